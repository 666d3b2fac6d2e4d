use std::{collections::HashSet, sync::OnceLock};

/// Selector texts considered canonical, one per line, bundled at build
/// time. Lookup entries that are not on the list are flagged as
/// filtered so clients can rank collision spam below real signatures.
const CANONICAL_LIST: &str = include_str!("../data/canonical_signatures.txt");

fn canonical_set() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| {
        CANONICAL_LIST
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect()
    })
}

pub(crate) fn is_canonical(signature: &str) -> bool {
    canonical_set().contains(signature)
}
