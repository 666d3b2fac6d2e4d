//! Unlinked-bytecode handling. Every library the compiler could not
//! resolve shows up in the hex object as a 40-character placeholder,
//! either `__$<34 hex>$__` (0.5.0 and later, keyed by a keccak of the
//! fully qualified name) or `__<name padded with underscores>__`.

use super::artifacts::{LinkReferences, Offsets};
use thiserror::Error;

pub const PLACEHOLDER_CHARS: usize = 40;
pub const PLACEHOLDER_BYTES: usize = PLACEHOLDER_CHARS / 2;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InvalidBytecodeError {
    #[error("bytecode object has odd length")]
    OddLength,
    #[error("bytecode object is not a hex string at char {0}")]
    NotHex(usize),
    #[error("truncated link placeholder at char {0}")]
    TruncatedPlaceholder(usize),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkSite {
    pub id: String,
    pub offset: usize,
}

/// Decodes a (possibly unlinked) bytecode object, substituting zero
/// bytes for each placeholder and recording the link sites.
pub fn parse_unlinked(object: &str) -> Result<(Vec<u8>, Vec<LinkSite>), InvalidBytecodeError> {
    let object = object.strip_prefix("0x").unwrap_or(object);
    if object.len() % 2 != 0 {
        return Err(InvalidBytecodeError::OddLength);
    }

    let chars = object.as_bytes();
    let mut code = Vec::with_capacity(object.len() / 2);
    let mut sites = Vec::new();

    let mut pos = 0;
    while pos < chars.len() {
        if chars[pos..].starts_with(b"__") {
            if chars.len() < pos + PLACEHOLDER_CHARS {
                return Err(InvalidBytecodeError::TruncatedPlaceholder(pos));
            }
            let placeholder = &object[pos..pos + PLACEHOLDER_CHARS];
            sites.push(LinkSite {
                id: placeholder_id(placeholder),
                offset: code.len(),
            });
            code.extend([0u8; PLACEHOLDER_BYTES]);
            pos += PLACEHOLDER_CHARS;
        } else {
            let byte = u8::from_str_radix(&object[pos..pos + 2], 16)
                .map_err(|_| InvalidBytecodeError::NotHex(pos))?;
            code.push(byte);
            pos += 2;
        }
    }

    Ok((code, sites))
}

fn placeholder_id(placeholder: &str) -> String {
    let inner = placeholder.trim_matches('_');
    inner.trim_matches('$').to_string()
}

/// Link-references map derived from placeholder sites alone. The file
/// part is unknown for hash placeholders, so sites group under an empty
/// file name.
pub fn to_link_references(sites: &[LinkSite]) -> LinkReferences {
    let mut references = LinkReferences::new();
    for site in sites {
        references
            .entry(String::new())
            .or_default()
            .entry(site.id.clone())
            .or_default()
            .push(Offsets {
                start: site.offset as u32,
                length: PLACEHOLDER_BYTES as u32,
            });
    }
    references
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_plain_hex() {
        let (code, sites) = parse_unlinked("0x60806040").unwrap();
        assert_eq!(code, hex::decode("60806040").unwrap());
        assert!(sites.is_empty());
    }

    #[test]
    fn parses_hash_placeholder() {
        let placeholder = "__$8a4e4d2f9ab57e3f5f0cc1e2c3d4e5f601$__";
        assert_eq!(placeholder.len(), PLACEHOLDER_CHARS);
        let object = format!("6080{placeholder}6040");
        let (code, sites) = parse_unlinked(&object).unwrap();
        assert_eq!(code.len(), 2 + PLACEHOLDER_BYTES + 2);
        assert_eq!(&code[2..22], &[0u8; 20]);
        assert_eq!(
            sites,
            vec![LinkSite {
                id: "8a4e4d2f9ab57e3f5f0cc1e2c3d4e5f601".to_string(),
                offset: 2,
            }]
        );
    }

    #[test]
    fn parses_legacy_name_placeholder() {
        let placeholder = "__browser/Library.sol:Math______________";
        assert_eq!(placeholder.len(), PLACEHOLDER_CHARS);
        let (code, sites) = parse_unlinked(placeholder).unwrap();
        assert_eq!(code, vec![0u8; 20]);
        assert_eq!(sites[0].id, "browser/Library.sol:Math");
        assert_eq!(sites[0].offset, 0);
    }

    #[test]
    fn rejects_broken_objects() {
        assert_eq!(
            parse_unlinked("608"),
            Err(InvalidBytecodeError::OddLength)
        );
        assert_eq!(parse_unlinked("60zz"), Err(InvalidBytecodeError::NotHex(2)));
        assert_eq!(
            parse_unlinked("6080__$too_short$__"),
            Err(InvalidBytecodeError::TruncatedPlaceholder(4))
        );
    }

    #[test]
    fn sites_group_into_link_references() {
        let placeholder = "__$8a4e4d2f9ab57e3f5f0cc1e2c3d4e5f601$__";
        let object = format!("{placeholder}00{placeholder}");
        let (_, sites) = parse_unlinked(&object).unwrap();
        let references = to_link_references(&sites);
        let offsets = &references[""]["8a4e4d2f9ab57e3f5f0cc1e2c3d4e5f601"];
        assert_eq!(
            offsets,
            &vec![
                Offsets { start: 0, length: 20 },
                Offsets { start: 21, length: 20 },
            ]
        );
    }
}
