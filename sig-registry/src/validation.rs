use crate::RegistryError;

/// `0x`-prefixed selector hashes: 4 bytes (10 chars) or 32 bytes (66).
pub(crate) fn parse_hash(hash: &str, allow_short: bool) -> Result<Vec<u8>, RegistryError> {
    let invalid = || RegistryError::InvalidHash(hash.to_string());
    let digits = hash.strip_prefix("0x").ok_or_else(invalid)?;
    match hash.len() {
        10 if allow_short => {}
        66 => {}
        _ => return Err(invalid()),
    }
    hex::decode(digits).map_err(|_| invalid())
}

pub(crate) fn validate_pattern(pattern: &str) -> Result<(), RegistryError> {
    let allowed = |c: char| {
        c.is_ascii_alphanumeric() || matches!(c, '$' | '_' | '(' | ')' | '[' | ']' | ',' | '*' | '?')
    };
    if pattern.is_empty() || !pattern.chars().all(allowed) {
        return Err(RegistryError::InvalidPattern(pattern.to_string()));
    }
    Ok(())
}

/// Wildcards translate to SQL LIKE: `*` to `%`, `?` to `_`; literal
/// underscores are escaped so `totalSupply_` never matches arbitrary
/// characters.
pub(crate) fn pattern_to_like(pattern: &str) -> String {
    let mut like = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '*' => like.push('%'),
            '?' => like.push('_'),
            '_' => like.push_str("\\_"),
            '%' => like.push_str("\\%"),
            '\\' => like.push_str("\\\\"),
            other => like.push(other),
        }
    }
    like
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("0x70a08231", true)]
    #[case("0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef", true)]
    #[case("0x70a08231", false)]
    fn hash_lengths(#[case] hash: &str, #[case] allow_short: bool) {
        let result = parse_hash(hash, allow_short);
        if hash.len() == 10 && !allow_short {
            assert!(result.is_err());
        } else {
            assert_eq!(result.unwrap().len() * 2 + 2, hash.len());
        }
    }

    #[rstest]
    #[case("70a08231")]
    #[case("0x70a0823")]
    #[case("0xzzzz8231")]
    #[case("0x")]
    fn invalid_hashes(#[case] hash: &str) {
        assert!(parse_hash(hash, true).is_err());
    }

    #[test]
    fn pattern_charset() {
        validate_pattern("transfer(address,uint256)").unwrap();
        validate_pattern("balance*").unwrap();
        validate_pattern("a?b$_[]").unwrap();
        assert!(validate_pattern("").is_err());
        assert!(validate_pattern("has space").is_err());
        assert!(validate_pattern("semi;colon").is_err());
    }

    #[test]
    fn wildcards_translate_and_underscores_escape() {
        assert_eq!(pattern_to_like("transfer*"), "transfer%");
        assert_eq!(pattern_to_like("t?ansfer"), "t_ansfer");
        assert_eq!(pattern_to_like("total_supply"), "total\\_supply");
        assert_eq!(pattern_to_like("*(uint256,?)"), "%(uint256,_)");
    }
}
