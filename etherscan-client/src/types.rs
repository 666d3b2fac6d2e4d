use crate::ImportError;
use serde::Deserialize;
use std::collections::BTreeMap;
use verifier_core::standard_json::{CompilerInput, Language, Source};

#[derive(Debug, Deserialize)]
pub(crate) struct EtherscanResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub result: serde_json::Value,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct RawContract {
    #[serde(rename = "SourceCode", default)]
    pub source_code: String,
    #[serde(rename = "ContractName", default)]
    pub contract_name: String,
    #[serde(rename = "CompilerVersion", default)]
    pub compiler_version: String,
    #[serde(rename = "OptimizationUsed", default)]
    pub optimization_used: String,
    #[serde(rename = "Runs", default)]
    pub runs: String,
    #[serde(rename = "EVMVersion", default)]
    pub evm_version: String,
}

impl RawContract {
    pub fn is_vyper(&self) -> bool {
        self.compiler_version.starts_with("vyper")
    }

    /// Compiler settings reconstructed from the flat explorer fields,
    /// used for the single-file and multi-file shapes which carry no
    /// settings of their own.
    pub fn synthesized_settings(&self) -> serde_json::Value {
        let mut settings = serde_json::json!({
            "optimizer": {
                "enabled": self.optimization_used == "1",
                "runs": self.runs.parse::<u64>().unwrap_or(200),
            },
        });
        if !self.evm_version.is_empty() && !self.evm_version.eq_ignore_ascii_case("default") {
            settings["evmVersion"] = serde_json::json!(self.evm_version.to_lowercase());
        }
        settings
    }
}

/// The three shapes `SourceCode` is served in, discriminated by the
/// `{{` prefix and a json parse probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceCodeShape {
    SingleFile(String),
    MultiFile(BTreeMap<String, String>),
    StandardJson(serde_json::Value),
}

pub(crate) fn parse_source_code(raw: &str) -> Result<SourceCodeShape, ImportError> {
    let trimmed = raw.trim();
    if let Some(inner) = trimmed
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .filter(|_| trimmed.starts_with("{{") && trimmed.ends_with("}}"))
    {
        let value: serde_json::Value = serde_json::from_str(inner)
            .map_err(|err| ImportError::Api(format!("unparsable standard json input: {err}")))?;
        return Ok(SourceCodeShape::StandardJson(value));
    }

    if trimmed.starts_with('{') {
        #[derive(Deserialize)]
        struct FileEntry {
            content: String,
        }
        if let Ok(files) = serde_json::from_str::<BTreeMap<String, FileEntry>>(trimmed) {
            return Ok(SourceCodeShape::MultiFile(
                files
                    .into_iter()
                    .map(|(path, entry)| (path, entry.content))
                    .collect(),
            ));
        }
    }

    Ok(SourceCodeShape::SingleFile(raw.to_string()))
}

/// Whether `content` contains a top-level definition of `name`
/// (`contract X`, `library X`, `interface X`, abstract included).
pub(crate) fn contains_definition(content: &str, name: &str) -> bool {
    for keyword in ["contract", "library", "interface"] {
        let needle = format!("{keyword} {name}");
        let mut search_start = 0;
        while let Some(found) = content[search_start..].find(&needle) {
            let end = search_start + found + needle.len();
            let followed_by_identifier = content[end..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$');
            if !followed_by_identifier {
                return true;
            }
            search_start = end;
        }
    }
    false
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessedEtherscanResult {
    /// Canonical release string, e.g. `v0.8.10+commit.fc410830`.
    pub compiler_version: String,
    pub language: Language,
    pub json_input: CompilerInput,
    pub contract_path: String,
    pub contract_name: String,
}

pub(crate) fn sources_from_map(files: BTreeMap<String, String>) -> BTreeMap<String, Source> {
    files
        .into_iter()
        .map(|(path, content)| (path, Source::new(content)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn single_file_shape() {
        let raw = "pragma solidity ^0.8.0;\ncontract Storage {}";
        assert_eq!(
            parse_source_code(raw).unwrap(),
            SourceCodeShape::SingleFile(raw.to_string())
        );
    }

    #[test]
    fn multi_file_shape() {
        let raw = r#"{"contracts/A.sol": {"content": "contract A {}"}, "contracts/B.sol": {"content": "contract B {}"}}"#;
        let shape = parse_source_code(raw).unwrap();
        assert_eq!(
            shape,
            SourceCodeShape::MultiFile(BTreeMap::from([
                ("contracts/A.sol".to_string(), "contract A {}".to_string()),
                ("contracts/B.sol".to_string(), "contract B {}".to_string()),
            ]))
        );
    }

    #[test]
    fn double_braced_standard_json_shape() {
        let raw = r#"{{"language": "Solidity", "sources": {"a.sol": {"content": "contract A {}"}}, "settings": {}}}"#;
        match parse_source_code(raw).unwrap() {
            SourceCodeShape::StandardJson(value) => {
                assert_eq!(value["language"], "Solidity");
            }
            other => panic!("expected standard json, got {other:?}"),
        }
    }

    #[test]
    fn malformed_double_braced_json_is_an_api_error()  {
        let raw = "{{not json}}";
        assert!(matches!(
            parse_source_code(raw),
            Err(ImportError::Api(_))
        ));
    }

    #[test]
    fn definition_scan_requires_word_boundary() {
        assert!(contains_definition("contract Token {}", "Token"));
        assert!(contains_definition("abstract contract Token is A {}", "Token"));
        assert!(contains_definition("library Token {}", "Token"));
        assert!(!contains_definition("contract TokenVault {}", "Token"));
        assert!(!contains_definition("// no definitions here", "Token"));
        // a later true definition is still found after a prefix miss
        assert!(contains_definition(
            "contract TokenVault {} contract Token {}",
            "Token"
        ));
    }

    #[test]
    fn settings_are_synthesized_from_flat_fields() {
        let raw = RawContract {
            source_code: String::new(),
            contract_name: "Storage".to_string(),
            compiler_version: "v0.8.10+commit.fc410830".to_string(),
            optimization_used: "1".to_string(),
            runs: "999".to_string(),
            evm_version: "London".to_string(),
        };
        assert_eq!(
            raw.synthesized_settings(),
            serde_json::json!({
                "optimizer": {"enabled": true, "runs": 999},
                "evmVersion": "london",
            })
        );
    }
}
