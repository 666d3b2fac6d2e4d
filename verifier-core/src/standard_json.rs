//! Serde mapping of the standard JSON compiler interface
//! (<https://docs.soliditylang.org/en/latest/using-the-compiler.html#compiler-input-and-output-json-description>).
//!
//! Settings are kept as an opaque json value: the service stores them
//! content-addressed and must round-trip fields it does not interpret.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    Solidity,
    Yul,
    Vyper,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Solidity => "solidity",
            Language::Yul => "yul",
            Language::Vyper => "vyper",
        }
    }

    pub fn compiler(&self) -> &'static str {
        match self {
            Language::Solidity | Language::Yul => "solc",
            Language::Vyper => "vyper",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub content: String,
}

impl Source {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerInput {
    pub language: Language,
    pub sources: BTreeMap<String, Source>,
    #[serde(default = "empty_settings")]
    pub settings: serde_json::Value,
}

fn empty_settings() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

impl CompilerInput {
    pub fn new(language: Language, sources: BTreeMap<String, Source>) -> Self {
        Self {
            language,
            sources,
            settings: empty_settings(),
        }
    }

    /// Requests every output field the verification pipeline consumes.
    pub fn normalize_output_selection(&mut self) {
        let selection = serde_json::json!({
            "*": {
                "*": [
                    "abi",
                    "evm.bytecode.object",
                    "evm.bytecode.sourceMap",
                    "evm.bytecode.linkReferences",
                    "evm.deployedBytecode.object",
                    "evm.deployedBytecode.sourceMap",
                    "evm.deployedBytecode.linkReferences",
                    "evm.deployedBytecode.immutableReferences",
                    "evm.legacyAssembly",
                    "evm.methodIdentifiers",
                    "metadata",
                    "userdoc",
                    "devdoc",
                    "storageLayout",
                ],
            },
        });
        match &mut self.settings {
            serde_json::Value::Object(settings) => {
                settings.insert("outputSelection".to_string(), selection);
            }
            other => {
                *other = serde_json::json!({ "outputSelection": selection });
            }
        }
    }

    /// `metadata.appendCBOR: false` disables the auxdata trailer entirely.
    pub fn append_cbor_disabled(&self) -> bool {
        self.settings
            .pointer("/metadata/appendCBOR")
            .and_then(serde_json::Value::as_bool)
            .map(|enabled| !enabled)
            .unwrap_or(false)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerOutput {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<OutputError>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub contracts: BTreeMap<String, BTreeMap<String, Contract>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sources: BTreeMap<String, OutputSource>,
}

impl CompilerOutput {
    pub fn error_messages(&self) -> Vec<String> {
        self.errors
            .iter()
            .filter(|err| err.severity == "error")
            .map(OutputError::text)
            .collect()
    }

    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(|err| err.severity == "error")
    }

    pub fn contract(&self, path: &str, name: &str) -> Option<&Contract> {
        self.contracts.get(path).and_then(|file| file.get(name))
    }

    pub fn source_ids(&self) -> BTreeMap<String, serde_json::Value> {
        self.sources
            .iter()
            .map(|(path, source)| (path.clone(), serde_json::json!({ "id": source.id })))
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputError {
    #[serde(default)]
    pub severity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_message: Option<String>,
}

impl OutputError {
    pub fn text(&self) -> String {
        self.formatted_message
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "unknown compiler error".to_string())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSource {
    #[serde(default)]
    pub id: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abi: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userdoc: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devdoc: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_layout: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evm: Option<Evm>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytecode: Option<Bytecode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_bytecode: Option<DeployedBytecode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_assembly: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_identifiers: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bytecode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_map: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_references: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedBytecode {
    #[serde(flatten)]
    pub bytecode: Bytecode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immutable_references: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn deserialize_minimal_output() {
        let raw = serde_json::json!({
            "errors": [
                {"severity": "warning", "message": "unused variable"},
                {"severity": "error", "formattedMessage": "ParserError: boom"},
            ],
            "contracts": {
                "src/A.sol": {
                    "A": {
                        "abi": [],
                        "evm": {
                            "bytecode": {"object": "6080"},
                            "deployedBytecode": {"object": "6001", "immutableReferences": {}},
                        },
                    },
                },
            },
            "sources": {"src/A.sol": {"id": 0}},
        });
        let output: CompilerOutput = serde_json::from_value(raw).unwrap();
        assert!(output.has_errors());
        assert_eq!(output.error_messages(), vec!["ParserError: boom"]);
        let contract = output.contract("src/A.sol", "A").expect("contract");
        assert_eq!(
            contract
                .evm
                .as_ref()
                .unwrap()
                .bytecode
                .as_ref()
                .unwrap()
                .object
                .as_deref(),
            Some("6080")
        );
    }

    #[test]
    fn append_cbor_flag() {
        let mut input = CompilerInput::new(Language::Solidity, BTreeMap::new());
        assert!(!input.append_cbor_disabled());
        input.settings = serde_json::json!({"metadata": {"appendCBOR": false}});
        assert!(input.append_cbor_disabled());
    }

    #[test]
    fn output_selection_is_normalized() {
        let mut input = CompilerInput::new(Language::Solidity, BTreeMap::new());
        input.settings = serde_json::json!({"optimizer": {"enabled": true, "runs": 200}});
        input.normalize_output_selection();
        assert!(input.settings.pointer("/outputSelection/*/*").is_some());
        assert_eq!(
            input.settings.pointer("/optimizer/runs"),
            Some(&serde_json::json!(200))
        );
    }
}
