//! Typed views of the per-code compiler artifacts the verifier stores
//! and replays: link references, immutable references and located CBOR
//! auxdata regions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Offsets {
    pub start: u32,
    pub length: u32,
}

/// `{file => {library => [offsets]}}`, straight from `evm.bytecode.linkReferences`.
pub type LinkReferences = BTreeMap<String, BTreeMap<String, Vec<Offsets>>>;

/// `{ast id => [offsets]}`, straight from `evm.deployedBytecode.immutableReferences`.
pub type ImmutableReferences = BTreeMap<String, Vec<Offsets>>;

#[serde_with::serde_as]
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CborAuxdataValue {
    #[serde_as(as = "blockscout_display_bytes::serde_as::Hex")]
    pub value: Vec<u8>,
    pub offset: u32,
}

pub type CborAuxdata = BTreeMap<String, CborAuxdataValue>;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilationArtifacts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abi: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub devdoc: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userdoc: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_layout: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationCodeArtifacts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_map: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_references: Option<LinkReferences>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cbor_auxdata: Option<CborAuxdata>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeCodeArtifacts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_map: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_references: Option<LinkReferences>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub immutable_references: Option<ImmutableReferences>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cbor_auxdata: Option<CborAuxdata>,
}

impl From<CompilationArtifacts> for serde_json::Value {
    fn from(value: CompilationArtifacts) -> Self {
        serde_json::to_value(value).expect("compilation artifacts serialization must succeed")
    }
}

impl From<CreationCodeArtifacts> for serde_json::Value {
    fn from(value: CreationCodeArtifacts) -> Self {
        serde_json::to_value(value).expect("creation code artifacts serialization must succeed")
    }
}

impl From<RuntimeCodeArtifacts> for serde_json::Value {
    fn from(value: RuntimeCodeArtifacts) -> Self {
        serde_json::to_value(value).expect("runtime code artifacts serialization must succeed")
    }
}
