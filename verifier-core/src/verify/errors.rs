use crate::compilers::CompileError;
use serde::Serialize;
use thiserror::Error;

/// Failed-verification payload: the artifacts that were produced before
/// the comparison failed, handed back to callers for diagnostics.
#[serde_with::serde_as]
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MismatchPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde_as(as = "Option<blockscout_display_bytes::serde_as::Hex>")]
    pub onchain_runtime_code: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde_as(as = "Option<blockscout_display_bytes::serde_as::Hex>")]
    pub onchain_creation_code: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde_as(as = "Option<blockscout_display_bytes::serde_as::Hex>")]
    pub recompiled_runtime_code: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde_as(as = "Option<blockscout_display_bytes::serde_as::Hex>")]
    pub recompiled_creation_code: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde_as(as = "Option<blockscout_display_bytes::serde_as::Hex>")]
    pub creation_transaction_hash: Option<Vec<u8>>,
}

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("compiler version {0} is not supported")]
    UnsupportedCompilerVersion(String),
    #[error("compilation failed: {}", .0.join("; "))]
    Compiler(Vec<String>),
    #[error("compilation output misses the requested contract {0}")]
    ContractNotFound(String),
    #[error("source file {0} is referenced but was not provided")]
    MissingSource(String),
    #[error("source input is missing or invalid: {0}")]
    MissingOrInvalidSource(String),
    #[error("compiler emitted bytecode for metadata-listed sources only; the full source set is required")]
    ExtraFileInputBug,
    #[error("no contract is deployed at the requested address")]
    ContractNotDeployed,
    #[error("on-chain and recompiled bytecodes do not match")]
    BytecodeMismatch(Box<MismatchPayload>),
    #[error(transparent)]
    ChainAccess(#[from] chain_access::Error),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl VerificationError {
    /// Stable machine-readable code persisted on job rows.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedCompilerVersion(_) => "unsupported_compiler_version",
            Self::Compiler(_) => "compiler_error",
            Self::ContractNotFound(_) => "contract_not_found",
            Self::MissingSource(_) => "missing_source",
            Self::MissingOrInvalidSource(_) => "missing_or_invalid_source",
            Self::ExtraFileInputBug => "extra_file_input_bug",
            Self::ContractNotDeployed => "contract_not_deployed",
            Self::BytecodeMismatch(_) => "bytecode_mismatch",
            Self::ChainAccess(err) => err.code(),
            Self::Compile(CompileError::VersionNotFound(_)) => "unsupported_compiler_version",
            Self::Compile(_) => "compiler_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Structured payload stored as `error_data`, keyed by `code`.
    pub fn data(&self) -> serde_json::Value {
        match self {
            Self::UnsupportedCompilerVersion(version) => {
                serde_json::json!({ "compilerVersion": version })
            }
            Self::Compiler(messages) => serde_json::json!({ "errors": messages }),
            Self::ContractNotFound(name) => serde_json::json!({ "contract": name }),
            Self::MissingSource(path) => serde_json::json!({ "path": path }),
            Self::BytecodeMismatch(payload) => {
                serde_json::to_value(payload).expect("payload serialization must succeed")
            }
            other => serde_json::json!({ "message": other.to_string() }),
        }
    }
}
