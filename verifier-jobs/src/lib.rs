//! Off-request verification: a bounded worker pool that records every
//! accepted request as a job row before compiling, runs the engine
//! under a deadline, and writes exactly one terminal update per job.
//! Compiler failures and bytecode mismatches are job outcomes, not
//! process errors; only infrastructure failures propagate.

mod metadata;
mod pool;

pub use pool::{WorkerPool, WorkerPoolBuilder};

use std::collections::BTreeMap;
use thiserror::Error;
use verifier_core::{
    standard_json::CompilerInput, verify::CompilationTarget, VerificationError,
};

/// The three job shapes the pool dispatches.
#[derive(Clone, Debug)]
pub enum VerificationJobRequest {
    FromJsonInput {
        chain_id: String,
        address: Vec<u8>,
        compiler_version: String,
        compilation_target: CompilationTarget,
        json_input: CompilerInput,
        creation_transaction_hash: Option<Vec<u8>>,
    },
    FromMetadata {
        chain_id: String,
        address: Vec<u8>,
        metadata: serde_json::Value,
        sources: BTreeMap<String, String>,
        creation_transaction_hash: Option<Vec<u8>>,
    },
    FromExplorer {
        chain_id: String,
        address: Vec<u8>,
        explorer_result: etherscan_client::ProcessedEtherscanResult,
        creation_transaction_hash: Option<Vec<u8>>,
    },
}

impl VerificationJobRequest {
    pub fn chain_id(&self) -> &str {
        match self {
            Self::FromJsonInput { chain_id, .. }
            | Self::FromMetadata { chain_id, .. }
            | Self::FromExplorer { chain_id, .. } => chain_id,
        }
    }

    pub fn address(&self) -> &[u8] {
        match self {
            Self::FromJsonInput { address, .. }
            | Self::FromMetadata { address, .. }
            | Self::FromExplorer { address, .. } => address,
        }
    }

    fn endpoint_name(&self) -> &'static str {
        match self {
            Self::FromJsonInput { .. } => "verify_from_json_input",
            Self::FromMetadata { .. } => "verify_from_metadata",
            Self::FromExplorer { .. } => "verify_from_explorer",
        }
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("chain {0} is not configured")]
    UnsupportedChain(String),
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error(transparent)]
    Store(#[from] verifier_database::StoreError),
    #[error("verification did not finish before the deadline")]
    DeadlineExceeded,
}

impl JobError {
    pub fn code(&self) -> &'static str {
        match self {
            JobError::UnsupportedChain(_) => "unsupported_chain",
            JobError::Verification(err) => err.code(),
            JobError::Store(err) => err.code(),
            JobError::DeadlineExceeded => "deadline_exceeded",
        }
    }

    pub fn data(&self) -> serde_json::Value {
        match self {
            JobError::Verification(err) => err.data(),
            other => serde_json::json!({ "message": other.to_string() }),
        }
    }
}
