mod client;
mod health;
mod settings;
mod traces;
mod types;

pub use client::ChainClient;
pub use health::EndpointHealth;
pub use traces::CreatedContract;
pub use settings::{
    ChainSettings, ResolvedEndpoint, RpcEndpointEntry, RpcEndpointSettings, SettingsError,
    TraceMode,
};
pub use types::{Block, Transaction, TransactionReceipt};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("all configured rpc endpoints failed")]
    AllRpcsFailed,
    #[error("no endpoint of the chain advertises trace support")]
    NoTraceSupport,
    #[error("transaction traces contain no create frame for the address")]
    NoCreateTrace,
    #[error("trace response has unexpected shape: {0}")]
    MalformedTraceResponse(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("invalid rpc response: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Stable machine-readable code persisted on job rows.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AllRpcsFailed => "all_rpcs_failed",
            Self::NoTraceSupport => "no_trace_support",
            Self::NoCreateTrace => "no_create_trace",
            Self::MalformedTraceResponse(_) => "malformed_trace_response",
            Self::Rpc { .. } => "rpc_error",
            Self::InvalidResponse(_) => "invalid_response",
        }
    }
}
