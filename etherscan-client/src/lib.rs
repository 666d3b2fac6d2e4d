//! Importer for sources already verified on Etherscan-compatible block
//! explorers. The explorer's `getsourcecode` answer comes in three
//! shapes (raw single file, a json object of files, double-brace
//! wrapped standard json); all three normalize into a compilable
//! standard JSON input.

mod client;
mod types;
mod vyper_versions;

pub use client::{EtherscanClient, EtherscanClientBuilder};
pub use types::{ProcessedEtherscanResult, SourceCodeShape};
pub use vyper_versions::VyperVersionCache;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("explorer request failed: {0}")]
    Network(String),
    #[error("explorer returned http status {0}")]
    Http(u16),
    #[error("explorer rate limit reached")]
    RateLimit,
    #[error("explorer api error: {0}")]
    Api(String),
    #[error("contract is not verified on the explorer")]
    NotVerified,
    #[error("no provided source defines contract {0}")]
    MissingContractDefinition(String),
    #[error("vyper version {0} cannot be mapped to a compiler release")]
    VyperVersionMappingFailed(String),
    #[error("standard json input does not define contract {0}")]
    MissingContractInJson(String),
    #[error("vyper standard json input carries no settings")]
    MissingVyperSettings,
}

impl ImportError {
    /// Stable machine-readable code persisted on job rows.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network(_) => "etherscan_network_error",
            Self::Http(_) => "etherscan_http_error",
            Self::RateLimit => "etherscan_rate_limit",
            Self::Api(_) => "etherscan_api_error",
            Self::NotVerified => "etherscan_not_verified",
            Self::MissingContractDefinition(_) => "etherscan_missing_contract_definition",
            Self::VyperVersionMappingFailed(_) => "etherscan_vyper_version_mapping_failed",
            Self::MissingContractInJson(_) => "etherscan_missing_contract_in_json",
            Self::MissingVyperSettings => "etherscan_missing_vyper_settings",
        }
    }
}
