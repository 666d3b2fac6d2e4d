use serde::Deserialize;
use serde_with::serde_as;
use std::{collections::BTreeMap, time::Duration};
use url::Url;

#[serde_as]
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MonitorSettings {
    pub chains: BTreeMap<String, ChainMonitorSettings>,
    #[serde(default)]
    pub monitor_factories: bool,
    pub sourcify_server_urls: Vec<Url>,
    #[serde(default)]
    pub sourcify_request: RequestSettings,
    #[serde(default)]
    pub similarity_verification: SimilaritySettings,
    #[serde(default)]
    pub ipfs: IpfsSettings,
}

#[serde_as]
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ChainMonitorSettings {
    /// Block height to resume from; the chain tip when absent.
    #[serde(default)]
    pub start_block: Option<u64>,
    #[serde(default = "default_block_interval")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub block_interval: Duration,
    /// Multiplier applied on an empty poll, divisor on a successful one.
    #[serde(default = "default_block_interval_factor")]
    pub block_interval_factor: f64,
    #[serde(default = "default_lower_block_interval")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub lower_block_interval: Duration,
    #[serde(default = "default_upper_block_interval")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub upper_block_interval: Duration,
    /// Fan-out for per-block bytecode and metadata fetches.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for ChainMonitorSettings {
    fn default() -> Self {
        Self {
            start_block: None,
            block_interval: default_block_interval(),
            block_interval_factor: default_block_interval_factor(),
            lower_block_interval: default_lower_block_interval(),
            upper_block_interval: default_upper_block_interval(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_block_interval() -> Duration {
    Duration::from_secs(12)
}

fn default_block_interval_factor() -> f64 {
    2.0
}

fn default_lower_block_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_upper_block_interval() -> Duration {
    Duration::from_secs(300)
}

fn default_concurrency() -> usize {
    4
}

#[serde_as]
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RequestSettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub retry_delay: Duration,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(5)
}

#[serde_as]
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SimilaritySettings {
    /// Grace delay before triggering, so explorers can index the
    /// contract first.
    #[serde(default = "default_similarity_request_delay")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub request_delay: Duration,
}

impl Default for SimilaritySettings {
    fn default() -> Self {
        Self {
            request_delay: default_similarity_request_delay(),
        }
    }
}

fn default_similarity_request_delay() -> Duration {
    Duration::from_secs(15)
}

#[serde_as]
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct IpfsSettings {
    #[serde(default = "default_ipfs_enabled")]
    pub enabled: bool,
    #[serde(default = "default_ipfs_gateways")]
    pub gateways: Vec<Url>,
    #[serde(default = "default_ipfs_timeout")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub timeout: Duration,
    #[serde(default = "default_ipfs_retries")]
    pub retries: u32,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Default for IpfsSettings {
    fn default() -> Self {
        Self {
            enabled: default_ipfs_enabled(),
            gateways: default_ipfs_gateways(),
            timeout: default_ipfs_timeout(),
            retries: default_ipfs_retries(),
            headers: Default::default(),
        }
    }
}

fn default_ipfs_enabled() -> bool {
    true
}

fn default_ipfs_gateways() -> Vec<Url> {
    vec!["https://ipfs.io/ipfs/"
        .parse()
        .expect("default gateway url is valid")]
}

fn default_ipfs_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_ipfs_retries() -> u32 {
    2
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn minimal_config_fills_defaults() {
        let raw = serde_json::json!({
            "chains": {"1": {}},
            "sourcify_server_urls": ["https://sourcify.dev/server/"],
        });
        let settings: MonitorSettings = serde_json::from_value(raw).unwrap();
        let chain = &settings.chains["1"];
        assert_eq!(chain.block_interval, Duration::from_secs(12));
        assert_eq!(chain.block_interval_factor, 2.0);
        assert!(!settings.monitor_factories);
        assert_eq!(
            settings.similarity_verification.request_delay,
            Duration::from_secs(15)
        );
        assert!(settings.ipfs.enabled);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let raw = serde_json::json!({
            "chains": {},
            "sourcify_server_urls": [],
            "no_such_field": 1,
        });
        assert!(serde_json::from_value::<MonitorSettings>(raw).is_err());
    }
}
