use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("environment variable {0} referenced by an rpc endpoint is not set")]
    MissingEnvVariable(String),
    #[error("rpc endpoint url is invalid after substitution: {0}")]
    InvalidUrl(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceMode {
    /// parity-style `trace_transaction`
    TraceTransaction,
    /// geth-style `debug_traceTransaction` with the `callTracer`
    DebugTraceTransaction,
}

/// One entry of a chain's `rpc` list. Plain urls, authenticated url
/// templates and header-carrying requests, as they appear in the chains
/// config file.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum RpcEndpointSettings {
    #[serde(rename = "Url")]
    Url {
        url: Url,
        #[serde(default)]
        trace_support: Option<TraceMode>,
    },
    #[serde(rename = "ApiKey")]
    ApiKey {
        url: String,
        api_key_env_name: String,
        #[serde(default)]
        sub_domain_env_name: Option<String>,
        #[serde(default)]
        trace_support: Option<TraceMode>,
    },
    #[serde(rename = "FetchRequest")]
    FetchRequest {
        url: Url,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        #[serde(default)]
        trace_support: Option<TraceMode>,
    },
}

impl RpcEndpointSettings {
    pub fn resolve(&self) -> Result<ResolvedEndpoint, SettingsError> {
        match self {
            Self::Url { url, trace_support } => Ok(ResolvedEndpoint {
                url: url.clone(),
                headers: vec![],
                trace_support: *trace_support,
            }),
            Self::ApiKey {
                url,
                api_key_env_name,
                sub_domain_env_name,
                trace_support,
            } => {
                let api_key = std::env::var(api_key_env_name)
                    .map_err(|_| SettingsError::MissingEnvVariable(api_key_env_name.clone()))?;
                let mut url = url.replace("{API_KEY}", &api_key);
                if let Some(sub_domain_env_name) = sub_domain_env_name {
                    let sub_domain = std::env::var(sub_domain_env_name).map_err(|_| {
                        SettingsError::MissingEnvVariable(sub_domain_env_name.clone())
                    })?;
                    url = url.replace("{SUBDOMAIN}", &sub_domain);
                }
                let url = url
                    .parse()
                    .map_err(|_| SettingsError::InvalidUrl(redact(&url, &api_key)))?;
                Ok(ResolvedEndpoint {
                    url,
                    headers: vec![],
                    trace_support: *trace_support,
                })
            }
            Self::FetchRequest {
                url,
                headers,
                trace_support,
            } => Ok(ResolvedEndpoint {
                url: url.clone(),
                headers: headers
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect(),
                trace_support: *trace_support,
            }),
        }
    }
}

fn redact(url: &str, secret: &str) -> String {
    url.replace(secret, "{API_KEY}")
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedEndpoint {
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub trace_support: Option<TraceMode>,
}

/// A chain's `rpc` list entry: either a bare url string or one of the
/// configured endpoint shapes.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RpcEndpointEntry {
    Plain(Url),
    Configured(RpcEndpointSettings),
}

impl RpcEndpointEntry {
    pub fn resolve(&self) -> Result<ResolvedEndpoint, SettingsError> {
        match self {
            Self::Plain(url) => Ok(ResolvedEndpoint {
                url: url.clone(),
                headers: vec![],
                trace_support: None,
            }),
            Self::Configured(settings) => settings.resolve(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ChainSettings {
    pub name: String,
    pub rpc: Vec<RpcEndpointEntry>,
    #[serde(default = "default_supported")]
    pub supported: bool,
    /// Address-indexed explorer API used to discover creation
    /// transactions when the caller supplies none.
    #[serde(default)]
    pub creation_transaction_api: Option<Url>,
}

fn default_supported() -> bool {
    true
}

impl ChainSettings {
    pub fn resolve_endpoints(&self) -> Result<Vec<ResolvedEndpoint>, SettingsError> {
        self.rpc.iter().map(RpcEndpointEntry::resolve).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn deserializes_all_endpoint_shapes() {
        let raw = serde_json::json!({
            "name": "testnet",
            "rpc": [
                "https://rpc.example.com/",
                {
                    "type": "ApiKey",
                    "url": "https://{SUBDOMAIN}.example.com/v3/{API_KEY}",
                    "api_key_env_name": "EXAMPLE_API_KEY",
                    "sub_domain_env_name": "EXAMPLE_SUBDOMAIN",
                    "trace_support": "debug_trace_transaction",
                },
                {
                    "type": "FetchRequest",
                    "url": "https://archive.example.com/",
                    "headers": {"x-api-key": "secret"},
                    "trace_support": "trace_transaction",
                },
            ],
        });
        let settings: ChainSettings = serde_json::from_value(raw).unwrap();
        assert_eq!(settings.rpc.len(), 3);
        assert_eq!(
            settings.rpc[0],
            RpcEndpointEntry::Plain("https://rpc.example.com/".parse().unwrap())
        );
        assert_eq!(
            settings.rpc[2],
            RpcEndpointEntry::Configured(RpcEndpointSettings::FetchRequest {
                url: "https://archive.example.com/".parse().unwrap(),
                headers: BTreeMap::from([("x-api-key".to_string(), "secret".to_string())]),
                trace_support: Some(TraceMode::TraceTransaction),
            })
        );
        let resolved = settings.resolve_endpoints();
        // the ApiKey endpoint needs env variables; bare urls resolve alone
        assert!(resolved.is_err());
    }

    #[test]
    fn api_key_template_is_substituted_from_env() {
        std::env::set_var("CHAIN_ACCESS_TEST_KEY", "deadbeef");
        std::env::set_var("CHAIN_ACCESS_TEST_SUBDOMAIN", "mainnet");
        let endpoint = RpcEndpointSettings::ApiKey {
            url: "https://{SUBDOMAIN}.example.com/v3/{API_KEY}".to_string(),
            api_key_env_name: "CHAIN_ACCESS_TEST_KEY".to_string(),
            sub_domain_env_name: Some("CHAIN_ACCESS_TEST_SUBDOMAIN".to_string()),
            trace_support: None,
        };
        let resolved = endpoint.resolve().unwrap();
        assert_eq!(
            resolved.url.as_str(),
            "https://mainnet.example.com/v3/deadbeef"
        );
    }

    #[test]
    fn missing_env_variable_is_reported() {
        let endpoint = RpcEndpointSettings::ApiKey {
            url: "https://example.com/{API_KEY}".to_string(),
            api_key_env_name: "CHAIN_ACCESS_TEST_UNSET_VARIABLE".to_string(),
            sub_domain_env_name: None,
            trace_support: None,
        };
        let err = endpoint.resolve().unwrap_err();
        assert!(matches!(err, SettingsError::MissingEnvVariable(name) if name.contains("UNSET")));
    }
}
