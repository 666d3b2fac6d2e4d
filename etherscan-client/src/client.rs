use crate::{
    types::{
        contains_definition, parse_source_code, sources_from_map, EtherscanResponse,
        ProcessedEtherscanResult, RawContract, SourceCodeShape,
    },
    vyper_versions::{VyperVersionCache, DEFAULT_VYPER_RELEASES_URL},
    ImportError,
};
use blockscout_display_bytes::Bytes as DisplayBytes;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use std::collections::BTreeMap;
use url::Url;
use verifier_core::standard_json::{CompilerInput, Language, Source};

pub struct EtherscanClientBuilder {
    base_url: Url,
    api_key: Option<String>,
    vyper_releases_url: Url,
    max_retries: u32,
}

impl EtherscanClientBuilder {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            api_key: None,
            vyper_releases_url: DEFAULT_VYPER_RELEASES_URL
                .parse()
                .expect("default vyper releases url is valid"),
            max_retries: 3,
        }
    }

    pub fn api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn vyper_releases_url(mut self, url: Url) -> Self {
        self.vyper_releases_url = url;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn build(self) -> EtherscanClient {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(self.max_retries);
        let client = reqwest_middleware::ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        EtherscanClient {
            base_url: self.base_url,
            api_key: self.api_key,
            client,
            vyper_versions: VyperVersionCache::new(self.vyper_releases_url),
        }
    }
}

pub struct EtherscanClient {
    base_url: Url,
    api_key: Option<String>,
    client: ClientWithMiddleware,
    vyper_versions: VyperVersionCache,
}

impl EtherscanClient {
    /// `GET /api?module=contract&action=getsourcecode` normalized into
    /// a compilable input.
    pub async fn fetch_verified_source(
        &self,
        chain_id: &str,
        address: &[u8],
    ) -> Result<ProcessedEtherscanResult, ImportError> {
        let mut url = self
            .base_url
            .join("api")
            .map_err(|err| ImportError::Network(err.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("chainid", chain_id)
                .append_pair("module", "contract")
                .append_pair("action", "getsourcecode")
                .append_pair("address", &DisplayBytes::from(address.to_vec()).to_string());
            if let Some(api_key) = &self.api_key {
                query.append_pair("apikey", api_key);
            }
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| ImportError::Network(err.to_string()))?;
        if response.status().as_u16() == 429 {
            return Err(ImportError::RateLimit);
        }
        if !response.status().is_success() {
            return Err(ImportError::Http(response.status().as_u16()));
        }
        let response: EtherscanResponse = response
            .json()
            .await
            .map_err(|err| ImportError::Network(err.to_string()))?;

        if response.status != "1" {
            let details = response
                .result
                .as_str()
                .map(ToString::to_string)
                .unwrap_or(response.message);
            if details.to_lowercase().contains("rate limit") {
                return Err(ImportError::RateLimit);
            }
            return Err(ImportError::Api(details));
        }

        let contract: RawContract = serde_json::from_value(
            response
                .result
                .as_array()
                .and_then(|results| results.first().cloned())
                .ok_or_else(|| ImportError::Api("empty result array".to_string()))?,
        )
        .map_err(|err| ImportError::Api(format!("unexpected result shape: {err}")))?;

        if contract.source_code.is_empty() {
            return Err(ImportError::NotVerified);
        }

        self.process(contract).await
    }

    /// `GET /api?module=contract&action=getcontractcreation`: the
    /// transaction that deployed the contract, when the explorer has
    /// indexed it.
    pub async fn fetch_contract_creation(
        &self,
        chain_id: &str,
        address: &[u8],
    ) -> Result<Option<Vec<u8>>, ImportError> {
        let mut url = self
            .base_url
            .join("api")
            .map_err(|err| ImportError::Network(err.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("chainid", chain_id)
                .append_pair("module", "contract")
                .append_pair("action", "getcontractcreation")
                .append_pair(
                    "contractaddresses",
                    &DisplayBytes::from(address.to_vec()).to_string(),
                );
            if let Some(api_key) = &self.api_key {
                query.append_pair("apikey", api_key);
            }
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| ImportError::Network(err.to_string()))?;
        if response.status().as_u16() == 429 {
            return Err(ImportError::RateLimit);
        }
        if !response.status().is_success() {
            return Err(ImportError::Http(response.status().as_u16()));
        }
        let response: EtherscanResponse = response
            .json()
            .await
            .map_err(|err| ImportError::Network(err.to_string()))?;

        if response.status != "1" {
            // "No data found" is a normal miss, not an api failure
            return Ok(None);
        }

        #[derive(Deserialize)]
        struct CreationEntry {
            #[serde(rename = "txHash")]
            tx_hash: String,
        }
        let entry: Option<CreationEntry> = response
            .result
            .as_array()
            .and_then(|results| results.first().cloned())
            .and_then(|entry| serde_json::from_value(entry).ok());
        Ok(entry.and_then(|entry| {
            hex::decode(entry.tx_hash.trim_start_matches("0x")).ok()
        }))
    }

    async fn process(&self, raw: RawContract) -> Result<ProcessedEtherscanResult, ImportError> {
        let shape = parse_source_code(&raw.source_code)?;
        if raw.is_vyper() {
            self.process_vyper(raw, shape).await
        } else {
            process_solidity(raw, shape)
        }
    }

    async fn process_vyper(
        &self,
        raw: RawContract,
        shape: SourceCodeShape,
    ) -> Result<ProcessedEtherscanResult, ImportError> {
        let short_version = raw
            .compiler_version
            .trim_start_matches("vyper:")
            .trim_start_matches('v');
        let compiler_version = self.vyper_versions.lookup(short_version).await?;
        let contract_name = raw.contract_name.clone();

        let (sources, settings, contract_path) = match shape {
            SourceCodeShape::SingleFile(content) => {
                let path = format!("{contract_name}.vy");
                let sources = BTreeMap::from([(path.clone(), Source::new(content))]);
                (sources, vyper_settings(&raw), path)
            }
            SourceCodeShape::MultiFile(files) => {
                let path = vyper_target_path(files.keys(), &contract_name)
                    .ok_or_else(|| ImportError::MissingContractDefinition(contract_name.clone()))?;
                (sources_from_map(files), vyper_settings(&raw), path)
            }
            SourceCodeShape::StandardJson(value) => {
                let input = decode_standard_json(value)?;
                let settings = input
                    .standard_settings
                    .ok_or(ImportError::MissingVyperSettings)?;
                let path = vyper_target_path(input.sources.keys(), &contract_name)
                    .ok_or_else(|| ImportError::MissingContractInJson(contract_name.clone()))?;
                (input.sources, settings, path)
            }
        };

        Ok(ProcessedEtherscanResult {
            compiler_version,
            language: Language::Vyper,
            json_input: CompilerInput {
                language: Language::Vyper,
                sources,
                settings,
            },
            contract_path,
            contract_name,
        })
    }
}

/// Engine seam: explorers are the address-indexed source of creation
/// transactions when the caller supplies none. Misses and explorer
/// errors both skip the creation side instead of failing verification.
#[async_trait::async_trait]
impl verifier_core::verify::CreationTransactionProvider for EtherscanClient {
    async fn creation_transaction(
        &self,
        chain_id: &str,
        address: &[u8],
    ) -> Result<Option<Vec<u8>>, anyhow::Error> {
        match self.fetch_contract_creation(chain_id, address).await {
            Ok(hash) => Ok(hash),
            Err(err @ (ImportError::RateLimit | ImportError::Network(_))) => {
                Err(anyhow::Error::new(err).context("contract creation lookup"))
            }
            Err(err) => {
                tracing::debug!("contract creation lookup failed: {err}");
                Ok(None)
            }
        }
    }
}

fn process_solidity(
    raw: RawContract,
    shape: SourceCodeShape,
) -> Result<ProcessedEtherscanResult, ImportError> {
    let compiler_version = normalize_solc_version(&raw.compiler_version);
    let contract_name = raw.contract_name.clone();

    let (language, sources, settings, contract_path) = match shape {
        SourceCodeShape::SingleFile(content) => {
            let path = format!("{contract_name}.sol");
            let sources = BTreeMap::from([(path.clone(), Source::new(content))]);
            (Language::Solidity, sources, raw.synthesized_settings(), path)
        }
        SourceCodeShape::MultiFile(files) => {
            let path = solidity_target_path(&files, &contract_name)
                .ok_or_else(|| ImportError::MissingContractDefinition(contract_name.clone()))?;
            (
                Language::Solidity,
                sources_from_map(files),
                raw.synthesized_settings(),
                path,
            )
        }
        SourceCodeShape::StandardJson(value) => {
            let input = decode_standard_json(value)?;
            let files: BTreeMap<String, String> = input
                .sources
                .iter()
                .map(|(path, source)| (path.clone(), source.content.clone()))
                .collect();
            let path = solidity_target_path(&files, &contract_name)
                .ok_or_else(|| ImportError::MissingContractInJson(contract_name.clone()))?;
            (
                input.language,
                input.sources,
                input.standard_settings.unwrap_or_else(empty_settings),
                path,
            )
        }
    };

    Ok(ProcessedEtherscanResult {
        compiler_version,
        language,
        json_input: CompilerInput {
            language,
            sources,
            settings,
        },
        contract_path,
        contract_name,
    })
}

struct DecodedStandardJson {
    language: Language,
    sources: BTreeMap<String, Source>,
    standard_settings: Option<serde_json::Value>,
}

fn decode_standard_json(value: serde_json::Value) -> Result<DecodedStandardJson, ImportError> {
    #[derive(Deserialize)]
    struct Raw {
        #[serde(default = "default_language")]
        language: Language,
        sources: BTreeMap<String, Source>,
        #[serde(default)]
        settings: Option<serde_json::Value>,
    }
    fn default_language() -> Language {
        Language::Solidity
    }

    let raw: Raw = serde_json::from_value(value)
        .map_err(|err| ImportError::Api(format!("unparsable standard json input: {err}")))?;
    Ok(DecodedStandardJson {
        language: raw.language,
        sources: raw.sources,
        standard_settings: raw.settings,
    })
}

fn empty_settings() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

/// vyper knows no optimizer runs; only the evm version survives from
/// the flat explorer fields.
fn vyper_settings(raw: &RawContract) -> serde_json::Value {
    let mut settings = serde_json::json!({});
    if !raw.evm_version.is_empty() && !raw.evm_version.eq_ignore_ascii_case("default") {
        settings["evmVersion"] = serde_json::json!(raw.evm_version.to_lowercase());
    }
    settings
}

fn normalize_solc_version(version: &str) -> String {
    if version.starts_with('v') {
        version.to_string()
    } else {
        format!("v{version}")
    }
}

fn solidity_target_path(
    files: &BTreeMap<String, String>,
    contract_name: &str,
) -> Option<String> {
    files
        .iter()
        .find(|(_, content)| contains_definition(content, contract_name))
        .map(|(path, _)| path.clone())
}

/// vyper modules carry no textual contract definition; the target is
/// the file whose stem equals the contract name.
fn vyper_target_path<'a>(
    paths: impl Iterator<Item = &'a String>,
    contract_name: &str,
) -> Option<String> {
    let mut fallback = None;
    for path in paths {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        let stem = file_name.trim_end_matches(".vy");
        if stem == contract_name {
            return Some(path.clone());
        }
        if fallback.is_none() && file_name.ends_with(".vy") {
            fallback = Some(path.clone());
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    const ADDRESS: [u8; 20] = [0xab; 20];

    fn client(server: &MockServer) -> EtherscanClient {
        EtherscanClientBuilder::new(format!("{}/", server.uri()).parse().unwrap())
            .api_key(Some("test-key".to_string()))
            .max_retries(0)
            .build()
    }

    fn source_code_response(result: serde_json::Value) -> serde_json::Value {
        serde_json::json!({"status": "1", "message": "OK", "result": [result]})
    }

    #[tokio::test]
    async fn single_file_contract_is_processed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .and(query_param("module", "contract"))
            .and(query_param("action", "getsourcecode"))
            .and(query_param("chainid", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(source_code_response(
                serde_json::json!({
                    "SourceCode": "pragma solidity ^0.8.0;\ncontract Storage {}",
                    "ContractName": "Storage",
                    "CompilerVersion": "v0.8.10+commit.fc410830",
                    "OptimizationUsed": "0",
                    "Runs": "200",
                    "EVMVersion": "Default",
                }),
            )))
            .mount(&server)
            .await;

        let result = client(&server)
            .fetch_verified_source("1", &ADDRESS)
            .await
            .expect("processed");
        assert_eq!(result.compiler_version, "v0.8.10+commit.fc410830");
        assert_eq!(result.language, Language::Solidity);
        assert_eq!(result.contract_path, "Storage.sol");
        assert_eq!(result.contract_name, "Storage");
        assert!(result.json_input.sources.contains_key("Storage.sol"));
    }

    #[tokio::test]
    async fn multi_file_target_is_found_by_definition_scan() {
        let server = MockServer::start().await;
        let source_code = r#"{"contracts/Other.sol": {"content": "contract Other {}"}, "contracts/Token.sol": {"content": "contract Token {}"}}"#;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(source_code_response(
                serde_json::json!({
                    "SourceCode": source_code,
                    "ContractName": "Token",
                    "CompilerVersion": "v0.8.24+commit.e11b9ed9",
                    "OptimizationUsed": "1",
                    "Runs": "200",
                }),
            )))
            .mount(&server)
            .await;

        let result = client(&server)
            .fetch_verified_source("10", &ADDRESS)
            .await
            .expect("processed");
        assert_eq!(result.contract_path, "contracts/Token.sol");
        assert_eq!(result.json_input.sources.len(), 2);
    }

    #[tokio::test]
    async fn double_braced_standard_json_is_unwrapped() {
        let server = MockServer::start().await;
        let source_code = r#"{{"language": "Solidity", "sources": {"src/Main.sol": {"content": "contract Main {}"}}, "settings": {"optimizer": {"enabled": true, "runs": 999}}}}"#;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(source_code_response(
                serde_json::json!({
                    "SourceCode": source_code,
                    "ContractName": "Main",
                    "CompilerVersion": "v0.8.24+commit.e11b9ed9",
                }),
            )))
            .mount(&server)
            .await;

        let result = client(&server)
            .fetch_verified_source("1", &ADDRESS)
            .await
            .expect("processed");
        assert_eq!(result.contract_path, "src/Main.sol");
        assert_eq!(
            result.json_input.settings["optimizer"]["runs"],
            serde_json::json!(999)
        );
    }

    #[tokio::test]
    async fn unverified_contract_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(source_code_response(
                serde_json::json!({
                    "SourceCode": "",
                    "ContractName": "",
                    "CompilerVersion": "",
                    "ABI": "Contract source code not verified",
                }),
            )))
            .mount(&server)
            .await;

        let err = client(&server)
            .fetch_verified_source("1", &ADDRESS)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "etherscan_not_verified");
    }

    #[tokio::test]
    async fn rate_limits_are_recognized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "0",
                "message": "NOTOK",
                "result": "Max rate limit reached, please use API Key for higher rate limit",
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .fetch_verified_source("1", &ADDRESS)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "etherscan_rate_limit");
    }

    #[tokio::test]
    async fn contract_creation_transaction_is_resolved() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .and(query_param("action", "getcontractcreation"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "1",
                "message": "OK",
                "result": [{
                    "contractAddress": format!("0x{}", hex::encode(ADDRESS)),
                    "contractCreator": "0x00000000000000000000000000000000000000aa",
                    "txHash": "0x1111111111111111111111111111111111111111111111111111111111111111",
                }],
            })))
            .mount(&server)
            .await;

        let hash = client(&server)
            .fetch_contract_creation("1", &ADDRESS)
            .await
            .expect("resolved");
        assert_eq!(hash, Some(vec![0x11; 32]));
    }

    #[tokio::test]
    async fn unknown_contract_creation_is_a_miss_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "0",
                "message": "No data found",
                "result": [],
            })))
            .mount(&server)
            .await;

        let hash = client(&server)
            .fetch_contract_creation("1", &ADDRESS)
            .await
            .expect("miss is fine");
        assert_eq!(hash, None);
    }

    #[tokio::test]
    async fn missing_definition_in_multi_file_sources() {
        let server = MockServer::start().await;
        let source_code = r#"{"contracts/Other.sol": {"content": "contract Other {}"}}"#;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(source_code_response(
                serde_json::json!({
                    "SourceCode": source_code,
                    "ContractName": "Token",
                    "CompilerVersion": "v0.8.24+commit.e11b9ed9",
                }),
            )))
            .mount(&server)
            .await;

        let err = client(&server)
            .fetch_verified_source("1", &ADDRESS)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "etherscan_missing_contract_definition");
    }
}
