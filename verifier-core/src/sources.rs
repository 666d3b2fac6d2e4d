//! Fetching source files and metadata documents from decentralized
//! storage gateways. Used both by metadata-based verification (missing
//! source contents are referenced by hash only) and by the chain
//! monitor.

use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum IpfsError {
    #[error("no ipfs gateways are configured")]
    NoGateways,
    #[error("\"{cid}\" could not be fetched from any configured gateway")]
    Unreachable { cid: String },
    #[error("\"{cid}\" is not a json document: {error}")]
    InvalidJson { cid: String, error: String },
}

#[derive(Clone)]
pub struct IpfsClient {
    gateways: Vec<Url>,
    timeout: Duration,
    retries: u32,
    headers: Vec<(String, String)>,
    client: reqwest::Client,
}

impl IpfsClient {
    pub fn new(
        gateways: Vec<Url>,
        timeout: Duration,
        retries: u32,
        headers: Vec<(String, String)>,
    ) -> Self {
        Self {
            gateways,
            timeout,
            retries,
            headers,
            client: reqwest::Client::new(),
        }
    }

    /// Tries every gateway in order, each up to `retries + 1` times with
    /// the per-gateway timeout, and returns the first successful body.
    pub async fn fetch(&self, cid: &str) -> Result<bytes::Bytes, IpfsError> {
        if self.gateways.is_empty() {
            return Err(IpfsError::NoGateways);
        }

        for gateway in &self.gateways {
            let Ok(url) = gateway.join(cid) else {
                tracing::warn!(gateway = %gateway, cid, "gateway url cannot address the cid");
                continue;
            };
            for attempt in 0..=self.retries {
                let mut request = self.client.get(url.clone()).timeout(self.timeout);
                for (name, value) in &self.headers {
                    request = request.header(name, value);
                }
                match request.send().await.and_then(|r| r.error_for_status()) {
                    Ok(response) => match response.bytes().await {
                        Ok(bytes) => return Ok(bytes),
                        Err(err) => {
                            tracing::debug!(cid, gateway = %gateway, attempt, "reading gateway response failed: {err}");
                        }
                    },
                    Err(err) => {
                        tracing::debug!(cid, gateway = %gateway, attempt, "gateway fetch failed: {err}");
                    }
                }
            }
        }

        Err(IpfsError::Unreachable {
            cid: cid.to_string(),
        })
    }

    pub async fn fetch_json(&self, cid: &str) -> Result<serde_json::Value, IpfsError> {
        let bytes = self.fetch(cid).await?;
        serde_json::from_slice(&bytes).map_err(|err| IpfsError::InvalidJson {
            cid: cid.to_string(),
            error: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    const CID: &str = "QmWmyoMoctfbAaiEs2G46gpeUmhqFRDW6KWo64y5r581Vz";

    fn client(gateways: Vec<Url>) -> IpfsClient {
        IpfsClient::new(gateways, Duration::from_secs(1), 1, vec![])
    }

    #[tokio::test]
    async fn falls_through_to_a_working_gateway() {
        let broken = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&broken)
            .await;

        let working = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/ipfs/{CID}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"language": "Solidity"})))
            .mount(&working)
            .await;

        let client = client(vec![
            format!("{}/ipfs/", broken.uri()).parse().unwrap(),
            format!("{}/ipfs/", working.uri()).parse().unwrap(),
        ]);
        let value = client.fetch_json(CID).await.expect("fetched");
        assert_eq!(value["language"], "Solidity");
        // two attempts against the broken gateway before moving on
        assert_eq!(broken.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unreachable_when_all_gateways_fail() {
        let broken = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(504))
            .mount(&broken)
            .await;

        let client = client(vec![format!("{}/ipfs/", broken.uri()).parse().unwrap()]);
        let err = client.fetch(CID).await.expect_err("unreachable");
        assert!(matches!(err, IpfsError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn no_gateways_is_an_error() {
        let client = client(vec![]);
        assert!(matches!(
            client.fetch(CID).await,
            Err(IpfsError::NoGateways)
        ));
    }
}
