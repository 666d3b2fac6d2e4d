use crate::settings::RequestSettings;
use blockscout_display_bytes::Bytes as DisplayBytes;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("no verification server accepted the submission")]
    AllServersFailed,
    #[error("submission url cannot be built: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSubmission {
    pub metadata: serde_json::Value,
    pub sources: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_transaction_hash: Option<String>,
}

/// Pushes discovered contracts to the configured verification servers.
/// Transient failures retry with backoff per server; a submission
/// succeeds as soon as one server accepts it.
pub struct VerificationSubmitter {
    servers: Vec<Url>,
    client: ClientWithMiddleware,
}

impl VerificationSubmitter {
    pub fn new(servers: Vec<Url>, request_settings: &RequestSettings) -> Self {
        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(
                request_settings.retry_delay,
                request_settings.retry_delay.saturating_mul(8),
            )
            .build_with_max_retries(request_settings.max_retries);
        let client = reqwest_middleware::ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        Self { servers, client }
    }

    pub async fn submit_metadata(
        &self,
        chain_id: &str,
        address: &[u8],
        submission: &MetadataSubmission,
    ) -> Result<(), SubmitError> {
        self.post(chain_id, address, "v2/verify/metadata", Some(submission))
            .await
    }

    /// Fire-and-forget trigger; the server answers 202 and verifies on
    /// its own schedule.
    pub async fn trigger_similarity(
        &self,
        chain_id: &str,
        address: &[u8],
        creation_transaction_hash: Option<&[u8]>,
    ) -> Result<(), SubmitError> {
        let body = creation_transaction_hash.map(|hash| {
            serde_json::json!({
                "creationTransactionHash": DisplayBytes::from(hash.to_vec()).to_string(),
            })
        });
        self.post(chain_id, address, "v2/verify/similarity", body.as_ref())
            .await
    }

    async fn post<B: Serialize>(
        &self,
        chain_id: &str,
        address: &[u8],
        route: &str,
        body: Option<&B>,
    ) -> Result<(), SubmitError> {
        let address = DisplayBytes::from(address.to_vec()).to_string();
        for server in &self.servers {
            let url = server
                .join(&format!("{route}/{chain_id}/{address}"))
                .map_err(|err| SubmitError::InvalidUrl(err.to_string()))?;
            let mut request = self.client.post(url.clone());
            if let Some(body) = body {
                request = request.json(body);
            }
            match request.send().await {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => {
                    tracing::warn!(
                        server = %server,
                        chain_id,
                        address,
                        status = response.status().as_u16(),
                        "verification server rejected the submission"
                    );
                }
                Err(err) => {
                    tracing::warn!(server = %server, chain_id, address, "submission failed: {err}");
                }
            }
        }
        Err(SubmitError::AllServersFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{body_partial_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    const ADDRESS: [u8; 20] = [0x42; 20];

    fn submitter(servers: Vec<Url>) -> VerificationSubmitter {
        VerificationSubmitter::new(
            servers,
            &RequestSettings {
                max_retries: 0,
                retry_delay: std::time::Duration::from_millis(10),
            },
        )
    }

    #[tokio::test]
    async fn metadata_submission_falls_through_to_a_healthy_server() {
        let broken = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&broken)
            .await;
        let healthy = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!(
                "/v2/verify/metadata/1/0x{}",
                hex::encode(ADDRESS)
            )))
            .and(body_partial_json(serde_json::json!({
                "sources": {"a.sol": "contract A {}"},
            })))
            .respond_with(ResponseTemplate::new(200))
            .mount(&healthy)
            .await;

        let submitter = submitter(vec![
            format!("{}/", broken.uri()).parse().unwrap(),
            format!("{}/", healthy.uri()).parse().unwrap(),
        ]);
        let submission = MetadataSubmission {
            metadata: serde_json::json!({"compiler": {"version": "0.8.10+commit.fc410830"}}),
            sources: BTreeMap::from([("a.sol".to_string(), "contract A {}".to_string())]),
            creation_transaction_hash: None,
        };
        submitter
            .submit_metadata("1", &ADDRESS, &submission)
            .await
            .expect("second server accepts");
    }

    #[tokio::test]
    async fn similarity_trigger_accepts_202() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!(
                "/v2/verify/similarity/5/0x{}",
                hex::encode(ADDRESS)
            )))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let submitter = submitter(vec![format!("{}/", server.uri()).parse().unwrap()]);
        submitter
            .trigger_similarity("5", &ADDRESS, Some(&[0x11; 32]))
            .await
            .expect("202 accepted");
    }

    #[tokio::test]
    async fn all_servers_failing_is_an_error() {
        let broken = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&broken)
            .await;

        let submitter = submitter(vec![format!("{}/", broken.uri()).parse().unwrap()]);
        let err = submitter
            .trigger_similarity("1", &ADDRESS, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::AllServersFailed));
    }
}
