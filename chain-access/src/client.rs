use crate::{
    health::EndpointHealth,
    settings::{ResolvedEndpoint, TraceMode},
    traces,
    types::{quantity, Block, Transaction, TransactionReceipt},
    Error,
};
use blockscout_display_bytes::Bytes as DisplayBytes;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

struct Endpoint {
    resolved: ResolvedEndpoint,
    health: Mutex<EndpointHealth>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// A multi-endpoint JSON-RPC client for one chain. Endpoints are tried
/// in configuration order; per-endpoint health implements the circuit
/// breaker, so one slow or broken provider does not block the chain.
pub struct ChainClient {
    chain_id: String,
    endpoints: Vec<Arc<Endpoint>>,
    http: reqwest::Client,
    request_timeout: Duration,
}

impl ChainClient {
    pub fn new(chain_id: impl Into<String>, endpoints: Vec<ResolvedEndpoint>) -> Self {
        Self {
            chain_id: chain_id.into(),
            endpoints: endpoints
                .into_iter()
                .map(|resolved| {
                    Arc::new(Endpoint {
                        resolved,
                        health: Mutex::new(EndpointHealth::default()),
                    })
                })
                .collect(),
            http: reqwest::Client::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn has_trace_support(&self) -> bool {
        self.endpoints
            .iter()
            .any(|endpoint| endpoint.resolved.trace_support.is_some())
    }

    /// Clears all endpoint health state. Intended for tests.
    pub fn reset_health(&self) {
        for endpoint in &self.endpoints {
            *endpoint.health.lock() = EndpointHealth::default();
        }
    }

    pub async fn block_number(&self) -> Result<u64, Error> {
        let result: String = self.request_typed("eth_blockNumber", json!([])).await?;
        quantity::parse(&result).map_err(Error::InvalidResponse)
    }

    pub async fn get_code(&self, address: &[u8]) -> Result<Vec<u8>, Error> {
        let result: DisplayBytes = self
            .request_typed("eth_getCode", json!([hex(address), "latest"]))
            .await?;
        Ok(result.to_vec())
    }

    pub async fn get_transaction(&self, hash: &[u8]) -> Result<Option<Transaction>, Error> {
        self.request_typed("eth_getTransactionByHash", json!([hex(hash)]))
            .await
    }

    pub async fn get_transaction_receipt(
        &self,
        hash: &[u8],
    ) -> Result<Option<TransactionReceipt>, Error> {
        self.request_typed("eth_getTransactionReceipt", json!([hex(hash)]))
            .await
    }

    pub async fn get_block(
        &self,
        number: u64,
        full_transactions: bool,
    ) -> Result<Option<Block>, Error> {
        self.request_typed(
            "eth_getBlockByNumber",
            json!([format!("0x{number:x}"), full_transactions]),
        )
        .await
    }

    /// Extracts the creation bytecode of `contract_address` out of the
    /// traces of its creation transaction, using whichever trace flavor
    /// each endpoint advertises.
    pub async fn get_creation_bytecode(
        &self,
        transaction_hash: &[u8],
        contract_address: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let trace_endpoints: Vec<_> = self
            .endpoints
            .iter()
            .filter(|endpoint| endpoint.resolved.trace_support.is_some())
            .cloned()
            .collect();
        if trace_endpoints.is_empty() {
            return Err(Error::NoTraceSupport);
        }

        for endpoint in select_candidates(&trace_endpoints)? {
            let mode = endpoint
                .resolved
                .trace_support
                .expect("only trace-supporting endpoints are candidates");
            let (method, params) = match mode {
                TraceMode::TraceTransaction => {
                    ("trace_transaction", json!([hex(transaction_hash)]))
                }
                TraceMode::DebugTraceTransaction => (
                    "debug_traceTransaction",
                    json!([hex(transaction_hash), { "tracer": "callTracer" }]),
                ),
            };

            match self.send(&endpoint, method, &params).await {
                Ok(value) => {
                    endpoint.health.lock().on_success();
                    // the endpoint answered: its verdict on the traces is final
                    return match mode {
                        TraceMode::TraceTransaction => {
                            let parsed = serde_json::from_value(value).map_err(|err| {
                                Error::MalformedTraceResponse(err.to_string())
                            })?;
                            traces::creation_bytecode_from_parity(parsed, contract_address)
                        }
                        TraceMode::DebugTraceTransaction => {
                            let parsed = serde_json::from_value(value).map_err(|err| {
                                Error::MalformedTraceResponse(err.to_string())
                            })?;
                            traces::creation_bytecode_from_geth(parsed, contract_address)
                        }
                    };
                }
                Err(err) => {
                    endpoint.health.lock().on_failure(Instant::now());
                    tracing::warn!(
                        chain_id = self.chain_id,
                        endpoint = %endpoint.resolved.url,
                        "trace request failed: {err}"
                    );
                }
            }
        }

        Err(Error::AllRpcsFailed)
    }

    /// All contracts created inside the transaction, including nested
    /// factory children, via whichever tracer each endpoint advertises.
    pub async fn get_created_contracts(
        &self,
        transaction_hash: &[u8],
    ) -> Result<Vec<traces::CreatedContract>, Error> {
        let trace_endpoints: Vec<_> = self
            .endpoints
            .iter()
            .filter(|endpoint| endpoint.resolved.trace_support.is_some())
            .cloned()
            .collect();
        if trace_endpoints.is_empty() {
            return Err(Error::NoTraceSupport);
        }

        for endpoint in select_candidates(&trace_endpoints)? {
            let mode = endpoint
                .resolved
                .trace_support
                .expect("only trace-supporting endpoints are candidates");
            let (method, params) = match mode {
                TraceMode::TraceTransaction => {
                    ("trace_transaction", json!([hex(transaction_hash)]))
                }
                TraceMode::DebugTraceTransaction => (
                    "debug_traceTransaction",
                    json!([hex(transaction_hash), { "tracer": "callTracer" }]),
                ),
            };

            match self.send(&endpoint, method, &params).await {
                Ok(value) => {
                    endpoint.health.lock().on_success();
                    return match mode {
                        TraceMode::TraceTransaction => {
                            let parsed = serde_json::from_value(value).map_err(|err| {
                                Error::MalformedTraceResponse(err.to_string())
                            })?;
                            Ok(traces::created_contracts_from_parity(parsed))
                        }
                        TraceMode::DebugTraceTransaction => {
                            let parsed = serde_json::from_value(value).map_err(|err| {
                                Error::MalformedTraceResponse(err.to_string())
                            })?;
                            Ok(traces::created_contracts_from_geth(parsed))
                        }
                    };
                }
                Err(err) => {
                    endpoint.health.lock().on_failure(Instant::now());
                    tracing::warn!(
                        chain_id = self.chain_id,
                        endpoint = %endpoint.resolved.url,
                        "trace request failed: {err}"
                    );
                }
            }
        }

        Err(Error::AllRpcsFailed)
    }

    async fn request_typed<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, Error> {
        let value = self.request(method, params).await?;
        serde_json::from_value(value).map_err(|err| Error::InvalidResponse(err.to_string()))
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, Error> {
        for endpoint in select_candidates(&self.endpoints)? {
            match self.send(&endpoint, method, &params).await {
                Ok(value) => {
                    endpoint.health.lock().on_success();
                    return Ok(value);
                }
                Err(err) => {
                    endpoint.health.lock().on_failure(Instant::now());
                    tracing::warn!(
                        chain_id = self.chain_id,
                        endpoint = %endpoint.resolved.url,
                        method,
                        "rpc request failed: {err}"
                    );
                }
            }
        }
        Err(Error::AllRpcsFailed)
    }

    async fn send(&self, endpoint: &Endpoint, method: &str, params: &Value) -> Result<Value, Error> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let mut request = self
            .http
            .post(endpoint.resolved.url.clone())
            .timeout(self.request_timeout)
            .json(&body);
        for (name, value) in &endpoint.resolved.headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| Error::InvalidResponse(err.to_string()))?;
        let response: JsonRpcResponse = response
            .json()
            .await
            .map_err(|err| Error::InvalidResponse(err.to_string()))?;

        if let Some(error) = response.error {
            return Err(Error::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }
}

/// Circuit-breaker candidate selection: cooling endpoints are skipped.
/// When every endpoint is cooling, a single extra retry is granted to
/// an endpoint still inside its first backoff window; beyond that the
/// call fails without touching any provider.
fn select_candidates(endpoints: &[Arc<Endpoint>]) -> Result<Vec<Arc<Endpoint>>, Error> {
    let now = Instant::now();
    let available: Vec<_> = endpoints
        .iter()
        .filter(|endpoint| !endpoint.health.lock().is_cooling(now))
        .cloned()
        .collect();
    if !available.is_empty() {
        return Ok(available);
    }

    endpoints
        .iter()
        .filter(|endpoint| endpoint.health.lock().consecutive_failures == 1)
        .min_by_key(|endpoint| endpoint.health.lock().next_retry_time)
        .map(|endpoint| vec![endpoint.clone()])
        .ok_or(Error::AllRpcsFailed)
}

fn hex(bytes: &[u8]) -> String {
    DisplayBytes::from(bytes.to_vec()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::{
        matchers::{body_partial_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn endpoint(server: &MockServer, trace_support: Option<TraceMode>) -> ResolvedEndpoint {
        ResolvedEndpoint {
            url: server.uri().parse().unwrap(),
            headers: vec![],
            trace_support,
        }
    }

    fn rpc_result(value: Value) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": value}))
    }

    #[tokio::test]
    async fn fails_over_to_the_next_endpoint() {
        let broken = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&broken)
            .await;
        let healthy = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_getCode"})))
            .respond_with(rpc_result(json!("0x6080")))
            .mount(&healthy)
            .await;

        let client = ChainClient::new(
            "1",
            vec![endpoint(&broken, None), endpoint(&healthy, None)],
        );
        let code = client.get_code(&[0xaa; 20]).await.unwrap();
        assert_eq!(code, vec![0x60, 0x80]);
    }

    #[tokio::test]
    async fn breaker_stops_touching_a_repeatedly_failing_endpoint() {
        let broken = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&broken)
            .await;

        let client = ChainClient::new("1", vec![endpoint(&broken, None)]);
        // first call touches the endpoint, second consumes the allowed retry
        for _ in 0..2 {
            let err = client.block_number().await.unwrap_err();
            assert!(matches!(err, Error::AllRpcsFailed));
        }
        assert_eq!(broken.received_requests().await.unwrap().len(), 2);

        // third call must complete without another request
        let err = client.block_number().await.unwrap_err();
        assert!(matches!(err, Error::AllRpcsFailed));
        assert_eq!(broken.received_requests().await.unwrap().len(), 2);

        client.reset_health();
        assert_eq!(client.block_number().await.unwrap_err().code(), "all_rpcs_failed");
        assert_eq!(broken.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn rpc_error_responses_count_as_endpoint_failures() {
        let flaky = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "error": {"code": -32601, "message": "method not found"},
            })))
            .mount(&flaky)
            .await;
        let healthy = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(rpc_result(json!("0x10")))
            .mount(&healthy)
            .await;

        let client =
            ChainClient::new("1", vec![endpoint(&flaky, None), endpoint(&healthy, None)]);
        assert_eq!(client.block_number().await.unwrap(), 16);
    }

    #[tokio::test]
    async fn creation_bytecode_prefers_second_rpc_when_first_rejects() {
        let rejecting = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&rejecting)
            .await;
        let tracing_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "trace_transaction"})))
            .respond_with(rpc_result(json!([
                {"type": "create", "action": {"init": "0x60016002"}, "result": {"address": "0xffffffffffffffffffffffffffffffffffffffff"}},
            ])))
            .mount(&tracing_server)
            .await;

        let client = ChainClient::new(
            "1",
            vec![
                endpoint(&rejecting, Some(TraceMode::TraceTransaction)),
                endpoint(&tracing_server, Some(TraceMode::TraceTransaction)),
            ],
        );
        let init = client
            .get_creation_bytecode(&[0x11; 32], &[0xff; 20])
            .await
            .unwrap();
        assert_eq!(init, hex::decode("60016002").unwrap());
    }

    #[tokio::test]
    async fn creation_bytecode_via_geth_call_tracer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(json!({"method": "debug_traceTransaction"})))
            .respond_with(rpc_result(json!({
                "type": "CALL",
                "to": "0x1111111111111111111111111111111111111111",
                "calls": [
                    {"type": "CREATE2", "to": "0xffffffffffffffffffffffffffffffffffffffff", "input": "0xdeadbeef"},
                ],
            })))
            .mount(&server)
            .await;

        let client = ChainClient::new(
            "1",
            vec![endpoint(&server, Some(TraceMode::DebugTraceTransaction))],
        );
        let init = client
            .get_creation_bytecode(&[0x11; 32], &[0xff; 20])
            .await
            .unwrap();
        assert_eq!(init, hex::decode("deadbeef").unwrap());
    }

    #[tokio::test]
    async fn chains_without_trace_endpoints_report_no_trace_support() {
        let server = MockServer::start().await;
        let client = ChainClient::new("1", vec![endpoint(&server, None)]);
        let err = client
            .get_creation_bytecode(&[0x11; 32], &[0xff; 20])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "no_trace_support");
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
