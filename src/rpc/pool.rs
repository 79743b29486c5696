//! Endpoint pool with retry, failover, and batch dispatch

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use alloy::primitives::{Address, U256};

use crate::config::EndpointConfig;
use crate::errors::{ScanError, ScanResult, TransportKind};
use crate::types::EndpointHealth;

use super::jsonrpc::{
    block_tag, encode_hex, parse_hash, parse_hex_bytes, parse_quantity_u256, parse_quantity_u64,
    RpcRequest, RpcResponse,
};
use super::BlockHeader;

const INITIAL_RETRY_DELAY_MS: u64 = 100;
const MAX_RETRY_DELAY_MS: u64 = 5_000;
const RETRY_EXPONENTIAL_BASE: f64 = 2.0;

#[derive(Debug, Default, Clone)]
struct EndpointStatus {
    consecutive_failures: u32,
    total_errors: u64,
    last_failure_at: Option<DateTime<Utc>>,
}

struct PoolState {
    active: usize,
    statuses: Vec<EndpointStatus>,
    last_rotation: Option<Instant>,
}

/// Wraps an ordered list of JSON-RPC endpoints. All chain access goes
/// through `call`/`batch_call` and inherits retry and failover.
pub struct RpcPool {
    client: reqwest::Client,
    endpoints: Vec<EndpointConfig>,
    failover_threshold: u32,
    cooldown: Duration,
    state: RwLock<PoolState>,
    next_id: AtomicU64,
}

impl RpcPool {
    pub fn new(
        mut endpoints: Vec<EndpointConfig>,
        failover_threshold: u32,
        cooldown: Duration,
    ) -> ScanResult<Self> {
        if endpoints.is_empty() {
            return Err(ScanError::config("RpcPool requires at least one endpoint"));
        }
        // Higher weight first; ties keep the configured order.
        endpoints.sort_by(|a, b| b.weight.cmp(&a.weight));
        let statuses = vec![EndpointStatus::default(); endpoints.len()];
        Ok(Self {
            client: reqwest::Client::new(),
            endpoints,
            failover_threshold: failover_threshold.max(1),
            cooldown,
            state: RwLock::new(PoolState {
                active: 0,
                statuses,
                last_rotation: None,
            }),
            next_id: AtomicU64::new(1),
        })
    }

    async fn active_endpoint(&self) -> (usize, EndpointConfig) {
        let state = self.state.read().await;
        (state.active, self.endpoints[state.active].clone())
    }

    async fn record_success(&self, idx: usize) {
        let mut state = self.state.write().await;
        state.statuses[idx].consecutive_failures = 0;
    }

    /// Counts a failure and rotates the active endpoint once the
    /// failover threshold is hit, rate-limited by the cooldown period.
    async fn record_failure(&self, idx: usize) {
        let mut state = self.state.write().await;
        state.statuses[idx].consecutive_failures += 1;
        state.statuses[idx].total_errors += 1;
        state.statuses[idx].last_failure_at = Some(Utc::now());

        let per_endpoint_cap = self.endpoints[idx].max_retries.max(1);
        let threshold = self.failover_threshold.min(per_endpoint_cap);
        if idx == state.active
            && state.statuses[idx].consecutive_failures >= threshold
            && self.endpoints.len() > 1
        {
            let cooled_down = state
                .last_rotation
                .map(|t| t.elapsed() >= self.cooldown)
                .unwrap_or(true);
            if cooled_down {
                state.active = (state.active + 1) % self.endpoints.len();
                state.last_rotation = Some(Instant::now());
                let active = state.active;
                let url = &self.endpoints[active].http_url;
                state.statuses[active].consecutive_failures = 0;
                info!("🔄 Failing over to endpoint {url}");
            }
        }
    }

    /// Forces a rotation attempt, used when the block subscription's
    /// transport drops. Still rate-limited by the cooldown.
    pub async fn rotate(&self) {
        let mut state = self.state.write().await;
        if self.endpoints.len() < 2 {
            return;
        }
        let cooled_down = state
            .last_rotation
            .map(|t| t.elapsed() >= self.cooldown)
            .unwrap_or(true);
        if cooled_down {
            state.active = (state.active + 1) % self.endpoints.len();
            state.last_rotation = Some(Instant::now());
            info!(
                "🔄 Rotated to endpoint {} after subscription loss",
                self.endpoints[state.active].http_url
            );
        }
    }

    async fn single_call(
        &self,
        endpoint: &EndpointConfig,
        method: &str,
        params: Value,
    ) -> ScanResult<Value> {
        let request = RpcRequest::new(self.next_id.fetch_add(1, Ordering::Relaxed), method, params);
        let url = endpoint.http_url.clone();
        let send = async {
            let response = self
                .client
                .post(&url)
                .json(&request)
                .send()
                .await
                .map_err(|e| ScanError::Transport {
                    kind: TransportKind::Refused,
                    endpoint: url.clone(),
                    message: format!("{method} request failed"),
                    source: Some(e.into()),
                    retry_count: 0,
                })?;
            let parsed: RpcResponse =
                response.json().await.map_err(|e| ScanError::Transport {
                    kind: TransportKind::Malformed,
                    endpoint: url.clone(),
                    message: format!("{method} returned malformed body"),
                    source: Some(e.into()),
                    retry_count: 0,
                })?;
            parsed.into_result().map_err(|e| ScanError::Transport {
                kind: TransportKind::Malformed,
                endpoint: url.clone(),
                message: format!("{method} rpc error {}: {}", e.code, e.message),
                source: None,
                retry_count: 0,
            })
        };
        match tokio::time::timeout(Duration::from_millis(endpoint.timeout_ms), send).await {
            Ok(result) => result,
            Err(_) => Err(ScanError::Transport {
                kind: TransportKind::Timeout,
                endpoint: endpoint.http_url.clone(),
                message: format!("{method} timed out after {}ms", endpoint.timeout_ms),
                source: None,
                retry_count: 0,
            }),
        }
    }

    /// Executes one JSON-RPC call against the active endpoint, retrying
    /// with backoff up to one attempt per configured endpoint. Failures
    /// rotate the pool via `record_failure`.
    pub async fn call(&self, method: &str, params: Value) -> ScanResult<Value> {
        let max_attempts = self.endpoints.len() as u32;
        let mut delay = INITIAL_RETRY_DELAY_MS;
        let mut last_error: Option<ScanError> = None;

        for attempt in 1..=max_attempts {
            let (idx, endpoint) = self.active_endpoint().await;
            match self.single_call(&endpoint, method, params.clone()).await {
                Ok(value) => {
                    self.record_success(idx).await;
                    return Ok(value);
                }
                Err(e) => {
                    warn!(
                        "Attempt {attempt}/{max_attempts} failed for {method} on {}: {e}",
                        endpoint.http_url
                    );
                    self.record_failure(idx).await;
                    last_error = Some(e);
                    if attempt < max_attempts {
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        delay = ((delay as f64 * RETRY_EXPONENTIAL_BASE) as u64)
                            .min(MAX_RETRY_DELAY_MS);
                        let jitter = (delay as f64 * 0.1 * (rand::random::<f64>() - 0.5)) as u64;
                        delay = delay.saturating_add(jitter);
                    }
                }
            }
        }

        Err(ScanError::EndpointsExhausted {
            attempts: max_attempts,
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no endpoints".to_string()),
        })
    }

    /// Sends a JSON batch in one round trip where the endpoint supports
    /// it, falling back to concurrent single calls. Per-item results
    /// keep request order; the outer call fails only when every
    /// sub-call failed.
    pub async fn batch_call(&self, calls: &[(String, Value)]) -> ScanResult<Vec<ScanResult<Value>>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }
        let (idx, endpoint) = self.active_endpoint().await;
        match self.batch_on_endpoint(&endpoint, calls).await {
            Ok(results) => {
                self.record_success(idx).await;
                Ok(results)
            }
            Err(e) => {
                debug!("Batch on {} failed ({e}), fanning out individually", endpoint.http_url);
                self.record_failure(idx).await;
                let futures = calls
                    .iter()
                    .map(|(method, params)| self.call(method, params.clone()));
                let results: Vec<ScanResult<Value>> = join_all(futures).await;
                if results.iter().all(|r| r.is_err()) {
                    return Err(ScanError::EndpointsExhausted {
                        attempts: self.endpoints.len() as u32,
                        message: "every sub-call of the batch failed".to_string(),
                    });
                }
                Ok(results)
            }
        }
    }

    async fn batch_on_endpoint(
        &self,
        endpoint: &EndpointConfig,
        calls: &[(String, Value)],
    ) -> ScanResult<Vec<ScanResult<Value>>> {
        let base_id = self.next_id.fetch_add(calls.len() as u64, Ordering::Relaxed);
        let requests: Vec<RpcRequest> = calls
            .iter()
            .enumerate()
            .map(|(i, (method, params))| RpcRequest::new(base_id + i as u64, method, params.clone()))
            .collect();

        let url = endpoint.http_url.clone();
        let send = async {
            let response = self
                .client
                .post(&url)
                .json(&requests)
                .send()
                .await
                .map_err(|e| ScanError::Transport {
                    kind: TransportKind::Refused,
                    endpoint: url.clone(),
                    message: "batch request failed".to_string(),
                    source: Some(e.into()),
                    retry_count: 0,
                })?;
            let responses: Vec<RpcResponse> =
                response.json().await.map_err(|e| ScanError::Transport {
                    kind: TransportKind::Malformed,
                    endpoint: url.clone(),
                    message: "batch response was not a JSON array".to_string(),
                    source: Some(e.into()),
                    retry_count: 0,
                })?;
            Ok(responses)
        };
        let responses = match tokio::time::timeout(Duration::from_millis(endpoint.timeout_ms), send)
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(ScanError::Transport {
                    kind: TransportKind::Timeout,
                    endpoint: endpoint.http_url.clone(),
                    message: format!("batch timed out after {}ms", endpoint.timeout_ms),
                    source: None,
                    retry_count: 0,
                })
            }
        };

        // Servers may answer out of order; re-align by id.
        let mut ordered: Vec<ScanResult<Value>> = (0..calls.len())
            .map(|i| {
                Err(ScanError::Transport {
                    kind: TransportKind::Malformed,
                    endpoint: endpoint.http_url.clone(),
                    message: format!("missing batch response for request {i}"),
                    source: None,
                    retry_count: 0,
                })
            })
            .collect();
        for response in responses {
            let Some(id) = response.id.as_u64() else { continue };
            let Some(offset) = id.checked_sub(base_id) else { continue };
            let offset = offset as usize;
            if offset >= ordered.len() {
                continue;
            }
            ordered[offset] = response.into_result().map_err(|e| ScanError::Transport {
                kind: TransportKind::Malformed,
                endpoint: endpoint.http_url.clone(),
                message: format!("rpc error {}: {}", e.code, e.message),
                source: None,
                retry_count: 0,
            });
        }
        Ok(ordered)
    }

    pub async fn get_block_number(&self) -> ScanResult<u64> {
        let result = self.call("eth_blockNumber", Value::Array(vec![])).await?;
        parse_quantity_u64(&result)
    }

    pub async fn get_gas_price(&self) -> ScanResult<U256> {
        let result = self.call("eth_gasPrice", Value::Array(vec![])).await?;
        parse_quantity_u256(&result)
    }

    pub async fn get_block_by_number(&self, number: Option<u64>) -> ScanResult<BlockHeader> {
        let params = serde_json::json!([block_tag(number), false]);
        let result = self.call("eth_getBlockByNumber", params).await?;
        let number = parse_quantity_u64(&result["number"])?;
        let hash = parse_hash(&result["hash"])?;
        Ok(BlockHeader { number, hash })
    }

    pub async fn eth_call(
        &self,
        to: Address,
        data: &[u8],
        block: Option<u64>,
    ) -> ScanResult<Vec<u8>> {
        let params = Self::eth_call_params(to, data, block);
        let result = self.call("eth_call", params).await?;
        parse_hex_bytes(&result)
    }

    /// Params for an `eth_call`, shared by single and batched dispatch.
    pub fn eth_call_params(to: Address, data: &[u8], block: Option<u64>) -> Value {
        serde_json::json!([
            {"to": format!("{to:#x}"), "data": encode_hex(data)},
            block_tag(block)
        ])
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    pub async fn active_ws_url(&self) -> Option<String> {
        let state = self.state.read().await;
        if let Some(url) = &self.endpoints[state.active].ws_url {
            return Some(url.clone());
        }
        self.endpoints.iter().find_map(|e| e.ws_url.clone())
    }

    pub async fn endpoint_health(&self) -> (usize, Vec<EndpointHealth>) {
        let state = self.state.read().await;
        let health = self
            .endpoints
            .iter()
            .zip(state.statuses.iter())
            .map(|(endpoint, status)| EndpointHealth {
                url: endpoint.http_url.clone(),
                consecutive_failures: status.consecutive_failures,
                total_errors: status.total_errors,
                last_failure_at: status.last_failure_at,
            })
            .collect();
        (state.active, health)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(url: &str, weight: u32) -> EndpointConfig {
        EndpointConfig {
            http_url: url.to_string(),
            ws_url: None,
            weight,
            max_retries: 3,
            timeout_ms: 1_000,
        }
    }

    fn pool(cooldown: Duration) -> RpcPool {
        RpcPool::new(
            vec![endpoint("http://a", 1), endpoint("http://b", 1)],
            2,
            cooldown,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn rotates_after_failover_threshold() {
        let pool = pool(Duration::from_secs(0));
        let (active, _) = pool.active_endpoint().await;
        assert_eq!(active, 0);
        pool.record_failure(0).await;
        let (active, _) = pool.active_endpoint().await;
        assert_eq!(active, 0, "one failure is below the threshold");
        pool.record_failure(0).await;
        let (active, _) = pool.active_endpoint().await;
        assert_eq!(active, 1, "threshold reached, rotated");
    }

    #[tokio::test]
    async fn rotation_is_rate_limited_by_cooldown() {
        let pool = pool(Duration::from_secs(3600));
        pool.record_failure(0).await;
        pool.record_failure(0).await;
        let (active, _) = pool.active_endpoint().await;
        assert_eq!(active, 1);
        // Hammer the new endpoint; the cooldown blocks further rotation.
        for _ in 0..10 {
            pool.record_failure(1).await;
        }
        let (active, _) = pool.active_endpoint().await;
        assert_eq!(active, 1);
    }

    #[tokio::test]
    async fn success_resets_consecutive_failures() {
        let pool = pool(Duration::from_secs(0));
        pool.record_failure(0).await;
        pool.record_success(0).await;
        pool.record_failure(0).await;
        let (active, _) = pool.active_endpoint().await;
        assert_eq!(active, 0);
    }

    #[tokio::test]
    async fn weight_orders_endpoints() {
        let pool = RpcPool::new(
            vec![endpoint("http://light", 1), endpoint("http://heavy", 10)],
            3,
            Duration::from_secs(60),
        )
        .unwrap();
        let (_, active) = pool.active_endpoint().await;
        assert_eq!(active.http_url, "http://heavy");
    }

    #[tokio::test]
    async fn health_reflects_error_counts() {
        let pool = pool(Duration::from_secs(3600));
        pool.record_failure(0).await;
        let (active, health) = pool.endpoint_health().await;
        assert_eq!(active, 0);
        assert_eq!(health[0].total_errors, 1);
        assert!(health[0].last_failure_at.is_some());
        assert_eq!(health[1].total_errors, 0);
    }
}
