//! JSON-RPC over HTTP POST with `reqwest`.
//!
//! Connection failures, non-2xx statuses and timeouts are retried on the
//! [`RetryPolicy`] schedule. A node-side error object is an answer, not a
//! failure, and comes back on the first attempt.

use std::time::Duration;

use async_trait::async_trait;

use chainrelay_core::error::TransportError;
use chainrelay_core::policy::{RetryConfig, RetryPolicy};
use chainrelay_core::request::{JsonRpcRequest, JsonRpcResponse};
use chainrelay_core::transport::RpcTransport;

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub retry: RetryConfig,
    /// Whole-request timeout, connect included.
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub struct HttpRpcClient {
    endpoint: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    timeout_ms: u64,
}

impl HttpRpcClient {
    pub fn new(endpoint: impl Into<String>, config: HttpClientConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Http(format!("client setup: {e}")))?;

        Ok(Self {
            endpoint: endpoint.into(),
            http,
            retry: RetryPolicy::new(config.retry),
            timeout_ms: u64::try_from(config.request_timeout.as_millis()).unwrap_or(u64::MAX),
        })
    }

    async fn post(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(req)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {}: {body}", status.as_u16())));
        }

        resp.json::<JsonRpcResponse>()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    self.classify(e)
                } else {
                    TransportError::InvalidResponse(format!("{}: {e}", req.method))
                }
            })
    }

    fn classify(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout { ms: self.timeout_ms }
        } else {
            TransportError::Http(e.to_string())
        }
    }
}

#[async_trait]
impl RpcTransport for HttpRpcClient {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let mut waits = self.retry.delays();
        let mut attempt = 1u32;
        loop {
            let err = match self.post(&req).await {
                Ok(resp) => return Ok(resp),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };
            let Some(wait) = waits.next() else {
                tracing::debug!(method = %req.method, attempt, error = %err, "giving up");
                return Err(err);
            };
            tracing::warn!(
                method = %req.method,
                attempt,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "transient RPC failure, retrying"
            );
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
