//! Failures talking to the chain node or the upstream feed.

use thiserror::Error;

use crate::request::JsonRpcError;

#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failure or non-2xx status.
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The node answered with an error object.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// No live upstream connection to write to.
    #[error("upstream not connected")]
    NotConnected,

    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Well-formed JSON-RPC whose result has the wrong shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
}

impl TransportError {
    /// Worth another attempt on the same endpoint.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::WebSocket(_) | Self::Timeout { .. })
    }
}
