//! Request/response carrier for JSON-RPC calls against the chain node.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// One JSON-RPC round trip. Retries, if any, happen inside `send`.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError>;

    /// Endpoint for logs.
    fn endpoint(&self) -> &str;
}
