//! The chain read API consumed by history reconstruction and lot state reads.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::types::{BlockHeader, RawLogRecord};

/// Read-only access to an EVM chain.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Logs emitted by `address` in the inclusive range `[from, to]`.
    async fn filter_logs(
        &self,
        from: u64,
        to: u64,
        address: &str,
    ) -> Result<Vec<RawLogRecord>, TransportError>;

    async fn block_by_number(&self, number: u64) -> Result<BlockHeader, TransportError>;

    async fn current_block_number(&self) -> Result<u64, TransportError>;

    /// Deployed bytecode at `address`; empty when no contract lives there.
    async fn code_at(&self, address: &str) -> Result<Vec<u8>, TransportError>;

    /// Execute a read-only call against the latest block.
    async fn call(&self, to: &str, calldata: &[u8]) -> Result<Vec<u8>, TransportError>;
}
