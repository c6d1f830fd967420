//! Batched log scanning against a range-limited log API.
//!
//! The window `[head - lookback, head]` is walked in batches of `batch_size`
//! blocks, oldest first. A failed range query is retried block by block; a
//! block whose single query also fails is skipped. Scanning never errors.

use std::sync::Arc;

use futures::stream::{self, StreamExt};

use chainrelay_core::reader::ChainReader;
use chainrelay_core::types::{RawLogRecord, ScanWindow};

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Blocks per range query; public providers cap this around 10.
    pub batch_size: u64,
    /// How far behind the head the window reaches.
    pub lookback: u64,
    /// Batches in flight at once. 1 keeps scanning strictly sequential.
    pub concurrency: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            lookback: 1000,
            concurrency: 1,
        }
    }
}

pub struct LogScanner {
    reader: Arc<dyn ChainReader>,
    config: ScanConfig,
}

impl LogScanner {
    pub fn new(reader: Arc<dyn ChainReader>, config: ScanConfig) -> Self {
        Self { reader, config }
    }

    pub fn window(&self, head: u64) -> ScanWindow {
        ScanWindow::ending_at(head, self.config.lookback, self.config.batch_size)
    }

    /// All logs emitted by `address` inside the window ending at `head`,
    /// ordered oldest to newest.
    pub async fn scan(&self, address: &str, head: u64) -> Vec<RawLogRecord> {
        let window = self.window(head);
        tracing::info!(
            address,
            from = window.from_block,
            to = window.to_block,
            batch = window.batch_size,
            "scanning logs"
        );

        // `buffered` yields in input order, so output stays oldest first.
        let batches: Vec<Vec<RawLogRecord>> = stream::iter(window.batches())
            .map(|(from, to)| self.fetch_batch(address, from, to))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let logs: Vec<RawLogRecord> = batches.into_iter().flatten().collect();
        tracing::info!(address, logs = logs.len(), "log scan complete");
        logs
    }

    async fn fetch_batch(&self, address: &str, from: u64, to: u64) -> Vec<RawLogRecord> {
        match self.reader.filter_logs(from, to, address).await {
            Ok(logs) => {
                tracing::debug!(from, to, logs = logs.len(), "batch complete");
                logs
            }
            Err(e) => {
                tracing::warn!(from, to, error = %e, "range query failed, falling back to single blocks");
                let mut logs = Vec::new();
                for block in from..=to {
                    match self.reader.filter_logs(block, block, address).await {
                        Ok(found) => logs.extend(found),
                        Err(e) => {
                            tracing::warn!(block, error = %e, "block query failed, skipping block");
                        }
                    }
                }
                logs
            }
        }
    }
}
