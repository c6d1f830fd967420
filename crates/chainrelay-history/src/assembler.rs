//! Full event history of one lot contract.

use std::sync::Arc;

use serde::Serialize;

use chainrelay_core::reader::ChainReader;
use chainrelay_core::types::{DomainEvent, EventKind};

use crate::contract::LotContract;
use crate::decoder::{EventDecoder, LOT_ID_FIELD};
use crate::error::HistoryError;
use crate::scanner::{LogScanner, ScanConfig};

/// Reconstructed history, oldest event first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainHistory {
    #[serde(rename = "contractAddress")]
    pub contract_address: String,
    /// Empty when neither the events nor a direct read yielded it.
    #[serde(rename = "loteId")]
    pub lot_id: String,
    #[serde(rename = "totalEventos")]
    pub total_events: usize,
    #[serde(rename = "eventos")]
    pub events: Vec<DomainEvent>,
}

pub struct ChainHistoryAssembler {
    reader: Arc<dyn ChainReader>,
    scanner: LogScanner,
    decoder: EventDecoder,
}

impl ChainHistoryAssembler {
    pub fn new(reader: Arc<dyn ChainReader>, config: ScanConfig) -> Self {
        Self {
            scanner: LogScanner::new(Arc::clone(&reader), config),
            reader,
            decoder: EventDecoder::new(),
        }
    }

    pub fn reader(&self) -> &dyn ChainReader {
        self.reader.as_ref()
    }

    /// Rebuild the history of `address`. Only a missing contract or a failed
    /// head/code read is an error. Failed log batches and timestamp lookups
    /// drop the affected entries; a lot event that only partly decodes is
    /// kept with the fields that did.
    pub async fn assemble(&self, address: &str) -> Result<ChainHistory, HistoryError> {
        let code = self.reader.code_at(address).await?;
        if code.is_empty() {
            return Err(HistoryError::ContractNotFound {
                address: address.to_string(),
            });
        }

        let head = self.reader.current_block_number().await?;
        let logs = self.scanner.scan(address, head).await;

        let mut lot_id = String::new();
        let mut events = Vec::new();
        for log in &logs {
            let Some(decoded) = self.decoder.decode(log) else {
                continue;
            };
            for issue in &decoded.issues {
                tracing::warn!(block = log.block_number, tx = %log.transaction_hash, error = %issue, "lot event partially decoded");
            }
            let mut event = decoded.event;

            // One lookup per event, repeated blocks included.
            match self.reader.block_by_number(event.block_number).await {
                Ok(header) => event.timestamp = header.timestamp,
                Err(e) => {
                    tracing::warn!(block = event.block_number, error = %e, "block lookup failed, dropping event");
                    continue;
                }
            }

            if lot_id.is_empty() && event.kind == EventKind::LotCreated {
                if let Some(id) = event.field(LOT_ID_FIELD).and_then(|v| v.as_str()) {
                    lot_id = id.to_string();
                }
            }
            events.push(event);
        }

        if lot_id.is_empty() {
            match LotContract::new(self.reader.as_ref(), address).lot_id().await {
                Ok(id) => lot_id = id,
                Err(e) => tracing::warn!(address, error = %e, "could not read lot id"),
            }
        }

        tracing::info!(address, %lot_id, events = events.len(), scanned_logs = logs.len(), "history assembled");
        Ok(ChainHistory {
            contract_address: address.to_string(),
            lot_id,
            total_events: events.len(),
            events,
        })
    }
}
