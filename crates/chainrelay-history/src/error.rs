//! Error types for decoding and history reconstruction.

use thiserror::Error;

use chainrelay_core::error::TransportError;
use chainrelay_core::types::EventKind;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("{event}: expected {expected} indexed topics, got {got}")]
    MissingTopics {
        event: EventKind,
        expected: usize,
        got: usize,
    },

    #[error("{event}: ABI decode failed: {reason}")]
    Abi { event: EventKind, reason: String },
}

#[derive(Debug, Error)]
pub enum HistoryError {
    /// `eth_getCode` returned no bytecode.
    #[error("no contract deployed at {address}")]
    ContractNotFound { address: String },

    #[error("contract call {function} failed: {reason}")]
    Call { function: String, reason: String },

    #[error(transparent)]
    Chain(#[from] TransportError),
}
