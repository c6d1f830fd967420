//! Relay error types.

use thiserror::Error;

use chainrelay_core::error::TransportError;

#[derive(Debug, Error)]
pub enum RelayError {
    /// The upstream request backing a registration could not be sent.
    #[error("upstream request failed: {0}")]
    Upstream(#[from] TransportError),

    /// `start` was called on a connector that is already running.
    #[error("upstream connector already started")]
    AlreadyStarted,
}
