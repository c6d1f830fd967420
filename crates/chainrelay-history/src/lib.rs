//! chainrelay-history: rebuild a lot contract's event history from chain logs.
//!
//! - [`EventDecoder`] maps raw logs onto the known lot events
//! - [`LogScanner`] walks a block window in small batches, degrading to
//!   single-block queries when a range query fails
//! - [`ChainHistoryAssembler`] ties both together with block timestamps
//! - [`LotContract`] reads the lot's current state through view calls

pub mod assembler;
pub mod contract;
pub mod decoder;
pub mod error;
pub mod fingerprint;
pub mod scanner;

pub use assembler::{ChainHistory, ChainHistoryAssembler};
pub use contract::{LotContract, LotInfo};
pub use decoder::{Decoded, EventDecoder, EventLayout, FieldDef, LOT_ID_FIELD};
pub use error::{DecodeError, HistoryError};
pub use scanner::{LogScanner, ScanConfig};
