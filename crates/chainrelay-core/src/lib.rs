//! chainrelay-core: shared traits and types for ChainRelay.
//!
//! # Overview
//!
//! ChainRelay relays mined-transaction notifications for tracked lot contracts
//! from one upstream real-time feed to many downstream listeners, and rebuilds a
//! contract's event history from chain logs. The core crate defines:
//!
//! - [`RpcTransport`]: one JSON-RPC round trip over any carrier
//! - [`ChainReader`]: the chain read API consumed by history reconstruction
//! - [`JsonRpcRequest`] / [`JsonRpcResponse`]: wire types
//! - [`UpstreamMessage`]: classification of inbound feed messages
//! - [`TransportError`]: structured error type
//! - [`policy`] module: retry policy for transient transport failures
//! - [`types`] module: raw logs, decoded events and downstream envelopes

pub mod error;
pub mod policy;
pub mod reader;
pub mod request;
pub mod subscription;
pub mod transport;
pub mod types;

pub use error::TransportError;
pub use reader::ChainReader;
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
pub use subscription::UpstreamMessage;
pub use transport::RpcTransport;
pub use types::{
    BlockHeader, DomainEvent, DownstreamMessage, EventKind, FieldValue, MessageType,
    RawLogRecord, ScanWindow,
};
