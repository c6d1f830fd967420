//! chainrelay-http: JSON-RPC over HTTP and the EVM [`ChainReader`] built on it.
//!
//! [`ChainReader`]: chainrelay_core::ChainReader

pub mod client;
pub mod evm;

pub use client::{HttpClientConfig, HttpRpcClient};
pub use evm::EvmRpcClient;
