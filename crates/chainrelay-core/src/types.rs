//! Shared types for the relay and history pipelines.

use alloy_primitives::B256;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Hex helpers ─────────────────────────────────────────────────────────────

/// Parse a `0x`-prefixed (or bare) hex quantity.
pub fn parse_hex_u64(s: &str) -> Option<u64> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).ok()
}

/// Format a block number as a JSON-RPC hex quantity.
pub fn to_hex_quantity(n: u64) -> String {
    format!("{n:#x}")
}

/// Decode `0x`-prefixed hex bytes; `"0x"` decodes to an empty vector.
pub fn decode_hex_bytes(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s))
}

/// Returns `true` for a `0x`-prefixed, 40-hex-digit account address.
pub fn is_contract_address(s: &str) -> bool {
    s.len() == 42
        && s.starts_with("0x")
        && s[2..].bytes().all(|b| b.is_ascii_hexdigit())
}

/// Lowercase form used as the registry key and in decoded fields.
pub fn normalize_address(s: &str) -> String {
    s.to_ascii_lowercase()
}

// ─── RawLogRecord ────────────────────────────────────────────────────────────

/// One log entry as returned by a log-filter query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLogRecord {
    pub block_number: u64,
    pub transaction_hash: String,
    pub log_index: u64,
    /// `topics[0]` is the event signature hash, the rest are indexed params.
    pub topics: Vec<B256>,
    pub data: Vec<u8>,
}

/// The slice of a block header the history path needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    /// Unix timestamp (seconds since epoch).
    pub timestamp: u64,
}

// ─── ScanWindow ──────────────────────────────────────────────────────────────

/// One history reconstruction pass: an inclusive block range walked in
/// fixed-size batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub from_block: u64,
    pub to_block: u64,
    pub batch_size: u64,
}

impl ScanWindow {
    /// The window reaching `lookback` blocks behind `head`, clamped at genesis.
    pub fn ending_at(head: u64, lookback: u64, batch_size: u64) -> Self {
        Self {
            from_block: head.saturating_sub(lookback),
            to_block: head,
            batch_size: batch_size.max(1),
        }
    }

    /// Contiguous, non-overlapping inclusive batch ranges, oldest first.
    pub fn batches(&self) -> impl Iterator<Item = (u64, u64)> {
        let Self {
            from_block,
            to_block,
            batch_size,
        } = *self;
        let mut next = Some(from_block).filter(|from| *from <= to_block);
        std::iter::from_fn(move || {
            let from = next?;
            let to = from.saturating_add(batch_size.max(1) - 1).min(to_block);
            next = to.checked_add(1).filter(|n| *n <= to_block);
            Some((from, to))
        })
    }

    pub fn block_count(&self) -> u64 {
        self.to_block.saturating_sub(self.from_block) + 1
    }
}

// ─── DomainEvent ─────────────────────────────────────────────────────────────

/// Known lot-tracking event kinds. Serialized with their on-chain names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "LoteCreado")]
    LotCreated,
    #[serde(rename = "CustodiaTransferida")]
    CustodyTransferred,
    #[serde(rename = "LoteComprometido")]
    LotCompromised,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::LotCreated,
        EventKind::CustodyTransferred,
        EventKind::LotCompromised,
    ];

    /// The event name as declared by the contract.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LotCreated => "LoteCreado",
            Self::CustodyTransferred => "CustodiaTransferida",
            Self::LotCompromised => "LoteComprometido",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded event parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Lowercase `0x`-prefixed address.
    Address(String),
    Int(i128),
    Uint(u128),
    /// Integers wider than 128 bits, as decimal strings.
    BigInt(String),
    Bool(bool),
    Str(String),
    /// `0x`-prefixed hex.
    Bytes(String),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) | Self::Address(s) => Some(s),
            _ => None,
        }
    }
}

/// A decoded, typed lot-tracking event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainEvent {
    #[serde(rename = "tipoEvento")]
    pub kind: EventKind,
    #[serde(rename = "blockNumber")]
    pub block_number: u64,
    #[serde(rename = "txHash")]
    pub transaction_hash: String,
    /// Block timestamp; zero until resolved.
    pub timestamp: u64,
    /// Field name → value, in declaration order.
    #[serde(rename = "datos")]
    pub fields: IndexMap<String, FieldValue>,
}

impl DomainEvent {
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

// ─── DownstreamMessage ───────────────────────────────────────────────────────

/// Envelope type tag pushed to downstream listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Connected,
    Transaction,
    Error,
    Echo,
}

/// The envelope every downstream push uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownstreamMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(rename = "contractAddress")]
    pub contract_address: String,
    pub data: Value,
    /// Unix seconds at envelope creation.
    pub timestamp: i64,
}

impl DownstreamMessage {
    pub fn new(kind: MessageType, contract_address: impl Into<String>, data: Value) -> Self {
        Self {
            kind,
            contract_address: contract_address.into(),
            data,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn connected(contract_address: &str) -> Self {
        Self::new(
            MessageType::Connected,
            contract_address,
            serde_json::json!({ "status": "monitoring started" }),
        )
    }

    /// Wraps an upstream notification payload verbatim.
    pub fn transaction(contract_address: &str, payload: Value) -> Self {
        Self::new(MessageType::Transaction, contract_address, payload)
    }

    pub fn error(contract_address: &str, message: impl std::fmt::Display) -> Self {
        Self::new(
            MessageType::Error,
            contract_address,
            serde_json::json!({ "error": message.to_string() }),
        )
    }

    pub fn echo(contract_address: &str, text: &str) -> Self {
        Self::new(
            MessageType::Echo,
            contract_address,
            Value::String(text.to_string()),
        )
    }
}
