//! Upstream real-time feed wire types: `eth_subscribe` requests and the
//! classification of inbound messages.

use serde::Serialize;
use serde_json::Value;

use crate::request::{JsonRpcError, JsonRpcRequest, RpcId};

/// Method name carried by every subscription notification.
pub const NOTIFICATION_METHOD: &str = "eth_subscription";

/// One `to` address the mined-transactions feed should match.
#[derive(Debug, Clone, Serialize)]
pub struct AddressFilter {
    pub to: String,
}

/// Filter object sent as the second `eth_subscribe` parameter.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinedTransactionsFilter {
    pub addresses: Vec<AddressFilter>,
    pub include_removed: bool,
    pub hashes_only: bool,
}

impl MinedTransactionsFilter {
    /// Full transactions sent *to* `contract_address`, excluding reorged ones.
    pub fn to_address(contract_address: impl Into<String>) -> Self {
        Self {
            addresses: vec![AddressFilter {
                to: contract_address.into(),
            }],
            include_removed: false,
            hashes_only: false,
        }
    }
}

/// Build the `eth_subscribe` request for one contract address on `feed`.
pub fn subscribe_request(id: u64, feed: &str, contract_address: &str) -> JsonRpcRequest {
    let filter = MinedTransactionsFilter::to_address(contract_address);
    JsonRpcRequest::new(
        id,
        "eth_subscribe",
        vec![
            Value::String(feed.to_string()),
            serde_json::to_value(filter).unwrap_or(Value::Null),
        ],
    )
}

/// Build the `eth_unsubscribe` request for an upstream subscription id.
pub fn unsubscribe_request(id: u64, subscription_id: &str) -> JsonRpcRequest {
    JsonRpcRequest::new(
        id,
        "eth_unsubscribe",
        vec![Value::String(subscription_id.to_string())],
    )
}

/// An inbound upstream message, classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamMessage {
    /// `{id, result: "<subscription id>"}` with no `method`.
    Ack { id: RpcId, subscription_id: String },
    /// `{id, error}` answering one of our requests.
    Rejected { id: RpcId, error: JsonRpcError },
    /// `{method: "eth_subscription", params: {subscription, result}}`.
    Notification {
        subscription_id: String,
        payload: Value,
    },
    /// Anything else (unsubscribe confirmations, garbage, ...).
    Unrecognized,
}

impl UpstreamMessage {
    pub fn parse(text: &str) -> Self {
        let Ok(value) = serde_json::from_str::<Value>(text) else {
            return Self::Unrecognized;
        };

        match value.get("method").and_then(Value::as_str) {
            Some(NOTIFICATION_METHOD) => {
                let params = &value["params"];
                match params.get("subscription").and_then(Value::as_str) {
                    Some(sub) => Self::Notification {
                        subscription_id: sub.to_string(),
                        payload: params.get("result").cloned().unwrap_or(Value::Null),
                    },
                    None => Self::Unrecognized,
                }
            }
            Some(_) => Self::Unrecognized,
            None => {
                let id = value
                    .get("id")
                    .cloned()
                    .and_then(|v| serde_json::from_value::<RpcId>(v).ok())
                    .unwrap_or(RpcId::Null);

                if let Some(err) = value
                    .get("error")
                    .cloned()
                    .and_then(|e| serde_json::from_value::<JsonRpcError>(e).ok())
                {
                    return Self::Rejected { id, error: err };
                }

                match value.get("result").and_then(Value::as_str) {
                    Some(sub) => Self::Ack {
                        id,
                        subscription_id: sub.to_string(),
                    },
                    None => Self::Unrecognized,
                }
            }
        }
    }
}
