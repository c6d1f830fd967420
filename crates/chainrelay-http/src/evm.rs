//! EVM chain reader over any [`RpcTransport`].
//!
//! Uses `eth_getLogs`, `eth_getBlockByNumber`, `eth_blockNumber`, `eth_getCode`
//! and `eth_call`.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::B256;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use chainrelay_core::error::TransportError;
use chainrelay_core::reader::ChainReader;
use chainrelay_core::request::JsonRpcRequest;
use chainrelay_core::transport::RpcTransport;
use chainrelay_core::types::{
    decode_hex_bytes, parse_hex_u64, to_hex_quantity, BlockHeader, RawLogRecord,
};

/// A log as returned by `eth_getLogs`.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcLog {
    pub topics: Vec<String>,
    pub data: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    #[serde(rename = "transactionHash")]
    pub tx_hash: String,
    #[serde(rename = "logIndex", default)]
    pub log_index: Option<String>,
    #[serde(default)]
    pub removed: Option<bool>,
}

impl TryFrom<RpcLog> for RawLogRecord {
    type Error = TransportError;

    fn try_from(log: RpcLog) -> Result<Self, Self::Error> {
        let block_number = parse_hex_u64(&log.block_number).ok_or_else(|| {
            TransportError::InvalidResponse(format!("bad blockNumber {}", log.block_number))
        })?;
        let topics = log
            .topics
            .iter()
            .map(|t| {
                B256::from_str(t)
                    .map_err(|e| TransportError::InvalidResponse(format!("bad topic {t}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let data = decode_hex_bytes(&log.data)
            .map_err(|e| TransportError::InvalidResponse(format!("bad log data: {e}")))?;

        Ok(Self {
            block_number,
            transaction_hash: log.tx_hash,
            log_index: log.log_index.as_deref().and_then(parse_hex_u64).unwrap_or(0),
            topics,
            data,
        })
    }
}

/// [`ChainReader`] implementation issuing JSON-RPC calls through `T`.
pub struct EvmRpcClient<T> {
    transport: T,
    next_id: AtomicU64,
}

impl<T: RpcTransport> EvmRpcClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }

    async fn request<R: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<R, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.transport
            .send(JsonRpcRequest::new(id, method, params))
            .await?
            .decode()
    }

    async fn request_bytes(&self, method: &str, params: Vec<Value>) -> Result<Vec<u8>, TransportError> {
        let hex: String = self.request(method, params).await?;
        decode_hex_bytes(&hex).map_err(|e| TransportError::InvalidResponse(format!("{method}: {e}")))
    }
}

#[async_trait]
impl<T: RpcTransport> ChainReader for EvmRpcClient<T> {
    async fn filter_logs(
        &self,
        from: u64,
        to: u64,
        address: &str,
    ) -> Result<Vec<RawLogRecord>, TransportError> {
        let filter = json!({
            "fromBlock": to_hex_quantity(from),
            "toBlock": to_hex_quantity(to),
            "address": address,
        });
        let logs: Vec<RpcLog> = self.request("eth_getLogs", vec![filter]).await?;
        logs.into_iter()
            .filter(|log| !log.removed.unwrap_or(false))
            .map(RawLogRecord::try_from)
            .collect()
    }

    async fn block_by_number(&self, number: u64) -> Result<BlockHeader, TransportError> {
        let block: Option<Value> = self
            .request(
                "eth_getBlockByNumber",
                vec![json!(to_hex_quantity(number)), json!(false)],
            )
            .await?;
        let block = block
            .ok_or_else(|| TransportError::InvalidResponse(format!("block {number} not found")))?;
        let timestamp = block["timestamp"]
            .as_str()
            .and_then(parse_hex_u64)
            .ok_or_else(|| TransportError::InvalidResponse(format!("block {number} has no timestamp")))?;

        Ok(BlockHeader { number, timestamp })
    }

    async fn current_block_number(&self) -> Result<u64, TransportError> {
        let hex: String = self.request("eth_blockNumber", vec![]).await?;
        parse_hex_u64(&hex)
            .ok_or_else(|| TransportError::InvalidResponse(format!("bad block number {hex}")))
    }

    async fn code_at(&self, address: &str) -> Result<Vec<u8>, TransportError> {
        self.request_bytes("eth_getCode", vec![json!(address), json!("latest")])
            .await
    }

    async fn call(&self, to: &str, calldata: &[u8]) -> Result<Vec<u8>, TransportError> {
        let tx = json!({
            "to": to,
            "data": format!("0x{}", hex::encode(calldata)),
        });
        self.request_bytes("eth_call", vec![tx, json!("latest")]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainrelay_core::request::{JsonRpcResponse, RpcId};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Answers each method with a canned result and records every request.
    struct CannedTransport {
        results: HashMap<&'static str, Value>,
        seen: Mutex<Vec<JsonRpcRequest>>,
    }

    impl CannedTransport {
        fn new(results: Vec<(&'static str, Value)>) -> Self {
            Self {
                results: results.into_iter().collect(),
                seen: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl RpcTransport for CannedTransport {
        async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
            let result = self.results.get(req.method.as_str()).cloned();
            let id = req.id.clone();
            self.seen.lock().unwrap().push(req);
            Ok(JsonRpcResponse {
                id,
                result,
                error: None,
            })
        }

        fn endpoint(&self) -> &str {
            "mock://"
        }
    }

    const TOPIC: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";

    #[tokio::test]
    async fn filter_logs_sends_hex_range_and_parses_logs() {
        let client = EvmRpcClient::new(CannedTransport::new(vec![(
            "eth_getLogs",
            json!([
                {
                    "topics": [TOPIC],
                    "data": "0x0102",
                    "blockNumber": "0xf",
                    "transactionHash": "0xaa",
                    "logIndex": "0x2",
                    "removed": false
                },
                {
                    "topics": [TOPIC],
                    "data": "0x",
                    "blockNumber": "0x10",
                    "transactionHash": "0xbb",
                    "removed": true
                }
            ]),
        )]));

        let logs = client.filter_logs(15, 24, "0xabc").await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].block_number, 15);
        assert_eq!(logs[0].log_index, 2);
        assert_eq!(logs[0].data, vec![1, 2]);
        assert_eq!(logs[0].topics[0], B256::from_str(TOPIC).unwrap());

        let seen = client.transport.seen.lock().unwrap();
        assert_eq!(seen[0].params[0]["fromBlock"], "0xf");
        assert_eq!(seen[0].params[0]["toBlock"], "0x18");
        assert_eq!(seen[0].params[0]["address"], "0xabc");
        assert!(matches!(seen[0].id, RpcId::Number(_)));
    }

    #[tokio::test]
    async fn block_and_head_parsing() {
        let client = EvmRpcClient::new(CannedTransport::new(vec![
            ("eth_blockNumber", json!("0x3ed")),
            (
                "eth_getBlockByNumber",
                json!({"number": "0x11", "timestamp": "0x65000000"}),
            ),
        ]));
        assert_eq!(client.current_block_number().await.unwrap(), 1005);
        let header = client.block_by_number(17).await.unwrap();
        assert_eq!(header.timestamp, 0x6500_0000);
    }

    #[tokio::test]
    async fn missing_block_is_an_error() {
        let client = EvmRpcClient::new(CannedTransport::new(vec![(
            "eth_getBlockByNumber",
            Value::Null,
        )]));
        let err = client.block_by_number(99).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn empty_code_decodes_to_empty_bytes() {
        let client = EvmRpcClient::new(CannedTransport::new(vec![("eth_getCode", json!("0x"))]));
        assert!(client.code_at("0xabc").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn call_hex_encodes_calldata() {
        let client = EvmRpcClient::new(CannedTransport::new(vec![("eth_call", json!("0x01"))]));
        let out = client.call("0xabc", &[0xde, 0xad, 0xbe, 0xef]).await.unwrap();
        assert_eq!(out, vec![1]);
        let seen = client.transport.seen.lock().unwrap();
        assert_eq!(seen[0].params[0]["data"], "0xdeadbeef");
        assert_eq!(seen[0].params[1], "latest");
    }
}
