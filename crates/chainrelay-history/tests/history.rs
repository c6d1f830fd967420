//! Log scanning and history assembly against an in-memory chain.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use alloy_core::dyn_abi::DynSolValue;
use alloy_primitives::{Address, B256, I256};
use async_trait::async_trait;

use chainrelay_core::error::TransportError;
use chainrelay_core::reader::ChainReader;
use chainrelay_core::types::{BlockHeader, EventKind, FieldValue, RawLogRecord};
use chainrelay_history::fingerprint::{event_topic, selector};
use chainrelay_history::{
    ChainHistoryAssembler, EventLayout, HistoryError, LogScanner, LotContract, ScanConfig,
};

// ─── In-memory chain ─────────────────────────────────────────────────────────

const CONTRACT: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";

#[derive(Default)]
struct MockChain {
    head: u64,
    code: Vec<u8>,
    logs: BTreeMap<u64, Vec<RawLogRecord>>,
    failing_ranges: HashSet<(u64, u64)>,
    failing_blocks: HashSet<u64>,
    missing_headers: HashSet<u64>,
    view_results: BTreeMap<[u8; 4], Vec<u8>>,
    queries: Mutex<Vec<(u64, u64)>>,
}

impl MockChain {
    fn with_head(head: u64) -> Self {
        Self {
            head,
            code: vec![0x60, 0x80],
            ..Default::default()
        }
    }

    fn add_log(&mut self, log: RawLogRecord) {
        self.logs.entry(log.block_number).or_default().push(log);
    }

    fn queries(&self) -> Vec<(u64, u64)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn filter_logs(
        &self,
        from: u64,
        to: u64,
        _address: &str,
    ) -> Result<Vec<RawLogRecord>, TransportError> {
        self.queries.lock().unwrap().push((from, to));
        let single_block_failure = from == to && self.failing_blocks.contains(&from);
        if self.failing_ranges.contains(&(from, to)) || single_block_failure {
            return Err(TransportError::Http("HTTP 400: block range too large".into()));
        }
        Ok(self
            .logs
            .range(from..=to)
            .flat_map(|(_, logs)| logs.iter().cloned())
            .collect())
    }

    async fn block_by_number(&self, number: u64) -> Result<BlockHeader, TransportError> {
        if self.missing_headers.contains(&number) {
            return Err(TransportError::InvalidResponse(format!("block {number} not found")));
        }
        Ok(BlockHeader {
            number,
            timestamp: 1_700_000_000 + number * 12,
        })
    }

    async fn current_block_number(&self) -> Result<u64, TransportError> {
        Ok(self.head)
    }

    async fn code_at(&self, _address: &str) -> Result<Vec<u8>, TransportError> {
        Ok(self.code.clone())
    }

    async fn call(&self, _to: &str, calldata: &[u8]) -> Result<Vec<u8>, TransportError> {
        let sel: [u8; 4] = calldata[..4].try_into().unwrap();
        Ok(self.view_results.get(&sel).cloned().unwrap_or_default())
    }
}

// ─── Log fixtures ────────────────────────────────────────────────────────────

fn int8(v: i64) -> DynSolValue {
    DynSolValue::Int(I256::try_from(v).unwrap(), 8)
}

fn addr_topic(byte: u8) -> B256 {
    B256::left_padding_from(Address::from([byte; 20]).as_slice())
}

fn plain_log(block: u64) -> RawLogRecord {
    RawLogRecord {
        block_number: block,
        transaction_hash: format!("0x{block:064x}"),
        log_index: 0,
        topics: vec![event_topic("Ping(uint256)")],
        data: vec![],
    }
}

fn lot_created(block: u64, lot_id: &str) -> RawLogRecord {
    RawLogRecord {
        topics: vec![EventLayout::for_kind(EventKind::LotCreated).topic0],
        data: DynSolValue::Tuple(vec![
            DynSolValue::String(lot_id.into()),
            DynSolValue::Address(Address::from([0xAA; 20])),
            int8(2),
            int8(8),
        ])
        .abi_encode_params(),
        ..plain_log(block)
    }
}

fn custody_transferred(block: u64) -> RawLogRecord {
    RawLogRecord {
        topics: vec![
            EventLayout::for_kind(EventKind::CustodyTransferred).topic0,
            addr_topic(0xAA),
            addr_topic(0xBB),
        ],
        data: DynSolValue::Tuple(vec![DynSolValue::Bool(false)]).abi_encode_params(),
        ..plain_log(block)
    }
}

fn scanner(chain: Arc<MockChain>, config: ScanConfig) -> LogScanner {
    LogScanner::new(chain, config)
}

// ─── LogScanner ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn batches_are_contiguous_and_cover_the_window() {
    let chain = Arc::new(MockChain::with_head(1005));
    let logs = scanner(Arc::clone(&chain), ScanConfig::default())
        .scan(CONTRACT, 1005)
        .await;
    assert!(logs.is_empty());

    let queries = chain.queries();
    assert_eq!(queries.len(), 101);
    assert_eq!(queries[0], (5, 14));
    assert_eq!(queries[1], (15, 24));
    assert_eq!(queries[99], (995, 1004));
    assert_eq!(queries[100], (1005, 1005));
    for pair in queries.windows(2) {
        assert_eq!(pair[0].1 + 1, pair[1].0, "gap or overlap between {pair:?}");
    }
}

#[tokio::test]
async fn failed_range_degrades_to_single_blocks_and_skips_bad_block() {
    let mut chain = MockChain::with_head(1005);
    for block in 15..=24 {
        chain.add_log(plain_log(block));
    }
    chain.failing_ranges.insert((15, 24));
    chain.failing_blocks.insert(17);
    let chain = Arc::new(chain);

    let logs = scanner(Arc::clone(&chain), ScanConfig::default())
        .scan(CONTRACT, 1005)
        .await;

    let blocks: Vec<u64> = logs.iter().map(|l| l.block_number).collect();
    assert_eq!(blocks, vec![15, 16, 18, 19, 20, 21, 22, 23, 24]);

    let queries = chain.queries();
    let singles: Vec<u64> = queries
        .iter()
        .skip_while(|q| **q != (15, 24))
        .skip(1)
        .take(10)
        .map(|(from, to)| {
            assert_eq!(from, to);
            *from
        })
        .collect();
    assert_eq!(singles, (15..=24).collect::<Vec<_>>());
    assert_eq!(queries.last(), Some(&(1005, 1005)));
}

#[tokio::test]
async fn short_chain_window_starts_at_genesis() {
    let mut chain = MockChain::with_head(12);
    chain.add_log(plain_log(0));
    chain.add_log(plain_log(12));
    let chain = Arc::new(chain);

    let logs = scanner(Arc::clone(&chain), ScanConfig::default()).scan(CONTRACT, 12).await;
    assert_eq!(logs.len(), 2);
    assert_eq!(chain.queries(), vec![(0, 9), (10, 12)]);
}

#[tokio::test]
async fn parallel_scan_keeps_block_order() {
    let mut chain = MockChain::with_head(200);
    for block in (0..=200).step_by(7) {
        chain.add_log(plain_log(block));
    }
    let chain = Arc::new(chain);

    let config = ScanConfig {
        concurrency: 4,
        ..ScanConfig::default()
    };
    let logs = scanner(chain, config).scan(CONTRACT, 200).await;
    let blocks: Vec<u64> = logs.iter().map(|l| l.block_number).collect();
    let mut sorted = blocks.clone();
    sorted.sort_unstable();
    assert_eq!(blocks, sorted);
    assert_eq!(blocks.len(), 29);
}

// ─── ChainHistoryAssembler ───────────────────────────────────────────────────

#[tokio::test]
async fn assembles_decoded_events_in_block_order() {
    let mut chain = MockChain::with_head(100);
    chain.add_log(lot_created(20, "LOTE-7"));
    chain.add_log(plain_log(25));
    chain.add_log(custody_transferred(30));
    let chain = Arc::new(chain);

    let history = ChainHistoryAssembler::new(chain, ScanConfig::default())
        .assemble(CONTRACT)
        .await
        .unwrap();

    assert_eq!(history.lot_id, "LOTE-7");
    assert_eq!(history.total_events, 2);
    assert_eq!(history.events[0].kind, EventKind::LotCreated);
    assert_eq!(history.events[0].timestamp, 1_700_000_000 + 20 * 12);
    assert_eq!(history.events[1].kind, EventKind::CustodyTransferred);
    assert_eq!(
        history.events[1].field("nuevoPropietario"),
        Some(&FieldValue::Address(format!("0x{}", "bb".repeat(20))))
    );

    let json = serde_json::to_value(&history).unwrap();
    assert_eq!(json["contractAddress"], CONTRACT);
    assert_eq!(json["loteId"], "LOTE-7");
    assert_eq!(json["totalEventos"], 2);
    assert_eq!(json["eventos"][0]["tipoEvento"], "LoteCreado");
    assert_eq!(json["eventos"][0]["blockNumber"], 20);
    assert_eq!(json["eventos"][0]["datos"]["temperaturaMinima"], 2);
    assert_eq!(json["eventos"][1]["tipoEvento"], "CustodiaTransferida");
    assert_eq!(json["eventos"][1]["datos"]["comprometido"], false);
}

#[tokio::test]
async fn missing_code_means_no_contract() {
    let mut chain = MockChain::with_head(100);
    chain.code.clear();
    let err = ChainHistoryAssembler::new(Arc::new(chain), ScanConfig::default())
        .assemble(CONTRACT)
        .await
        .unwrap_err();
    assert!(matches!(err, HistoryError::ContractNotFound { .. }));
}

#[tokio::test]
async fn lot_id_falls_back_to_contract_read() {
    let mut chain = MockChain::with_head(100);
    chain.add_log(custody_transferred(50));
    chain.view_results.insert(
        selector("loteId()"),
        DynSolValue::Tuple(vec![DynSolValue::String("LOTE-FROM-STATE".into())]).abi_encode_params(),
    );

    let history = ChainHistoryAssembler::new(Arc::new(chain), ScanConfig::default())
        .assemble(CONTRACT)
        .await
        .unwrap();
    assert_eq!(history.lot_id, "LOTE-FROM-STATE");
    assert_eq!(history.total_events, 1);
}

#[tokio::test]
async fn events_without_block_header_are_dropped() {
    let mut chain = MockChain::with_head(100);
    chain.add_log(lot_created(20, "LOTE-7"));
    chain.add_log(custody_transferred(30));
    chain.missing_headers.insert(30);

    let history = ChainHistoryAssembler::new(Arc::new(chain), ScanConfig::default())
        .assemble(CONTRACT)
        .await
        .unwrap();
    assert_eq!(history.total_events, 1);
    assert_eq!(history.events[0].kind, EventKind::LotCreated);
}

#[tokio::test]
async fn malformed_lot_event_is_kept_with_partial_fields() {
    let mut chain = MockChain::with_head(100);
    chain.add_log(lot_created(20, "LOTE-7"));
    // Truncated data, owner topics intact.
    chain.add_log(RawLogRecord {
        data: vec![0u8; 7],
        ..custody_transferred(30)
    });
    // Data intact, second owner topic missing.
    let mut short_topics = custody_transferred(40);
    short_topics.topics.truncate(2);
    chain.add_log(short_topics);

    let history = ChainHistoryAssembler::new(Arc::new(chain), ScanConfig::default())
        .assemble(CONTRACT)
        .await
        .unwrap();

    assert_eq!(history.total_events, 3);
    let truncated = &history.events[1];
    assert_eq!(truncated.kind, EventKind::CustodyTransferred);
    assert_eq!(truncated.block_number, 30);
    assert_eq!(truncated.timestamp, 1_700_000_000 + 30 * 12);
    assert!(truncated.field("comprometido").is_none());
    assert_eq!(
        truncated.field("nuevoPropietario"),
        Some(&FieldValue::Address(format!("0x{}", "bb".repeat(20))))
    );

    let json = serde_json::to_value(&history.events[2]).unwrap();
    assert_eq!(json["tipoEvento"], "CustodiaTransferida");
    assert_eq!(json["txHash"], format!("0x{:064x}", 40));
    assert_eq!(json["datos"]["comprometido"], false);
    assert!(json["datos"].get("nuevoPropietario").is_none());
}

// ─── LotContract ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn lot_info_reads_every_getter() {
    let mut chain = MockChain::with_head(1);
    let mut set = |sig: &str, value: DynSolValue| {
        chain
            .view_results
            .insert(selector(sig), DynSolValue::Tuple(vec![value]).abi_encode_params());
    };
    set("loteId()", DynSolValue::String("LOTE-9".into()));
    set("fabricante()", DynSolValue::Address(Address::from([0xAA; 20])));
    set("propietarioActual()", DynSolValue::Address(Address::from([0xBB; 20])));
    set("temperaturaMinima()", int8(-18));
    set("temperaturaMaxima()", int8(-2));
    set("tempRegMinima()", int8(-20));
    set("tempRegMaxima()", int8(-1));
    set("comprometido()", DynSolValue::Bool(true));

    let info = LotContract::new(&chain, CONTRACT).info().await.unwrap();
    assert_eq!(info.lot_id, "LOTE-9");
    assert_eq!(info.current_owner, format!("0x{}", "bb".repeat(20)));
    assert_eq!(info.min_temperature, -18);
    assert_eq!(info.recorded_min_temperature, -20);
    assert!(info.compromised);

    let json = serde_json::to_value(&info).unwrap();
    assert_eq!(json["tempRegMaxima"], -1);
    assert_eq!(json["contractAddress"], CONTRACT);
}

#[tokio::test]
async fn lot_info_on_empty_return_is_a_call_error() {
    let chain = MockChain::with_head(1);
    let err = LotContract::new(&chain, CONTRACT).info().await.unwrap_err();
    assert!(matches!(err, HistoryError::Call { ref function, .. } if function == "loteId"));
}
