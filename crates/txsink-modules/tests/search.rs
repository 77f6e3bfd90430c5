//! End-to-end indexing and search over SQLite stores.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, TimeZone, Utc};

use txsink_core::codec::{
    Any, AuthInfo, Coin, EncodingConfig, Fee, Tx, TxBody, MSG_EXECUTE_CONTRACT_TYPE_URL,
    MSG_SEND_TYPE_URL,
};
use txsink_core::{
    tx_hash, BlockEvents, Event, EventSink, ExecTxResult, FinalizeBlockRequest,
    FinalizeBlockResponse, IndexerError, ModuleSinkRegistry, Query, TxRequestRecord,
    TxRequestStore, TxResult, TxSearchResult,
};
use txsink_modules::{TxEventSink, WasmEventSink};
use txsink_storage::SqliteEventSink;

struct Harness {
    store: Arc<SqliteEventSink>,
    registry: ModuleSinkRegistry,
}

fn block_time(height: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + height * 5, 0).unwrap()
}

fn sample_tx(memo: &str) -> Tx {
    Tx {
        body: TxBody {
            messages: vec![
                Any::new(MSG_SEND_TYPE_URL, format!("send:{memo}").into_bytes()),
                Any::new(MSG_EXECUTE_CONTRACT_TYPE_URL, b"{\"transfer\":{}}".to_vec()),
            ],
            memo: memo.into(),
        },
        auth_info: AuthInfo {
            fee: Fee {
                amount: vec![Coin::new("orai", 1_000)],
                gas_limit: 200_000,
                payer: String::new(),
                granter: "orai1granter".into(),
            },
        },
        signatures: vec![vec![7; 64]],
    }
}

impl Harness {
    async fn new() -> Self {
        let store = SqliteEventSink::in_memory("testing").await.unwrap();
        Self::with_store(store)
    }

    fn with_store(store: SqliteEventSink) -> Self {
        let store = Arc::new(store);
        let encoding = EncodingConfig::default();

        let mut registry = ModuleSinkRegistry::new();
        registry
            .register(Arc::new(TxEventSink::new(store.clone(), encoding.clone())))
            .unwrap();
        registry
            .register(Arc::new(WasmEventSink::new(store.clone(), encoding)))
            .unwrap();

        Self { store, registry }
    }

    /// Build a finalized block. Each entry of `txs` is `(memo, tx event)`.
    fn block(height: i64, txs: &[(&str, Event)]) -> (FinalizeBlockRequest, FinalizeBlockResponse) {
        let encoding = EncodingConfig::default();
        let req = FinalizeBlockRequest {
            height,
            txs: txs
                .iter()
                .map(|(memo, _)| encoding.encode_tx(&sample_tx(memo)).unwrap())
                .collect(),
            time: block_time(height),
        };
        let res = FinalizeBlockResponse {
            events: vec![Event::indexed("mint.amount", "100")],
            tx_results: txs
                .iter()
                .map(|(_, event)| ExecTxResult {
                    log: "ok".into(),
                    gas_wanted: 200_000,
                    gas_used: 81_234,
                    events: vec![event.clone()],
                    ..Default::default()
                })
                .collect(),
        };
        (req, res)
    }

    async fn index_primary(&self, req: &FinalizeBlockRequest, res: &FinalizeBlockResponse) {
        self.store
            .index_block_events(&BlockEvents::from_finalize(req, res))
            .await
            .unwrap();
        let tx_results: Vec<TxResult> = req
            .txs
            .iter()
            .zip(&res.tx_results)
            .enumerate()
            .map(|(i, (tx, result))| TxResult {
                height: req.height,
                index: i as u32,
                tx: tx.clone(),
                result: result.clone(),
            })
            .collect();
        self.store.index_tx_events(&tx_results).await.unwrap();
    }

    /// Run one finalized block through the primary sink, then every module.
    async fn finalize_events(&self, height: i64, txs: &[(&str, Event)]) -> FinalizeBlockRequest {
        let (req, res) = Self::block(height, txs);
        self.index_primary(&req, &res).await;
        self.registry.dispatch_block(&req, &res).await.unwrap();
        req
    }

    /// Same as [`Harness::finalize_events`] with an `account.owner` event per
    /// transaction. Each entry of `txs` is `(memo, account owner)`.
    async fn finalize(&self, height: i64, txs: &[(&str, &str)]) -> FinalizeBlockRequest {
        let txs: Vec<(&str, Event)> = txs
            .iter()
            .map(|(memo, owner)| (*memo, Event::indexed("account.owner", *owner)))
            .collect();
        self.finalize_events(height, &txs).await
    }

    /// Run the modules before the primary sink has seen the block.
    async fn finalize_modules_first(&self, height: i64, txs: &[(&str, &str)]) {
        let txs: Vec<(&str, Event)> = txs
            .iter()
            .map(|(memo, owner)| (*memo, Event::indexed("account.owner", *owner)))
            .collect();
        let (req, res) = Self::block(height, &txs);
        self.registry.dispatch_block(&req, &res).await.unwrap();
        self.index_primary(&req, &res).await;
    }

    async fn search(&self, query: &str, limit: u16) -> Result<TxSearchResult, IndexerError> {
        self.registry
            .search_txs("tx", &Query::parse(query).unwrap(), limit)
            .await
    }
}

fn heights(result: &TxSearchResult) -> Vec<i64> {
    result.txs.iter().map(|t| t.tx_response.height).collect()
}

#[tokio::test]
async fn reindexing_a_block_is_idempotent() {
    let h = Harness::new().await;
    h.finalize(1, &[("a-1", "Ivan"), ("b-1", "Olga")]).await;
    assert_eq!(h.store.tx_request_count().await.unwrap(), 2);

    h.finalize(1, &[("a-1", "Ivan"), ("b-1", "Olga")]).await;
    assert_eq!(h.store.tx_request_count().await.unwrap(), 2);
}

#[tokio::test]
async fn height_equality_returns_only_that_height() {
    let h = Harness::new().await;
    for height in 1..=3 {
        h.finalize(height, &[(format!("tx-{height}").as_str(), "Ivan")]).await;
    }

    let found = h.search("tx.height = 2", 10).await.unwrap();
    assert_eq!(heights(&found), vec![2]);
    assert_eq!(found.total, 1);
}

#[tokio::test]
async fn last_height_equality_wins() {
    let h = Harness::new().await;
    for height in 1..=3 {
        h.finalize(height, &[(format!("tx-{height}").as_str(), "Ivan")]).await;
    }

    let found = h.search("tx.height = 1 AND tx.height = 3", 10).await.unwrap();
    assert_eq!(heights(&found), vec![3]);
}

#[tokio::test]
async fn half_open_range_bounds() {
    let h = Harness::new().await;
    for height in 1..=5 {
        h.finalize(height, &[(format!("tx-{height}").as_str(), "Ivan")]).await;
    }

    let found = h.search("tx.height >= 2 AND tx.height < 4", 10).await.unwrap();
    assert_eq!(heights(&found), vec![3, 2]);

    let found = h.search("tx.height > 2 AND tx.height <= 5", 10).await.unwrap();
    assert_eq!(heights(&found), vec![5, 4, 3]);
}

#[tokio::test]
async fn range_is_unaffected_by_unrelated_conditions() {
    let h = Harness::new().await;
    for height in 1..=5 {
        let owner = if height % 2 == 0 { "Olga" } else { "Ivan" };
        h.finalize(height, &[(format!("tx-{height}").as_str(), owner)]).await;
    }

    let found = h
        .search("tx.height >= 2 AND account.owner = 'Ivan' AND tx.height < 5", 10)
        .await
        .unwrap();
    assert_eq!(heights(&found), vec![3]);

    let found = h
        .search("account.owner = 'Olga' AND tx.height >= 1 AND tx.height <= 5", 10)
        .await
        .unwrap();
    assert_eq!(heights(&found), vec![4, 2]);
}

#[tokio::test]
async fn indexed_tx_round_trips() {
    let h = Harness::new().await;
    let req = h.finalize(4, &[("round-trip", "Ivan")]).await;
    let original = sample_tx("round-trip");

    let found = h.search("tx.height = 4", 10).await.unwrap();
    assert_eq!(found.txs.len(), 1);
    let hit = &found.txs[0];

    assert_eq!(hit.tx.body.messages, original.body.messages);
    assert_eq!(hit.tx.body.memo, "round-trip");
    assert_eq!(hit.tx.auth_info.fee, original.auth_info.fee);
    assert_eq!(hit.tx_response.tx_hash, tx_hash(&req.txs[0]));
    assert_eq!(hit.tx_response.tx_hash.len(), 64);
    assert_eq!(hit.tx_response.gas_used, 81_234);
    assert_eq!(hit.tx_response.raw_log, "ok");
    assert_eq!(hit.tx_response.timestamp, block_time(4));
    assert_eq!(hit.tx_response.events, vec![Event::indexed("account.owner", "Ivan")]);
}

#[tokio::test]
async fn search_by_hash() {
    let h = Harness::new().await;
    let req = h.finalize(1, &[("first", "Ivan"), ("second", "Ivan")]).await;
    let hash = tx_hash(&req.txs[1]);

    let found = h.search(format!("tx.hash = '{hash}'").as_str(), 10).await.unwrap();
    assert_eq!(found.total, 1);
    assert_eq!(found.txs[0].tx.body.memo, "second");
}

#[tokio::test]
async fn limit_bounds_results_and_count() {
    let h = Harness::new().await;
    h.finalize(1, &[("a", "Ivan"), ("b", "Ivan"), ("c", "Ivan")]).await;

    let found = h.search("account.owner = 'Ivan' AND tx.height = 1", 1).await.unwrap();
    assert_eq!(found.txs.len(), 1);
    assert_eq!(found.total, 1);
    // newest row first
    assert_eq!(found.txs[0].tx.body.memo, "c");

    let found = h.search("account.owner = 'Ivan' AND tx.height = 1", 10).await.unwrap();
    assert_eq!(found.total, 3);
}

#[tokio::test]
async fn two_heights_newest_first_and_stable_on_reindex() {
    let h = Harness::new().await;
    h.finalize(1, &[("h1", "Ivan")]).await;
    h.finalize(2, &[("h2", "Ivan")]).await;

    let found = h.search("tx.height >= 1 AND tx.height <= 2", 10).await.unwrap();
    assert_eq!(found.total, 2);
    assert_eq!(heights(&found), vec![2, 1]);

    h.finalize(1, &[("h1", "Ivan")]).await;
    h.finalize(2, &[("h2", "Ivan")]).await;

    let again = h.search("tx.height >= 1 AND tx.height <= 2", 10).await.unwrap();
    assert_eq!(again, found);
}

#[tokio::test]
async fn no_height_constraint_searches_below_tip() {
    let h = Harness::new().await;
    assert_eq!(h.search("account.owner = 'Ivan'", 10).await.unwrap().total, 0);

    h.finalize(1, &[("one", "Ivan")]).await;
    h.finalize(2, &[("two", "Olga")]).await;
    h.finalize(3, &[("three", "Ivan")]).await;

    let found = h.search("account.owner = 'Ivan'", 10).await.unwrap();
    assert_eq!(heights(&found), vec![3, 1]);

    let found = h.search("account.owner EXISTS", 10).await.unwrap();
    assert_eq!(found.total, 3);

    let found = h.search("account.owner CONTAINS 'lg'", 10).await.unwrap();
    assert_eq!(heights(&found), vec![2]);
}

#[tokio::test]
async fn non_integral_height_bound_is_rejected() {
    let h = Harness::new().await;
    h.finalize(1, &[("one", "Ivan")]).await;

    let err = h.search("tx.height > 1.5", 10).await.unwrap_err();
    assert!(matches!(err, IndexerError::RangeConversion { .. }));
}

#[tokio::test]
async fn corrupt_row_fails_the_whole_search() {
    let h = Harness::new().await;
    h.finalize(9, &[("good", "Ivan")]).await;

    // a second transaction whose persisted fee is not JSON
    let raw = EncodingConfig::default().encode_tx(&sample_tx("bad")).unwrap();
    let result = TxResult {
        height: 9,
        index: 1,
        tx: raw.clone(),
        result: ExecTxResult::default(),
    };
    h.store.index_tx_events(&[result]).await.unwrap();
    let block = BlockEvents {
        height: 9,
        time: block_time(9),
        events: vec![],
        num_txs: 2,
    };
    let record = TxRequestRecord {
        height: 9,
        index: 1,
        created_at: block_time(9),
        tx_hash: tx_hash(&raw),
        messages: vec![0, 0, 0, 0],
        fee: "not json".into(),
        memo: "bad".into(),
    };
    assert!(h.store.insert_tx_request(&block, &record).await.unwrap());

    let err = h.search("tx.height = 9", 10).await.unwrap_err();
    assert!(matches!(err, IndexerError::Decode { what: "fee", .. }));
}

#[tokio::test]
async fn unknown_module_and_unsupported_search() {
    let h = Harness::new().await;
    let q = Query::parse("tx.height = 1").unwrap();

    assert!(matches!(
        h.registry.search_txs("bank", &q, 10).await.unwrap_err(),
        IndexerError::UnknownModule { .. }
    ));
    assert!(h.registry.search_txs("wasm", &q, 10).await.unwrap_err().is_unsupported());
    assert!(h.store.search_tx_events(&q).await.unwrap_err().is_unsupported());
    assert_eq!(h.registry.module_names(), vec!["tx", "wasm"]);
}

#[tokio::test]
async fn modules_before_primary_sink_keep_block_events() {
    let h = Harness::new().await;
    h.finalize_modules_first(1, &[("a", "Ivan"), ("b", "Olga")]).await;

    // block.height + mint, then tx.hash, tx.height, account.owner per tx
    assert_eq!(h.store.event_count().await.unwrap(), 2 + 2 * 3);
    assert_eq!(h.store.tx_request_count().await.unwrap(), 2);

    let found = h.search("tx.height = 1", 10).await.unwrap();
    assert_eq!(found.total, 2);
    assert!(found.txs.iter().all(|t| t.tx_response.timestamp == block_time(1)));

    h.finalize(1, &[("a", "Ivan"), ("b", "Olga")]).await;
    assert_eq!(h.store.event_count().await.unwrap(), 8);
}

#[tokio::test]
async fn numeric_filter_ignores_non_numeric_values() {
    let h = Harness::new().await;
    h.finalize_events(
        1,
        &[
            ("five-abc", Event::indexed("account.amount", "5abc")),
            ("seven", Event::indexed("account.amount", "7")),
            ("three", Event::indexed("account.amount", "3")),
        ],
    )
    .await;

    let found = h.search("tx.height = 1 AND account.amount > 4", 10).await.unwrap();
    let memos: Vec<&str> = found.txs.iter().map(|t| t.tx.body.memo.as_str()).collect();
    assert_eq!(memos, vec!["seven"]);

    let found = h.search("tx.height = 1 AND account.amount = '5abc'", 10).await.unwrap();
    assert_eq!(found.txs[0].tx.body.memo, "five-abc");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_indexing_of_one_height_is_safe() {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let path = std::env::temp_dir().join(format!("txsink-{}-{nanos}.db", std::process::id()));
    let path = path.to_str().unwrap().to_string();

    let h = Harness::with_store(SqliteEventSink::open(&path, "testing").await.unwrap());
    let txs: Vec<(&str, Event)> = ["a", "b", "c"]
        .iter()
        .map(|memo| (*memo, Event::indexed("account.owner", "Ivan")))
        .collect();
    let (req, res) = Harness::block(1, &txs);

    for _ in 0..2 {
        let (first, second) = tokio::join!(
            h.registry.dispatch_block(&req, &res),
            h.registry.dispatch_block(&req, &res),
        );
        first.unwrap();
        second.unwrap();
        assert_eq!(h.store.tx_request_count().await.unwrap(), 3);
    }

    h.index_primary(&req, &res).await;
    // block.height + mint, then three events per tx
    assert_eq!(h.store.event_count().await.unwrap(), 2 + 3 * 3);
    assert_eq!(h.search("account.owner = 'Ivan'", 10).await.unwrap().total, 3);

    h.store.stop().await.unwrap();
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{path}{suffix}"));
    }
}
