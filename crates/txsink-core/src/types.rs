//! Shared types for the indexing pipeline.

use borsh::{BorshDeserialize, BorshSerialize};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::Tx;

/// Composite key of the per-block height meta-event.
pub const BLOCK_HEIGHT_KEY: &str = "block.height";
/// Composite key of the per-tx hash meta-event.
pub const TX_HASH_KEY: &str = "tx.hash";
/// Composite key of the per-tx height meta-event; also the height symbol of tx queries.
pub const TX_HEIGHT_KEY: &str = "tx.height";

/// Execution code of a successful transaction.
pub const CODE_TYPE_OK: u32 = 0;

// ─── Events ───────────────────────────────────────────────────────────────────

/// A key/value pair attached to an [`Event`].
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct EventAttribute {
    pub key: String,
    pub value: String,
    /// Only indexed attributes are written to the attribute table.
    pub index: bool,
}

/// An execution event emitted by a block or a transaction.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    pub attributes: Vec<EventAttribute>,
}

impl Event {
    /// Build a single-attribute indexed event from a composite key such as
    /// `"account.owner"`. A key without a `.` yields an event with no attributes.
    pub fn indexed(composite_key: &str, value: impl Into<String>) -> Self {
        match composite_key.split_once('.') {
            Some((kind, key)) => Self {
                kind: kind.to_string(),
                attributes: vec![EventAttribute {
                    key: key.to_string(),
                    value: value.into(),
                    index: true,
                }],
            },
            None => Self {
                kind: composite_key.to_string(),
                attributes: vec![],
            },
        }
    }
}

// ─── Execution results ────────────────────────────────────────────────────────

/// Result of executing one transaction.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
pub struct ExecTxResult {
    pub code: u32,
    pub data: Vec<u8>,
    pub log: String,
    pub info: String,
    pub gas_wanted: i64,
    pub gas_used: i64,
    pub events: Vec<Event>,
    pub codespace: String,
}

impl ExecTxResult {
    pub fn is_ok(&self) -> bool {
        self.code == CODE_TYPE_OK
    }
}

/// A transaction together with its position and execution result, as stored
/// by the primary sink in `tx_results.tx_result`.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct TxResult {
    pub height: i64,
    pub index: u32,
    pub tx: Vec<u8>,
    pub result: ExecTxResult,
}

// ─── Finalize block ───────────────────────────────────────────────────────────

/// The finalized-block payload handed to every module indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeBlockRequest {
    pub height: i64,
    /// Raw transaction bytes, in block order.
    pub txs: Vec<Vec<u8>>,
    /// Block wall-clock time.
    pub time: DateTime<Utc>,
}

/// Execution results for a finalized block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeBlockResponse {
    /// Block-level events.
    pub events: Vec<Event>,
    /// One result per transaction of the request, same order.
    pub tx_results: Vec<ExecTxResult>,
}

/// Block-level events as recorded by the primary sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEvents {
    pub height: i64,
    /// Block time; stored as `blocks.created_at`.
    pub time: DateTime<Utc>,
    pub events: Vec<Event>,
    pub num_txs: i64,
}

impl BlockEvents {
    pub fn from_finalize(req: &FinalizeBlockRequest, res: &FinalizeBlockResponse) -> Self {
        Self {
            height: req.height,
            time: req.time,
            events: res.events.clone(),
            num_txs: req.txs.len() as i64,
        }
    }
}

// ─── Tx requests ──────────────────────────────────────────────────────────────

/// A row of `tx_requests`, owned by the tx module indexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequestRecord {
    pub height: i64,
    /// Position of the transaction in the block.
    pub index: u32,
    pub created_at: DateTime<Utc>,
    /// Uppercase hex SHA-256 of the raw transaction.
    pub tx_hash: String,
    /// Persisted binary encoding of the message list.
    pub messages: Vec<u8>,
    /// Persisted JSON encoding of the fee.
    pub fee: String,
    pub memo: String,
}

/// One row returned by a tx search, still in its persisted form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTx {
    pub height: i64,
    pub created_at: DateTime<Utc>,
    pub tx_hash: String,
    pub messages: Vec<u8>,
    pub memo: String,
    pub fee: String,
    pub tx_result: Vec<u8>,
}

// ─── Search responses ─────────────────────────────────────────────────────────

/// Execution summary of an indexed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResponse {
    pub height: i64,
    pub tx_hash: String,
    pub codespace: String,
    pub code: u32,
    pub info: String,
    pub raw_log: String,
    pub gas_wanted: i64,
    pub gas_used: i64,
    pub events: Vec<Event>,
    pub timestamp: DateTime<Utc>,
}

/// Response envelope for one search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetTxResponse {
    pub tx: Tx,
    pub tx_response: TxResponse,
}

/// Ordered search hits plus the number of rows iterated to produce them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSearchResult {
    pub txs: Vec<GetTxResponse>,
    pub total: u64,
}
