//! Sink traits: the primary event sink, the tx-request store, and the
//! module indexer capability set.

use std::sync::Arc;

use async_trait::async_trait;

use crate::codec::EncodingConfig;
use crate::compiler::TxQueryPlan;
use crate::error::IndexerError;
use crate::query::Query;
use crate::types::{
    BlockEvents, FinalizeBlockRequest, FinalizeBlockResponse, StoredTx, TxRequestRecord,
    TxResult, TxSearchResult,
};

pub const TABLE_TX_RESULTS: &str = "tx_results";
pub const TABLE_EVENTS: &str = "events";
pub const TABLE_ATTRIBUTES: &str = "attributes";
pub const TABLE_TX_REQUESTS: &str = "tx_requests";

/// The append-only store of blocks, tx results, events and attributes.
///
/// Only indexing is supported; lookups go through the module indexers, so the
/// search-style methods report [`IndexerError::Unsupported`] by default.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Backend name used in error messages (e.g. `"postgres"`).
    fn backend(&self) -> &'static str;

    fn chain_id(&self) -> &str;

    /// Record a block and its events. Re-indexing a known height succeeds
    /// without writing anything.
    async fn index_block_events(&self, block: &BlockEvents) -> Result<(), IndexerError>;

    /// Record tx results and their events. The block of every result must
    /// already be indexed. Re-indexing a known tx succeeds without writing.
    async fn index_tx_events(&self, txs: &[TxResult]) -> Result<(), IndexerError>;

    async fn search_block_events(&self, _query: &Query) -> Result<Vec<i64>, IndexerError> {
        Err(IndexerError::unsupported("block search", self.backend()))
    }

    async fn search_tx_events(&self, _query: &Query) -> Result<Vec<TxResult>, IndexerError> {
        Err(IndexerError::unsupported("tx search", self.backend()))
    }

    async fn get_tx_by_hash(&self, _hash: &[u8]) -> Result<Option<TxResult>, IndexerError> {
        Err(IndexerError::unsupported("getTxByHash", self.backend()))
    }

    async fn has_block(&self, _height: i64) -> Result<bool, IndexerError> {
        Err(IndexerError::unsupported("hasBlock", self.backend()))
    }

    /// Release the underlying connections.
    async fn stop(&self) -> Result<(), IndexerError>;
}

/// Storage for `tx_requests` rows and the search over them.
#[async_trait]
pub trait TxRequestStore: Send + Sync {
    /// In one transaction: make sure the block row exists, resolve its id and
    /// insert the request keyed by `(block_id, index)`.
    ///
    /// Returns `false` when the row was already present.
    async fn insert_tx_request(
        &self,
        block: &BlockEvents,
        record: &TxRequestRecord,
    ) -> Result<bool, IndexerError>;

    /// Render and run `plan` in one transaction, newest first.
    async fn search_tx_requests(&self, plan: &TxQueryPlan) -> Result<Vec<StoredTx>, IndexerError>;

    /// Number of rows in `tx_requests`.
    async fn tx_request_count(&self) -> Result<u64, IndexerError>;
}

/// A store usable by module indexers: both the primary sink and tx requests.
pub trait IndexStore: EventSink + TxRequestStore {}

impl<T: EventSink + TxRequestStore> IndexStore for T {}

/// Capability set of one module indexer.
#[async_trait]
pub trait ModuleEventSinkIndexer: Send + Sync {
    fn module_name(&self) -> &str;

    /// Persist this module's rows for a finalized block. Must be idempotent.
    async fn insert_module_events(
        &self,
        req: &FinalizeBlockRequest,
        res: &FinalizeBlockResponse,
    ) -> Result<(), IndexerError>;

    /// Reserved hook for publishing module events downstream.
    async fn emit_module_events(
        &self,
        _req: &FinalizeBlockRequest,
        _res: &FinalizeBlockResponse,
    ) -> Result<(), IndexerError> {
        Ok(())
    }

    fn event_sink(&self) -> Arc<dyn EventSink>;

    fn encoding_config(&self) -> &EncodingConfig;

    async fn search_txs(&self, _query: &Query, _limit: u16) -> Result<TxSearchResult, IndexerError> {
        Err(IndexerError::unsupported(
            format!("{} tx search", self.module_name()),
            self.event_sink().backend(),
        ))
    }
}
