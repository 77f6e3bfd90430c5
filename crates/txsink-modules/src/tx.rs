//! The generic `tx` module indexer.
//!
//! On every finalized block each transaction is decoded, its messages and fee
//! are re-encoded into their persisted forms, and one `tx_requests` row is
//! written per transaction, each in its own database transaction. A block that
//! is processed twice leaves the table unchanged.
//!
//! Search compiles the filter into a [`TxQueryPlan`], runs it against the
//! store and decodes every row back into a [`GetTxResponse`]. A row that
//! fails to decode fails the whole call.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use txsink_core::codec::{tx_hash, AuthInfo, EncodingConfig, Tx, TxBody};
use txsink_core::compiler::{TxQueryPlan, TX_SEARCH_LIMIT};
use txsink_core::config::SinkConfig;
use txsink_core::error::IndexerError;
use txsink_core::query::Query;
use txsink_core::sink::{EventSink, IndexStore, ModuleEventSinkIndexer};
use txsink_core::types::{
    BlockEvents, FinalizeBlockRequest, FinalizeBlockResponse, GetTxResponse, StoredTx,
    TxRequestRecord, TxResponse, TxSearchResult,
};

pub const MODULE_NAME: &str = "tx";

/// Indexes every transaction of a block into `tx_requests`.
pub struct TxEventSink<S> {
    store: Arc<S>,
    encoding: EncodingConfig,
    search_limit: u16,
}

impl<S: IndexStore + 'static> TxEventSink<S> {
    pub fn new(store: Arc<S>, encoding: EncodingConfig) -> Self {
        Self {
            store,
            encoding,
            search_limit: TX_SEARCH_LIMIT,
        }
    }

    /// Build with the search ceiling from `config`.
    pub fn with_config(store: Arc<S>, encoding: EncodingConfig, config: &SinkConfig) -> Self {
        Self::new(store, encoding).with_search_limit(config.search_limit)
    }

    /// Lower the ceiling applied to every search limit.
    pub fn with_search_limit(mut self, limit: u16) -> Self {
        self.search_limit = limit.min(TX_SEARCH_LIMIT);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn request_record(
        &self,
        req: &FinalizeBlockRequest,
        index: usize,
        raw: &[u8],
    ) -> Result<TxRequestRecord, IndexerError> {
        let tx = self.encoding.decode_tx(raw)?;
        let index = u32::try_from(index)
            .map_err(|_| IndexerError::encode("tx index", format!("{index} out of range")))?;

        Ok(TxRequestRecord {
            height: req.height,
            index,
            created_at: req.time,
            tx_hash: tx_hash(raw),
            messages: self.encoding.marshal_msgs(&tx.body.messages)?,
            fee: self.encoding.marshal_fee_json(&tx.auth_info.fee)?,
            memo: tx.body.memo,
        })
    }

    fn response(&self, row: StoredTx) -> Result<GetTxResponse, IndexerError> {
        let messages = self.encoding.unmarshal_msgs(&row.messages)?;
        let fee = self.encoding.unmarshal_fee_json(&row.fee)?;
        let result = self.encoding.unmarshal_tx_result(&row.tx_result)?.result;

        Ok(GetTxResponse {
            tx: Tx {
                body: TxBody {
                    messages,
                    memo: row.memo,
                },
                auth_info: AuthInfo { fee },
                signatures: vec![],
            },
            tx_response: TxResponse {
                height: row.height,
                tx_hash: row.tx_hash,
                codespace: result.codespace,
                code: result.code,
                info: result.info,
                raw_log: result.log,
                gas_wanted: result.gas_wanted,
                gas_used: result.gas_used,
                events: result.events,
                timestamp: row.created_at,
            },
        })
    }
}

#[async_trait]
impl<S: IndexStore + 'static> ModuleEventSinkIndexer for TxEventSink<S> {
    fn module_name(&self) -> &str {
        MODULE_NAME
    }

    async fn insert_module_events(
        &self,
        req: &FinalizeBlockRequest,
        res: &FinalizeBlockResponse,
    ) -> Result<(), IndexerError> {
        let block = BlockEvents::from_finalize(req, res);

        for (i, raw) in req.txs.iter().enumerate() {
            let record = self.request_record(req, i, raw)?;
            if self.store.insert_tx_request(&block, &record).await? {
                debug!(height = req.height, index = i, hash = %record.tx_hash, "tx request indexed");
            } else {
                debug!(height = req.height, index = i, "tx request already indexed");
            }
        }
        Ok(())
    }

    fn event_sink(&self) -> Arc<dyn EventSink> {
        self.store.clone()
    }

    fn encoding_config(&self) -> &EncodingConfig {
        &self.encoding
    }

    async fn search_txs(&self, query: &Query, limit: u16) -> Result<TxSearchResult, IndexerError> {
        let plan = TxQueryPlan::compile_with_ceiling(query, limit, self.search_limit)?;
        debug!(query = %query, window = ?plan.window(), limit = plan.limit(), "tx search");

        let rows = self.store.search_tx_requests(&plan).await?;
        let total = rows.len() as u64;
        let txs = rows
            .into_iter()
            .map(|row| self.response(row))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TxSearchResult { txs, total })
    }
}
