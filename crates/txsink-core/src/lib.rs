//! txsink-core — secondary transaction index for finalized blocks.
//!
//! # Architecture
//!
//! ```text
//! finalized block → ModuleSinkRegistry
//!                        ├── tx indexer    (tx_requests rows, per-tx transaction)
//!                        └── wasm indexer  (reserved)
//!
//! Query ──▶ TxQueryPlan::compile ──▶ render(Dialect, tip) ──▶ TxRequestStore
//!             (height dedup, range       (SQL + bind params)     (one read tx)
//!              extraction, limit clamp)
//! ```

pub mod codec;
pub mod compiler;
pub mod config;
pub mod error;
pub mod query;
pub mod registry;
pub mod sink;
pub mod types;

pub use codec::{tx_hash, EncodingConfig, InterfaceRegistry, Tx};
pub use compiler::{
    CompiledQuery, Dialect, HeightInfo, HeightRange, HeightWindow, PostgresDialect, SqlArg,
    SqliteDialect, TxQueryPlan, TX_SEARCH_LIMIT,
};
pub use config::SinkConfig;
pub use error::IndexerError;
pub use query::{Condition, Operator, Query, Value};
pub use registry::ModuleSinkRegistry;
pub use sink::{EventSink, IndexStore, ModuleEventSinkIndexer, TxRequestStore};
pub use types::{
    BlockEvents, Event, EventAttribute, ExecTxResult, FinalizeBlockRequest,
    FinalizeBlockResponse, GetTxResponse, StoredTx, TxRequestRecord, TxResponse, TxResult,
    TxSearchResult,
};
