//! txsink-modules — module event indexers.
//!
//! - [`tx`] — persists every transaction of a finalized block into
//!   `tx_requests` and serves filtered tx search
//! - [`wasm`] — CosmWasm contract indexer (hooks reserved)
//!
//! # Quick start
//! ```rust,ignore
//! let store = Arc::new(SqliteEventSink::in_memory("Oraichain").await?);
//! let mut registry = ModuleSinkRegistry::new();
//! registry.register(Arc::new(TxEventSink::new(store.clone(), EncodingConfig::default())))?;
//! registry.register(Arc::new(WasmEventSink::new(store, EncodingConfig::default())))?;
//!
//! registry.dispatch_block(&req, &res).await?;
//! let found = registry.search_txs("tx", &Query::parse("tx.height = 1")?, 10).await?;
//! ```

pub mod tx;
pub mod wasm;

pub use tx::TxEventSink;
pub use wasm::WasmEventSink;
