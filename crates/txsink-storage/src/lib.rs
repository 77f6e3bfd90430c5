//! txsink-storage — relational backends for TxSink.
//!
//! Backends:
//! - [`sqlite`] — SQLite via `sqlx` (embedded, single file or in-memory)
//! - [`postgres`] — PostgreSQL via `sqlx` (production)
//!
//! Both implement the primary [`EventSink`](txsink_core::EventSink) and the
//! [`TxRequestStore`](txsink_core::TxRequestStore) used by the module indexers.

#[cfg(any(feature = "sqlite", feature = "postgres"))]
mod sql;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteEventSink;

#[cfg(feature = "postgres")]
pub use postgres::PostgresEventSink;
