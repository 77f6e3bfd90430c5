//! SQLite event sink for TxSink.
//!
//! Stores blocks, tx results, events, attributes and tx requests in a single
//! SQLite file (or in memory). Uses `sqlx` with WAL mode for concurrent reads.
//!
//! # Usage
//! ```rust,no_run
//! use txsink_storage::sqlite::SqliteEventSink;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let sink = SqliteEventSink::open("./txsink.db", "Oraichain").await?;
//!
//! // In-memory (tests / ephemeral)
//! let sink = SqliteEventSink::in_memory("testing").await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use sqlx::sqlite::{SqliteConnection, SqlitePoolOptions, SqliteRow};
use sqlx::SqlitePool;
use tracing::info;

use txsink_core::codec::EncodingConfig;
use txsink_core::compiler::SqliteDialect;
use txsink_core::config::SinkConfig;
use txsink_core::error::IndexerError;

use crate::sql;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS blocks (
        rowid      INTEGER PRIMARY KEY,
        height     INTEGER NOT NULL,
        chain_id   TEXT    NOT NULL,
        created_at TEXT    NOT NULL,
        UNIQUE (height, chain_id)
    )",
    r#"CREATE TABLE IF NOT EXISTS tx_results (
        rowid      INTEGER PRIMARY KEY,
        block_id   INTEGER NOT NULL REFERENCES blocks (rowid),
        "index"    INTEGER NOT NULL,
        height     INTEGER NOT NULL,
        created_at TEXT    NOT NULL,
        tx_hash    TEXT    NOT NULL,
        tx_result  BLOB    NOT NULL,
        UNIQUE (block_id, "index")
    )"#,
    "CREATE TABLE IF NOT EXISTS events (
        rowid    INTEGER PRIMARY KEY,
        block_id INTEGER NOT NULL REFERENCES blocks (rowid),
        tx_id    INTEGER NULL REFERENCES tx_results (rowid),
        type     TEXT    NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS attributes (
        event_id      INTEGER NOT NULL REFERENCES events (rowid),
        key           TEXT    NOT NULL,
        composite_key TEXT    NOT NULL,
        value         TEXT    NULL,
        UNIQUE (event_id, key)
    )",
    r#"CREATE TABLE IF NOT EXISTS tx_requests (
        rowid      INTEGER PRIMARY KEY,
        block_id   INTEGER NOT NULL REFERENCES blocks (rowid),
        "index"    INTEGER NOT NULL,
        height     INTEGER NOT NULL,
        created_at TEXT    NOT NULL,
        tx_hash    TEXT    NOT NULL,
        messages   BLOB    NOT NULL,
        fee        TEXT    NOT NULL,
        memo       TEXT    NOT NULL,
        UNIQUE (block_id, "index")
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_tx_results_height ON tx_results (height)",
    "CREATE INDEX IF NOT EXISTS idx_events_tx ON events (tx_id)",
    "CREATE INDEX IF NOT EXISTS idx_attributes_composite ON attributes (composite_key, value)",
    "CREATE INDEX IF NOT EXISTS idx_tx_requests_hash ON tx_requests (tx_hash)",
];

/// SQLite-backed primary sink and tx-request store.
#[derive(Clone)]
pub struct SqliteEventSink {
    pool: SqlitePool,
    chain_id: String,
    encoding: EncodingConfig,
}

impl SqliteEventSink {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./txsink.db"`) or a full
    /// SQLite URL (`"sqlite:./txsink.db?mode=rwc"`).
    pub async fn open(path: &str, chain_id: &str) -> Result<Self, IndexerError> {
        let config = SinkConfig::default().chain_id(chain_id).database_url(path);
        Self::connect_with_config(&config).await
    }

    /// Open an in-memory SQLite database.
    ///
    /// The pool holds a single connection that is never recycled, so the
    /// data lives as long as the sink.
    pub async fn in_memory(chain_id: &str) -> Result<Self, IndexerError> {
        let config = SinkConfig::default()
            .chain_id(chain_id)
            .database_url("sqlite::memory:");
        Self::connect_with_config(&config).await
    }

    pub async fn connect_with_config(config: &SinkConfig) -> Result<Self, IndexerError> {
        let url = if config.database_url.starts_with("sqlite:") {
            config.database_url.clone()
        } else {
            format!("sqlite:{}?mode=rwc", config.database_url)
        };

        let options = SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs));
        let options = if url.contains(":memory:") {
            options.max_connections(1).idle_timeout(None).max_lifetime(None)
        } else {
            options
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
        };

        let pool = options
            .connect(&url)
            .await
            .map_err(|e| IndexerError::storage("connect", e))?;

        let sink = Self {
            pool,
            chain_id: config.chain_id.clone(),
            encoding: EncodingConfig::default(),
        };
        sink.init_schema().await?;
        info!(chain_id = %sink.chain_id, "sqlite event sink ready");
        Ok(sink)
    }

    /// Use `encoding` for the persisted tx-result blobs.
    pub fn with_encoding_config(mut self, encoding: EncodingConfig) -> Self {
        self.encoding = encoding;
        self
    }

    /// Create tables and indexes if they don't already exist.
    async fn init_schema(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::storage("schema", e))?;

        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| IndexerError::storage("schema", e))?;
        }
        Ok(())
    }
}

sql::impl_sql_event_sink! {
    sink: SqliteEventSink,
    conn: SqliteConnection,
    row: SqliteRow,
    dialect: SqliteDialect,
    backend: "sqlite",
}

// ─── Tests ───────────────────────────────────────────────────────────────────
