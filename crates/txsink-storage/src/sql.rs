//! Statements, row shaping and the indexing/search logic shared by the SQL
//! backends.
//!
//! Placeholders use the `$N` form, which both the SQLite and the PostgreSQL
//! drivers accept. `"index"` is always quoted.

use txsink_core::types::{BlockEvents, Event, TxResult, BLOCK_HEIGHT_KEY, TX_HASH_KEY, TX_HEIGHT_KEY};

pub(crate) const INSERT_BLOCK: &str =
    "INSERT INTO blocks (height, chain_id, created_at) VALUES ($1, $2, $3)
     ON CONFLICT DO NOTHING
     RETURNING rowid";

pub(crate) const SELECT_BLOCK_ID: &str =
    "SELECT rowid FROM blocks WHERE height = $1 AND chain_id = $2";

pub(crate) const INSERT_TX_RESULT: &str = r#"INSERT INTO tx_results
     (block_id, "index", height, created_at, tx_hash, tx_result)
     VALUES ($1, $2, $3, $4, $5, $6)
     ON CONFLICT DO NOTHING
     RETURNING rowid"#;

pub(crate) const INSERT_EVENT: &str =
    "INSERT INTO events (block_id, tx_id, type) VALUES ($1, $2, $3) RETURNING rowid";

pub(crate) const INSERT_ATTRIBUTE: &str =
    "INSERT INTO attributes (event_id, key, composite_key, value) VALUES ($1, $2, $3, $4)
     ON CONFLICT DO NOTHING";

pub(crate) const INSERT_TX_REQUEST: &str = r#"INSERT INTO tx_requests
     (block_id, "index", height, created_at, tx_hash, messages, fee, memo)
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
     ON CONFLICT DO NOTHING"#;

pub(crate) const LATEST_HEIGHT: &str =
    "SELECT height FROM blocks WHERE chain_id = $1 ORDER BY height DESC LIMIT 1";

pub(crate) const COUNT_TX_REQUESTS: &str = "SELECT COUNT(*) AS cnt FROM tx_requests";

pub(crate) const COUNT_EVENTS: &str = "SELECT COUNT(*) AS cnt FROM events";

/// Implements `EventSink` and `TxRequestStore` for a pooled sqlx sink.
///
/// The sink struct must have `pool`, `chain_id` and `encoding` fields. The
/// expansion also defines the module-level helpers `find_block_id`,
/// `insert_block`, `insert_event` and `stored_tx`.
macro_rules! impl_sql_event_sink {
    (
        sink: $sink:ty,
        conn: $conn:ty,
        row: $row:ty,
        dialect: $dialect:expr,
        backend: $backend:literal $(,)?
    ) => {
        async fn find_block_id(
            conn: &mut $conn,
            height: i64,
            chain_id: &str,
        ) -> Result<i64, ::txsink_core::error::IndexerError> {
            use ::txsink_core::error::IndexerError;

            let row = ::sqlx::query($crate::sql::SELECT_BLOCK_ID)
                .bind(height)
                .bind(chain_id)
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| IndexerError::storage("find-block-id", e))?;

            match row {
                Some(r) => ::sqlx::Row::try_get::<i64, _>(&r, 0)
                    .map_err(|e| IndexerError::storage("find-block-id", e)),
                None => Err(IndexerError::NotFound {
                    height,
                    chain_id: chain_id.to_string(),
                }),
            }
        }

        /// Insert the block row and its events, reporting failures under
        /// `step`. `None` when the block was already recorded, in which case
        /// nothing is written.
        async fn insert_block(
            conn: &mut $conn,
            block: &::txsink_core::types::BlockEvents,
            chain_id: &str,
            step: &'static str,
        ) -> Result<Option<i64>, ::txsink_core::error::IndexerError> {
            use ::txsink_core::error::IndexerError;

            let inserted = ::sqlx::query($crate::sql::INSERT_BLOCK)
                .bind(block.height)
                .bind(chain_id)
                .bind(block.time)
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| IndexerError::storage(step, e))?;

            let Some(row) = inserted else {
                return Ok(None);
            };
            let block_id: i64 = ::sqlx::Row::try_get(&row, 0)
                .map_err(|e| IndexerError::storage(step, e))?;

            for event in &$crate::sql::block_event_rows(block) {
                insert_event(&mut *conn, block_id, None, event).await?;
            }
            Ok(Some(block_id))
        }

        async fn insert_event(
            conn: &mut $conn,
            block_id: i64,
            tx_id: Option<i64>,
            event: &::txsink_core::types::Event,
        ) -> Result<(), ::txsink_core::error::IndexerError> {
            use ::txsink_core::error::IndexerError;

            let row = ::sqlx::query($crate::sql::INSERT_EVENT)
                .bind(block_id)
                .bind(tx_id)
                .bind(&event.kind)
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| IndexerError::storage("insert-event", e))?;
            let event_id: i64 = ::sqlx::Row::try_get(&row, 0)
                .map_err(|e| IndexerError::storage("insert-event", e))?;

            for attr in $crate::sql::attribute_rows(event) {
                ::sqlx::query($crate::sql::INSERT_ATTRIBUTE)
                    .bind(event_id)
                    .bind(attr.key)
                    .bind(&attr.composite_key)
                    .bind(attr.value)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| IndexerError::storage("insert-attribute", e))?;
            }
            Ok(())
        }

        fn stored_tx(row: &$row) -> Result<::txsink_core::types::StoredTx, ::sqlx::Error> {
            use ::sqlx::Row;

            Ok(::txsink_core::types::StoredTx {
                height: row.try_get(0)?,
                created_at: row.try_get(1)?,
                tx_hash: row.try_get(2)?,
                messages: row.try_get(3)?,
                memo: row.try_get(4)?,
                fee: row.try_get(5)?,
                tx_result: row.try_get(6)?,
            })
        }

        impl $sink {
            /// Number of stored events, block and tx level.
            pub async fn event_count(&self) -> Result<u64, ::txsink_core::error::IndexerError> {
                let row = ::sqlx::query($crate::sql::COUNT_EVENTS)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| ::txsink_core::error::IndexerError::storage("count", e))?;

                let cnt: i64 = ::sqlx::Row::try_get(&row, "cnt")
                    .map_err(|e| ::txsink_core::error::IndexerError::storage("count", e))?;
                Ok(cnt as u64)
            }
        }

        // ─── EventSink impl ──────────────────────────────────────────────────

        #[::async_trait::async_trait]
        impl ::txsink_core::sink::EventSink for $sink {
            fn backend(&self) -> &'static str {
                $backend
            }

            fn chain_id(&self) -> &str {
                &self.chain_id
            }

            async fn index_block_events(
                &self,
                block: &::txsink_core::types::BlockEvents,
            ) -> Result<(), ::txsink_core::error::IndexerError> {
                use ::txsink_core::error::IndexerError;

                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| IndexerError::storage("begin", e))?;

                let inserted = insert_block(&mut tx, block, &self.chain_id, "insert-block").await?;
                let Some(block_id) = inserted else {
                    ::tracing::debug!(height = block.height, "block already indexed");
                    return Ok(());
                };

                tx.commit()
                    .await
                    .map_err(|e| IndexerError::storage("commit", e))?;
                ::tracing::debug!(
                    height = block.height,
                    block_id,
                    events = block.events.len(),
                    "block indexed"
                );
                Ok(())
            }

            async fn index_tx_events(
                &self,
                txs: &[::txsink_core::types::TxResult],
            ) -> Result<(), ::txsink_core::error::IndexerError> {
                use ::txsink_core::error::IndexerError;

                for result in txs {
                    let hash = ::txsink_core::codec::tx_hash(&result.tx);
                    let blob = self.encoding.marshal_tx_result(result)?;

                    let mut tx = self
                        .pool
                        .begin()
                        .await
                        .map_err(|e| IndexerError::storage("begin", e))?;

                    let block_id = find_block_id(&mut tx, result.height, &self.chain_id).await?;

                    let inserted = ::sqlx::query($crate::sql::INSERT_TX_RESULT)
                        .bind(block_id)
                        .bind(i64::from(result.index))
                        .bind(result.height)
                        .bind(::chrono::Utc::now())
                        .bind(&hash)
                        .bind(blob)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(|e| IndexerError::storage("insert-tx-result", e))?;

                    let Some(row) = inserted else {
                        ::tracing::debug!(
                            height = result.height,
                            index = result.index,
                            "tx result already indexed"
                        );
                        continue;
                    };
                    let tx_id: i64 = ::sqlx::Row::try_get(&row, 0)
                        .map_err(|e| IndexerError::storage("insert-tx-result", e))?;

                    for event in &$crate::sql::tx_event_rows(result, &hash) {
                        insert_event(&mut tx, block_id, Some(tx_id), event).await?;
                    }

                    tx.commit()
                        .await
                        .map_err(|e| IndexerError::storage("commit", e))?;
                    ::tracing::debug!(
                        height = result.height,
                        index = result.index,
                        hash = %hash,
                        "tx result indexed"
                    );
                }
                Ok(())
            }

            async fn stop(&self) -> Result<(), ::txsink_core::error::IndexerError> {
                self.pool.close().await;
                Ok(())
            }
        }

        // ─── TxRequestStore impl ─────────────────────────────────────────────

        #[::async_trait::async_trait]
        impl ::txsink_core::sink::TxRequestStore for $sink {
            async fn insert_tx_request(
                &self,
                block: &::txsink_core::types::BlockEvents,
                record: &::txsink_core::types::TxRequestRecord,
            ) -> Result<bool, ::txsink_core::error::IndexerError> {
                use ::txsink_core::error::IndexerError;

                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| IndexerError::storage("begin", e))?;

                let ensured = insert_block(&mut tx, block, &self.chain_id, "ensure-block").await?;
                let block_id = match ensured {
                    Some(id) => {
                        ::tracing::debug!(height = block.height, "block recorded before the primary sink");
                        id
                    }
                    None => find_block_id(&mut tx, block.height, &self.chain_id).await?,
                };

                let done = ::sqlx::query($crate::sql::INSERT_TX_REQUEST)
                    .bind(block_id)
                    .bind(i64::from(record.index))
                    .bind(record.height)
                    .bind(record.created_at)
                    .bind(&record.tx_hash)
                    .bind(record.messages.as_slice())
                    .bind(&record.fee)
                    .bind(&record.memo)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| IndexerError::storage("insert-tx-row", e))?;

                tx.commit()
                    .await
                    .map_err(|e| IndexerError::storage("commit", e))?;
                Ok(done.rows_affected() > 0)
            }

            async fn search_tx_requests(
                &self,
                plan: &::txsink_core::compiler::TxQueryPlan,
            ) -> Result<Vec<::txsink_core::types::StoredTx>, ::txsink_core::error::IndexerError> {
                use ::txsink_core::compiler::SqlArg;
                use ::txsink_core::error::IndexerError;

                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| IndexerError::storage("begin", e))?;

                let tip = if plan.needs_tip() {
                    let row = ::sqlx::query($crate::sql::LATEST_HEIGHT)
                        .bind(&self.chain_id)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(|e| IndexerError::storage("latest-height", e))?;
                    match row {
                        Some(r) => Some(
                            ::sqlx::Row::try_get::<i64, _>(&r, 0)
                                .map_err(|e| IndexerError::storage("latest-height", e))?,
                        ),
                        None => return Ok(Vec::new()),
                    }
                } else {
                    None
                };

                let compiled = plan.render(&$dialect, tip)?;
                ::tracing::debug!(sql = %compiled.sql, params = compiled.args.len(), "tx search compiled");

                let mut query = ::sqlx::query(&compiled.sql);
                for arg in &compiled.args {
                    query = match arg {
                        SqlArg::Int(v) => query.bind(*v),
                        SqlArg::Text(s) => query.bind(s.as_str()),
                    };
                }
                let rows = query
                    .fetch_all(&mut *tx)
                    .await
                    .map_err(|e| IndexerError::storage("search", e))?;

                let found = rows
                    .iter()
                    .map(stored_tx)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| IndexerError::storage("scan-result-row", e))?;

                tx.commit()
                    .await
                    .map_err(|e| IndexerError::storage("commit", e))?;
                Ok(found)
            }

            async fn tx_request_count(&self) -> Result<u64, ::txsink_core::error::IndexerError> {
                let row = ::sqlx::query($crate::sql::COUNT_TX_REQUESTS)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| ::txsink_core::error::IndexerError::storage("count", e))?;

                let cnt: i64 = ::sqlx::Row::try_get(&row, "cnt")
                    .map_err(|e| ::txsink_core::error::IndexerError::storage("count", e))?;
                Ok(cnt as u64)
            }
        }
    };
}

pub(crate) use impl_sql_event_sink;

/// An attribute row ready for insertion.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct AttributeRow<'a> {
    pub key: &'a str,
    pub composite_key: String,
    pub value: &'a str,
}

/// Events recorded for a block: the height meta-event first, then the block's
/// own events.
pub(crate) fn block_event_rows(block: &BlockEvents) -> Vec<Event> {
    let mut events = vec![Event::indexed(BLOCK_HEIGHT_KEY, block.height.to_string())];
    events.extend(block.events.iter().filter(|e| !e.kind.is_empty()).cloned());
    events
}

/// Events recorded for a transaction: hash and height meta-events first, then
/// the execution result's events.
pub(crate) fn tx_event_rows(tx: &TxResult, hash: &str) -> Vec<Event> {
    let mut events = vec![
        Event::indexed(TX_HASH_KEY, hash),
        Event::indexed(TX_HEIGHT_KEY, tx.height.to_string()),
    ];
    events.extend(tx.result.events.iter().filter(|e| !e.kind.is_empty()).cloned());
    events
}

/// Indexed attributes of an event, keyed `type.key`.
pub(crate) fn attribute_rows(event: &Event) -> Vec<AttributeRow<'_>> {
    event
        .attributes
        .iter()
        .filter(|a| a.index)
        .map(|a| AttributeRow {
            key: &a.key,
            composite_key: format!("{}.{}", event.kind, a.key),
            value: &a.value,
        })
        .collect()
}
