//! Postgres-backed document store
//!
//! Documents live in a single JSONB table keyed by `(collection, id)`.
//! Each batch runs in one transaction. Before any op runs, the transaction
//! takes an advisory lock on every document the batch touches, in sorted key
//! order, so overlapping batches serialize instead of deadlocking and a
//! `Missing` check on an absent row is as exclusive as one on a present row.
//! Change notifications are sent with `pg_notify` inside that transaction, so
//! Postgres only delivers them once the batch commits; a background
//! `PgListener` forwards them to the feed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgListener;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, instrument, warn};

use super::{
    Change, ChangeFeed, Direction, Document, DocumentStore, Fields, Filter, Query, StoreError,
    WriteOp,
};

/// Postgres channel carrying the name of each changed collection.
pub const CHANGE_CHANNEL: &str = "document_changes";

/// SQLSTATEs for a transaction aborted by a concurrent writer
/// (`deadlock_detected`, `serialization_failure`).
const WRITE_CONFLICT_CODES: [&str; 2] = ["40P01", "40001"];

/// `collection/id` of every document a batch reads or writes, sorted and
/// deduplicated. Locks are always taken in this order.
fn lock_keys(ops: &[WriteOp]) -> Vec<String> {
    ops.iter()
        .map(|op| format!("{}/{}", op.collection(), op.id()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn is_write_conflict(code: Option<&str>) -> bool {
    code.is_some_and(|code| WRITE_CONFLICT_CODES.contains(&code))
}

/// A batch that lost to a concurrent writer reports it the same way a failed
/// precondition does.
fn classify(error: StoreError) -> StoreError {
    match error {
        StoreError::Database(sqlx::Error::Database(db))
            if is_write_conflict(db.code().as_deref()) =>
        {
            StoreError::PreconditionFailed(format!("concurrent write: {}", db.message()))
        }
        other => other,
    }
}

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
    feed: ChangeFeed,
}

impl PgDocumentStore {
    /// Run migrations and start forwarding change notifications.
    pub async fn connect(pool: PgPool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run document store migrations")?;

        let mut listener = PgListener::connect_with(&pool)
            .await
            .context("Failed to open change listener")?;
        listener
            .listen(CHANGE_CHANNEL)
            .await
            .context("Failed to LISTEN on change channel")?;

        let feed = ChangeFeed::new();
        let forward = feed.clone();
        tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => forward.publish(notification.payload()),
                    Err(e) => {
                        // PgListener reconnects on the next recv.
                        warn!(error = %e, "Change listener error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        tracing::info!("Postgres document store ready");
        Ok(Self { pool, feed })
    }

    fn to_fields(value: Value) -> Fields {
        match value {
            Value::Object(fields) => fields,
            _ => Fields::new(),
        }
    }

    fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
        match filter {
            Filter::Eq(field, value) => {
                qb.push(" AND data -> ");
                qb.push_bind(field.clone());
                qb.push(" = ");
                qb.push_bind(Json(value.clone()));
            }
            Filter::In(field, values) => {
                qb.push(" AND ");
                qb.push_bind(Json(Value::Array(values.clone())));
                qb.push(" @> jsonb_build_array(data -> ");
                qb.push_bind(field.clone());
                qb.push(")");
            }
            Filter::Exists(field) => {
                qb.push(" AND jsonb_typeof(data -> ");
                qb.push_bind(field.clone());
                qb.push(") <> 'null'");
            }
        }
    }

    async fn run_batch(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let touched: BTreeSet<String> = ops
            .iter()
            .filter(|op| op.is_write())
            .map(|op| op.collection().to_string())
            .collect();

        let mut tx = self.pool.begin().await?;

        for key in lock_keys(&ops) {
            sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
                .bind(&key)
                .execute(&mut *tx)
                .await?;
        }

        for op in ops {
            match op {
                WriteOp::Check {
                    collection,
                    id,
                    precondition,
                } => {
                    let current: Option<Json<Value>> = sqlx::query_scalar(
                        "SELECT data FROM documents WHERE collection = $1 AND id = $2",
                    )
                    .bind(&collection)
                    .bind(&id)
                    .fetch_optional(&mut *tx)
                    .await?;

                    let current = current.map(|Json(value)| Self::to_fields(value));
                    if !precondition.holds(current.as_ref()) {
                        // Dropping the transaction rolls it back.
                        return Err(StoreError::PreconditionFailed(format!(
                            "{}/{}: {:?}",
                            collection, id, precondition
                        )));
                    }
                }
                WriteOp::Set {
                    collection,
                    id,
                    fields,
                } => {
                    sqlx::query(
                        r#"
                        INSERT INTO documents (collection, id, data)
                        VALUES ($1, $2, $3)
                        ON CONFLICT (collection, id)
                        DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()
                        "#,
                    )
                    .bind(&collection)
                    .bind(&id)
                    .bind(Json(Value::Object(fields)))
                    .execute(&mut *tx)
                    .await?;
                }
                WriteOp::Merge {
                    collection,
                    id,
                    fields,
                } => {
                    sqlx::query(
                        r#"
                        INSERT INTO documents (collection, id, data)
                        VALUES ($1, $2, $3)
                        ON CONFLICT (collection, id)
                        DO UPDATE SET data = documents.data || EXCLUDED.data, updated_at = NOW()
                        "#,
                    )
                    .bind(&collection)
                    .bind(&id)
                    .bind(Json(Value::Object(fields)))
                    .execute(&mut *tx)
                    .await?;
                }
                WriteOp::Update {
                    collection,
                    id,
                    fields,
                } => {
                    let result = sqlx::query(
                        r#"
                        UPDATE documents SET data = data || $3, updated_at = NOW()
                        WHERE collection = $1 AND id = $2
                        "#,
                    )
                    .bind(&collection)
                    .bind(&id)
                    .bind(Json(Value::Object(fields)))
                    .execute(&mut *tx)
                    .await?;

                    if result.rows_affected() == 0 {
                        return Err(StoreError::NotFound { collection, id });
                    }
                }
                WriteOp::Delete { collection, id } => {
                    sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
                        .bind(&collection)
                        .bind(&id)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        for collection in &touched {
            sqlx::query("SELECT pg_notify($1, $2)")
                .bind(CHANGE_CHANNEL)
                .bind(collection)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(collections = ?touched, "Batch committed");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    #[instrument(skip(self))]
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let data: Option<Json<Value>> =
            sqlx::query_scalar("SELECT data FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(data.map(|Json(value)| Document::new(id, Self::to_fields(value))))
    }

    #[instrument(skip(self), fields(collection = %query.collection))]
    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT id, data FROM documents WHERE collection = ");
        qb.push_bind(query.collection.clone());

        for filter in &query.filters {
            Self::push_filter(&mut qb, filter);
        }

        if let Some((field, direction)) = &query.order_by {
            qb.push(" ORDER BY data -> ");
            qb.push_bind(field.clone());
            qb.push(match direction {
                Direction::Asc => " ASC",
                Direction::Desc => " DESC",
            });
        }

        if let Some(limit) = query.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit as i64);
        }

        let rows: Vec<(String, Json<Value>)> = qb.build_query_as().fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|(id, Json(value))| Document::new(id, Self::to_fields(value)))
            .collect())
    }

    #[instrument(skip(self, ops), fields(ops = ops.len()))]
    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        self.run_batch(ops).await.map_err(classify)
    }

    fn changes(&self) -> broadcast::Receiver<Change> {
        self.feed.subscribe()
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        if crate::db::health_check(&self.pool).await {
            Ok(())
        } else {
            Err(StoreError::Unavailable("database ping failed".to_string()))
        }
    }
}
