//! Document store abstraction
//!
//! Everything the bid workflow persists lives in collections of JSON documents.
//! The store is injected as `Arc<dyn DocumentStore>` so services run unchanged
//! against Postgres in production and the in-memory store in tests.

pub mod memory;
pub mod postgres;
pub mod watch;

pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;
pub use watch::{subscribe, Change, ChangeFeed, Subscription};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use thiserror::Error;
use tokio::sync::broadcast;

/// Field map of a single document.
pub type Fields = serde_json::Map<String, Value>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Whether a read that failed with this error may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }
}

/// A stored document: its id plus its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(Value::Object(self.fields.clone()))?)
    }
}

/// Serialize a domain value into document fields.
pub fn encode<T: Serialize>(value: &T) -> Result<Fields, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(fields) => Ok(fields),
        _ => Err(StoreError::Serialization(<serde_json::Error as serde::ser::Error>::custom(
            "document must serialize to a JSON object",
        ))),
    }
}

/// Decode every document of a snapshot.
pub fn decode_all<T: DeserializeOwned>(docs: &[Document]) -> Result<Vec<T>, StoreError> {
    docs.iter().map(Document::decode).collect()
}

/// Build a field map from `(name, value)` pairs.
pub fn fields<I, K>(pairs: I) -> Fields
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

// ============================================================================
// Queries
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    In(String, Vec<Value>),
    /// Field is present and not null.
    Exists(String),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    pub fn one_of<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Self::Exists(field.into())
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        match self {
            Self::Eq(field, value) => fields.get(field) == Some(value),
            Self::In(field, values) => fields.get(field).is_some_and(|v| values.contains(v)),
            Self::Exists(field) => fields.get(field).is_some_and(|v| !v.is_null()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        self.filters.iter().all(|f| f.matches(fields))
    }

    /// Apply ordering and limit to an already filtered result set.
    pub(crate) fn finish(&self, mut docs: Vec<Document>) -> Vec<Document> {
        if let Some((field, direction)) = &self.order_by {
            docs.sort_by(|a, b| {
                let ord = compare_values(a.fields.get(field), b.fields.get(field));
                match direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
        docs
    }
}

/// Total order over optional JSON scalars; missing sorts first.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

// ============================================================================
// Writes
// ============================================================================

/// Condition a batch asserts about a document before any of its writes apply.
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    Exists,
    Missing,
    FieldEquals(String, Value),
    /// The document is absent, or has no non-null value for the field.
    FieldMissing(String),
}

impl Precondition {
    pub fn field_equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::FieldEquals(field.into(), value.into())
    }

    pub fn holds(&self, current: Option<&Fields>) -> bool {
        match (self, current) {
            (Self::Exists, doc) => doc.is_some(),
            (Self::Missing, doc) => doc.is_none(),
            (Self::FieldEquals(field, value), Some(doc)) => doc.get(field) == Some(value),
            (Self::FieldEquals(..), None) => false,
            (Self::FieldMissing(field), doc) => {
                doc.and_then(|d| d.get(field)).map_or(true, Value::is_null)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Replace the document, creating it if absent.
    Set {
        collection: String,
        id: String,
        fields: Fields,
    },
    /// Merge fields into the document, creating it if absent.
    Merge {
        collection: String,
        id: String,
        fields: Fields,
    },
    /// Merge fields into an existing document; fails with `NotFound` otherwise.
    Update {
        collection: String,
        id: String,
        fields: Fields,
    },
    Delete {
        collection: String,
        id: String,
    },
    Check {
        collection: String,
        id: String,
        precondition: Precondition,
    },
}

impl WriteOp {
    pub fn set(collection: &str, id: &str, fields: Fields) -> Self {
        Self::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
        }
    }

    pub fn merge(collection: &str, id: &str, fields: Fields) -> Self {
        Self::Merge {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
        }
    }

    pub fn update(collection: &str, id: &str, fields: Fields) -> Self {
        Self::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
        }
    }

    pub fn delete(collection: &str, id: &str) -> Self {
        Self::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn check(collection: &str, id: &str, precondition: Precondition) -> Self {
        Self::Check {
            collection: collection.to_string(),
            id: id.to_string(),
            precondition,
        }
    }

    pub fn collection(&self) -> &str {
        match self {
            Self::Set { collection, .. }
            | Self::Merge { collection, .. }
            | Self::Update { collection, .. }
            | Self::Delete { collection, .. }
            | Self::Check { collection, .. } => collection,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Set { id, .. }
            | Self::Merge { id, .. }
            | Self::Update { id, .. }
            | Self::Delete { id, .. }
            | Self::Check { id, .. } => id,
        }
    }

    pub fn is_write(&self) -> bool {
        !matches!(self, Self::Check { .. })
    }
}

// ============================================================================
// Store trait
// ============================================================================

/// Remote document database.
///
/// `batch_write` is all-or-nothing: either every op (including `Check`
/// preconditions) succeeds and all writes become visible together, or none do.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError>;

    /// Feed of committed changes, used to drive live subscriptions.
    fn changes(&self) -> broadcast::Receiver<Change>;

    async fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        self.batch_write(vec![WriteOp::set(collection, id, fields)])
            .await
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        self.batch_write(vec![WriteOp::update(collection, id, fields)])
            .await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.batch_write(vec![WriteOp::delete(collection, id)]).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Fields {
        match value {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn filters_match_fields() {
        let d = doc(json!({ "status": "pending", "jobId": "j1", "jobRating": null }));

        assert!(Filter::eq("status", "pending").matches(&d));
        assert!(!Filter::eq("status", "accepted").matches(&d));
        assert!(Filter::one_of("status", ["accepted", "pending"]).matches(&d));
        assert!(!Filter::exists("jobRating").matches(&d));
        assert!(!Filter::exists("review").matches(&d));
        assert!(Filter::exists("jobId").matches(&d));
    }

    #[test]
    fn preconditions_against_current_state() {
        let d = doc(json!({ "status": "pending" }));

        assert!(Precondition::Exists.holds(Some(&d)));
        assert!(!Precondition::Missing.holds(Some(&d)));
        assert!(Precondition::Missing.holds(None));
        assert!(Precondition::field_equals("status", "pending").holds(Some(&d)));
        assert!(!Precondition::field_equals("status", "accepted").holds(Some(&d)));
        assert!(!Precondition::field_equals("status", "pending").holds(None));
        assert!(Precondition::FieldMissing("rating".into()).holds(None));
        assert!(Precondition::FieldMissing("rating".into()).holds(Some(&d)));
        assert!(!Precondition::FieldMissing("status".into()).holds(Some(&d)));
    }

    #[test]
    fn query_orders_and_limits() {
        let docs = vec![
            Document::new("a", doc(json!({ "price": 3 }))),
            Document::new("b", doc(json!({ "price": 1 }))),
            Document::new("c", doc(json!({ "price": 2 }))),
        ];

        let q = Query::collection("bids")
            .order_by("price", Direction::Desc)
            .limit(2);
        let ids: Vec<_> = q.finish(docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn encode_rejects_non_objects() {
        assert!(encode(&42).is_err());
        assert!(encode(&json!({ "a": 1 })).is_ok());
    }
}
