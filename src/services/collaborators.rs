//! Collaborators the bid workflow depends on
//!
//! Identity, messaging threads and contractor profiles are owned by other
//! parts of the system. The workflow sees them only through these traits;
//! the default implementations keep their records in the document store.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::domain::conversations::{self, conversation_id, Conversation};
use crate::domain::profiles::{self, fields as pf, ContractorProfile};
use crate::services::retry::{retry_read, RetryPolicy};
use crate::store::{encode, fields, DocumentStore, Precondition, StoreError, WriteOp};

/// Who is making the current call.
pub trait AuthProvider: Send + Sync {
    fn current_user_id(&self) -> Option<String>;
}

/// Fixed identity, for jobs and tests running outside a request.
#[derive(Debug, Clone, Default)]
pub struct StaticAuth(pub Option<String>);

impl StaticAuth {
    pub fn user(id: impl Into<String>) -> Self {
        Self(Some(id.into()))
    }
}

impl AuthProvider for StaticAuth {
    fn current_user_id(&self) -> Option<String> {
        self.0.clone()
    }
}

#[async_trait]
pub trait MessagingCollaborator: Send + Sync {
    /// Return the conversation between two users, creating it if needed.
    async fn ensure_conversation(&self, user_a: &str, user_b: &str) -> Result<String, StoreError>;
}

/// Contractor profiles, as far as the aggregate rating goes.
///
/// The aggregate carries a version that every write bumps. Writers read the
/// version first and commit [`ProfileStore::rating_ops`] in the same batch as
/// whatever the new value was derived from; a stale version fails the batch.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn rating(&self, contractor_id: &str) -> Result<Option<f64>, StoreError>;

    /// Current aggregate version; `0` before the first rating is stored.
    async fn rating_version(&self, contractor_id: &str) -> Result<u64, StoreError>;

    /// Ops storing `rating` if the aggregate is still at `expected_version`.
    fn rating_ops(&self, contractor_id: &str, expected_version: u64, rating: f64) -> Vec<WriteOp>;
}

/// Conversations stored as `conversations/{a}_{b}` documents.
#[derive(Clone)]
pub struct StoreMessaging {
    store: Arc<dyn DocumentStore>,
}

impl StoreMessaging {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MessagingCollaborator for StoreMessaging {
    #[instrument(skip(self))]
    async fn ensure_conversation(&self, user_a: &str, user_b: &str) -> Result<String, StoreError> {
        let id = conversation_id(user_a, user_b);
        let mut participants = vec![user_a.to_string(), user_b.to_string()];
        participants.sort();

        let conversation = Conversation {
            id: id.clone(),
            participants,
            created_at: Utc::now(),
        };

        let created = self
            .store
            .batch_write(vec![
                WriteOp::check(conversations::COLLECTION, &id, Precondition::Missing),
                WriteOp::set(conversations::COLLECTION, &id, encode(&conversation)?),
            ])
            .await;

        match created {
            Ok(()) => {
                debug!(conversation_id = %id, "Conversation created");
                Ok(id)
            }
            Err(StoreError::PreconditionFailed(_)) => Ok(id),
            Err(e) => Err(e),
        }
    }
}

/// Contractor ratings kept on `users/{id}` profile documents.
#[derive(Clone)]
pub struct StoreProfiles {
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
}

impl StoreProfiles {
    pub fn new(store: Arc<dyn DocumentStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }
}

impl StoreProfiles {
    async fn profile(&self, contractor_id: &str) -> Result<Option<ContractorProfile>, StoreError> {
        let doc = retry_read(&self.retry, "profile", || {
            self.store.get(profiles::COLLECTION, contractor_id)
        })
        .await?;

        doc.map(|d| d.decode::<ContractorProfile>()).transpose()
    }
}

#[async_trait]
impl ProfileStore for StoreProfiles {
    async fn rating(&self, contractor_id: &str) -> Result<Option<f64>, StoreError> {
        Ok(self.profile(contractor_id).await?.and_then(|p| p.rating))
    }

    async fn rating_version(&self, contractor_id: &str) -> Result<u64, StoreError> {
        Ok(self
            .profile(contractor_id)
            .await?
            .map_or(0, |p| p.rating_version))
    }

    fn rating_ops(&self, contractor_id: &str, expected_version: u64, rating: f64) -> Vec<WriteOp> {
        let guard = if expected_version == 0 {
            Precondition::FieldMissing(pf::RATING_VERSION.to_string())
        } else {
            Precondition::field_equals(pf::RATING_VERSION, expected_version)
        };

        vec![
            WriteOp::check(profiles::COLLECTION, contractor_id, guard),
            WriteOp::merge(
                profiles::COLLECTION,
                contractor_id,
                fields([
                    (pf::RATING, Value::from(rating)),
                    (pf::RATING_VERSION, Value::from(expected_version + 1)),
                ]),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn rating_write_is_guarded_by_version() {
        let store = Arc::new(MemoryStore::new());
        let profiles = StoreProfiles::new(store.clone(), RetryPolicy::none());

        assert_eq!(profiles.rating_version("c1").await.unwrap(), 0);
        store
            .batch_write(profiles.rating_ops("c1", 0, 4.0))
            .await
            .unwrap();
        assert_eq!(profiles.rating_version("c1").await.unwrap(), 1);
        assert_eq!(profiles.rating("c1").await.unwrap(), Some(4.0));

        // A writer that read the version before the first write loses.
        let stale = store.batch_write(profiles.rating_ops("c1", 0, 2.0)).await;
        assert!(matches!(stale, Err(StoreError::PreconditionFailed(_))));
        assert_eq!(profiles.rating("c1").await.unwrap(), Some(4.0));

        store
            .batch_write(profiles.rating_ops("c1", 1, 3.0))
            .await
            .unwrap();
        assert_eq!(profiles.rating("c1").await.unwrap(), Some(3.0));
        assert_eq!(profiles.rating_version("c1").await.unwrap(), 2);
    }
}
