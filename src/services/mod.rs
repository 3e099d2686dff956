//! Service layer
//!
//! Bid lifecycle, jobs, notifications and rating aggregation, plus the
//! collaborator interfaces they consume.

pub mod bids;
pub mod cascade;
pub mod collaborators;
pub mod jobs;
pub mod notifications;
pub mod ratings;
pub mod retry;

pub use bids::BidService;
pub use collaborators::{AuthProvider, MessagingCollaborator, ProfileStore, StaticAuth};
pub use jobs::JobService;
pub use notifications::NotificationService;
pub use ratings::RatingAggregator;
pub use retry::RetryPolicy;

use std::sync::Arc;

use crate::store::DocumentStore;
use collaborators::{StoreMessaging, StoreProfiles};

/// All services wired against one document store.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn DocumentStore>,
    pub bids: BidService,
    pub jobs: JobService,
    pub notifications: NotificationService,
    pub ratings: RatingAggregator,
}

impl Services {
    pub fn new(store: Arc<dyn DocumentStore>, retry: RetryPolicy) -> Self {
        let messaging = Arc::new(StoreMessaging::new(store.clone()));
        let profiles = Arc::new(StoreProfiles::new(store.clone(), retry));
        Self::with_collaborators(store, messaging, profiles, retry)
    }

    pub fn with_collaborators(
        store: Arc<dyn DocumentStore>,
        messaging: Arc<dyn MessagingCollaborator>,
        profiles: Arc<dyn ProfileStore>,
        retry: RetryPolicy,
    ) -> Self {
        let ratings = RatingAggregator::new(store.clone(), profiles, retry);
        Self {
            bids: BidService::new(store.clone(), messaging, ratings.clone(), retry),
            jobs: JobService::new(store.clone(), retry),
            notifications: NotificationService::new(store.clone(), retry),
            ratings,
            store,
        }
    }
}
