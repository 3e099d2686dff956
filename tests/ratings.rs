mod common;

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use common::Harness;
use homebid_backend::domain::bids::BidStatus;
use homebid_backend::domain::profiles;
use homebid_backend::error::BidError;
use homebid_backend::services::ratings::mean_rating;
use homebid_backend::store::{
    Change, Document, DocumentStore, MemoryStore, Query, StoreError, WriteOp,
};

#[tokio::test]
async fn aggregate_is_the_mean_of_rated_bids() {
    let h = Harness::new();

    assert_eq!(h.rated_job("contractor-1", 4.0).await, Some(4.0));
    assert_eq!(h.rated_job("contractor-1", 2.0).await, Some(3.0));

    let stored = h.services.ratings.rating_for("contractor-1").await.unwrap();
    assert_eq!(stored, Some(3.0));
}

#[tokio::test]
async fn aggregate_matches_independent_recompute() {
    let h = Harness::new();
    for rating in [5.0, 3.5, -1.0, 4.25] {
        h.rated_job("contractor-1", rating).await;
    }
    // Another contractor's ratings never leak in.
    h.rated_job("contractor-2", 1.0).await;

    let bids = h
        .services
        .bids
        .bids_for_contractor("contractor-1")
        .await
        .unwrap();
    let ratings: Vec<f64> = bids
        .iter()
        .filter(|b| b.status == BidStatus::Completed)
        .filter_map(|b| b.job_rating)
        .collect();
    // -1.0 was clamped to 0.0 on the way in.
    assert_eq!(ratings.len(), 4);
    let expected = ratings.iter().sum::<f64>() / ratings.len() as f64;

    let stored = h
        .services
        .ratings
        .rating_for("contractor-1")
        .await
        .unwrap()
        .unwrap();
    assert!((stored - expected).abs() < 1e-9);
    assert!((stored - 12.75 / 4.0).abs() < 1e-9);
    assert_eq!(mean_rating(&bids), Some(stored));

    let recomputed = h.services.ratings.recompute("contractor-1").await.unwrap();
    assert_eq!(recomputed, Some(stored));
}

#[tokio::test]
async fn unrated_contractor_has_no_aggregate() {
    let h = Harness::new();
    let job = h.job("Unrated").await;
    let bid = h.bid(&job, "contractor-1", 100).await;
    h.services.bids.accept(&bid.id).await.unwrap();
    h.services.bids.complete(&bid.id).await.unwrap();

    assert_eq!(h.services.ratings.recompute("contractor-1").await.unwrap(), None);
    assert_eq!(h.services.ratings.rating_for("contractor-1").await.unwrap(), None);
    assert_eq!(h.store.document_count("users"), 0);
}

#[tokio::test]
async fn rerating_a_bid_replaces_its_value() {
    let h = Harness::new();
    let job = h.job("Re-rated").await;
    let bid = h.bid(&job, "contractor-1", 100).await;
    h.services.bids.accept(&bid.id).await.unwrap();
    h.services.bids.complete(&bid.id).await.unwrap();

    h.services.bids.attach_rating(&bid.id, 1.0).await.unwrap();
    let aggregate = h.services.bids.attach_rating(&bid.id, 5.0).await.unwrap();
    assert_eq!(aggregate, Some(5.0));
}

/// Memory store whose first batch touching contractor profiles stalls, so a
/// second rating can commit while the first writer holds a stale aggregate.
struct StallFirstProfileWrite {
    inner: MemoryStore,
    stalled: AtomicBool,
}

#[async_trait]
impl DocumentStore for StallFirstProfileWrite {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.inner.get(collection, id).await
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.inner.query(query).await
    }

    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let touches_profiles = ops.iter().any(|op| op.collection() == profiles::COLLECTION);
        if touches_profiles && !self.stalled.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.inner.batch_write(ops).await
    }

    fn changes(&self) -> broadcast::Receiver<Change> {
        self.inner.changes()
    }
}

#[tokio::test]
async fn concurrent_ratings_store_the_exact_mean() {
    let h = Harness::wrapping(|inner| {
        Arc::new(StallFirstProfileWrite {
            inner,
            stalled: AtomicBool::new(false),
        })
    });
    let first = h.completed_bid("contractor-1").await;
    let second = h.completed_bid("contractor-1").await;

    let (a, b) = tokio::join!(
        h.services.bids.attach_rating(&first.id, 4.0),
        h.services.bids.attach_rating(&second.id, 1.0),
    );
    let (a, b) = (a.unwrap().unwrap(), b.unwrap().unwrap());
    // Whichever committed last saw both ratings.
    assert!(a == 2.5 || b == 2.5, "got {} and {}", a, b);

    let stored = h.services.ratings.rating_for("contractor-1").await.unwrap();
    assert_eq!(stored, Some(2.5));
    assert_eq!(h.services.bids.get_bid(&first.id).await.unwrap().job_rating, Some(4.0));
    assert_eq!(h.services.bids.get_bid(&second.id).await.unwrap().job_rating, Some(1.0));
}

#[tokio::test]
async fn failed_rating_write_leaves_rating_and_aggregate_together() {
    let h = Harness::new();
    assert_eq!(h.rated_job("contractor-1", 4.0).await, Some(4.0));
    let bid = h.completed_bid("contractor-1").await;

    // Fail after the bid's rating is staged but before the aggregate is.
    h.store.fail_next_batch_after(2);
    let err = h.services.bids.attach_rating(&bid.id, 1.0).await.unwrap_err();
    assert!(matches!(err, BidError::Remote(StoreError::Unavailable(_))));

    assert_eq!(h.services.bids.get_bid(&bid.id).await.unwrap().job_rating, None);
    let stored = h.services.ratings.rating_for("contractor-1").await.unwrap();
    assert_eq!(stored, Some(4.0));

    assert_eq!(
        h.services.bids.attach_rating(&bid.id, 1.0).await.unwrap(),
        Some(2.5)
    );
}
