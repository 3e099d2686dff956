//! Contractor rating aggregation
//!
//! The aggregate is recomputed from scratch on every rating change: the plain
//! arithmetic mean of `job_rating` over the contractor's completed, rated bids.
//!
//! A bid's rating and the aggregate derived from it are written in one batch,
//! guarded by the aggregate's version. A writer whose view went stale while it
//! computed the mean loses the batch, re-reads and tries again, so the stored
//! aggregate always matches the stored ratings.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::domain::bids::{self, fields as bf, Bid, BidStatus};
use crate::error::{BidError, BidResult};
use crate::services::cascade;
use crate::services::collaborators::ProfileStore;
use crate::services::retry::{retry_read, RetryPolicy};
use crate::store::{decode_all, DocumentStore, Filter, Query, StoreError};

/// Attempts at committing an aggregate before giving up on a busy contractor.
const MAX_COMMIT_ATTEMPTS: u32 = 5;

/// Mean of the ratings on completed bids; `None` when nothing is rated.
pub fn mean_rating<'a>(bids: impl IntoIterator<Item = &'a Bid>) -> Option<f64> {
    let (sum, count) = bids
        .into_iter()
        .filter(|b| b.status == BidStatus::Completed)
        .filter_map(|b| b.job_rating)
        .fold((0.0, 0u32), |(sum, count), r| (sum + r, count + 1));

    (count > 0).then(|| sum / f64::from(count))
}

#[derive(Clone)]
pub struct RatingAggregator {
    store: Arc<dyn DocumentStore>,
    profiles: Arc<dyn ProfileStore>,
    retry: RetryPolicy,
}

impl RatingAggregator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        profiles: Arc<dyn ProfileStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            profiles,
            retry,
        }
    }

    /// Recompute and store the contractor's aggregate rating.
    ///
    /// Leaves the profile untouched when the contractor has no rated bids.
    #[instrument(skip(self))]
    pub async fn recompute(&self, contractor_id: &str) -> BidResult<Option<f64>> {
        self.commit(contractor_id, None).await
    }

    /// Store `rating` on a completed bid together with the refreshed
    /// aggregate. Returns `None`, writing nothing, once the bid is no longer
    /// completed.
    #[instrument(skip(self, bid), fields(bid_id = %bid.id))]
    pub async fn rate(&self, bid: &Bid, rating: f64) -> BidResult<Option<f64>> {
        self.commit(&bid.contractor_id, Some((bid, rating))).await
    }

    /// The stored aggregate for a contractor.
    pub async fn rating_for(&self, contractor_id: &str) -> BidResult<Option<f64>> {
        Ok(self.profiles.rating(contractor_id).await?)
    }

    async fn rated_bids(&self, contractor_id: &str) -> BidResult<Vec<Bid>> {
        let query = Query::collection(bids::COLLECTION)
            .filter(Filter::eq(bf::CONTRACTOR_ID, contractor_id))
            .filter(Filter::exists(bf::JOB_RATING));

        let docs = retry_read(&self.retry, "rated_bids", || self.store.query(&query)).await?;
        Ok(decode_all(&docs)?)
    }

    async fn still_completed(&self, bid: &Bid) -> BidResult<bool> {
        let doc = retry_read(&self.retry, "rated_bid", || {
            self.store.get(bids::COLLECTION, &bid.id)
        })
        .await?;
        let current = doc.map(|d| d.decode::<Bid>()).transpose()?;
        Ok(current.is_some_and(|b| b.status == BidStatus::Completed))
    }

    async fn commit(
        &self,
        contractor_id: &str,
        pending: Option<(&Bid, f64)>,
    ) -> BidResult<Option<f64>> {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            // Version first: anything committed after this read bumps it.
            let version = self.profiles.rating_version(contractor_id).await?;
            let mut rated = self.rated_bids(contractor_id).await?;
            let mut ops = Vec::new();

            if let Some((bid, rating)) = pending {
                match rated.iter_mut().find(|b| b.id == bid.id) {
                    Some(stored) => stored.job_rating = Some(rating),
                    None => rated.push(Bid {
                        job_rating: Some(rating),
                        ..bid.clone()
                    }),
                }
                ops.extend(
                    cascade::plan_completed_fields(bid, bf::JOB_RATING, Value::from(rating)).ops,
                );
            }

            let Some(mean) = mean_rating(&rated) else {
                return Ok(None);
            };
            ops.extend(self.profiles.rating_ops(contractor_id, version, mean));

            match self.store.batch_write(ops).await {
                Ok(()) => {
                    info!(
                        contractor_id,
                        rating = mean,
                        rated_bids = rated.len(),
                        version = version + 1,
                        "Contractor rating updated"
                    );
                    return Ok(Some(mean));
                }
                Err(StoreError::PreconditionFailed(reason)) => {
                    if let Some((bid, _)) = pending {
                        if !self.still_completed(bid).await? {
                            warn!(bid_id = %bid.id, "Ignoring rating on bid that is not completed");
                            return Ok(None);
                        }
                    }
                    debug!(contractor_id, attempt, %reason, "Rating changed underneath, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(BidError::Remote(StoreError::Unavailable(format!(
            "rating for {} kept changing after {} attempts",
            contractor_id, MAX_COMMIT_ATTEMPTS
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn rated(status: BidStatus, rating: Option<f64>) -> Bid {
        Bid {
            id: uuid::Uuid::new_v4().to_string(),
            job_id: "j".into(),
            contractor_id: "c".into(),
            homeowner_id: "h".into(),
            price: Decimal::from(50),
            description: String::new(),
            status,
            bid_date: Utc::now(),
            review: None,
            job_rating: rating,
            conversation_id: String::new(),
        }
    }

    #[test]
    fn mean_of_completed_rated_bids() {
        let bids = vec![
            rated(BidStatus::Completed, Some(4.0)),
            rated(BidStatus::Completed, Some(2.0)),
            rated(BidStatus::Completed, None),
            rated(BidStatus::Accepted, None),
        ];
        assert_eq!(mean_rating(&bids), Some(3.0));
    }

    #[test]
    fn no_ratings_no_mean() {
        assert_eq!(mean_rating(&[rated(BidStatus::Completed, None)]), None);
        assert_eq!(mean_rating(Vec::<Bid>::new().iter()), None);
    }

    #[test]
    fn unweighted_mean_over_many() {
        let values = [5.0, 4.5, 3.0, 1.0, 0.0, 2.5];
        let bids: Vec<_> = values
            .iter()
            .map(|v| rated(BidStatus::Completed, Some(*v)))
            .collect();
        let expected = values.iter().sum::<f64>() / values.len() as f64;
        assert!((mean_rating(&bids).unwrap() - expected).abs() < 1e-12);
    }
}
