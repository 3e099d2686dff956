//! Bid lifecycle service
//!
//! Places bids and drives them through the status state machine. Every status
//! change is a single guarded batch; see [`crate::services::cascade`].

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::bids::{self, clamp_rating, fields as bf, Bid, BidStatus, PlaceBidRequest};
use crate::domain::jobs::Job;
use crate::error::{BidError, BidResult};
use crate::services::cascade::{self, TransitionPlan};
use crate::services::collaborators::{AuthProvider, MessagingCollaborator};
use crate::services::ratings::RatingAggregator;
use crate::services::retry::{retry_read, RetryPolicy};
use crate::store::{
    decode_all, encode, fields, subscribe, Direction, DocumentStore, Filter, Precondition, Query,
    StoreError, Subscription, WriteOp,
};

#[derive(Clone)]
pub struct BidService {
    store: Arc<dyn DocumentStore>,
    messaging: Arc<dyn MessagingCollaborator>,
    ratings: RatingAggregator,
    retry: RetryPolicy,
}

impl BidService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        messaging: Arc<dyn MessagingCollaborator>,
        ratings: RatingAggregator,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            messaging,
            ratings,
            retry,
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_bid(&self, bid_id: &str) -> BidResult<Bid> {
        let doc = retry_read(&self.retry, "get_bid", || self.store.get(bids::COLLECTION, bid_id))
            .await?
            .ok_or_else(|| BidError::not_found(format!("Bid {} not found", bid_id)))?;
        Ok(doc.decode()?)
    }

    async fn find(&self, operation: &str, query: Query) -> BidResult<Vec<Bid>> {
        let docs = retry_read(&self.retry, operation, || self.store.query(&query)).await?;
        Ok(decode_all(&docs)?)
    }

    fn job_query(job_id: &str) -> Query {
        Query::collection(bids::COLLECTION)
            .filter(Filter::eq(bf::JOB_ID, job_id))
            .order_by(bf::BID_DATE, Direction::Asc)
    }

    /// All bids on a job, oldest first.
    pub async fn bids_for_job(&self, job_id: &str) -> BidResult<Vec<Bid>> {
        self.find("bids_for_job", Self::job_query(job_id)).await
    }

    /// All bids by a contractor, newest first.
    pub async fn bids_for_contractor(&self, contractor_id: &str) -> BidResult<Vec<Bid>> {
        let query = Query::collection(bids::COLLECTION)
            .filter(Filter::eq(bf::CONTRACTOR_ID, contractor_id))
            .order_by(bf::BID_DATE, Direction::Desc);
        self.find("bids_for_contractor", query).await
    }

    /// Live view of the bids on a job.
    pub fn watch_job_bids(&self, job_id: &str) -> Subscription<Vec<Bid>> {
        subscribe(self.store.clone(), Self::job_query(job_id), |docs| {
            decode_all(&docs)
        })
    }

    // =========================================================================
    // Placement
    // =========================================================================

    /// Place a new pending bid on `job`.
    ///
    /// Fails if the price is not positive or the contractor already has a
    /// pending or accepted bid on the job. Makes sure the contractor and the
    /// homeowner share a conversation.
    ///
    /// The bid is written together with its active-bid guard, under a check
    /// that no guard exists yet, so concurrent placements for the same job and
    /// contractor cannot both commit.
    #[instrument(skip(self, job, request), fields(job_id = %job.id))]
    pub async fn place_bid(
        &self,
        job: &Job,
        contractor_id: &str,
        request: PlaceBidRequest,
    ) -> BidResult<Bid> {
        request.validate()?;

        let conversation_id = self
            .messaging
            .ensure_conversation(contractor_id, &job.homeowner_id)
            .await?;

        let bid = Bid {
            id: Uuid::new_v4().to_string(),
            job_id: job.id.clone(),
            contractor_id: contractor_id.to_string(),
            homeowner_id: job.homeowner_id.clone(),
            price: request.price,
            description: request.description,
            status: BidStatus::Pending,
            bid_date: Utc::now(),
            review: None,
            job_rating: None,
            conversation_id,
        };

        let key = bid.active_key();
        let guard = fields([
            ("bidId", Value::from(bid.id.as_str())),
            (bf::JOB_ID, Value::from(bid.job_id.as_str())),
            (bf::CONTRACTOR_ID, Value::from(contractor_id)),
        ]);
        let placed = self
            .store
            .batch_write(vec![
                WriteOp::check(bids::ACTIVE_COLLECTION, &key, Precondition::Missing),
                WriteOp::set(bids::ACTIVE_COLLECTION, &key, guard),
                WriteOp::set(bids::COLLECTION, &bid.id, encode(&bid)?),
            ])
            .await;

        match placed {
            Ok(()) => {
                info!(bid_id = %bid.id, contractor_id, price = %bid.price, "Bid placed");
                Ok(bid)
            }
            Err(StoreError::PreconditionFailed(_)) => Err(BidError::DuplicateBid {
                job_id: job.id.clone(),
                contractor_id: contractor_id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Place a bid as the signed-in user. Homeowners cannot bid on their own
    /// jobs.
    pub async fn place_bid_as(
        &self,
        auth: &dyn AuthProvider,
        job: &Job,
        request: PlaceBidRequest,
    ) -> BidResult<Bid> {
        let contractor_id = signed_in(auth)?;
        if contractor_id == job.homeowner_id {
            return Err(BidError::forbidden("You cannot bid on your own job"));
        }
        self.place_bid(job, &contractor_id, request).await
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Commit a transition plan. A failed guard means another writer got there
    /// first, which the caller sees as an invalid transition.
    async fn commit(
        &self,
        bid: &Bid,
        to: BidStatus,
        plan: TransitionPlan,
    ) -> BidResult<TransitionPlan> {
        match self.store.batch_write(plan.ops.clone()).await {
            Ok(()) => Ok(plan),
            Err(StoreError::PreconditionFailed(reason)) => {
                warn!(bid_id = %bid.id, %reason, "Transition lost a race");
                Err(BidError::InvalidTransition {
                    bid_id: bid.id.clone(),
                    from: bid.status,
                    to,
                })
            }
            Err(e) => Err(BidError::Remote(e)),
        }
    }

    /// Accept a pending bid and decline all other pending bids on its job,
    /// atomically.
    #[instrument(skip(self))]
    pub async fn accept(&self, bid_id: &str) -> BidResult<Bid> {
        let bid = self.get_bid(bid_id).await?;
        bid.ensure_transition(BidStatus::Accepted)?;

        let job_bids = self.bids_for_job(&bid.job_id).await?;
        if job_bids.iter().any(|b| b.id != bid.id && b.status.closes_job()) {
            return Err(BidError::InvalidTransition {
                bid_id: bid.id.clone(),
                from: bid.status,
                to: BidStatus::Accepted,
            });
        }

        let plan = cascade::plan_acceptance(&bid, &job_bids, Utc::now())?;
        let plan = self.commit(&bid, BidStatus::Accepted, plan).await?;

        info!(
            bid_id = %bid.id,
            job_id = %bid.job_id,
            declined = plan.declined.len(),
            "Bid accepted"
        );
        Ok(Bid {
            status: BidStatus::Accepted,
            ..bid
        })
    }

    #[instrument(skip(self))]
    pub async fn decline(&self, bid_id: &str) -> BidResult<Bid> {
        let bid = self.get_bid(bid_id).await?;
        bid.ensure_transition(BidStatus::Declined)?;

        let plan = cascade::plan_decline(&bid, Utc::now())?;
        self.commit(&bid, BidStatus::Declined, plan).await?;

        info!(bid_id = %bid.id, job_id = %bid.job_id, "Bid declined");
        Ok(Bid {
            status: BidStatus::Declined,
            ..bid
        })
    }

    /// Mark an accepted bid's work as done.
    #[instrument(skip(self))]
    pub async fn complete(&self, bid_id: &str) -> BidResult<Bid> {
        let bid = self.get_bid(bid_id).await?;
        bid.ensure_transition(BidStatus::Completed)?;

        self.commit(&bid, BidStatus::Completed, cascade::plan_completion(&bid))
            .await?;

        info!(bid_id = %bid.id, job_id = %bid.job_id, "Bid completed");
        Ok(Bid {
            status: BidStatus::Completed,
            ..bid
        })
    }

    /// Complete a bid on behalf of the signed-in user, who must be the
    /// homeowner the bid was placed with.
    pub async fn complete_as(&self, auth: &dyn AuthProvider, bid_id: &str) -> BidResult<Bid> {
        let user_id = signed_in(auth)?;
        let bid = self.get_bid(bid_id).await?;
        if bid.homeowner_id != user_id {
            return Err(BidError::forbidden("Only the homeowner can complete a bid"));
        }
        self.complete(bid_id).await
    }

    // =========================================================================
    // Reviews and ratings
    // =========================================================================

    fn ensure_completed(bid: &Bid, field: &str) -> bool {
        if bid.status != BidStatus::Completed {
            warn!(
                bid_id = %bid.id,
                status = %bid.status,
                field,
                "Ignoring attachment on bid that is not completed"
            );
            return false;
        }
        true
    }

    /// Attach the homeowner's review text. Returns whether it was stored.
    #[instrument(skip(self, review))]
    pub async fn attach_review(&self, bid_id: &str, review: &str) -> BidResult<bool> {
        let bid = self.get_bid(bid_id).await?;
        if !Self::ensure_completed(&bid, bf::REVIEW) {
            return Ok(false);
        }

        match self
            .store
            .batch_write(cascade::plan_completed_fields(&bid, bf::REVIEW, Value::from(review)).ops)
            .await
        {
            Ok(()) => Ok(true),
            Err(StoreError::PreconditionFailed(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Attach a rating, clamped to `[0, 5]`, and refresh the contractor's
    /// aggregate in the same batch. Returns the new aggregate, or `None` if
    /// the bid is not completed.
    #[instrument(skip(self))]
    pub async fn attach_rating(&self, bid_id: &str, rating: f64) -> BidResult<Option<f64>> {
        let rating = clamp_rating(rating)?;
        let bid = self.get_bid(bid_id).await?;
        if !Self::ensure_completed(&bid, bf::JOB_RATING) {
            return Ok(None);
        }

        self.ratings.rate(&bid, rating).await
    }
}

fn signed_in(auth: &dyn AuthProvider) -> BidResult<String> {
    auth.current_user_id()
        .ok_or_else(|| BidError::forbidden("Not signed in"))
}
