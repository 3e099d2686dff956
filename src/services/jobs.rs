//! Job service
//!
//! Job records plus the read-only views derived from bids: a job's status and
//! the set of jobs excluded from the open listing.

use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::bids::{self, fields as bf, Bid, BidStatus};
use crate::domain::jobs::{self, excluded_job_ids, CreateJobRequest, Job, JobStatus};
use crate::error::{BidError, BidResult};
use crate::services::retry::{retry_read, RetryPolicy};
use crate::store::{
    decode_all, encode, subscribe, DocumentStore, Filter, Query, Subscription, WriteOp,
};

#[derive(Clone)]
pub struct JobService {
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
}

impl JobService {
    pub fn new(store: Arc<dyn DocumentStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    #[instrument(skip(self, request))]
    pub async fn create_job(
        &self,
        homeowner_id: &str,
        request: CreateJobRequest,
    ) -> BidResult<Job> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(BidError::validation("Job title is required"));
        }

        let job = Job {
            id: Uuid::new_v4().to_string(),
            homeowner_id: homeowner_id.to_string(),
            title: title.to_string(),
            description: request.description,
            created_at: Utc::now(),
        };

        self.store
            .batch_write(vec![WriteOp::set(jobs::COLLECTION, &job.id, encode(&job)?)])
            .await?;

        info!(job_id = %job.id, "Job posted");
        Ok(job)
    }

    pub async fn get_job(&self, job_id: &str) -> BidResult<Job> {
        let doc = retry_read(&self.retry, "get_job", || self.store.get(jobs::COLLECTION, job_id))
            .await?
            .ok_or_else(|| BidError::not_found(format!("Job {} not found", job_id)))?;
        Ok(doc.decode()?)
    }

    /// Status of a job derived from its bids.
    pub async fn job_status(&self, job_id: &str) -> BidResult<JobStatus> {
        let query = Query::collection(bids::COLLECTION).filter(Filter::eq(bf::JOB_ID, job_id));
        let docs = retry_read(&self.retry, "job_bids", || self.store.query(&query)).await?;
        let bids: Vec<Bid> = decode_all(&docs)?;
        Ok(JobStatus::derive(&bids))
    }

    fn closing_bids_query() -> Query {
        Query::collection(bids::COLLECTION).filter(Filter::one_of(
            bf::STATUS,
            [BidStatus::Accepted.to_value(), BidStatus::Completed.to_value()],
        ))
    }

    /// Jobs with at least one accepted or completed bid.
    pub async fn excluded_job_ids(&self) -> BidResult<BTreeSet<String>> {
        let query = Self::closing_bids_query();
        let docs = retry_read(&self.retry, "excluded_jobs", || self.store.query(&query)).await?;
        let bids: Vec<Bid> = decode_all(&docs)?;
        Ok(excluded_job_ids(&bids))
    }

    /// Jobs still open for bidding.
    pub async fn open_jobs(&self) -> BidResult<Vec<Job>> {
        let excluded = self.excluded_job_ids().await?;
        let query = Query::collection(jobs::COLLECTION);
        let docs = retry_read(&self.retry, "all_jobs", || self.store.query(&query)).await?;
        let mut open: Vec<Job> = decode_all(&docs)?;
        open.retain(|job| !excluded.contains(&job.id));
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(open)
    }

    /// Live excluded-jobs set.
    pub fn watch_excluded_jobs(&self) -> Subscription<BTreeSet<String>> {
        subscribe(self.store.clone(), Self::closing_bids_query(), |docs| {
            let bids: Vec<Bid> = decode_all(&docs)?;
            Ok(excluded_job_ids(&bids))
        })
    }
}
