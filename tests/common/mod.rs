//! Shared fixtures for integration tests.

#![allow(dead_code)]

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

use homebid_backend::domain::bids::{Bid, PlaceBidRequest};
use homebid_backend::domain::jobs::{CreateJobRequest, Job};
use homebid_backend::services::{RetryPolicy, Services};
use homebid_backend::store::{DocumentStore, MemoryStore};

pub const HOMEOWNER: &str = "homeowner-1";

pub struct Harness {
    pub store: MemoryStore,
    pub services: Services,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_retry(RetryPolicy::none())
    }

    /// Harness whose reads retry quickly.
    pub fn retrying() -> Self {
        Self::with_retry(RetryPolicy::fixed(3, Duration::from_millis(10)))
    }

    pub fn with_retry(retry: RetryPolicy) -> Self {
        Self::wrapping_with_retry(retry, |store| Arc::new(store))
    }

    /// Harness whose services see the memory store through `wrap`.
    pub fn wrapping(wrap: impl FnOnce(MemoryStore) -> Arc<dyn DocumentStore>) -> Self {
        Self::wrapping_with_retry(RetryPolicy::none(), wrap)
    }

    fn wrapping_with_retry(
        retry: RetryPolicy,
        wrap: impl FnOnce(MemoryStore) -> Arc<dyn DocumentStore>,
    ) -> Self {
        let store = MemoryStore::new();
        let services = Services::new(wrap(store.clone()), retry);
        Self { store, services }
    }

    pub async fn job(&self, title: &str) -> Job {
        self.services
            .jobs
            .create_job(
                HOMEOWNER,
                CreateJobRequest {
                    title: title.to_string(),
                    description: None,
                },
            )
            .await
            .unwrap()
    }

    pub async fn bid(&self, job: &Job, contractor_id: &str, price: i64) -> Bid {
        self.services
            .bids
            .place_bid(
                job,
                contractor_id,
                PlaceBidRequest::new(Decimal::from(price), "Can start Monday"),
            )
            .await
            .unwrap()
    }

    /// A fresh bid from `contractor_id`, accepted and completed.
    pub async fn completed_bid(&self, contractor_id: &str) -> Bid {
        let job = self.job("Rated work").await;
        let bid = self.bid(&job, contractor_id, 100).await;
        self.services.bids.accept(&bid.id).await.unwrap();
        self.services.bids.complete(&bid.id).await.unwrap()
    }

    /// Complete and rate a fresh bid from `contractor_id`.
    pub async fn rated_job(&self, contractor_id: &str, rating: f64) -> Option<f64> {
        let bid = self.completed_bid(contractor_id).await;
        self.services.bids.attach_rating(&bid.id, rating).await.unwrap()
    }
}
