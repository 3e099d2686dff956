//! Notification service
//!
//! Builds the notification write that accompanies a bid transition and serves
//! the contractor-facing queries: unread listing, counts and mark-read.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::domain::bids::{Bid, BidStatus};
use crate::domain::notifications::{self, fields as nf, BidNotification};
use crate::error::{BidError, BidResult};
use crate::services::retry::{retry_read, RetryPolicy};
use crate::store::{
    decode_all, encode, fields, subscribe, Direction, DocumentStore, Filter, Precondition, Query,
    StoreError, Subscription, WriteOp,
};

/// Notification for `bid` moving to `status`, plus the op that persists it.
pub fn emit(
    bid: &Bid,
    status: BidStatus,
    at: DateTime<Utc>,
) -> Result<(BidNotification, WriteOp), StoreError> {
    let notification = BidNotification::for_transition(bid, status, at);
    let op = WriteOp::set(notifications::COLLECTION, &notification.id, encode(&notification)?);
    Ok((notification, op))
}

#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
}

impl NotificationService {
    pub fn new(store: Arc<dyn DocumentStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    fn contractor_query(contractor_id: &str, unread_only: bool) -> Query {
        let mut query = Query::collection(notifications::COLLECTION)
            .filter(Filter::eq(nf::CONTRACTOR_ID, contractor_id));
        if unread_only {
            query = query.filter(Filter::eq(nf::IS_READ, false));
        }
        query.order_by(nf::DATE, Direction::Desc)
    }

    /// Newest first.
    pub async fn list_for(
        &self,
        contractor_id: &str,
        unread_only: bool,
    ) -> BidResult<Vec<BidNotification>> {
        let query = Self::contractor_query(contractor_id, unread_only);
        let docs =
            retry_read(&self.retry, "list_notifications", || self.store.query(&query)).await?;
        Ok(decode_all(&docs)?)
    }

    pub async fn unread_for(&self, contractor_id: &str) -> BidResult<Vec<BidNotification>> {
        self.list_for(contractor_id, true).await
    }

    pub async fn unread_count(&self, contractor_id: &str) -> BidResult<usize> {
        Ok(self.unread_for(contractor_id).await?.len())
    }

    pub async fn get(&self, notification_id: &str) -> BidResult<BidNotification> {
        let doc = retry_read(&self.retry, "get_notification", || {
            self.store.get(notifications::COLLECTION, notification_id)
        })
        .await?
        .ok_or_else(|| BidError::not_found(format!("Notification {} not found", notification_id)))?;
        Ok(doc.decode()?)
    }

    /// Flip `is_read` on. Returns `false` if it was already read.
    #[instrument(skip(self))]
    pub async fn mark_read(&self, notification_id: &str) -> BidResult<bool> {
        let notification = self.get(notification_id).await?;
        if notification.is_read {
            return Ok(false);
        }

        let result = self
            .store
            .batch_write(vec![
                WriteOp::check(
                    notifications::COLLECTION,
                    notification_id,
                    Precondition::field_equals(nf::IS_READ, false),
                ),
                WriteOp::update(
                    notifications::COLLECTION,
                    notification_id,
                    fields([(nf::IS_READ, Value::Bool(true))]),
                ),
            ])
            .await;

        match result {
            Ok(()) => Ok(true),
            // Someone else read it in between.
            Err(StoreError::PreconditionFailed(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Mark every unread notification for a contractor in one batch.
    #[instrument(skip(self))]
    pub async fn mark_all_read(&self, contractor_id: &str) -> BidResult<usize> {
        let unread = self.unread_for(contractor_id).await?;
        if unread.is_empty() {
            return Ok(0);
        }

        let ops = unread
            .iter()
            .map(|n| {
                WriteOp::update(
                    notifications::COLLECTION,
                    &n.id,
                    fields([(nf::IS_READ, Value::Bool(true))]),
                )
            })
            .collect();
        self.store.batch_write(ops).await?;

        info!(contractor_id, count = unread.len(), "Notifications marked read");
        Ok(unread.len())
    }

    /// Live view of a contractor's unread notifications.
    pub fn watch_unread(&self, contractor_id: &str) -> Subscription<Vec<BidNotification>> {
        subscribe(
            self.store.clone(),
            Self::contractor_query(contractor_id, true),
            |docs| decode_all(&docs),
        )
    }
}
