//! Bid entity and status state machine
//!
//! ```text
//! pending ──► accepted ──► completed
//!    │
//!    └──────► declined
//! ```
//!
//! `declined` and `completed` are terminal. A declined contractor may place a
//! brand new bid, but a bid record is never reopened.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BidError, BidResult};

pub const COLLECTION: &str = "bids";

/// Guard documents, one per job and contractor pair that has a pending or
/// accepted bid. Placement creates the guard under a `Missing` check and a
/// decline deletes it, so at most one active bid per pair can commit.
pub const ACTIVE_COLLECTION: &str = "activeBids";

pub fn active_bid_key(job_id: &str, contractor_id: &str) -> String {
    format!("{}_{}", job_id, contractor_id)
}

/// Document field names used in queries and partial updates.
pub mod fields {
    pub const JOB_ID: &str = "jobId";
    pub const CONTRACTOR_ID: &str = "contractorId";
    pub const HOMEOWNER_ID: &str = "homeownerId";
    pub const STATUS: &str = "status";
    pub const BID_DATE: &str = "bidDate";
    pub const REVIEW: &str = "review";
    pub const JOB_RATING: &str = "jobRating";
}

/// Highest rating a homeowner can give a completed job.
pub const MAX_RATING: f64 = 5.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    #[default]
    Pending,
    Accepted,
    Declined,
    Completed,
}

impl BidStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Completed => "completed",
        }
    }

    pub fn can_transition_to(self, next: BidStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Accepted)
                | (Self::Pending, Self::Declined)
                | (Self::Accepted, Self::Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Declined | Self::Completed)
    }

    /// Counts against the one-active-bid-per-contractor-per-job rule.
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Declined)
    }

    /// A bid in this status takes its job off the open listing.
    pub fn closes_job(self) -> bool {
        matches!(self, Self::Accepted | Self::Completed)
    }

    /// JSON form as stored in documents, for filters and preconditions.
    pub fn to_value(self) -> Value {
        Value::String(self.as_str().to_string())
    }
}

impl std::fmt::Display for BidStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contractor's priced offer to perform a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: String,
    pub job_id: String,
    pub contractor_id: String,
    pub homeowner_id: String,
    pub price: Decimal,
    pub description: String,
    pub status: BidStatus,
    #[serde(with = "crate::domain::timestamp")]
    pub bid_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_rating: Option<f64>,
    pub conversation_id: String,
}

impl Bid {
    /// Check that this bid may move to `next`.
    pub fn ensure_transition(&self, next: BidStatus) -> BidResult<()> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(BidError::InvalidTransition {
                bid_id: self.id.clone(),
                from: self.status,
                to: next,
            })
        }
    }

    /// Id of this bid's guard document in [`ACTIVE_COLLECTION`].
    pub fn active_key(&self) -> String {
        active_bid_key(&self.job_id, &self.contractor_id)
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.contractor_id == user_id || self.homeowner_id == user_id
    }
}

/// Request DTO for placing a bid
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceBidRequest {
    pub price: Decimal,
    #[serde(default)]
    pub description: String,
}

impl PlaceBidRequest {
    pub fn new(price: Decimal, description: impl Into<String>) -> Self {
        Self {
            price,
            description: description.into(),
        }
    }

    pub fn validate(&self) -> BidResult<()> {
        if self.price <= Decimal::ZERO {
            return Err(BidError::validation(format!(
                "Bid price must be positive, got {}",
                self.price
            )));
        }
        Ok(())
    }
}

/// Request DTO for attaching a review
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewRequest {
    pub review: String,
}

/// Request DTO for attaching a rating
#[derive(Debug, Clone, Deserialize)]
pub struct RatingRequest {
    pub rating: f64,
}

/// Clamp a rating into `[0, MAX_RATING]`; non-numbers are rejected.
pub fn clamp_rating(value: f64) -> BidResult<f64> {
    if value.is_nan() {
        return Err(BidError::validation("Rating must be a number"));
    }
    Ok(value.clamp(0.0, MAX_RATING))
}
