//! Bid notification domain types
//!
//! A notification is written alongside every accept/decline transition and is
//! never changed afterwards except for flipping `is_read` once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::bids::{Bid, BidStatus};

pub const COLLECTION: &str = "bidNotifications";

pub mod fields {
    pub const CONTRACTOR_ID: &str = "contractorId";
    pub const IS_READ: &str = "isRead";
    pub const DATE: &str = "date";
}

/// Notification entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BidNotification {
    pub id: String,
    pub bid_id: String,
    pub contractor_id: String,
    pub message: String,
    #[serde(with = "crate::domain::timestamp")]
    pub date: DateTime<Utc>,
    pub status: BidStatus,
    pub is_read: bool,
}

impl BidNotification {
    /// Notification telling the bid's contractor it moved to `status`.
    pub fn for_transition(bid: &Bid, status: BidStatus, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            bid_id: bid.id.clone(),
            contractor_id: bid.contractor_id.clone(),
            message: message_for(status),
            date: at,
            status,
            is_read: false,
        }
    }
}

/// The same wording is used for every outcome; only the status word differs.
pub fn message_for(status: BidStatus) -> String {
    format!("A new bid is {}.", status)
}

/// Query params for listing notifications
#[derive(Debug, Clone, Deserialize, Default)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: Option<bool>,
}

/// Unread count response
#[derive(Debug, Clone, Serialize)]
pub struct UnreadCountResponse {
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_template() {
        assert_eq!(message_for(BidStatus::Accepted), "A new bid is accepted.");
        assert_eq!(message_for(BidStatus::Declined), "A new bid is declined.");
    }
}
