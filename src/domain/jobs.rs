//! Job references and the excluded-jobs view

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::bids::{Bid, BidStatus};

pub const COLLECTION: &str = "jobs";

/// A homeowner's posted job. Bids reference it by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub homeowner_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request DTO for posting a job
#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Job status derived from its bids.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Open,
    HasAcceptedBid,
    Closed,
}

impl JobStatus {
    /// Derive from the bids placed on one job.
    pub fn derive<'a>(bids: impl IntoIterator<Item = &'a Bid>) -> Self {
        let mut status = Self::Open;
        for bid in bids {
            match bid.status {
                BidStatus::Completed => return Self::Closed,
                BidStatus::Accepted => status = Self::HasAcceptedBid,
                _ => {}
            }
        }
        status
    }

    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Jobs with at least one accepted or completed bid.
pub fn excluded_job_ids<'a>(bids: impl IntoIterator<Item = &'a Bid>) -> BTreeSet<String> {
    bids.into_iter()
        .filter(|b| b.status.closes_job())
        .map(|b| b.job_id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn bid(id: &str, job: &str, status: BidStatus) -> Bid {
        Bid {
            id: id.into(),
            job_id: job.into(),
            contractor_id: format!("contractor-{}", id),
            homeowner_id: "h1".into(),
            price: Decimal::from(100),
            description: String::new(),
            status,
            bid_date: Utc::now(),
            review: None,
            job_rating: None,
            conversation_id: String::new(),
        }
    }

    #[test]
    fn excluded_set_tracks_accepted_and_completed() {
        let bids = vec![
            bid("1", "j1", BidStatus::Pending),
            bid("2", "j1", BidStatus::Declined),
            bid("3", "j2", BidStatus::Accepted),
            bid("4", "j3", BidStatus::Completed),
            bid("5", "j3", BidStatus::Declined),
            bid("6", "j4", BidStatus::Declined),
        ];

        let excluded = excluded_job_ids(&bids);
        assert_eq!(
            excluded.into_iter().collect::<Vec<_>>(),
            vec!["j2".to_string(), "j3".to_string()]
        );
    }

    #[test]
    fn job_status_from_bids() {
        assert_eq!(JobStatus::derive(Vec::<Bid>::new().iter()), JobStatus::Open);
        let open = [bid("1", "j", BidStatus::Pending), bid("2", "j", BidStatus::Declined)];
        assert_eq!(JobStatus::derive(&open), JobStatus::Open);

        let taken = [bid("1", "j", BidStatus::Declined), bid("2", "j", BidStatus::Accepted)];
        assert_eq!(JobStatus::derive(&taken), JobStatus::HasAcceptedBid);
        assert_eq!(
            JobStatus::derive(&[bid("1", "j", BidStatus::Completed)]),
            JobStatus::Closed
        );
    }
}
