//! Acceptance cascade
//!
//! Accepting a bid declines every other pending bid on the same job. The whole
//! change, notifications included, is one batch: each touched bid carries a
//! `status == pending` precondition, so a concurrent accept or decline on any
//! of them aborts the batch and nothing is written. Declining a bid also
//! releases its active-bid guard, so the contractor may bid on the job again.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::bids::{self, fields as bf, Bid, BidStatus};
use crate::domain::notifications::BidNotification;
use crate::services::notifications::emit;
use crate::store::{fields, Precondition, StoreError, WriteOp};

/// Ops and side effects of one status transition batch.
#[derive(Debug, Clone)]
pub struct TransitionPlan {
    pub ops: Vec<WriteOp>,
    pub notifications: Vec<BidNotification>,
    /// Competing bids declined by the cascade.
    pub declined: Vec<String>,
}

impl TransitionPlan {
    fn new() -> Self {
        Self {
            ops: Vec::new(),
            notifications: Vec::new(),
            declined: Vec::new(),
        }
    }

    /// Guarded status write for one bid.
    fn transition(&mut self, bid: &Bid, to: BidStatus) {
        self.ops.push(WriteOp::check(
            bids::COLLECTION,
            &bid.id,
            Precondition::FieldEquals(bf::STATUS.to_string(), bid.status.to_value()),
        ));
        self.ops.push(WriteOp::update(
            bids::COLLECTION,
            &bid.id,
            fields([(bf::STATUS, to.to_value())]),
        ));
    }

    /// Guarded decline that also releases the bid's active-bid guard.
    fn decline(&mut self, bid: &Bid, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.transition(bid, BidStatus::Declined);
        self.ops.push(WriteOp::delete(bids::ACTIVE_COLLECTION, &bid.active_key()));
        self.notify(bid, BidStatus::Declined, at)
    }

    fn notify(
        &mut self,
        bid: &Bid,
        status: BidStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let (notification, op) = emit(bid, status, at)?;
        self.ops.push(op);
        self.notifications.push(notification);
        Ok(())
    }
}

/// Plan accepting `accepted` and declining every pending bid in `job_bids`
/// other than it.
pub fn plan_acceptance(
    accepted: &Bid,
    job_bids: &[Bid],
    at: DateTime<Utc>,
) -> Result<TransitionPlan, StoreError> {
    let mut plan = TransitionPlan::new();

    plan.transition(accepted, BidStatus::Accepted);
    plan.notify(accepted, BidStatus::Accepted, at)?;

    for competitor in job_bids
        .iter()
        .filter(|b| b.id != accepted.id && b.job_id == accepted.job_id)
        .filter(|b| b.status == BidStatus::Pending)
    {
        plan.decline(competitor, at)?;
        plan.declined.push(competitor.id.clone());
    }

    Ok(plan)
}

/// Plan declining a single pending bid.
pub fn plan_decline(bid: &Bid, at: DateTime<Utc>) -> Result<TransitionPlan, StoreError> {
    let mut plan = TransitionPlan::new();
    plan.decline(bid, at)?;
    Ok(plan)
}

/// Plan completing an accepted bid. Completion notifies nobody.
pub fn plan_completion(bid: &Bid) -> TransitionPlan {
    let mut plan = TransitionPlan::new();
    plan.transition(bid, BidStatus::Completed);
    plan
}

/// Plan a guarded write of post-completion fields.
pub fn plan_completed_fields(bid: &Bid, field: &str, value: Value) -> TransitionPlan {
    let mut plan = TransitionPlan::new();
    plan.ops.push(WriteOp::check(
        bids::COLLECTION,
        &bid.id,
        Precondition::FieldEquals(bf::STATUS.to_string(), BidStatus::Completed.to_value()),
    ));
    plan.ops.push(WriteOp::update(bids::COLLECTION, &bid.id, fields([(field, value)])));
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn bid(id: &str, job: &str, status: BidStatus) -> Bid {
        Bid {
            id: id.into(),
            job_id: job.into(),
            contractor_id: format!("c-{}", id),
            homeowner_id: "h".into(),
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
    fn acceptance_declines_only_pending_competitors() {
        let accepted = bid("b1", "j", BidStatus::Pending);
        let job_bids = vec![
            accepted.clone(),
            bid("b2", "j", BidStatus::Pending),
            bid("b3", "j", BidStatus::Declined),
            bid("b4", "j", BidStatus::Pending),
            bid("b5", "other", BidStatus::Pending),
        ];

        let plan = plan_acceptance(&accepted, &job_bids, Utc::now()).unwrap();

        assert_eq!(plan.declined, vec!["b2".to_string(), "b4".to_string()]);
        // One notification per transition, addressed to each bid's contractor.
        assert_eq!(plan.notifications.len(), 3);
        assert_eq!(plan.notifications[0].status, BidStatus::Accepted);
        assert_eq!(plan.notifications[0].contractor_id, "c-b1");
        assert!(plan.notifications[1..]
            .iter()
            .all(|n| n.status == BidStatus::Declined));
        // check + update + notification per touched bid, plus a guard
        // release per declined competitor
        assert_eq!(plan.ops.len(), 11);
        let released: Vec<_> = plan
            .ops
            .iter()
            .filter_map(|op| match op {
                WriteOp::Delete { collection, id } if collection == bids::ACTIVE_COLLECTION => {
                    Some(id.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(released, vec!["j_c-b2", "j_c-b4"]);
    }

    #[test]
    fn every_status_write_is_guarded() {
        let accepted = bid("b1", "j", BidStatus::Pending);
        let job_bids = vec![accepted.clone(), bid("b2", "j", BidStatus::Pending)];
        let plan = plan_acceptance(&accepted, &job_bids, Utc::now()).unwrap();

        let checked: Vec<_> = plan
            .ops
            .iter()
            .filter_map(|op| match op {
                WriteOp::Check { id, precondition, .. } => {
                    Some((id.clone(), precondition.clone()))
                }
                _ => None,
            })
            .collect();

        assert_eq!(
            checked,
            vec![
                ("b1".to_string(), Precondition::field_equals("status", "pending")),
                ("b2".to_string(), Precondition::field_equals("status", "pending")),
            ]
        );
    }

    #[test]
    fn decline_releases_the_guard() {
        let plan = plan_decline(&bid("b1", "j", BidStatus::Pending), Utc::now()).unwrap();
        assert!(plan.ops.contains(&WriteOp::delete(bids::ACTIVE_COLLECTION, "j_c-b1")));
        assert_eq!(plan.notifications.len(), 1);
    }

    #[test]
    fn completion_emits_no_notification() {
        let plan = plan_completion(&bid("b1", "j", BidStatus::Accepted));
        assert!(plan.notifications.is_empty());
        assert_eq!(plan.ops.len(), 2);
    }
}
