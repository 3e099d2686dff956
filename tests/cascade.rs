mod common;

use std::collections::BTreeSet;

use common::Harness;
use homebid_backend::domain::bids::BidStatus;
use homebid_backend::domain::notifications;
use homebid_backend::error::BidError;
use homebid_backend::store::StoreError;

#[tokio::test]
async fn failure_mid_cascade_persists_nothing() {
    let h = Harness::new();
    let job = h.job("Roof").await;
    let b1 = h.bid(&job, "contractor-1", 100).await;
    let b2 = h.bid(&job, "contractor-2", 90).await;
    let b3 = h.bid(&job, "contractor-3", 80).await;

    // Fail after the accepted bid and the first competitor have been staged.
    h.store.fail_next_batch_after(5);
    let err = h.services.bids.accept(&b1.id).await.unwrap_err();
    assert!(matches!(err, BidError::Remote(StoreError::Unavailable(_))));
    assert!(err.is_retryable());

    for bid in [&b1, &b2, &b3] {
        let stored = h.services.bids.get_bid(&bid.id).await.unwrap();
        assert_eq!(stored.status, BidStatus::Pending);
    }
    assert_eq!(h.store.document_count(notifications::COLLECTION), 0);
    assert!(h.services.jobs.excluded_job_ids().await.unwrap().is_empty());

    // The same accept goes through once the store recovers.
    h.services.bids.accept(&b1.id).await.unwrap();
    let statuses: Vec<BidStatus> = h
        .services
        .bids
        .bids_for_job(&job.id)
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.status)
        .collect();
    assert_eq!(statuses.iter().filter(|s| **s == BidStatus::Accepted).count(), 1);
    assert_eq!(statuses.iter().filter(|s| **s == BidStatus::Declined).count(), 2);
}

#[tokio::test]
async fn every_failure_point_leaves_the_job_untouched() {
    // Three bids: the accepted one plus two declined competitors, 11 ops.
    for fail_after in 0..11 {
        let h = Harness::new();
        let job = h.job("Siding").await;
        let b1 = h.bid(&job, "contractor-1", 100).await;
        h.bid(&job, "contractor-2", 90).await;
        h.bid(&job, "contractor-3", 80).await;

        h.store.fail_next_batch_after(fail_after);
        assert!(h.services.bids.accept(&b1.id).await.is_err());

        let bids = h.services.bids.bids_for_job(&job.id).await.unwrap();
        assert!(
            bids.iter().all(|b| b.status == BidStatus::Pending),
            "partial cascade persisted when failing after {} ops",
            fail_after
        );
    }
}

#[tokio::test]
async fn write_outage_surfaces_one_remote_error() {
    let h = Harness::new();
    let job = h.job("Driveway").await;
    let b1 = h.bid(&job, "contractor-1", 100).await;
    h.bid(&job, "contractor-2", 90).await;

    h.store.set_fail_writes(true);
    let err = h.services.bids.accept(&b1.id).await.unwrap_err();
    assert!(matches!(err, BidError::Remote(_)));
    h.store.set_fail_writes(false);

    let bids = h.services.bids.bids_for_job(&job.id).await.unwrap();
    assert!(bids.iter().all(|b| b.status == BidStatus::Pending));
}

#[tokio::test]
async fn concurrent_accepts_leave_one_winner() {
    let h = Harness::new();
    let job = h.job("Basement").await;
    let b1 = h.bid(&job, "contractor-1", 100).await;
    let b2 = h.bid(&job, "contractor-2", 90).await;

    let (r1, r2) = tokio::join!(h.services.bids.accept(&b1.id), h.services.bids.accept(&b2.id));

    let (winner, loser) = match (r1, r2) {
        (Ok(w), Err(e)) => (w, e),
        (Err(e), Ok(w)) => (w, e),
        other => panic!("expected exactly one accept to succeed: {:?}", other),
    };
    assert!(matches!(loser, BidError::InvalidTransition { .. }));

    let bids = h.services.bids.bids_for_job(&job.id).await.unwrap();
    let accepted: Vec<_> = bids.iter().filter(|b| b.status == BidStatus::Accepted).collect();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].id, winner.id);
    assert!(bids
        .iter()
        .filter(|b| b.id != winner.id)
        .all(|b| b.status == BidStatus::Declined));
}

#[tokio::test]
async fn accept_races_with_decline() {
    let h = Harness::new();
    let job = h.job("Attic").await;
    let b1 = h.bid(&job, "contractor-1", 100).await;
    let b2 = h.bid(&job, "contractor-2", 90).await;

    let (accepted, declined) = tokio::join!(
        h.services.bids.accept(&b1.id),
        h.services.bids.decline(&b2.id)
    );

    // b2 ends declined either way; b1 is accepted only if its batch won.
    let bids = h.services.bids.bids_for_job(&job.id).await.unwrap();
    let b2_now = bids.iter().find(|b| b.id == b2.id).unwrap();
    assert_eq!(b2_now.status, BidStatus::Declined);
    if accepted.is_ok() {
        let b1_now = bids.iter().find(|b| b.id == b1.id).unwrap();
        assert_eq!(b1_now.status, BidStatus::Accepted);
    }
    assert!(accepted.is_ok() || declined.is_ok());
    assert!(bids.iter().filter(|b| b.status == BidStatus::Accepted).count() <= 1);
}

#[tokio::test]
async fn excluded_jobs_match_closing_bids() {
    let h = Harness::new();
    let open = h.job("Open job").await;
    let accepted = h.job("Accepted job").await;
    let completed = h.job("Completed job").await;
    let declined = h.job("Declined job").await;

    h.bid(&open, "contractor-1", 10).await;
    let a = h.bid(&accepted, "contractor-1", 10).await;
    let c = h.bid(&completed, "contractor-1", 10).await;
    let d = h.bid(&declined, "contractor-1", 10).await;

    h.services.bids.accept(&a.id).await.unwrap();
    h.services.bids.accept(&c.id).await.unwrap();
    h.services.bids.complete(&c.id).await.unwrap();
    h.services.bids.decline(&d.id).await.unwrap();

    let excluded = h.services.jobs.excluded_job_ids().await.unwrap();
    let expected: BTreeSet<String> = [accepted.id.clone(), completed.id.clone()].into();
    assert_eq!(excluded, expected);

    let open_ids: BTreeSet<String> = h
        .services
        .jobs
        .open_jobs()
        .await
        .unwrap()
        .into_iter()
        .map(|j| j.id)
        .collect();
    let expected: BTreeSet<String> = [open.id.clone(), declined.id.clone()].into();
    assert_eq!(open_ids, expected);
}
