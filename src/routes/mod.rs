pub mod bids;
pub mod health;
pub mod jobs;
pub mod notifications;
pub mod profiles;

use axum::{routing::get, routing::post, Router};
use std::sync::Arc;

use crate::app::AppState;

/// Build the API router with all routes
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Public routes
        .route("/health", get(health::health_check))
        // Jobs
        .route("/jobs", post(jobs::create_job))
        .route("/jobs/open", get(jobs::list_open_jobs))
        .route("/jobs/excluded", get(jobs::list_excluded_jobs))
        .route("/jobs/:job_id", get(jobs::get_job))
        // Bids (nested under jobs)
        .route("/jobs/:job_id/bids", post(bids::place_bid))
        .route("/jobs/:job_id/bids", get(bids::list_job_bids))
        .route("/me/bids", get(bids::list_my_bids))
        // Bid transitions
        .route("/bids/:bid_id", get(bids::get_bid))
        .route("/bids/:bid_id/accept", post(bids::accept_bid))
        .route("/bids/:bid_id/decline", post(bids::decline_bid))
        .route("/bids/:bid_id/complete", post(bids::complete_bid))
        .route("/bids/:bid_id/review", post(bids::review_bid))
        .route("/bids/:bid_id/rating", post(bids::rate_bid))
        // Notifications
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route(
            "/notifications/:notification_id/read",
            post(notifications::mark_read),
        )
        // Contractors
        .route("/contractors/:contractor_id/rating", get(profiles::get_rating))
}
