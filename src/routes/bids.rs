//! Bid routes
//!
//! Contractors place bids; the job's homeowner accepts, declines, completes,
//! reviews and rates them.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::api::pagination::{Paginated, PaginationParams};
use crate::api::response::{Created, DataResponse};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::bids::{Bid, PlaceBidRequest, RatingRequest, ReviewRequest};
use crate::error::{ApiError, ApiResult};

/// Load a bid and make sure the caller is the homeowner it was placed with.
async fn homeowner_bid(state: &AppState, auth: &RequireAuth, bid_id: &str) -> ApiResult<Bid> {
    let bid = state.services.bids.get_bid(bid_id).await?;
    if bid.homeowner_id != auth.user_id {
        return Err(ApiError::forbidden("Only the job's homeowner can manage this bid"));
    }
    Ok(bid)
}

/// POST /jobs/:job_id/bids
///
/// Place a bid on a job as the calling contractor.
pub async fn place_bid(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    Json(req): Json<PlaceBidRequest>,
) -> ApiResult<impl IntoResponse> {
    tracing::info!(
        user_id = %auth.user_id,
        job_id = %job_id,
        price = %req.price,
        "Placing bid"
    );

    let job = state.services.jobs.get_job(&job_id).await?;
    let bid = state.services.bids.place_bid_as(&auth.0, &job, req).await?;

    Ok(Created::at(format!("/bids/{}", bid.id), bid))
}

/// GET /jobs/:job_id/bids
///
/// List bids on a job. Only the job's homeowner sees them.
pub async fn list_job_bids(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<impl IntoResponse> {
    let job = state.services.jobs.get_job(&job_id).await?;
    if job.homeowner_id != auth.user_id {
        return Err(ApiError::forbidden("Only the job's homeowner can view all bids"));
    }

    let bids = state.services.bids.bids_for_job(&job_id).await?;
    Ok(Paginated::from_all(bids, &pagination))
}

/// GET /me/bids
pub async fn list_my_bids(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<impl IntoResponse> {
    let bids = state
        .services
        .bids
        .bids_for_contractor(&auth.user_id)
        .await?;
    Ok(Paginated::from_all(bids, &pagination))
}

/// GET /bids/:bid_id
pub async fn get_bid(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(bid_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let bid = state.services.bids.get_bid(&bid_id).await?;
    if !bid.is_participant(&auth.user_id) {
        return Err(ApiError::not_found("Bid not found"));
    }
    Ok(DataResponse::new(bid))
}

/// POST /bids/:bid_id/accept
pub async fn accept_bid(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(bid_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    homeowner_bid(&state, &auth, &bid_id).await?;
    let bid = state.services.bids.accept(&bid_id).await?;
    Ok(DataResponse::new(bid))
}

/// POST /bids/:bid_id/decline
pub async fn decline_bid(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(bid_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    homeowner_bid(&state, &auth, &bid_id).await?;
    let bid = state.services.bids.decline(&bid_id).await?;
    Ok(DataResponse::new(bid))
}

/// POST /bids/:bid_id/complete
pub async fn complete_bid(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(bid_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let bid = state.services.bids.complete_as(&auth.0, &bid_id).await?;
    Ok(DataResponse::new(bid))
}

/// POST /bids/:bid_id/review
pub async fn review_bid(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(bid_id): Path<String>,
    Json(req): Json<ReviewRequest>,
) -> ApiResult<impl IntoResponse> {
    homeowner_bid(&state, &auth, &bid_id).await?;
    let stored = state
        .services
        .bids
        .attach_review(&bid_id, &req.review)
        .await?;
    Ok(Json(serde_json::json!({ "stored": stored })))
}

/// POST /bids/:bid_id/rating
pub async fn rate_bid(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(bid_id): Path<String>,
    Json(req): Json<RatingRequest>,
) -> ApiResult<impl IntoResponse> {
    homeowner_bid(&state, &auth, &bid_id).await?;
    let aggregate = state
        .services
        .bids
        .attach_rating(&bid_id, req.rating)
        .await?;
    Ok(Json(serde_json::json!({
        "stored": aggregate.is_some(),
        "contractor_rating": aggregate,
    })))
}
