//! Contractor profile routes

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use std::sync::Arc;

use crate::api::response::DataResponse;
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::profiles::RatingResponse;
use crate::error::ApiResult;

/// GET /contractors/:contractor_id/rating
pub async fn get_rating(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(contractor_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let rating = state.services.ratings.rating_for(&contractor_id).await?;
    Ok(DataResponse::new(RatingResponse {
        contractor_id,
        rating,
    }))
}
