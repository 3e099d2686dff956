//! Notification routes
//!
//! A contractor's bid notifications: list, unread count, mark read.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::api::pagination::{Paginated, PaginationParams};
use crate::api::response::DataResponse;
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::notifications::{NotificationQuery, UnreadCountResponse};
use crate::error::{ApiError, ApiResult};

/// GET /notifications
pub async fn list_notifications(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<NotificationQuery>,
) -> ApiResult<impl IntoResponse> {
    let unread_only = filter.unread_only.unwrap_or(false);
    let notifications = state
        .services
        .notifications
        .list_for(&auth.user_id, unread_only)
        .await?;
    Ok(Paginated::from_all(notifications, &pagination))
}

/// GET /notifications/unread-count
pub async fn unread_count(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> ApiResult<impl IntoResponse> {
    let count = state
        .services
        .notifications
        .unread_count(&auth.user_id)
        .await?;
    Ok(DataResponse::new(UnreadCountResponse { count }))
}

/// POST /notifications/:notification_id/read
pub async fn mark_read(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(notification_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let notification = state
        .services
        .notifications
        .get(&notification_id)
        .await?;
    if notification.contractor_id != auth.user_id {
        return Err(ApiError::not_found("Notification not found"));
    }

    let changed = state
        .services
        .notifications
        .mark_read(&notification_id)
        .await?;
    Ok(Json(serde_json::json!({ "success": true, "changed": changed })))
}

/// POST /notifications/read-all
pub async fn mark_all_read(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> ApiResult<impl IntoResponse> {
    let count = state
        .services
        .notifications
        .mark_all_read(&auth.user_id)
        .await?;
    Ok(Json(serde_json::json!({ "success": true, "marked": count })))
}
