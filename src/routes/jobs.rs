//! Job routes
//!
//! Posting jobs and the listings derived from their bids.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::{Created, DataResponse};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::jobs::{CreateJobRequest, Job, JobStatus};
use crate::error::ApiResult;

#[derive(Debug, Serialize)]
pub struct JobResponse {
    #[serde(flatten)]
    pub job: Job,
    pub status: JobStatus,
}

/// POST /jobs
///
/// Post a job as the calling homeowner.
pub async fn create_job(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateJobRequest>,
) -> ApiResult<impl IntoResponse> {
    let job = state.services.jobs.create_job(&auth.user_id, req).await?;
    let location = format!("/jobs/{}", job.id);
    Ok(Created::at(
        location,
        JobResponse {
            job,
            status: JobStatus::Open,
        },
    ))
}

/// GET /jobs/:job_id
pub async fn get_job(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job = state.services.jobs.get_job(&job_id).await?;
    let status = state.services.jobs.job_status(&job_id).await?;
    Ok(DataResponse::new(JobResponse { job, status }))
}

/// GET /jobs/open
///
/// Jobs without an accepted or completed bid, newest first.
pub async fn list_open_jobs(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> ApiResult<impl IntoResponse> {
    let jobs = state.services.jobs.open_jobs().await?;
    Ok(DataResponse::new(jobs))
}

/// GET /jobs/excluded
pub async fn list_excluded_jobs(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> ApiResult<impl IntoResponse> {
    let excluded = state.services.jobs.excluded_job_ids().await?;
    Ok(DataResponse::new(excluded))
}
