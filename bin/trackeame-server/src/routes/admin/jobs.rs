use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use trackeame_core::store::JobStore;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::job::{JobListQuery, JobResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(list_jobs), components(schemas(JobResponse)))]
pub struct JobsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/jobs", get(list_jobs))
}

/// Inspect jobs by status. Failed jobs are kept with their last error.
#[utoipa::path(
    get,
    path = "/admin/jobs",
    tag = "admin",
    params(JobListQuery),
    responses(
        (status = 200, description = "Jobs, most recently updated first", body = Vec<JobResponse>),
        (status = 400, description = "Unknown status"),
        (status = 401, description = "Missing or wrong admin token"),
    )
)]
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<JobListQuery>,
) -> Result<Json<Vec<JobResponse>>, ServerError> {
    let status = query
        .status()
        .ok_or_else(|| ServerError::BadRequest(format!("unknown job status {:?}", query.status.as_deref().unwrap_or(""))))?;
    let jobs = state.store().list_jobs(Some(status), query.limit()).await?;
    Ok(Json(jobs.into_iter().map(Into::into).collect()))
}
