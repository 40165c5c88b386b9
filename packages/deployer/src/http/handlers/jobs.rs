use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use deployer_types::{JobId, JobStatus};

use crate::http::{
    error::{HttpError, HttpResult},
    state::HttpState,
};

#[utoipa::path(
    get,
    path = "/job/{job_id}",
    params(
        ("job_id" = u64, Path, description = "Id returned when the job was submitted")
    ),
    responses(
        (status = 200, description = "Job is queued or running", body = JobStatus),
        (status = 401, description = "Missing or invalid token, when auth is configured"),
        (status = 404, description = "No such job, or it already completed")
    ),
    description = "Where a pending job is: its queue position or the worker running it"
)]
#[axum::debug_handler]
pub async fn handle_job_status(
    State(state): State<HttpState>,
    Path(job_id): Path<JobId>,
) -> impl IntoResponse {
    match job_status_inner(&state, job_id).await {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn job_status_inner(state: &HttpState, job_id: JobId) -> HttpResult<JobStatus> {
    state
        .dispatcher
        .job_status(job_id)
        .await?
        .ok_or(HttpError::JobNotFound(job_id))
}
