use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use deployer_types::{JobId, JobPayload, JobResult};
use serde::{Deserialize, Serialize};
use utils::http::UserClaims;
use utoipa::ToSchema;

use crate::http::{error::HttpResult, state::HttpState};

#[derive(Serialize, Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyContractResponse {
    pub success: bool,
    pub contract_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_tx: Option<String>,
    pub network: String,
    /// `"success"`, `"failed: <reason>"`, or null when the network has no explorer key
    pub verification_result: Option<String>,
}

impl From<JobResult> for VerifyContractResponse {
    fn from(result: JobResult) -> Self {
        Self {
            success: result.success,
            contract_address: result.deployed_address.to_string(),
            deployment_tx: result.deployment_tx.map(|tx| tx.to_string()),
            network: result.network,
            verification_result: result.verification_result.map(|v| v.to_string()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobResponse {
    #[schema(value_type = u64)]
    pub job_id: JobId,
}

#[utoipa::path(
    post,
    path = "/verify-contract",
    request_body = JobPayload,
    responses(
        (status = 200, description = "Job completed, verification outcome included", body = VerifyContractResponse),
        (status = 400, description = "Unsupported network or invalid payload"),
        (status = 401, description = "Missing or invalid token, when auth is configured"),
        (status = 500, description = "Deployment failed, the worker crashed or the job timed out"),
        (status = 503, description = "Server is shutting down")
    ),
    description = "Deploys (when an artifact is given) and verifies a contract, waiting for the outcome"
)]
#[axum::debug_handler]
pub async fn handle_verify_contract(
    State(state): State<HttpState>,
    claims: Option<Extension<UserClaims>>,
    Json(payload): Json<JobPayload>,
) -> impl IntoResponse {
    match verify_contract_inner(state, attribute(payload, claims)).await {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn verify_contract_inner(
    state: HttpState,
    payload: JobPayload,
) -> HttpResult<VerifyContractResponse> {
    let result = state.dispatcher.submit_job(payload).await?;
    Ok(result.into())
}

#[utoipa::path(
    post,
    path = "/jobs",
    request_body = JobPayload,
    responses(
        (status = 202, description = "Job accepted, poll /job/{job_id} for progress", body = SubmitJobResponse),
        (status = 400, description = "Unsupported network or invalid payload"),
        (status = 401, description = "Missing or invalid token, when auth is configured"),
        (status = 503, description = "Server is shutting down")
    ),
    description = "Submits a job without waiting for it to finish"
)]
#[axum::debug_handler]
pub async fn handle_submit_job(
    State(state): State<HttpState>,
    claims: Option<Extension<UserClaims>>,
    Json(payload): Json<JobPayload>,
) -> impl IntoResponse {
    match submit_job_inner(state, attribute(payload, claims)).await {
        Ok(resp) => (StatusCode::ACCEPTED, Json(resp)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn submit_job_inner(state: HttpState, payload: JobPayload) -> HttpResult<SubmitJobResponse> {
    let job_id = state.dispatcher.submit_job(payload).accepted().await?;
    Ok(SubmitJobResponse { job_id })
}

/// The token's user replaces whatever the body claimed
fn attribute(mut payload: JobPayload, claims: Option<Extension<UserClaims>>) -> JobPayload {
    if let Some(Extension(claims)) = claims {
        payload.user_id = Some(claims.id);
    }
    tracing::info!(
        "Job request from {} for {} on {}",
        payload.user_id.as_deref().unwrap_or("an anonymous caller"),
        payload.token_name,
        payload.chain_name
    );
    payload
}
