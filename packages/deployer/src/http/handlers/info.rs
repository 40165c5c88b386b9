use axum::{extract::State, response::IntoResponse, Json};
use deployer_types::PoolStatus;

use crate::http::{error::HttpResult, state::HttpState};

#[utoipa::path(
    get,
    path = "/info",
    responses(
        (status = 200, description = "Current state of the worker pool", body = PoolStatus),
        (status = 503, description = "Dispatcher has stopped")
    ),
    description = "Pool size, each worker's state and current job, and queue depth"
)]
#[axum::debug_handler]
pub async fn handle_info(State(state): State<HttpState>) -> impl IntoResponse {
    match inner_handle_info(state).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn inner_handle_info(state: HttpState) -> HttpResult<PoolStatus> {
    Ok(state.dispatcher.pool_status().await?)
}
