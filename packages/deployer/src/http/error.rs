use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use deployer_types::{JobError, JobId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::dispatcher::DispatcherError;

pub type HttpResult<T> = Result<T, HttpError>;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("{0}")]
    Job(#[from] JobError),

    #[error("{0}")]
    Dispatcher(#[from] DispatcherError),

    #[error("No pending job {0}")]
    JobNotFound(JobId),

    #[error("Not found")]
    NotFound,
}

impl HttpError {
    pub fn status(&self) -> StatusCode {
        match self {
            HttpError::Job(JobError::ShuttingDown) => StatusCode::SERVICE_UNAVAILABLE,
            HttpError::Job(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            HttpError::Job(_) => StatusCode::INTERNAL_SERVER_ERROR,
            HttpError::Dispatcher(DispatcherError::Stopped) => StatusCode::SERVICE_UNAVAILABLE,
            HttpError::Dispatcher(DispatcherError::UnknownWorker(_)) => StatusCode::NOT_FOUND,
            HttpError::JobNotFound(_) | HttpError::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

/// Body of every failed request
#[derive(Serialize, Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    /// Present when the failure came from the job itself
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_error: Option<JobError>,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{self}");
        }

        let job_error = match &self {
            HttpError::Job(err) => Some(err.clone()),
            _ => None,
        };
        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            job_error,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            HttpError::from(JobError::unsupported_network("MARS_MAINNET")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            HttpError::from(JobError::invalid_payload("bad address")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            HttpError::from(JobError::ShuttingDown).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            HttpError::from(JobError::Timeout { seconds: 600 }).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            HttpError::from(DispatcherError::Stopped).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(HttpError::NotFound.status(), StatusCode::NOT_FOUND);
    }
}
