use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::WorkerId;

/// Why a job was rejected.
/// Verification failures are not here: they are reported inside a successful `JobResult`.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum JobError {
    #[error("Unsupported network: {network}")]
    UnsupportedNetwork { network: String },

    #[error("Invalid payload: {reason}")]
    InvalidPayload { reason: String },

    #[error("Deployment failed: {reason}")]
    Deployment { reason: String },

    #[error("Worker {worker_id} exited while running the job: {detail}")]
    WorkerCrash { worker_id: WorkerId, detail: String },

    #[error("Job timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Dispatcher is shutting down")]
    ShuttingDown,

    #[error("Internal error: {reason}")]
    Internal { reason: String },
}

impl JobError {
    pub fn unsupported_network(network: impl ToString) -> Self {
        Self::UnsupportedNetwork {
            network: network.to_string(),
        }
    }

    pub fn invalid_payload(reason: impl ToString) -> Self {
        Self::InvalidPayload {
            reason: reason.to_string(),
        }
    }

    pub fn deployment(reason: impl ToString) -> Self {
        Self::Deployment {
            reason: reason.to_string(),
        }
    }

    pub fn internal(reason: impl ToString) -> Self {
        Self::Internal {
            reason: reason.to_string(),
        }
    }

    /// Rejections that are the caller's fault rather than the system's
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            JobError::UnsupportedNetwork { .. } | JobError::InvalidPayload { .. }
        )
    }
}

pub trait JobResultExt<T> {
    fn or_deployment_error(self) -> Result<T, JobError>;
}

impl<T, E: std::fmt::Display> JobResultExt<T> for Result<T, E> {
    fn or_deployment_error(self) -> Result<T, JobError> {
        self.map_err(JobError::deployment)
    }
}
