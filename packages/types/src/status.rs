use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{JobId, WorkerId};

/// Where a submitted, not yet finished job currently is
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: JobId,
    #[serde(flatten)]
    pub state: JobState,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(tag = "state", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum JobState {
    /// Waiting for an idle worker; position 0 is next in line
    Queued { position: usize },
    Running { worker_id: WorkerId },
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum WorkerState {
    /// Launched, waiting for the worker to report ready
    Starting,
    Idle,
    Busy,
    /// Asked to exit, or killed and waiting for the exit to be observed
    Stopping,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    pub id: WorkerId,
    pub state: WorkerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
}

/// A snapshot of the worker pool
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    pub pool_size: usize,
    pub workers: Vec<WorkerStatus>,
    pub queued: usize,
    /// Submitted and not yet completed, queued jobs included
    pub pending: usize,
    pub shutting_down: bool,
}

impl PoolStatus {
    pub fn busy(&self) -> usize {
        self.count(WorkerState::Busy)
    }

    pub fn idle(&self) -> usize {
        self.count(WorkerState::Idle)
    }

    fn count(&self, state: WorkerState) -> usize {
        self.workers.iter().filter(|w| w.state == state).count()
    }
}
