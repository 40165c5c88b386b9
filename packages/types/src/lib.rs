mod credential;
mod error;
mod id;
mod job;
mod network;
mod protocol;
mod status;

pub use credential::Credential;
pub use error::{JobError, JobResultExt};
pub use id::{ChainName, IDError, JobId, WorkerId};
pub use job::{ContractArtifact, JobPayload, JobResult, VerificationOutcome};
pub use network::{NetworkConfig, NetworkTable, VerificationSettings};
pub use protocol::{completion_into_result, WorkerRequest, WorkerResponse, WorkerSettings};
pub use status::{JobState, JobStatus, PoolStatus, WorkerState, WorkerStatus};
