use std::future::IntoFuture;

use deployer_types::{JobError, JobId, JobPayload, JobResult, JobStatus, PoolStatus, WorkerId};
use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};

use super::error::DispatcherError;

pub(super) enum Command {
    Submit {
        payload: Box<JobPayload>,
        updates: mpsc::UnboundedSender<JobUpdate>,
    },
    JobStatus {
        job_id: JobId,
        reply: oneshot::Sender<Option<JobStatus>>,
    },
    PoolStatus {
        reply: oneshot::Sender<PoolStatus>,
    },
    KillWorker {
        worker_id: WorkerId,
        reply: oneshot::Sender<Result<(), DispatcherError>>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// Progress of one job, in order. `Finished` is always the last update.
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdate {
    Queued {
        job_id: JobId,
        position: usize,
    },
    Assigned {
        job_id: JobId,
        worker_id: WorkerId,
    },
    Finished {
        job_id: JobId,
        outcome: Result<JobResult, JobError>,
    },
}

impl JobUpdate {
    pub fn job_id(&self) -> JobId {
        match self {
            JobUpdate::Queued { job_id, .. }
            | JobUpdate::Assigned { job_id, .. }
            | JobUpdate::Finished { job_id, .. } => *job_id,
        }
    }
}

/// Cheap to clone, talks to the dispatcher task
#[derive(Clone)]
pub struct DispatcherHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl DispatcherHandle {
    pub(super) fn new(commands: mpsc::UnboundedSender<Command>) -> Self {
        Self { commands }
    }

    /// Never blocks and never fails here: every outcome, rejection included, arrives on the ticket
    pub fn submit_job(&self, payload: JobPayload) -> JobTicket {
        let (updates, receiver) = mpsc::unbounded_channel();

        // if the dispatcher is gone the sender is dropped with the command
        // and the ticket resolves to ShuttingDown
        let _ = self.commands.send(Command::Submit {
            payload: Box::new(payload),
            updates,
        });

        JobTicket::new(receiver)
    }

    /// `None` once the job has completed, or if it never existed
    pub async fn job_status(&self, job_id: JobId) -> Result<Option<JobStatus>, DispatcherError> {
        self.request(|reply| Command::JobStatus { job_id, reply })
            .await
    }

    pub async fn pool_status(&self) -> Result<PoolStatus, DispatcherError> {
        self.request(|reply| Command::PoolStatus { reply }).await
    }

    /// Kills a worker as if it had crashed
    pub async fn kill_worker(&self, worker_id: WorkerId) -> Result<(), DispatcherError> {
        self.request(|reply| Command::KillWorker { worker_id, reply })
            .await?
    }

    /// Resolves once every worker has exited. Returns at once if the dispatcher already stopped.
    pub async fn shutdown(&self) {
        let (done, finished) = oneshot::channel();
        if self.commands.send(Command::Shutdown { done }).is_ok() {
            let _ = finished.await;
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, DispatcherError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| DispatcherError::Stopped)?;
        response.await.map_err(|_| DispatcherError::Stopped)
    }
}

/// The submitter's end of a job.
/// Awaiting it yields the final outcome; [`JobTicket::accepted`] returns as soon as the job is queued or running.
pub struct JobTicket {
    updates: mpsc::UnboundedReceiver<JobUpdate>,
    job_id: Option<JobId>,
    finished: Option<Result<JobResult, JobError>>,
}

impl JobTicket {
    fn new(updates: mpsc::UnboundedReceiver<JobUpdate>) -> Self {
        Self {
            updates,
            job_id: None,
            finished: None,
        }
    }

    /// Known after the first update
    pub fn job_id(&self) -> Option<JobId> {
        self.job_id
    }

    pub async fn next_update(&mut self) -> Option<JobUpdate> {
        let update = self.updates.recv().await?;
        self.job_id = Some(update.job_id());
        if let JobUpdate::Finished { outcome, .. } = &update {
            self.finished = Some(outcome.clone());
        }
        Some(update)
    }

    /// The job id once the dispatcher has taken the job, or the reason it refused it
    pub async fn accepted(&mut self) -> Result<JobId, JobError> {
        if let Some(job_id) = self.job_id {
            return match &self.finished {
                Some(Err(err)) => Err(err.clone()),
                _ => Ok(job_id),
            };
        }

        match self.next_update().await {
            Some(JobUpdate::Finished {
                outcome: Err(err), ..
            }) => Err(err),
            Some(update) => Ok(update.job_id()),
            None => Err(self.closed_error()),
        }
    }

    pub async fn wait(mut self) -> Result<JobResult, JobError> {
        loop {
            if let Some(outcome) = self.finished.take() {
                return outcome;
            }
            if self.next_update().await.is_none() {
                return Err(self.closed_error());
            }
        }
    }

    fn closed_error(&self) -> JobError {
        match self.job_id {
            // never reached the dispatcher
            None => JobError::ShuttingDown,
            Some(job_id) => JobError::internal(format!("dispatcher dropped job {job_id}")),
        }
    }
}

impl IntoFuture for JobTicket {
    type Output = Result<JobResult, JobError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}
