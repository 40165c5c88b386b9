//! The worker side of the pool: one process, one job at a time.
//!
//! A worker reads requests from its input pipe and answers on its output pipe.
//! It expects an `init` first, answers `ready`, and from then on runs each job it is
//! handed and reports a `jobComplete`. A job arriving while another is running is
//! answered with `rejected`, the dispatcher never does that on purpose.

pub mod runner;

use std::sync::Arc;

use deployer_types::{
    JobError, JobId, JobResult, WorkerRequest, WorkerResponse, WorkerSettings,
};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    task::JoinHandle,
};

use crate::wire::{write_message, MessageReader, WireError};
use runner::{DeploymentRunner, JobRunner};

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("{0}")]
    Wire(#[from] WireError),

    #[error("could not initialize worker: {0}")]
    Init(String),
}

/// Serves requests until told to shut down or the input pipe closes
pub async fn run_worker<R, W, F>(reader: R, mut writer: W, build_runner: F) -> Result<(), WorkerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    F: FnOnce(WorkerSettings) -> Result<Arc<dyn JobRunner>, WorkerError>,
{
    let mut messages = MessageReader::new(reader);

    let settings = loop {
        match messages.next::<WorkerRequest>().await? {
            Some(WorkerRequest::Init { settings }) => break *settings,
            Some(WorkerRequest::Job { job_id, .. }) => {
                tracing::warn!("Job {job_id} arrived before init");
                let rejected = WorkerResponse::Rejected {
                    job_id,
                    reason: "worker is not initialized".to_string(),
                };
                write_message(&mut writer, &rejected).await?;
            }
            Some(WorkerRequest::Shutdown) | None => return Ok(()),
        }
    };

    let runner = build_runner(settings)?;
    write_message(&mut writer, &WorkerResponse::Ready).await?;
    tracing::debug!("Worker ready");

    let mut running: Option<RunningJob> = None;

    loop {
        tokio::select! {
            message = messages.next::<WorkerRequest>() => match message? {
                Some(WorkerRequest::Job { job_id, payload }) => match &running {
                    Some(current) => {
                        tracing::error!("Job {job_id} arrived while job {} is running", current.job_id);
                        let rejected = WorkerResponse::Rejected {
                            job_id,
                            reason: format!("worker is busy with job {}", current.job_id),
                        };
                        write_message(&mut writer, &rejected).await?;
                    }
                    None => {
                        tracing::info!("Starting job {job_id}");
                        let runner = runner.clone();
                        running = Some(RunningJob {
                            job_id,
                            task: tokio::spawn(async move { runner.run(job_id, *payload).await }),
                        });
                    }
                },
                Some(WorkerRequest::Init { .. }) => {
                    tracing::warn!("Ignoring repeated init");
                }
                Some(WorkerRequest::Shutdown) => {
                    tracing::debug!("Shutdown requested");
                    break;
                }
                None => {
                    tracing::debug!("Input closed");
                    break;
                }
            },
            (job_id, outcome) = finished(&mut running) => {
                running = None;
                match &outcome {
                    Ok(_) => tracing::info!("Job {job_id} completed"),
                    Err(err) => tracing::warn!("Job {job_id} failed: {err}"),
                }
                write_message(&mut writer, &WorkerResponse::completed(job_id, outcome)).await?;
            }
        }
    }

    // dropping an unfinished job aborts it
    drop(running);
    Ok(())
}

/// Worker entry point over the process's own stdin and stdout
pub async fn run_stdio() -> Result<(), WorkerError> {
    run_worker(tokio::io::stdin(), tokio::io::stdout(), |settings| {
        Ok(Arc::new(DeploymentRunner::from_settings(settings)) as Arc<dyn JobRunner>)
    })
    .await
}

struct RunningJob {
    job_id: JobId,
    task: JoinHandle<Result<JobResult, JobError>>,
}

impl Drop for RunningJob {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn finished(running: &mut Option<RunningJob>) -> (JobId, Result<JobResult, JobError>) {
    let Some(job) = running else {
        return std::future::pending().await;
    };

    let outcome = match (&mut job.task).await {
        Ok(outcome) => outcome,
        Err(err) if err.is_panic() => {
            let panic = err.into_panic();
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(JobError::internal(format!("job panicked: {message}")))
        }
        Err(err) => Err(JobError::internal(err)),
    };

    (job.job_id, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mock::MockRunner;
    use deployer_types::JobPayload;
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

    struct Harness {
        requests: WriteHalf<DuplexStream>,
        responses: MessageReader<ReadHalf<DuplexStream>>,
        worker: JoinHandle<Result<(), WorkerError>>,
    }

    impl Harness {
        fn start(runner: MockRunner) -> Self {
            let (ours, theirs) = duplex(64 * 1024);
            let (their_reader, their_writer) = tokio::io::split(theirs);
            let (our_reader, our_writer) = tokio::io::split(ours);

            let runner = Arc::new(runner);
            let worker = tokio::spawn(run_worker(their_reader, their_writer, move |_| {
                Ok(runner as Arc<dyn JobRunner>)
            }));

            Self {
                requests: our_writer,
                responses: MessageReader::new(our_reader),
                worker,
            }
        }

        async fn send(&mut self, request: WorkerRequest) {
            write_message(&mut self.requests, &request).await.unwrap();
        }

        async fn recv(&mut self) -> WorkerResponse {
            tokio::time::timeout(Duration::from_secs(5), self.responses.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap()
        }

        async fn init(&mut self) {
            self.send(WorkerRequest::Init {
                settings: Box::default(),
            })
            .await;
            assert_eq!(self.recv().await, WorkerResponse::Ready);
        }
    }

    fn job(id: u64, token_name: &str) -> WorkerRequest {
        let payload: JobPayload = serde_json::from_value(json!({
            "chainName": "bsc",
            "deployedAddress": "0x5FbDB2315678afecb367f032d93F642f64180aa3",
            "tokenName": token_name
        }))
        .unwrap();

        WorkerRequest::Job {
            job_id: JobId::new(id),
            payload: Box::new(payload),
        }
    }

    #[tokio::test]
    async fn handshake_then_job() {
        let mut harness = Harness::start(MockRunner::new());
        harness.init().await;

        harness.send(job(7, "ok")).await;
        match harness.recv().await {
            WorkerResponse::JobComplete {
                job_id,
                success,
                result,
                error,
            } => {
                assert_eq!(job_id, JobId::new(7));
                assert!(success);
                assert!(result.is_some());
                assert!(error.is_none());
            }
            other => panic!("unexpected response {other:?}"),
        }

        harness.send(WorkerRequest::Shutdown).await;
        harness.worker.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn job_before_init_is_rejected() {
        let mut harness = Harness::start(MockRunner::new());

        harness.send(job(1, "ok")).await;
        assert!(matches!(
            harness.recv().await,
            WorkerResponse::Rejected { job_id, .. } if job_id == JobId::new(1)
        ));

        harness.init().await;
    }

    #[tokio::test]
    async fn second_job_is_rejected_while_busy() {
        let mut harness = Harness::start(MockRunner::new());
        harness.init().await;

        harness.send(job(1, "hang")).await;
        harness.send(job(2, "ok")).await;

        assert!(matches!(
            harness.recv().await,
            WorkerResponse::Rejected { job_id, .. } if job_id == JobId::new(2)
        ));
    }

    #[tokio::test]
    async fn panics_become_internal_errors() {
        let mut harness = Harness::start(MockRunner::new());
        harness.init().await;

        harness.send(job(3, "panic")).await;
        match harness.recv().await {
            WorkerResponse::JobComplete { success, error, .. } => {
                assert!(!success);
                assert!(matches!(error, Some(JobError::Internal { reason }) if reason.contains("panicked")));
            }
            other => panic!("unexpected response {other:?}"),
        }

        // the worker keeps serving
        harness.send(job(4, "ok")).await;
        assert!(matches!(
            harness.recv().await,
            WorkerResponse::JobComplete { success: true, .. }
        ));
    }

    #[tokio::test]
    async fn closed_input_stops_a_busy_worker() {
        let mut harness = Harness::start(MockRunner::new());
        harness.init().await;
        harness.send(job(1, "hang")).await;

        harness.requests.shutdown().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), harness.worker)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
