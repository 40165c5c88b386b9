//! Starting workers and turning everything they do into [`WorkerEvent`]s.
//!
//! Both launchers wire a worker up the same way: a writer task owns the worker's input,
//! a reader task decodes its output, and a supervisor reports the exit once the reader
//! has drained. Events for one worker therefore always end with exactly one `Exited`.

use std::{path::PathBuf, process::Stdio, sync::Arc, time::Duration};

use deployer_types::{WorkerId, WorkerRequest, WorkerResponse, WorkerSettings};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    process::{Child, Command},
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use super::error::LaunchError;
use crate::{
    wire::{write_message, MessageReader},
    worker::{run_worker, runner::JobRunner, WorkerError},
};

/// How long the supervisor waits for buffered output after the worker is gone
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum WorkerEvent {
    Message {
        worker_id: WorkerId,
        response: WorkerResponse,
    },
    /// The pipe to or from the worker broke while it may still be running
    Fault { worker_id: WorkerId, reason: String },
    Exited { worker_id: WorkerId, detail: String },
}

/// The dispatcher's side of one worker. Dropping it kills the worker.
pub struct WorkerHandle {
    requests: mpsc::UnboundedSender<WorkerRequest>,
    kill: Option<oneshot::Sender<()>>,
}

impl WorkerHandle {
    pub fn new(requests: mpsc::UnboundedSender<WorkerRequest>, kill: oneshot::Sender<()>) -> Self {
        Self {
            requests,
            kill: Some(kill),
        }
    }

    /// False once the worker's input is gone
    pub fn send(&self, request: WorkerRequest) -> bool {
        self.requests.send(request).is_ok()
    }

    pub fn kill(&mut self) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
    }
}

pub trait WorkerLauncher: Send + Sync {
    /// Starts a worker whose events go to `events`. Must be called within a tokio runtime.
    fn launch(
        &self,
        worker_id: WorkerId,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Result<WorkerHandle, LaunchError>;
}

/// Spawns the reader and writer tasks for a worker's pipes.
/// Returns the request sender and the reader task, which ends when the worker's output closes.
pub fn attach_pipes<R, W>(
    worker_id: WorkerId,
    reader: R,
    mut writer: W,
    events: mpsc::UnboundedSender<WorkerEvent>,
) -> (mpsc::UnboundedSender<WorkerRequest>, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (requests_tx, mut requests_rx) = mpsc::unbounded_channel::<WorkerRequest>();

    tokio::spawn({
        let events = events.clone();
        async move {
            while let Some(request) = requests_rx.recv().await {
                let is_shutdown = matches!(request, WorkerRequest::Shutdown);
                if let Err(err) = write_message(&mut writer, &request).await {
                    let _ = events.send(WorkerEvent::Fault {
                        worker_id,
                        reason: format!("write failed: {err}"),
                    });
                    break;
                }
                if is_shutdown {
                    break;
                }
            }
            let _ = writer.shutdown().await;
        }
    });

    let reader_task = tokio::spawn(async move {
        let mut messages = MessageReader::new(reader);
        loop {
            match messages.next::<WorkerResponse>().await {
                Ok(Some(response)) => {
                    let _ = events.send(WorkerEvent::Message {
                        worker_id,
                        response,
                    });
                }
                Ok(None) => break,
                Err(err) => {
                    let _ = events.send(WorkerEvent::Fault {
                        worker_id,
                        reason: format!("read failed: {err}"),
                    });
                    break;
                }
            }
        }
    });

    (requests_tx, reader_task)
}

async fn drain_reader(worker_id: WorkerId, mut reader_task: JoinHandle<()>) {
    if tokio::time::timeout(READER_DRAIN_TIMEOUT, &mut reader_task)
        .await
        .is_err()
    {
        tracing::warn!("Output of worker {worker_id} still open after exit, dropping it");
        reader_task.abort();
    }
}

/// Runs each worker as a child process of the `contract-deployer-worker` binary
pub struct ProcessLauncher {
    program: PathBuf,
    log_filter: String,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, log_filter: impl ToString) -> Self {
        Self {
            program: program.into(),
            log_filter: log_filter.to_string(),
        }
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(
        &self,
        worker_id: WorkerId,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Result<WorkerHandle, LaunchError> {
        let mut child = Command::new(&self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .env("RUST_LOG", &self.log_filter)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or(LaunchError::MissingPipe(worker_id, "stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(LaunchError::MissingPipe(worker_id, "stdout"))?;

        tracing::debug!("Spawned worker {worker_id} as pid {:?}", child.id());

        let (requests, reader_task) = attach_pipes(worker_id, stdout, stdin, events.clone());
        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(supervise_process(worker_id, child, kill_rx, reader_task, events));

        Ok(WorkerHandle::new(requests, kill_tx))
    }
}

async fn supervise_process(
    worker_id: WorkerId,
    mut child: Child,
    kill: oneshot::Receiver<()>,
    reader_task: JoinHandle<()>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    // a dropped handle counts as a kill
    let detail = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => status.to_string(),
            Err(err) => format!("wait failed: {err}"),
        },
        _ = kill => match child.kill().await {
            Ok(()) => "killed".to_string(),
            Err(err) => format!("kill failed: {err}"),
        },
    };

    drain_reader(worker_id, reader_task).await;
    let _ = events.send(WorkerEvent::Exited { worker_id, detail });
}

type RunnerFactory =
    dyn Fn(WorkerSettings) -> Result<Arc<dyn JobRunner>, WorkerError> + Send + Sync;

/// Runs the worker loop on a tokio task over in-memory pipes
#[derive(Clone)]
pub struct InProcessLauncher {
    factory: Arc<RunnerFactory>,
}

impl InProcessLauncher {
    pub fn new(
        factory: impl Fn(WorkerSettings) -> Result<Arc<dyn JobRunner>, WorkerError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            factory: Arc::new(factory),
        }
    }

    /// Every worker shares the same runner
    pub fn with_runner(runner: Arc<dyn JobRunner>) -> Self {
        Self::new(move |_| Ok(runner.clone()))
    }
}

impl WorkerLauncher for InProcessLauncher {
    fn launch(
        &self,
        worker_id: WorkerId,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Result<WorkerHandle, LaunchError> {
        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        let (our_reader, our_writer) = tokio::io::split(ours);
        let (their_reader, their_writer) = tokio::io::split(theirs);

        let factory = self.factory.clone();
        let worker = tokio::spawn(async move {
            run_worker(their_reader, their_writer, move |settings| factory(settings)).await
        });

        let (requests, reader_task) = attach_pipes(worker_id, our_reader, our_writer, events.clone());
        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(supervise_task(worker_id, worker, kill_rx, reader_task, events));

        Ok(WorkerHandle::new(requests, kill_tx))
    }
}

async fn supervise_task(
    worker_id: WorkerId,
    mut worker: JoinHandle<Result<(), WorkerError>>,
    kill: oneshot::Receiver<()>,
    reader_task: JoinHandle<()>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    let outcome = tokio::select! {
        outcome = &mut worker => outcome,
        _ = kill => {
            worker.abort();
            worker.await
        }
    };

    let detail = match outcome {
        Ok(Ok(())) => "exited".to_string(),
        Ok(Err(err)) => format!("failed: {err}"),
        Err(err) if err.is_cancelled() => "killed".to_string(),
        Err(_) => "panicked".to_string(),
    };

    drain_reader(worker_id, reader_task).await;
    let _ = events.send(WorkerEvent::Exited { worker_id, detail });
}
