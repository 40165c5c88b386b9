/***
 *
 * The Dispatcher owns a fixed size pool of workers and a FIFO queue of jobs.
 *
 * It runs as a single task: submissions, status queries, worker events and timers all arrive
 * on channels and are handled one at a time, so the queue, the pending map and the id counters
 * never need a lock.
 *
 * A job is assigned to the lowest numbered idle worker, or queued when there is none. Whenever a
 * worker becomes idle the queue is drained onto it right away. A worker that dies is replaced
 * with a fresh one under a new id, and whatever job it was running is failed, never retried,
 * since a deployment may already have been broadcast.
 *
 ***/

pub mod error;
pub mod handle;
pub mod launcher;
pub mod pool;

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use deployer_types::{
    completion_into_result, JobError, JobId, JobPayload, JobResult, JobState, JobStatus,
    PoolStatus, WorkerId, WorkerRequest, WorkerResponse, WorkerSettings, WorkerState,
};
use tokio::{
    sync::{mpsc, oneshot},
    task::{AbortHandle, JoinHandle},
};
use tracing::instrument;

pub use error::{DispatcherError, LaunchError};
pub use handle::{DispatcherHandle, JobTicket, JobUpdate};
pub use launcher::{InProcessLauncher, ProcessLauncher, WorkerEvent, WorkerHandle, WorkerLauncher};

use handle::Command;
use pool::{WorkerPool, WorkerSlot};

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub pool_size: usize,
    /// `None` lets jobs run forever
    pub job_timeout: Option<Duration>,
    /// How long workers get to exit on shutdown before they are killed
    pub shutdown_grace: Duration,
    /// Pause before retrying a worker that failed to launch
    pub respawn_delay: Duration,
    pub settings: WorkerSettings,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            pool_size: 1,
            job_timeout: Some(Duration::from_secs(600)),
            shutdown_grace: Duration::from_secs(10),
            respawn_delay: Duration::from_secs(1),
            settings: WorkerSettings::default(),
        }
    }
}

struct PendingJob {
    payload: JobPayload,
    submitted_at: DateTime<Utc>,
    updates: mpsc::UnboundedSender<JobUpdate>,
    worker: Option<WorkerId>,
}

impl PendingJob {
    fn update(&self, update: JobUpdate) {
        // the submitter may have stopped listening, the job runs regardless
        let _ = self.updates.send(update);
    }
}

#[derive(Debug)]
enum Timer {
    JobDeadline { worker_id: WorkerId, job_id: JobId },
    Respawn,
    ForceKill,
}

pub struct Dispatcher {
    config: DispatcherConfig,
    launcher: Arc<dyn WorkerLauncher>,
    pool: WorkerPool,
    queue: VecDeque<JobId>,
    pending: HashMap<JobId, PendingJob>,
    next_job_id: u64,
    next_worker_id: u64,
    events_tx: mpsc::UnboundedSender<WorkerEvent>,
    events_rx: mpsc::UnboundedReceiver<WorkerEvent>,
    timers_tx: mpsc::UnboundedSender<Timer>,
    timers_rx: mpsc::UnboundedReceiver<Timer>,
    shutting_down: bool,
    shutdown_waiters: Vec<oneshot::Sender<()>>,
    force_kill: Option<AbortHandle>,
}

impl Dispatcher {
    /// Spawns the dispatcher task on the current runtime and launches the pool
    pub fn start(
        config: DispatcherConfig,
        launcher: Arc<dyn WorkerLauncher>,
    ) -> (DispatcherHandle, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (timers_tx, timers_rx) = mpsc::unbounded_channel();

        let dispatcher = Self {
            config,
            launcher,
            pool: WorkerPool::default(),
            queue: VecDeque::new(),
            pending: HashMap::new(),
            next_job_id: 0,
            next_worker_id: 0,
            events_tx,
            events_rx,
            timers_tx,
            timers_rx,
            shutting_down: false,
            shutdown_waiters: Vec::new(),
            force_kill: None,
        };

        let task = tokio::spawn(dispatcher.run(commands_rx));
        (DispatcherHandle::new(commands_tx), task)
    }

    #[instrument(level = "debug", skip(self, commands), fields(subsys = "Dispatcher"))]
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        tracing::info!("Starting {} workers", self.config.pool_size);
        for _ in 0..self.config.pool_size {
            self.spawn_worker();
        }

        let mut commands_open = true;

        while !(self.shutting_down && self.pool.is_empty()) {
            tokio::select! {
                biased;

                Some(event) = self.events_rx.recv() => self.on_worker_event(event),
                Some(timer) = self.timers_rx.recv() => self.on_timer(timer),
                command = commands.recv(), if commands_open => match command {
                    Some(command) => self.on_command(command),
                    None => {
                        // every handle is gone, nobody can submit or wait anymore
                        commands_open = false;
                        self.begin_shutdown();
                    }
                },
            }
        }

        // late shutdown requests still queued behind the exit
        commands.close();
        while let Ok(command) = commands.try_recv() {
            self.on_command(command);
        }

        if let Some(force_kill) = self.force_kill.take() {
            force_kill.abort();
        }
        for waiter in self.shutdown_waiters.drain(..) {
            let _ = waiter.send(());
        }
        tracing::info!("Dispatcher stopped, all workers exited");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Submit { payload, updates } => self.submit(*payload, updates),
            Command::JobStatus { job_id, reply } => {
                let _ = reply.send(self.job_status(job_id));
            }
            Command::PoolStatus { reply } => {
                let _ = reply.send(self.pool_status());
            }
            Command::KillWorker { worker_id, reply } => {
                let result = match self.pool.get_mut(worker_id) {
                    Some(slot) => {
                        tracing::warn!("Killing worker {worker_id} on request");
                        slot.kill();
                        Ok(())
                    }
                    None => Err(DispatcherError::UnknownWorker(worker_id)),
                };
                let _ = reply.send(result);
            }
            Command::Shutdown { done } => {
                if self.shutting_down && self.pool.is_empty() {
                    let _ = done.send(());
                } else {
                    self.shutdown_waiters.push(done);
                    self.begin_shutdown();
                }
            }
        }
    }

    fn submit(&mut self, payload: JobPayload, updates: mpsc::UnboundedSender<JobUpdate>) {
        let job_id = JobId::take_next(&mut self.next_job_id);

        let rejection = if self.shutting_down {
            Some(JobError::ShuttingDown)
        } else if self.config.settings.networks.get(&payload.chain_name).is_none() {
            Some(JobError::unsupported_network(&payload.chain_name))
        } else {
            payload.validate().err()
        };

        if let Some(err) = rejection {
            tracing::warn!("Rejected job {job_id}: {err}");
            let _ = updates.send(JobUpdate::Finished {
                job_id,
                outcome: Err(err),
            });
            return;
        }

        tracing::info!("Accepted job {job_id} for {}", payload.chain_name);
        self.pending.insert(
            job_id,
            PendingJob {
                payload,
                submitted_at: Utc::now(),
                updates,
                worker: None,
            },
        );
        self.queue.push_back(job_id);
        self.dispatch_queued();

        if let Some(position) = self.queue.iter().position(|id| *id == job_id) {
            tracing::debug!("Job {job_id} queued at position {position}");
            if let Some(job) = self.pending.get(&job_id) {
                job.update(JobUpdate::Queued { job_id, position });
            }
        }
    }

    /// Moves queued jobs onto idle workers until one of the two runs out
    fn dispatch_queued(&mut self) {
        if self.shutting_down {
            return;
        }

        while let Some(worker_id) = self.pool.first_idle() {
            let Some(job_id) = self.queue.pop_front() else {
                break;
            };
            self.assign(worker_id, job_id);
        }
    }

    fn assign(&mut self, worker_id: WorkerId, job_id: JobId) {
        let (Some(job), Some(slot)) = (self.pending.get_mut(&job_id), self.pool.get_mut(worker_id))
        else {
            tracing::error!("Cannot assign job {job_id} to worker {worker_id}");
            return;
        };

        let request = WorkerRequest::Job {
            job_id,
            payload: Box::new(job.payload.clone()),
        };
        if !slot.send(request) {
            tracing::warn!("Worker {worker_id} input is closed, requeueing job {job_id}");
            slot.kill();
            self.queue.push_front(job_id);
            return;
        }

        slot.state = WorkerState::Busy;
        slot.job = Some(job_id);
        if let Some(timeout) = self.config.job_timeout {
            let deadline = schedule(&self.timers_tx, timeout, Timer::JobDeadline { worker_id, job_id });
            slot.set_deadline(deadline);
        }

        job.worker = Some(worker_id);
        job.update(JobUpdate::Assigned { job_id, worker_id });
        tracing::info!("Assigned job {job_id} to worker {worker_id}");
    }

    /// Removes the job and hands its outcome to the submitter
    fn resolve(&mut self, job_id: JobId, outcome: Result<JobResult, JobError>) {
        self.queue.retain(|id| *id != job_id);

        match self.pending.remove(&job_id) {
            Some(job) => {
                match &outcome {
                    Ok(_) => tracing::info!("Job {job_id} completed"),
                    Err(err) => tracing::warn!("Job {job_id} failed: {err}"),
                }
                job.update(JobUpdate::Finished { job_id, outcome });
            }
            None => tracing::warn!("Outcome for unknown job {job_id} dropped"),
        }
    }

    fn on_worker_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Message {
                worker_id,
                response,
            } => self.on_worker_message(worker_id, response),
            WorkerEvent::Fault { worker_id, reason } => {
                tracing::error!("Worker {worker_id} channel error: {reason}");
                if let Some(slot) = self.pool.get_mut(worker_id) {
                    slot.kill();
                }
            }
            WorkerEvent::Exited { worker_id, detail } => self.on_worker_exit(worker_id, detail),
        }
    }

    fn on_worker_message(&mut self, worker_id: WorkerId, response: WorkerResponse) {
        let Some(slot) = self.pool.get_mut(worker_id) else {
            tracing::debug!("Message from retired worker {worker_id} ignored");
            return;
        };

        match response {
            WorkerResponse::Ready => match slot.state {
                WorkerState::Starting => {
                    tracing::debug!("Worker {worker_id} is ready");
                    slot.state = WorkerState::Idle;
                    self.dispatch_queued();
                }
                // asked to stop before it finished starting
                WorkerState::Stopping => {}
                state => tracing::warn!("Worker {worker_id} reported ready while {state:?}"),
            },
            WorkerResponse::JobComplete {
                job_id,
                success,
                result,
                error,
            } => {
                if slot.job != Some(job_id) || slot.state != WorkerState::Busy {
                    tracing::warn!(
                        "Worker {worker_id} completed job {job_id} it was not running, ignoring"
                    );
                    return;
                }
                slot.job = None;
                slot.clear_deadline();
                slot.state = if self.shutting_down {
                    WorkerState::Stopping
                } else {
                    WorkerState::Idle
                };

                self.resolve(job_id, completion_into_result(success, result, error));
                self.dispatch_queued();
            }
            WorkerResponse::Rejected { job_id, reason } => {
                tracing::error!("Worker {worker_id} rejected job {job_id}: {reason}");
                if slot.job == Some(job_id) {
                    slot.job = None;
                }
                // its view of the protocol is off, start over with a fresh one
                slot.kill();

                if let Some(job) = self.pending.get_mut(&job_id) {
                    if job.worker == Some(worker_id) {
                        job.worker = None;
                    }
                    if job.worker.is_none() && !self.queue.contains(&job_id) {
                        self.queue.push_front(job_id);
                    }
                }
                self.dispatch_queued();
            }
        }
    }

    fn on_worker_exit(&mut self, worker_id: WorkerId, detail: String) {
        let Some(slot) = self.pool.remove(worker_id) else {
            return;
        };

        let expected = slot.state == WorkerState::Stopping;
        if expected {
            tracing::info!("Worker {worker_id} exited: {detail}");
        } else {
            tracing::error!("Worker {worker_id} exited unexpectedly: {detail}");
        }

        if let Some(job_id) = slot.job {
            let err = if self.shutting_down {
                JobError::ShuttingDown
            } else {
                JobError::WorkerCrash {
                    worker_id,
                    detail: detail.clone(),
                }
            };
            self.resolve(job_id, Err(err));
        }

        if !self.shutting_down {
            self.spawn_worker();
        }
    }

    fn on_timer(&mut self, timer: Timer) {
        match timer {
            Timer::JobDeadline { worker_id, job_id } => {
                let Some(slot) = self.pool.get_mut(worker_id) else {
                    return;
                };
                if slot.job != Some(job_id) {
                    return;
                }

                let seconds = self.config.job_timeout.unwrap_or_default().as_secs();
                tracing::error!("Job {job_id} on worker {worker_id} timed out after {seconds}s");
                slot.job = None;
                slot.kill();
                self.resolve(job_id, Err(JobError::Timeout { seconds }));
            }
            Timer::Respawn => {
                if !self.shutting_down {
                    self.spawn_worker();
                }
            }
            Timer::ForceKill => {
                for slot in self.pool.iter_mut() {
                    tracing::warn!("Worker {} did not exit in time, killing it", slot.id);
                    slot.kill();
                }
            }
        }
    }

    fn spawn_worker(&mut self) {
        let worker_id = WorkerId::take_next(&mut self.next_worker_id);

        match self.launcher.launch(worker_id, self.events_tx.clone()) {
            Ok(handle) => {
                let slot = WorkerSlot::new(worker_id, handle);
                let init = WorkerRequest::Init {
                    settings: Box::new(self.config.settings.clone()),
                };
                if !slot.send(init) {
                    tracing::error!("Worker {worker_id} closed its input before init");
                }
                tracing::debug!("Launched worker {worker_id}");
                self.pool.insert(slot);
            }
            Err(err) => {
                tracing::error!(
                    "Failed to launch worker {worker_id}: {err}, retrying in {:?}",
                    self.config.respawn_delay
                );
                schedule(&self.timers_tx, self.config.respawn_delay, Timer::Respawn);
            }
        }
    }

    fn begin_shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        tracing::info!(
            "Shutting down {} workers, rejecting {} queued jobs",
            self.pool.len(),
            self.queue.len()
        );

        for job_id in std::mem::take(&mut self.queue) {
            self.resolve(job_id, Err(JobError::ShuttingDown));
        }

        for slot in self.pool.iter_mut() {
            match slot.state {
                WorkerState::Starting | WorkerState::Idle | WorkerState::Busy => {
                    if !slot.send(WorkerRequest::Shutdown) {
                        slot.kill();
                    }
                    slot.state = WorkerState::Stopping;
                }
                WorkerState::Stopping => {}
            }
        }

        self.force_kill = Some(schedule(
            &self.timers_tx,
            self.config.shutdown_grace,
            Timer::ForceKill,
        ));
    }

    fn job_status(&self, job_id: JobId) -> Option<JobStatus> {
        let job = self.pending.get(&job_id)?;
        let state = match job.worker {
            Some(worker_id) => JobState::Running { worker_id },
            None => JobState::Queued {
                position: self.queue.iter().position(|id| *id == job_id)?,
            },
        };

        Some(JobStatus {
            job_id,
            state,
            submitted_at: job.submitted_at,
        })
    }

    fn pool_status(&self) -> PoolStatus {
        PoolStatus {
            pool_size: self.config.pool_size,
            workers: self.pool.statuses(),
            queued: self.queue.len(),
            pending: self.pending.len(),
            shutting_down: self.shutting_down,
        }
    }
}

fn schedule(timers: &mpsc::UnboundedSender<Timer>, after: Duration, timer: Timer) -> AbortHandle {
    let timers = timers.clone();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        let _ = timers.send(timer);
    })
    .abort_handle()
}
