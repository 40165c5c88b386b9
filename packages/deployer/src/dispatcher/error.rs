use deployer_types::WorkerId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Unable to spawn worker {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("Worker {0} has no {1} pipe")]
    MissingPipe(WorkerId, &'static str),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatcherError {
    #[error("Dispatcher has stopped")]
    Stopped,

    #[error("No such worker: {0}")]
    UnknownWorker(WorkerId),
}
