//! One worker of the pool. Speaks newline delimited JSON on stdin/stdout, logs to stderr.

use std::process::ExitCode;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> ExitCode {
    // stdout carries the protocol, so logs must never go there
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .without_time()
                .with_target(false),
        )
        .with(EnvFilter::from_default_env())
        .try_init();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("contract-deployer-worker: {err}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(contract_deployer::worker::run_stdio());
    // a blocking stdin read may still be parked, don't wait for it
    runtime.shutdown_background();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("Worker failed: {err}");
            ExitCode::FAILURE
        }
    }
}
