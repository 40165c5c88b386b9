use std::process::ExitCode;

use clap::Parser;
use contract_deployer::{args::CliArgs, config::Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utils::{
    config::{ConfigBuilder, ConfigExt},
    context::AppContext,
};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("contract-deployer: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let config: Config = ConfigBuilder::new(args).build()?;

    let ctx = AppContext::new()?;

    // setup tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_target(false),
        )
        .with(config.tracing_env_filter()?)
        .try_init()?;

    tracing::info!(
        "Starting contract-deployer with {} workers, timeout {}s",
        config.workers,
        config.job_timeout_secs
    );

    contract_deployer::run_server(ctx, config)
}
