pub mod args;
pub mod config;
pub mod deployment;
pub mod dispatcher; // where the worker pool and the job queue live
pub mod http;
pub mod test_utils;
pub mod verification;
pub mod wire;
pub mod worker; // what runs inside each worker process

use std::sync::Arc;

use config::Config;
use dispatcher::{Dispatcher, ProcessLauncher};
use utils::context::AppContext;

/// Entry point to start up the whole server
/// Called from main and end-to-end tests
pub fn run_server(ctx: AppContext, config: Config) -> anyhow::Result<()> {
    let _ = ctrlc::set_handler({
        let ctx = ctx.clone();
        move || {
            ctx.kill();
        }
    });

    ctx.clone().block_on(async move {
        let launcher = ProcessLauncher::new(config.worker_binary()?, config.worker_log_filter());
        let (dispatcher, dispatcher_task) =
            Dispatcher::start(config.dispatcher_config()?, Arc::new(launcher));

        // the http server stops taking requests first, then the pool winds down
        let stopper = tokio::spawn({
            let ctx = ctx.clone();
            let dispatcher = dispatcher.clone();
            async move {
                ctx.wait_killed().await;
                dispatcher.shutdown().await;
            }
        });

        let served = http::server::serve(ctx.clone(), config, dispatcher).await;
        if let Err(err) = &served {
            tracing::error!("Http server failed: {err:?}");
        }
        ctx.kill();

        stopper.await?;
        dispatcher_task.await?;
        served
    })
}

// the test version of init_tracing does not take a config
// since config itself is tested and modified from different parallel tests
// therefore, this only uses the default tracing settings
// it's not gated out because it is used in integration tests as well
pub fn init_tracing_tests() {
    use std::sync::LazyLock;

    // however, it has an extra complexity of race conditions across threads
    // so we use a Mutex to ensure we only initialize once globally
    static INIT: LazyLock<std::sync::Mutex<bool>> = LazyLock::new(|| std::sync::Mutex::new(false));

    let mut init = INIT.lock().unwrap();

    if !*init {
        *init = true;

        // try_init, since another test harness may already own the global subscriber
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        tracing::debug!("Tracing initialized for tests");
    }
}
