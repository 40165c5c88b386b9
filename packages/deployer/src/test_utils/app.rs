use std::{path::PathBuf, sync::Arc};

use utils::config::{ConfigBuilder, ConfigExt};

use crate::{args::CliArgs, config::Config};

#[derive(Clone)]
pub struct TestApp {
    pub config: Arc<Config>,
}

impl TestApp {
    pub fn zeroed_cli_args() -> CliArgs {
        CliArgs {
            data: Some(tempfile::tempdir().unwrap().path().to_path_buf()),
            home: Some(tempfile::tempdir().unwrap().path().to_path_buf()),
            // points at a file that doesn't exist so a developer's .env never leaks into tests
            dotenv: Some(
                PathBuf::from(env!("CARGO_MANIFEST_DIR"))
                    .join("tests")
                    .join(Config::DIRNAME)
                    .join("non-existant-file"),
            ),
            port: None,
            log_level: Vec::new(),
            host: None,
            cors_allowed_origins: Vec::new(),
            bearer_token: None,
            jwt_secret: None,
            workers: None,
            worker_binary: None,
            job_timeout_secs: None,
            shutdown_grace_secs: None,
            credential: None,
            hd_index: None,
        }
    }

    pub fn new() -> Self {
        Self::new_with_args(Self::zeroed_cli_args())
    }

    pub fn new_with_args(cli_args: CliArgs) -> Self {
        let config = Arc::new(ConfigBuilder::new(cli_args).build().unwrap());

        crate::init_tracing_tests();

        Self { config }
    }
}
