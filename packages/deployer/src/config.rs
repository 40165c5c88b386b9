use anyhow::{bail, Context, Result};
use deployer_types::{Credential, NetworkTable, VerificationSettings, WorkerSettings};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::PathBuf, time::Duration};
use utils::config::ConfigExt;

use crate::dispatcher::DispatcherConfig;

/// Name of the worker binary, looked up next to the server binary by default
pub const WORKER_BINARY_NAME: &str = "contract-deployer-worker";

/// Server configuration after every layer is merged and finalized.
/// Cli args beat env vars, which beat deployer.toml, which beats [`Config::default`]
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// HTTP port.
    /// Default is `32156`
    pub port: u32,
    /// The log-level to use, in the format of [tracing directives](https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/struct.EnvFilter.html#directives).
    /// Default is `["info"]`
    pub log_level: Vec<String>,
    /// HTTP bind address
    /// Default is `localhost`
    pub host: String,
    /// Data directory, tilde-expanded
    /// Default is `~/.contract-deployer`
    pub data: PathBuf,
    /// CORS origin patterns
    /// Default is empty
    pub cors_allowed_origins: Vec<String>,
    /// Required on the submission routes when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<Credential>,
    /// Signing secret of the user tokens accepted on the job routes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<Credential>,

    /// Size of the worker pool.
    /// Default is the number of available cores
    pub workers: usize,
    /// Default is the worker binary next to the current executable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_binary: Option<PathBuf>,
    /// 0 disables the job timeout
    pub job_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
    /// Pause before relaunching a worker that failed to start
    pub respawn_delay_ms: u64,

    pub verification: VerificationSettings,
    /// Template number to contract name. Keys are numbers, kept as strings for TOML.
    pub templates: BTreeMap<String, String>,
    pub networks: NetworkTable,

    /// Deployer mnemonic or 0x private key (usually leave this unset and provide it via env)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<Credential>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hd_index: Option<u32>,
}

impl ConfigExt for Config {
    const DIRNAME: &'static str = "contract-deployer";
    const FILENAME: &'static str = "deployer.toml";

    fn with_data_dir(&mut self, f: impl FnOnce(&mut PathBuf)) {
        f(&mut self.data);
    }

    fn log_levels(&self) -> impl Iterator<Item = &str> {
        self.log_level.iter().map(|s| s.as_str())
    }

    fn finalize(&mut self) -> Result<()> {
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }

        for (chain, network) in self.networks.iter_mut() {
            network.verification_api_key = network
                .verification_api_key
                .take()
                .and_then(|key| match shellexpand::env(key.as_str()) {
                    Ok(expanded) => Some(Credential::new(expanded.into_owned())),
                    Err(err) => {
                        tracing::debug!("No verification api key for {chain}: {err}");
                        None
                    }
                })
                .filter(|key| !key.is_blank());
        }

        self.credential = self.credential.take().filter(|c| !c.is_blank());
        self.bearer_token = self.bearer_token.take().filter(|t| !t.is_blank());
        self.jwt_secret = self.jwt_secret.take().filter(|s| !s.is_blank());
        if self.bearer_token.is_some() && self.jwt_secret.is_some() {
            bail!("bearer_token and jwt_secret both claim the Authorization header, set only one");
        }

        if let Some(dir) = &self.verification.project_dir {
            self.verification.project_dir =
                Some(shellexpand::tilde(&dir.to_string_lossy()).to_string().into());
        }

        self.template_numbers()?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 32156,
            log_level: vec!["info".to_string()],
            host: "localhost".to_string(),
            data: PathBuf::from("~/.contract-deployer"),
            cors_allowed_origins: Vec::new(),
            bearer_token: None,
            jwt_secret: None,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            worker_binary: None,
            job_timeout_secs: 600,
            shutdown_grace_secs: 10,
            respawn_delay_ms: 1000,
            verification: VerificationSettings::default(),
            templates: [
                ("0", "MemeToken"),
                ("1", "DegenToken"),
                ("2", "UtilityToken"),
                ("3", "ElonToken"),
            ]
            .into_iter()
            .map(|(number, name)| (number.to_string(), name.to_string()))
            .collect(),
            networks: NetworkTable::defaults(),
            credential: None,
            hd_index: None,
        }
    }
}

impl Config {
    pub fn template_numbers(&self) -> Result<BTreeMap<u32, String>> {
        self.templates
            .iter()
            .map(|(number, name)| {
                let number = number
                    .trim()
                    .parse()
                    .with_context(|| format!("template key {number} is not a number"))?;
                Ok((number, name.clone()))
            })
            .collect()
    }

    pub fn worker_settings(&self) -> Result<WorkerSettings> {
        Ok(WorkerSettings {
            networks: self.networks.clone(),
            verification: self.verification.clone(),
            templates: self.template_numbers()?,
            credential: self.credential.clone(),
            hd_index: self.hd_index,
        })
    }

    pub fn dispatcher_config(&self) -> Result<DispatcherConfig> {
        Ok(DispatcherConfig {
            pool_size: self.workers,
            job_timeout: (self.job_timeout_secs > 0)
                .then(|| Duration::from_secs(self.job_timeout_secs)),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
            respawn_delay: Duration::from_millis(self.respawn_delay_ms),
            settings: self.worker_settings()?,
        })
    }

    /// The configured worker binary, or the one installed alongside this executable
    pub fn worker_binary(&self) -> Result<PathBuf> {
        if let Some(path) = &self.worker_binary {
            return Ok(path.clone());
        }

        let exe = std::env::current_exe().context("unable to locate the current executable")?;
        let dir = exe
            .parent()
            .context("current executable has no parent directory")?;

        Ok(dir.join(format!(
            "{WORKER_BINARY_NAME}{}",
            std::env::consts::EXE_SUFFIX
        )))
    }

    /// Passed to workers as `RUST_LOG`
    pub fn worker_log_filter(&self) -> String {
        self.log_level.join(",")
    }
}
