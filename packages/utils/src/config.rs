use anyhow::{bail, Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{marker::PhantomData, path::PathBuf};

/// Command line arguments that double as environment variables.
/// Every field should be optional so that unset values never shadow the config file.
pub trait CliEnvExt: Serialize + DeserializeOwned + Default + std::fmt::Debug {
    /// e.g. "DEPLOYER", variables are then read as `DEPLOYER_{FIELD}`
    const ENV_VAR_PREFIX: &'static str;

    /// The TOML section that overrides `[default]`, e.g. "deployer"
    const TOML_IDENTIFIER: &'static str;

    /// Directory holding the config file, when given explicitly
    fn home_dir(&self) -> Option<PathBuf>;

    /// Dotenv file to load before anything else
    fn dotenv_path(&self) -> Option<PathBuf>;

    /// Env vars first, then whatever was passed on the command line on top
    fn merge_cli_env_args(&self) -> Result<Self> {
        Figment::new()
            .merge(Env::prefixed(&format!("{}_", Self::ENV_VAR_PREFIX)))
            .merge(Serialized::defaults(self))
            .extract()
            .context("invalid cli or env arguments")
    }

    fn env_var(name: &str) -> Option<String> {
        std::env::var(format!("{}_{name}", Self::ENV_VAR_PREFIX)).ok()
    }
}

/// The final, validated config of a binary
pub trait ConfigExt: Serialize + DeserializeOwned + Default + std::fmt::Debug {
    /// Directory name used in the fallback search paths, e.g. "contract-deployer"
    const DIRNAME: &'static str;

    /// e.g. "deployer.toml"
    const FILENAME: &'static str;

    fn with_data_dir(&mut self, f: impl FnOnce(&mut PathBuf));

    fn log_levels(&self) -> impl Iterator<Item = &str>;

    /// Runs once all layers are merged, for values that need resolving or checking
    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }

    fn tracing_env_filter(&self) -> Result<tracing_subscriber::EnvFilter> {
        let mut filter = tracing_subscriber::EnvFilter::from_default_env();
        for directive in self.log_levels() {
            match directive.parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(err) => bail!("{}: {}", err, directive),
            }
        }

        Ok(filter)
    }
}

/// Layers a config from, lowest priority first:
///
/// 1. `CONFIG::default()`
/// 2. the `[default]` section of the config file
/// 3. the `[{TOML_IDENTIFIER}]` section of the config file
/// 4. environment variables
/// 5. cli args
#[derive(Debug)]
pub struct ConfigBuilder<CONFIG, ARG> {
    pub cli_env_args: ARG,
    _config: PhantomData<CONFIG>,
}

impl<CONFIG: ConfigExt, ARG: CliEnvExt> ConfigBuilder<CONFIG, ARG> {
    pub fn new(cli_env_args: ARG) -> Self {
        Self {
            cli_env_args,
            _config: PhantomData,
        }
    }

    pub fn build(self) -> Result<CONFIG> {
        // dotenv may set the env vars that point at everything else
        load_dotenv_files(self.dotenv_candidates()?)?;

        let cli_env_args = self.cli_env_args.merge_cli_env_args()?;

        let filepath = ConfigFilePath::new(CONFIG::FILENAME, CONFIG::DIRNAME)
            .with_dir(cli_env_args.home_dir())
            .with_env_dir(ARG::env_var("HOME"))
            .into_path();

        let mut figment = Figment::new().merge(Serialized::defaults(CONFIG::default()));

        match &filepath {
            Some(filepath) => {
                tracing::debug!("Loading config from {}", filepath.display());
                figment = figment
                    .merge(Figment::from(Toml::file(filepath).nested()))
                    .merge(
                        Figment::from(Toml::file(filepath).nested()).select(ARG::TOML_IDENTIFIER),
                    );
            }
            None => {
                tracing::debug!("No {} found, using defaults", CONFIG::FILENAME);
            }
        }

        // the file section above selects its profile, globals still win over it
        let mut config: CONFIG = figment
            .merge(Serialized::globals(cli_env_args))
            .extract()
            .with_context(|| match &filepath {
                Some(path) => format!("invalid config in {}", path.display()),
                None => "invalid config".to_string(),
            })?;

        config.with_data_dir(|data_dir| {
            *data_dir = shellexpand::tilde(&data_dir.to_string_lossy())
                .to_string()
                .into();
        });

        config.finalize()?;

        Ok(config)
    }

    fn dotenv_candidates(&self) -> Result<Vec<PathBuf>> {
        let mut paths: Vec<PathBuf> = self.cli_env_args.dotenv_path().into_iter().collect();
        paths.extend(ARG::env_var("DOTENV").map(PathBuf::from));
        paths.push(std::env::current_dir()?.join(".env"));
        Ok(paths)
    }
}

fn load_dotenv_files(paths: Vec<PathBuf>) -> Result<()> {
    for path in paths.into_iter().filter(|path| path.exists()) {
        dotenvy::from_path(&path)
            .with_context(|| format!("Error loading dotenv file {}", path.display()))?;
    }
    Ok(())
}

/// Searches a list of well known directories for the config file
#[derive(Clone, Debug)]
pub struct ConfigFilePath {
    pub filename: String,
    pub dirname: String,
    /// e.g. `--home /foo`, which makes the first candidate `/foo/{filename}`
    pub explicit_dir: Option<PathBuf>,
    /// e.g. the value of `DEPLOYER_HOME`
    pub env_dir: Option<PathBuf>,
}

impl ConfigFilePath {
    pub fn new(filename: impl ToString, dirname: impl ToString) -> Self {
        Self {
            filename: filename.to_string(),
            dirname: dirname.to_string(),
            explicit_dir: None,
            env_dir: None,
        }
    }

    pub fn with_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.explicit_dir = dir;
        self
    }

    pub fn with_env_dir(mut self, dir: Option<impl Into<PathBuf>>) -> Self {
        self.env_dir = dir.map(Into::into);
        self
    }

    pub fn into_path(self) -> Option<PathBuf> {
        self.candidates().into_iter().find(|path| path.exists())
    }

    /// Candidate files, in the order they are tried
    pub fn candidates(self) -> Vec<PathBuf> {
        let dirname = self.dirname.as_str();

        let dirs = [
            self.explicit_dir.clone(),
            self.env_dir.clone(),
            std::env::current_dir().ok(),
            // ~/.{dirname}
            dirs::home_dir().map(|dir| dir.join(format!(".{dirname}"))),
            // Linux: ~/.config/{dirname}, macOS: ~/Library/Application Support/{dirname}
            dirs::config_dir().map(|dir| dir.join(dirname)),
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .map(|dir| PathBuf::from(dir).join(dirname)),
            dirs::home_dir().map(|dir| dir.join(".config").join(dirname)),
            Some(PathBuf::from("/etc").join(dirname)),
        ];

        let mut files: Vec<PathBuf> = Vec::new();
        for file in dirs.into_iter().flatten().map(|dir| dir.join(&self.filename)) {
            if !files.contains(&file) {
                files.push(file);
            }
        }
        files
    }
}
