//! Layered configuration loader
//!
//! Loads `Settings` from TOML files and `ATRIUM_*` environment variables
//! using the `config` crate.

use std::path::{Path, PathBuf};

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, File, FileFormat};

use crate::config::environment::Environment;
use crate::config::error::ConfigError;
use crate::config::settings::Settings;

/// Environment variable for configuration directory
pub const CONFIG_DIR_ENV: &str = "ATRIUM_CONFIG_DIR";

/// Environment variable for a single configuration file
pub const CONFIG_FILE_ENV: &str = "ATRIUM_CONFIG_FILE";

const DEFAULT_CONFIG_DIR: &str = "config";

/// Prefix of environment variable overrides, e.g. `ATRIUM_SERVER__PORT`
const ENV_PREFIX: &str = "ATRIUM";

/// Separator for nested keys in environment variables
const ENV_SEPARATOR: &str = "__";

/// Where the loader reads files from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    /// `default.toml`, `{environment}.toml`, `local.toml` from a directory
    Layered(PathBuf),
    /// One explicit file
    Single(PathBuf),
}

/// Configuration loader that handles layered configuration loading
#[derive(Debug)]
pub struct ConfigLoader {
    source: Source,
    environment: Environment,
}

impl ConfigLoader {
    /// Creates a loader from `ATRIUM_CONFIG_DIR`, `ATRIUM_CONFIG_FILE` and
    /// `ATRIUM_APP_ENV`.
    ///
    /// # Errors
    ///
    /// Fails if both `ATRIUM_CONFIG_DIR` and `ATRIUM_CONFIG_FILE` are set.
    pub fn new() -> Result<Self, ConfigError> {
        let dir = std::env::var(CONFIG_DIR_ENV).ok();
        let file = std::env::var(CONFIG_FILE_ENV).ok();

        let source = match (dir, file) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::MutualExclusivityError(format!(
                    "{} and {} cannot both be set",
                    CONFIG_DIR_ENV, CONFIG_FILE_ENV
                )));
            }
            (Some(dir), None) => Source::Layered(PathBuf::from(dir)),
            (None, Some(file)) => Source::Single(PathBuf::from(file)),
            (None, None) => Source::Layered(PathBuf::from(DEFAULT_CONFIG_DIR)),
        };

        Ok(Self {
            source,
            environment: Environment::from_env(),
        })
    }

    /// Loader for one explicit file, ignoring `ATRIUM_CONFIG_*`.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::Single(path.into()),
            environment: Environment::from_env(),
        }
    }

    /// Overrides the detected environment.
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Loads, deserializes and validates the settings.
    ///
    /// # Errors
    ///
    /// - `default.toml` (or the single file) is missing
    /// - a file or variable cannot be parsed
    /// - the merged settings fail validation
    pub fn load(&self) -> Result<Settings, ConfigError> {
        let config = self.build_config()?;
        let mut settings: Settings = config.try_deserialize().map_err(|e| {
            ConfigError::ParseError(format!("Failed to deserialize configuration: {}", e))
        })?;
        settings.application.environment = self.environment;

        settings.validate()?;
        Ok(settings)
    }

    fn build_config(&self) -> Result<Config, ConfigError> {
        let builder = match &self.source {
            Source::Single(path) => add_file(Config::builder(), path, true)?,
            Source::Layered(dir) => {
                let builder = add_file(Config::builder(), &dir.join("default.toml"), true)?;
                let env_file = dir.join(format!("{}.toml", self.environment.as_str()));
                let builder = add_file(builder, &env_file, false)?;
                add_file(builder, &dir.join("local.toml"), false)?
            }
        };

        // ATRIUM_SERVER__PORT -> server.port
        let builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator(ENV_SEPARATOR)
                .ignore_empty(true)
                .try_parsing(true),
        );

        builder.build().map_err(ConfigError::from)
    }
}

fn add_file(
    builder: ConfigBuilder<DefaultState>,
    path: &Path,
    required: bool,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    if required && !path.is_file() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let name = path.to_str().ok_or_else(|| {
        ConfigError::ParseError(format!("non UTF-8 config path: {}", path.display()))
    })?;
    Ok(builder.add_source(File::new(name, FileFormat::Toml).required(required)))
}
