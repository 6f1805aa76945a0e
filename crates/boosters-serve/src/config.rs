//! Service configuration.
//!
//! Layers, lowest precedence first: built-in defaults, a JSON file, the
//! `BOOSTERS_SERVE_*` environment variables, command-line flags. Each layer
//! only overrides what it sets.

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Default artifact location, relative to the working directory.
pub const DEFAULT_ARTIFACT_PATH: &str = "models/multisim_gbdt.bsrv";

pub const ENV_ARTIFACT: &str = "BOOSTERS_SERVE_ARTIFACT";
pub const ENV_LOG: &str = "BOOSTERS_SERVE_LOG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("artifact path must not be empty")]
    EmptyArtifactPath,

    #[error("n_threads must be at least 1 when set")]
    ZeroThreads,

    #[error("invalid log level `{level}`: {source}")]
    InvalidLogLevel {
        level: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `boosters_serve=debug`.
    pub level: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServeConfig {
    pub artifact_path: PathBuf,
    /// Worker threads for prediction. `None` uses all cores.
    pub n_threads: Option<usize>,
    pub logging: LoggingConfig,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            artifact_path: PathBuf::from(DEFAULT_ARTIFACT_PATH),
            n_threads: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl ServeConfig {
    /// Read a JSON config file. Absent keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
    }

    /// Apply `BOOSTERS_SERVE_ARTIFACT` and `BOOSTERS_SERVE_LOG` from `lookup`.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup(ENV_ARTIFACT).filter(|v| !v.is_empty()) {
            self.artifact_path = PathBuf::from(path);
        }
        if let Some(level) = lookup(ENV_LOG).filter(|v| !v.is_empty()) {
            self.logging.level = level;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.artifact_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyArtifactPath);
        }
        if self.n_threads == Some(0) {
            return Err(ConfigError::ZeroThreads);
        }
        EnvFilter::try_new(&self.logging.level).map_err(|source| ConfigError::InvalidLogLevel {
            level: self.logging.level.clone(),
            source,
        })?;
        Ok(())
    }

    pub fn thread_count(&self) -> Option<NonZeroUsize> {
        self.n_threads.and_then(NonZeroUsize::new)
    }
}
