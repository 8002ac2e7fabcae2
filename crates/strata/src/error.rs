//! Engine error types.

use std::path::PathBuf;
use strata_core::SchedulerError;
use strata_world::WorldError;
use thiserror::Error;

/// Configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The config is not valid TOML for [`crate::EngineConfig`].
    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config parsed but a value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Failures bringing the engine up.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The scheduler could not start.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// The world could not open or start ticking.
    #[error(transparent)]
    World(#[from] WorldError),
}

/// Result alias for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result alias for the engine.
pub type EngineResult<T> = Result<T, EngineError>;
