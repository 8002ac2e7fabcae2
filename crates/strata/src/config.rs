//! Engine configuration.
//!
//! ```toml
//! [logging]
//! filter = "info,strata_world=debug"
//!
//! [scheduler]
//! threads = 4
//!
//! [ticker]
//! tps = 20
//!
//! [world]
//! name = "overworld"
//! save_dir = "saves/overworld"
//! load_radius = 2
//! unload_radius = 4
//!
//! [world.generator]
//! kind = "flat"
//! surface_y = 0
//! fill = "stone"
//! ```
//!
//! Every section and field is optional.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use strata_core::{SchedulerConfig, TickerConfig};
use strata_world::WorldConfig;

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing-subscriber` env-filter directives.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Logging.
    pub logging: LoggingConfig,
    /// Task scheduler.
    pub scheduler: SchedulerConfig,
    /// Tick loop.
    pub ticker: TickerConfig,
    /// World.
    pub world: WorldConfig,
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a config file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`Self::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Rejects values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.ticker.tps == 0 {
            return Err(ConfigError::Invalid("ticker.tps must be at least 1".into()));
        }
        if self.ticker.tick_rare_rate == 0 {
            return Err(ConfigError::Invalid("ticker.tick_rare_rate must be at least 1".into()));
        }
        if self.world.load_radius < 0 {
            return Err(ConfigError::Invalid("world.load_radius must not be negative".into()));
        }
        if self.world.unload_radius < self.world.load_radius {
            return Err(ConfigError::Invalid(format!(
                "world.unload_radius ({}) is smaller than world.load_radius ({})",
                self.world.unload_radius, self.world.load_radius
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_radius_order_enforced() {
        let err = EngineConfig::from_toml_str("[world]\nload_radius = 5\nunload_radius = 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("unload_radius")));
    }
}
