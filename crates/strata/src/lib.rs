//! # STRATA
//!
//! Engine entry point: configuration, logging and the wiring between the
//! scheduler and the world.
//!
//! ```rust,ignore
//! let config = strata::EngineConfig::load("strata.toml")?;
//! strata::init_logging(&config.logging.filter);
//! let engine = strata::Engine::open(&config)?;
//! engine.run(Some(Duration::from_secs(60)))?;
//! engine.shutdown();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;

pub use config::{EngineConfig, LoggingConfig};
pub use engine::Engine;
pub use error::{ConfigError, ConfigResult, EngineError, EngineResult};
pub use logging::init_logging;

// Re-export the layers
pub use strata_core as core;
pub use strata_world as world;
