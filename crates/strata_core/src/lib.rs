//! # STRATA Core
//!
//! Execution primitives shared by every STRATA subsystem.
//!
//! ## Architecture
//!
//! ```text
//!   callers ──execute_async──> [worker pool] ──> job
//!           ──schedule_async─> [timer] ───────┘
//!           ──execute_sync───> [main queue] ──> main thread pump
//!
//!   [Ticker thread] ──every 1000/tps ms──> Tickable::tick / tick_rare
//! ```
//!
//! - [`scheduler::CancellableThreadScheduler`]: bounded worker pool plus a
//!   queue drained by the designated main thread. Every task is tracked so it
//!   can be cancelled in bulk.
//! - [`ticker::Ticker`]: fixed-rate loop on its own thread with pause, resume
//!   and rate-limited lag warnings.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod scheduler;
pub mod ticker;

pub use error::{SchedulerError, SchedulerResult, TickError};
pub use scheduler::{CancellableThreadScheduler, SchedulerConfig, SchedulerStats, TaskHandle};
pub use ticker::{Tickable, Ticker, TickerConfig, TickStats};
