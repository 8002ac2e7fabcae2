//! Error types for the execution primitives.

use thiserror::Error;

/// Scheduler errors.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The scheduler was shut down before the request was made.
    #[error("scheduler has been shut down")]
    ShutDown,

    /// A worker, timer or ticker thread could not be spawned.
    #[error("failed to spawn thread '{name}': {source}")]
    Spawn {
        /// Name of the thread that failed to start.
        name: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Failure reported by a single tick.
///
/// The ticker logs these and keeps running.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TickError {
    /// A ticking block failed.
    #[error("block at ({x}, {y}) failed to tick: {reason}")]
    Block {
        /// World x of the block.
        x: i32,
        /// World y of the block.
        y: i32,
        /// What went wrong.
        reason: String,
    },

    /// Several independent failures happened in one tick.
    #[error("{count} failures during tick, first: {first}")]
    Multiple {
        /// Total failures.
        count: usize,
        /// The first failure observed.
        first: Box<TickError>,
    },

    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

impl TickError {
    /// Folds a list of failures into one error, or `None` if the list is empty.
    #[must_use]
    pub fn combine(mut errors: Vec<TickError>) -> Option<TickError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            count => {
                let first = errors.swap_remove(0);
                Some(TickError::Multiple {
                    count,
                    first: Box::new(first),
                })
            }
        }
    }
}
