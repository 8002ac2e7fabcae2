//! Error types for the world crate.

use crate::coords::ChunkPos;
use std::path::PathBuf;
use strata_core::SchedulerError;
use thiserror::Error;
use uuid::Uuid;

/// Persistence errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The buffer is not a valid chunk record.
    #[error("corrupt chunk data: {0}")]
    Corrupt(String),

    /// A cell names a material ordinal that does not exist.
    #[error("unknown material ordinal {ordinal} at record {index}")]
    UnknownMaterial {
        /// The ordinal found.
        ordinal: u16,
        /// Record index.
        index: usize,
    },

    /// The record was written for another chunk.
    #[error("chunk record for {found} stored where {expected} was expected")]
    CoordinateMismatch {
        /// Requested position.
        expected: ChunkPos,
        /// Position inside the record.
        found: ChunkPos,
    },

    /// World metadata could not be read or written.
    #[error("world info format error: {0}")]
    Info(String),
}

/// Result type for persistence operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// World errors.
#[derive(Error, Debug)]
pub enum WorldError {
    /// Scheduler or ticker failure.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The lighting pool could not be built.
    #[error("failed to build lighting pool: {0}")]
    LightPool(String),

    /// Configuration names a material that does not exist.
    #[error("unknown material {0:?}")]
    UnknownMaterial(String),

    /// An entity with this UUID is already in the world.
    #[error("entity {0} already exists")]
    DuplicateEntity(Uuid),

    /// The chunk an entity lives in could not be loaded.
    #[error("home chunk {chunk} of entity {uuid} is unavailable")]
    HomeChunkUnavailable {
        /// Entity id.
        uuid: Uuid,
        /// Chunk that failed to load.
        chunk: ChunkPos,
    },

    /// Teardown during reload left state behind.
    #[error("reload left {chunks} unexpected chunk(s) and {entities} entity(ies) resident")]
    InconsistentTeardown {
        /// Chunks that should have been unloaded.
        chunks: usize,
        /// Entities that should have been removed.
        entities: usize,
    },
}

/// Result type for world operations.
pub type WorldResult<T> = Result<T, WorldError>;
