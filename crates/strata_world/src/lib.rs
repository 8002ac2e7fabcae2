//! # STRATA World
//!
//! An infinite 2D block world split into square chunks.
//!
//! ## Design Principles
//!
//! 1. **Absent is air**: an empty cell and an air block are the same thing
//! 2. **One entry point**: every cell change goes through `Chunk::set_block`
//! 3. **Stale work loses**: lighting jobs carry a generation and old results
//!    are discarded
//! 4. **No cycles**: chunks reach their neighbours by coordinate
//!
//! ## Core Components
//!
//! - `Chunk`: cells, ticking index, collision body and lighting of one chunk
//! - `ChunkBody`: static collision edges along solid/open boundaries
//! - `ChunkLighting`: generation-checked light grid per chunk
//! - `World`: chunk map, entities, physics, persistence and the ticker
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use strata_core::{CancellableThreadScheduler, SchedulerConfig};
//! use strata_world::{World, WorldConfig, WorldContext, MaterialId};
//!
//! let scheduler = Arc::new(CancellableThreadScheduler::new(SchedulerConfig::synchronous())?);
//! let world = World::open(WorldContext::new(scheduler), WorldConfig::default())?;
//! world.load_spawn_area();
//! world.set_material(3, 4, MaterialId::TORCH);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod block;
pub mod chunk;
pub mod chunk_body;
pub mod column;
pub mod config;
pub mod coords;
pub mod entity;
pub mod error;
pub mod events;
pub mod generator;
pub mod light;
pub mod material;
pub mod noise;
pub mod persistence;
pub mod physics;
pub mod world;

pub use block::{Block, BlockAction};
pub use chunk::{Chunk, SetBlockOptions};
pub use chunk_body::{ChunkBody, Face, Solidity, SolidityMask, SolidityProbe};
pub use column::{ChunkColumn, TopChange};
pub use config::{GeneratorKind, WorldConfig};
pub use coords::{ChunkPos, LocalPos, WorldPos, CHUNK_AREA, CHUNK_SIZE, CHUNK_SIZE_I32};
pub use entity::{Entity, EntityKind};
pub use error::{StoreError, StoreResult, WorldError, WorldResult};
pub use events::{BlockUpdateSink, EventBus, RenderSink, WorldEvent};
pub use generator::{ChunkGenerator, FlatGenerator, TerrainGenerator};
pub use light::{BlockLight, ChunkLighting, LightGrid, LightSources, LightTicket};
pub use material::{Capabilities, Material, MaterialId};
pub use noise::{PerlinNoise, Seed};
pub use persistence::{ChunkData, ChunkStore, FileChunkStore, MemoryChunkStore, WorldInfo};
pub use physics::{BodyKind, BodyOwner, PhysicsWorld, Shape};
pub use world::{World, WorldContext};
