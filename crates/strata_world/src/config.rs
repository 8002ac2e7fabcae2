//! World configuration.

use crate::generator::{ChunkGenerator, FlatGenerator, TerrainGenerator};
use crate::error::{WorldError, WorldResult};
use crate::material::{Material, MaterialId};
use crate::noise::Seed;
use crate::physics::GRAVITY;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Which generator a world uses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeneratorKind {
    /// Solid `fill` below `surface_y`, air above.
    Flat {
        /// First air row.
        surface_y: i32,
        /// Material name of the fill.
        fill: String,
    },
    /// Noise heightmap with caves.
    Terrain {
        /// Mean surface height.
        sea_level: i32,
        /// Height variation in blocks.
        amplitude: f64,
    },
}

impl Default for GeneratorKind {
    fn default() -> Self {
        Self::Terrain {
            sea_level: 0,
            amplitude: 24.0,
        }
    }
}

impl GeneratorKind {
    /// Instantiates the generator for a world seed.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::UnknownMaterial`] if a flat fill names no
    /// material, or names air.
    pub fn build(&self, seed: u64) -> WorldResult<Arc<dyn ChunkGenerator>> {
        match self {
            Self::Flat { surface_y, fill } => {
                let material = Material::by_name(fill)
                    .filter(|m| m.id != MaterialId::AIR)
                    .ok_or_else(|| WorldError::UnknownMaterial(fill.clone()))?;
                Ok(Arc::new(FlatGenerator::new(*surface_y, material.id)))
            }
            Self::Terrain {
                sea_level,
                amplitude,
            } => Ok(Arc::new(TerrainGenerator::new(
                Seed::new(seed),
                *sea_level,
                *amplitude,
            ))),
        }
    }
}

/// World configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Name used for new worlds.
    pub name: String,
    /// Seed for new worlds; random when absent.
    pub seed: Option<u64>,
    /// Save directory; in-memory when absent.
    pub save_dir: Option<PathBuf>,
    /// Chunks kept loaded around points of interest (Chebyshev radius).
    pub load_radius: i32,
    /// Loaded chunks farther than this from every point are unloaded.
    pub unload_radius: i32,
    /// Lighting pool size; 0 picks one per CPU.
    pub light_threads: usize,
    /// Retries for collision edges waiting on an unloaded neighbour.
    pub body_retry_attempts: u32,
    /// Delay between those retries.
    pub body_retry_delay_ms: u64,
    /// Downward acceleration for dynamic bodies.
    pub gravity: f32,
    /// How long `reload` waits for outstanding tasks.
    pub drain_timeout_ms: u64,
    /// Chunk generator.
    pub generator: GeneratorKind,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: "world".to_string(),
            seed: None,
            save_dir: None,
            load_radius: 2,
            unload_radius: 4,
            light_threads: 0,
            body_retry_attempts: 5,
            body_retry_delay_ms: 50,
            gravity: GRAVITY,
            drain_timeout_ms: 5_000,
            generator: GeneratorKind::default(),
        }
    }
}

impl WorldConfig {
    /// Delay between body retries.
    #[must_use]
    pub fn body_retry_delay(&self) -> Duration {
        Duration::from_millis(self.body_retry_delay_ms)
    }

    /// Drain timeout for `reload`.
    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Effective lighting pool size.
    #[must_use]
    pub fn light_pool_size(&self) -> usize {
        if self.light_threads == 0 {
            num_cpus::get().max(1)
        } else {
            self.light_threads
        }
    }
}
