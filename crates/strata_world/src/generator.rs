//! # Chunk Generators
//!
//! A generator returns a fully populated chunk that has not finished
//! loading. The world calls [`Chunk::finish_loading`] after inserting it.

use crate::block::Block;
use crate::chunk::Chunk;
use crate::coords::{ChunkPos, LocalPos, CHUNK_SIZE_I32};
use crate::material::MaterialId;
use crate::noise::{PerlinNoise, Seed};
use crate::world::World;

/// Produces chunks that were never saved.
pub trait ChunkGenerator: Send + Sync {
    /// Generates the chunk at `pos` for `world`.
    fn generate(&self, world: &World, pos: ChunkPos) -> Chunk;
}

/// Solid fill below a fixed height, air above.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlatGenerator {
    surface_y: i32,
    fill: MaterialId,
}

impl FlatGenerator {
    /// Fills every cell with `y < surface_y` with `fill`.
    #[must_use]
    pub const fn new(surface_y: i32, fill: MaterialId) -> Self {
        Self { surface_y, fill }
    }

    /// Cell at a world position.
    #[must_use]
    pub fn block_at(&self, _world_x: i32, world_y: i32) -> Option<Block> {
        (world_y < self.surface_y).then(|| Block::new(self.fill))
    }
}

impl ChunkGenerator for FlatGenerator {
    fn generate(&self, world: &World, pos: ChunkPos) -> Chunk {
        let chunk = Chunk::new(world, pos);
        for local in LocalPos::all() {
            let at = local.to_world(pos);
            chunk.fill(local, self.block_at(at.x, at.y));
        }
        chunk
    }
}

/// Noise terrain: grass over dirt over stone, with caves and a bedrock floor.
pub struct TerrainGenerator {
    height: PerlinNoise,
    caves: PerlinNoise,
    sea_level: i32,
    amplitude: f64,
}

impl TerrainGenerator {
    /// Depth of dirt under the grass.
    const DIRT_DEPTH: i32 = 4;
    /// Rows below the sea level where bedrock starts.
    const BEDROCK_DEPTH: i32 = 256;
    /// Cave noise above this threshold is carved out.
    const CAVE_THRESHOLD: f64 = 0.45;

    /// A generator for `seed`.
    #[must_use]
    pub fn new(seed: Seed, sea_level: i32, amplitude: f64) -> Self {
        Self {
            height: PerlinNoise::new(seed.derive(1)),
            caves: PerlinNoise::new(seed.derive(2)),
            sea_level,
            amplitude,
        }
    }

    /// Surface height (first air row) of a world column.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn surface(&self, world_x: i32) -> i32 {
        let n = self.height.fbm1(f64::from(world_x) / 96.0, 4, 0.5);
        self.sea_level + (n * self.amplitude).round() as i32
    }

    /// Cell at a world position, given the column's surface.
    #[must_use]
    pub fn block_at(&self, world_x: i32, world_y: i32, surface: i32) -> Option<Block> {
        let floor = self.sea_level - Self::BEDROCK_DEPTH;
        if world_y <= floor {
            return Some(Block::new(MaterialId::BEDROCK));
        }
        if world_y >= surface {
            return None;
        }
        let depth = surface - world_y;
        if depth > 2 {
            let cave = self
                .caves
                .fbm2(f64::from(world_x) / 24.0, f64::from(world_y) / 16.0, 3, 0.5);
            if cave > Self::CAVE_THRESHOLD {
                return None;
            }
        }
        let material = match depth {
            1 => MaterialId::GRASS,
            d if d <= Self::DIRT_DEPTH => MaterialId::DIRT,
            _ => MaterialId::STONE,
        };
        Some(Block::new(material))
    }
}

impl ChunkGenerator for TerrainGenerator {
    fn generate(&self, world: &World, pos: ChunkPos) -> Chunk {
        let chunk = Chunk::new(world, pos);
        let surfaces: Vec<i32> = (0..CHUNK_SIZE_I32)
            .map(|x| self.surface(pos.world_x() + x))
            .collect();
        for local in LocalPos::all() {
            let at = local.to_world(pos);
            let surface = surfaces[usize::from(local.x)];
            chunk.fill(local, self.block_at(at.x, at.y, surface));
        }
        chunk
    }
}
