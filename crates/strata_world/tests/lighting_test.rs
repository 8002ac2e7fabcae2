//! Lighting end to end: sources, sky columns and superseded generations.

use std::sync::Arc;
use std::time::Duration;
use strata_core::{CancellableThreadScheduler, SchedulerConfig};
use strata_world::{
    Block, ChunkPos, FlatGenerator, MaterialId, SetBlockOptions, World, WorldConfig, WorldContext,
};

fn open(config: SchedulerConfig) -> Arc<World> {
    let scheduler = Arc::new(CancellableThreadScheduler::new(config).unwrap());
    let ctx = WorldContext::new(scheduler).with_generator(Arc::new(FlatGenerator::new(0, MaterialId::STONE)));
    let config = WorldConfig {
        seed: Some(1),
        light_threads: 2,
        ..WorldConfig::default()
    };
    World::open(ctx, config).unwrap()
}

fn is_dark(world: &World, x: i32, y: i32) -> bool {
    world.light_at(x, y).unwrap().is_dark()
}

#[test]
fn test_torch_lights_surroundings_and_removal_restores_dark() {
    let world = open(SchedulerConfig::synchronous());
    world.get_chunk(ChunkPos::new(0, -1)).unwrap();
    assert!(is_dark(&world, 11, -10));

    world.set_material(10, -10, MaterialId::TORCH);
    assert!(!is_dark(&world, 11, -10));
    assert!(!is_dark(&world, 10, -12));
    assert!(is_dark(&world, 16, -10));

    // Buried air under the column top is not a sky source.
    world.set_block(10, -10, None, SetBlockOptions::default());
    assert!(is_dark(&world, 11, -10));
    assert!(is_dark(&world, 10, -10));
}

#[test]
fn test_light_crosses_chunk_borders() {
    let world = open(SchedulerConfig::synchronous());
    world.get_chunk(ChunkPos::new(0, -1)).unwrap();
    world.get_chunk(ChunkPos::new(1, -1)).unwrap();

    world.set_material(31, -10, MaterialId::GLOWSTONE);
    assert!(!is_dark(&world, 32, -10));
    assert!(!is_dark(&world, 33, -10));
}

#[test]
fn test_sky_light_follows_column_top() {
    let world = open(SchedulerConfig::synchronous());
    world.get_chunk(ChunkPos::new(0, -1)).unwrap();
    world.get_chunk(ChunkPos::new(0, 0)).unwrap();

    assert!(!is_dark(&world, 5, -1), "top stone row is lit from above");
    assert!(is_dark(&world, 5, -5));
    assert_eq!(world.column_top(5), Some(-1));

    world.set_block(5, -1, None, SetBlockOptions::default());
    world.set_block(5, -2, None, SetBlockOptions::default());
    assert_eq!(world.column_top(5), Some(-3));
    assert!(!is_dark(&world, 5, -5), "the shaft lets sky light in");

    world.set_material(5, -1, MaterialId::STONE);
    assert_eq!(world.column_top(5), Some(-1));
    assert!(is_dark(&world, 5, -5));
}

#[test]
fn test_superseded_light_never_overwrites_newer_result() {
    let world = open(SchedulerConfig::with_threads(4));
    let chunk = world.get_chunk(ChunkPos::new(0, -1)).unwrap();
    assert!(world.scheduler().wait_idle(Duration::from_secs(10)));

    for _ in 0..20 {
        world.set_material(10, -10, MaterialId::TORCH);
        world.set_block(10, -10, Some(Block::new(MaterialId::STONE)), SetBlockOptions::default());
    }
    assert!(world.scheduler().wait_idle(Duration::from_secs(10)));

    let lighting = chunk.lighting();
    assert!(!lighting.is_pending());
    assert_eq!(lighting.committed_generation(), lighting.generation());
    assert!(is_dark(&world, 11, -10));

    world.set_material(10, -10, MaterialId::TORCH);
    assert!(world.scheduler().wait_idle(Duration::from_secs(10)));
    assert!(!is_dark(&world, 11, -10));
}
