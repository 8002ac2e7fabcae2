//! Collision edges tracking block changes inside and across chunks.

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use strata_core::{CancellableThreadScheduler, SchedulerConfig};
use strata_world::{ChunkPos, Face, FlatGenerator, LocalPos, MaterialId, SetBlockOptions, World, WorldConfig, WorldContext};

fn flat_world() -> Arc<World> {
    flat_world_with_retries(5, 50)
}

fn flat_world_with_retries(attempts: u32, delay_ms: u64) -> Arc<World> {
    let scheduler = Arc::new(CancellableThreadScheduler::new(SchedulerConfig::synchronous()).unwrap());
    let ctx = WorldContext::new(scheduler).with_generator(Arc::new(FlatGenerator::new(0, MaterialId::STONE)));
    let config = WorldConfig {
        seed: Some(3),
        light_threads: 1,
        body_retry_attempts: attempts,
        body_retry_delay_ms: delay_ms,
        ..WorldConfig::default()
    };
    World::open(ctx, config).unwrap()
}

#[test]
fn test_isolated_chunk_defers_border_edges() {
    let world = flat_world();
    let chunk = world.get_chunk(ChunkPos::new(0, -1)).unwrap();

    assert_eq!(chunk.edge_count(), Some(0));
    assert_eq!(chunk.deferred_edges(), 124);
    assert_eq!(world.physics_body_count(), 1);
}

#[test]
fn test_neighbour_load_resolves_shared_border() {
    let world = flat_world();
    let ground = world.get_chunk(ChunkPos::new(0, -1)).unwrap();
    let sky = world.get_chunk(ChunkPos::new(0, 0)).unwrap();

    assert_eq!(ground.edge_count(), Some(32));
    assert!(ground.has_edge(LocalPos::new(5, 31), Face::Top));
    assert!(!ground.has_edge(LocalPos::new(5, 30), Face::Top));
    assert_eq!(ground.deferred_edges(), 124 - 30);

    assert_eq!(sky.edge_count(), Some(0));
    assert_eq!(sky.deferred_edges(), 0);
}

#[test]
fn test_digging_reshapes_edges() {
    let world = flat_world();
    let ground = world.get_chunk(ChunkPos::new(0, -1)).unwrap();
    world.get_chunk(ChunkPos::new(0, 0)).unwrap();
    let revision = ground.body_revision().unwrap();

    world.set_block(5, -1, None, SetBlockOptions::default());

    assert!(ground.body_revision().unwrap() > revision);
    assert!(!ground.has_edge(LocalPos::new(5, 31), Face::Top));
    assert!(ground.has_edge(LocalPos::new(5, 30), Face::Top));
    assert!(ground.has_edge(LocalPos::new(4, 31), Face::Right));
    assert!(ground.has_edge(LocalPos::new(6, 31), Face::Left));
    assert_eq!(ground.edge_count(), Some(34));

    world.set_material(5, -1, MaterialId::GLASS);
    assert_eq!(ground.edge_count(), Some(32));
    assert!(ground.has_edge(LocalPos::new(5, 31), Face::Top));
}

#[test]
fn test_edges_follow_changes_across_chunks() {
    let world = flat_world();
    let left = world.get_chunk(ChunkPos::new(0, -1)).unwrap();
    world.get_chunk(ChunkPos::new(0, 0)).unwrap();
    let right = world.get_chunk(ChunkPos::new(1, -1)).unwrap();

    let corner = LocalPos::new(31, 31);
    assert!(!left.has_edge(corner, Face::Right));

    // (32, -1) is the first column of the right-hand chunk.
    world.set_block(32, -1, None, SetBlockOptions::default());
    assert!(left.has_edge(corner, Face::Right));
    assert!(!right.has_edge(LocalPos::new(0, 31), Face::Left));

    world.set_material(32, -1, MaterialId::WOOD);
    assert!(!left.has_edge(corner, Face::Right));
}

#[test]
fn test_unloaded_chunk_body_is_destroyed() {
    let world = flat_world();
    let chunk = world.get_chunk(ChunkPos::new(4, 4)).unwrap();
    world.get_chunk(ChunkPos::new(5, 4)).unwrap();
    assert_eq!(world.physics_body_count(), 2);

    assert!(world.unload_chunk(&chunk, false, false));
    assert_eq!(world.physics_body_count(), 1);
    assert_eq!(chunk.edge_count(), None);
    assert!(!chunk.is_valid());
}

#[test]
fn test_deferred_retries_stop_after_budget() {
    let world = flat_world_with_retries(3, 1);
    let chunk = world.get_chunk(ChunkPos::new(0, -1)).unwrap();
    assert_eq!(chunk.deferred_edges(), 124);
    assert!(chunk.is_body_retry_pending());

    let before = world.scheduler().stats().completed;
    assert!(world.scheduler().wait_idle(Duration::from_secs(5)), "retries never stopped");
    let retries = world.scheduler().stats().completed - before;

    assert_eq!(retries, 3);
    assert!(!chunk.is_body_retry_pending());
    assert_eq!(chunk.deferred_edges(), 124);
    assert_eq!(chunk.edge_count(), Some(0));
    assert!(chunk.is_valid());
}

#[test]
fn test_neighbours_arriving_between_retries() {
    let world = flat_world_with_retries(5, 1);
    let pos = ChunkPos::new(0, -1);
    let chunk = world.get_chunk(pos).unwrap();

    thread::sleep(Duration::from_millis(5));
    assert!(world.scheduler().run_sync_tasks() >= 1);
    assert_eq!(chunk.deferred_edges(), 124);
    assert!(chunk.is_body_retry_pending(), "retry not rescheduled");

    for neighbour in pos.neighbors4() {
        world.get_chunk(neighbour).unwrap();
    }
    assert_eq!(chunk.deferred_edges(), 0);
    assert_eq!(chunk.edge_count(), Some(32));

    assert!(world.scheduler().wait_idle(Duration::from_secs(5)));
    assert!(!chunk.is_body_retry_pending());
    assert_eq!(chunk.deferred_edges(), 0);
    assert_eq!(chunk.edge_count(), Some(32));
}
