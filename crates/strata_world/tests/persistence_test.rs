//! Worlds surviving a restart through the file store.

use std::fs;
use std::sync::Arc;
use strata_core::{CancellableThreadScheduler, SchedulerConfig};
use strata_world::persistence::encode_chunk;
use strata_world::{
    Block, ChunkData, ChunkPos, ChunkStore, Entity, FileChunkStore, FlatGenerator, MaterialId,
    MemoryChunkStore, World, WorldConfig, WorldContext, WorldPos,
};

fn open(store: Arc<dyn ChunkStore>) -> Arc<World> {
    let scheduler = Arc::new(CancellableThreadScheduler::new(SchedulerConfig::synchronous()).unwrap());
    let ctx = WorldContext::new(scheduler)
        .with_store(store)
        .with_generator(Arc::new(FlatGenerator::new(0, MaterialId::DIRT)));
    let config = WorldConfig {
        name: "persisted".to_string(),
        load_radius: 1,
        light_threads: 1,
        ..WorldConfig::default()
    };
    World::open(ctx, config).unwrap()
}

#[test]
fn test_world_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let (uuid, seed, entity) = {
        let world = open(Arc::new(FileChunkStore::new(dir.path())));
        world.load_spawn_area();
        world.set_material(7, 3, MaterialId::TORCH);
        world.set_material(7, -4, MaterialId::GLASS);
        world.set_spawn(WorldPos::new(12, 1));
        let entity = world.add_entity(Entity::dynamic([20.5, 6.0], [0.6, 1.7])).unwrap();
        let info = world.info();
        world.shutdown();
        (info.uuid, info.seed, entity)
    };

    assert!(dir.path().join(FileChunkStore::INFO_FILE).is_file());
    assert!(dir.path().join("chunks").join("0_0.chunk").is_file());

    let world = open(Arc::new(FileChunkStore::new(dir.path())));
    let info = world.info();
    assert_eq!(info.uuid, uuid);
    assert_eq!(info.seed, seed);
    assert_eq!(info.name, "persisted");
    assert_eq!(world.spawn(), WorldPos::new(12, 1));
    assert_eq!(world.chunk_count(), 0);

    world.load_spawn_area();
    assert_eq!(world.get_block(7, 3, true), Some(Block::new(MaterialId::TORCH)));
    assert_eq!(world.get_block(7, -4, true), Some(Block::new(MaterialId::GLASS)));
    assert_eq!(world.get_block(7, -5, true), Some(Block::new(MaterialId::DIRT)));
    assert!(world.entity(entity).is_some());
}

#[test]
fn test_corrupt_chunk_is_regenerated() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileChunkStore::new(dir.path());
    fs::create_dir_all(dir.path().join("chunks")).unwrap();
    fs::write(dir.path().join("chunks").join("0_-1.chunk"), b"not a chunk").unwrap();

    let world = open(Arc::new(store));
    let chunk = world.get_chunk(ChunkPos::new(0, -1)).unwrap();

    assert!(chunk.is_valid());
    assert_eq!(world.get_block(0, -1, true), Some(Block::new(MaterialId::DIRT)));
}

#[test]
#[should_panic(expected = "stored where")]
fn test_misplaced_record_panics() {
    let store = Arc::new(MemoryChunkStore::new());
    store.insert_raw(ChunkPos::new(1, 1), encode_chunk(&ChunkData::empty(ChunkPos::new(2, 2))));

    let world = open(store);
    let _ = world.get_chunk(ChunkPos::new(1, 1));
}
