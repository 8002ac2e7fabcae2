//! # World
//!
//! Owns every loaded chunk, the entities, the physics world and the ticker.
//!
//! ## Ownership
//!
//! ```text
//!   World ──┬── chunks:   DashMap<ChunkPos, Arc<Chunk>>   (arena keyed by position)
//!           ├── columns:  DashMap<i32, Arc<ChunkColumn>>
//!           ├── entities: RwLock<HashMap<Uuid, Entity>>
//!           ├── physics:  Mutex<PhysicsWorld>
//!           └── ticker:   Ticker ──Weak<dyn Tickable>──> World
//!
//!   Chunk ──Weak<World>──> World     neighbours: World::loaded_chunk(pos)
//! ```
//!
//! Chunks hold only a weak handle to the world and reach neighbours by
//! coordinate, so there are no reference cycles.
//!
//! ## Locks
//!
//! `load_lock` serializes chunk production and teardown so two callers never
//! generate or dispose the same chunk. `entities` is taken before `physics` and never the other way
//! around. No side effect ever takes `load_lock`.

use crate::block::Block;
use crate::chunk::{Chunk, PendingAction, SetBlockOptions};
use crate::column::ChunkColumn;
use crate::config::WorldConfig;
use crate::coords::{world_to_chunk, ChunkPos, LocalPos, WorldPos, CHUNK_SIZE_I32};
use crate::entity::{Entity, EntityKind};
use crate::error::{StoreError, WorldError, WorldResult};
use crate::events::{BlockUpdateSink, RenderSink};
use crate::generator::ChunkGenerator;
use crate::light::{BlockLight, LightSources, LIGHT_REACH, SKY_LIGHT};
use crate::material::MaterialId;
use crate::persistence::{ChunkStore, MemoryChunkStore, WorldInfo};
use crate::physics::{BodyKind, BodyOwner, PhysicsWorld, Shape};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Weak};
use strata_core::{CancellableThreadScheduler, TickError, Tickable, Ticker, TickerConfig};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Collaborators a world is built from.
pub struct WorldContext {
    /// Task scheduler shared with the embedder.
    pub scheduler: Arc<CancellableThreadScheduler>,
    /// Persistence backend.
    pub store: Arc<dyn ChunkStore>,
    /// Overrides the generator named in the world config.
    pub generator: Option<Arc<dyn ChunkGenerator>>,
    /// Receives block changes.
    pub network: Option<Arc<dyn BlockUpdateSink>>,
    /// Receives render requests.
    pub renderer: Option<Arc<dyn RenderSink>>,
    /// Ticker settings.
    pub ticker: TickerConfig,
}

impl WorldContext {
    /// In-memory context around `scheduler`.
    #[must_use]
    pub fn new(scheduler: Arc<CancellableThreadScheduler>) -> Self {
        Self {
            scheduler,
            store: Arc::new(MemoryChunkStore::new()),
            generator: None,
            network: None,
            renderer: None,
            ticker: TickerConfig::default(),
        }
    }

    /// Uses `store` for persistence.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ChunkStore>) -> Self {
        self.store = store;
        self
    }

    /// Uses `generator` instead of the configured one.
    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn ChunkGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Sends block changes to `network`.
    #[must_use]
    pub fn with_network(mut self, network: Arc<dyn BlockUpdateSink>) -> Self {
        self.network = Some(network);
        self
    }

    /// Sends render requests to `renderer`.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn RenderSink>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Ticker settings.
    #[must_use]
    pub fn with_ticker(mut self, ticker: TickerConfig) -> Self {
        self.ticker = ticker;
        self
    }
}

/// The world.
pub struct World {
    self_ref: Weak<World>,
    info: RwLock<WorldInfo>,
    config: WorldConfig,
    scheduler: Arc<CancellableThreadScheduler>,
    store: Arc<dyn ChunkStore>,
    generator: Arc<dyn ChunkGenerator>,
    network: Option<Arc<dyn BlockUpdateSink>>,
    renderer: Option<Arc<dyn RenderSink>>,
    light_pool: rayon::ThreadPool,
    chunks: DashMap<ChunkPos, Arc<Chunk>>,
    columns: DashMap<i32, Arc<ChunkColumn>>,
    column_lock: Mutex<()>,
    load_lock: Mutex<()>,
    entities: RwLock<HashMap<Uuid, Entity>>,
    physics: Mutex<PhysicsWorld>,
    ticker: Ticker,
}

#[allow(clippy::cast_possible_truncation)]
fn random_seed() -> u64 {
    Uuid::new_v4().as_u128() as u64
}

impl World {
    /// Opens the world stored in `ctx.store`, creating its metadata if the
    /// store is empty. No chunk is loaded yet.
    ///
    /// # Errors
    ///
    /// Store failures reading or writing metadata, an unknown generator
    /// material, or a lighting pool that cannot start.
    pub fn open(ctx: WorldContext, config: WorldConfig) -> WorldResult<Arc<Self>> {
        let info = if let Some(info) = ctx.store.load_info()? {
            info!(name = %info.name, uuid = %info.uuid, "opened world");
            info
        } else {
            let info = WorldInfo::new(config.name.clone(), config.seed.unwrap_or_else(random_seed));
            ctx.store.save_info(&info)?;
            info!(name = %info.name, uuid = %info.uuid, seed = info.seed, "created world");
            info
        };

        let generator = match ctx.generator {
            Some(generator) => generator,
            None => config.generator.build(info.seed)?,
        };
        let light_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.light_pool_size())
            .thread_name(|index| format!("strata-light-{index}"))
            .build()
            .map_err(|e| WorldError::LightPool(e.to_string()))?;
        let physics = PhysicsWorld::new(config.gravity);

        Ok(Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            info: RwLock::new(info),
            config,
            scheduler: ctx.scheduler,
            store: ctx.store,
            generator,
            network: ctx.network,
            renderer: ctx.renderer,
            light_pool,
            chunks: DashMap::new(),
            columns: DashMap::new(),
            column_lock: Mutex::new(()),
            load_lock: Mutex::new(()),
            entities: RwLock::new(HashMap::new()),
            physics: Mutex::new(physics),
            ticker: Ticker::new(ctx.ticker),
        }))
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Weak handle to this world.
    #[must_use]
    pub fn downgrade(&self) -> Weak<World> {
        self.self_ref.clone()
    }

    /// Snapshot of the metadata.
    #[must_use]
    pub fn info(&self) -> WorldInfo {
        self.info.read().clone()
    }

    /// Spawn point.
    #[must_use]
    pub fn spawn(&self) -> WorldPos {
        let info = self.info.read();
        WorldPos::new(info.spawn_x, info.spawn_y)
    }

    /// Moves the spawn point. Persisted by the next [`Self::save_all`].
    pub fn set_spawn(&self, pos: WorldPos) {
        let mut info = self.info.write();
        info.spawn_x = pos.x;
        info.spawn_y = pos.y;
    }

    /// World configuration.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Task scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<CancellableThreadScheduler> {
        &self.scheduler
    }

    /// The world's ticker.
    #[must_use]
    pub fn ticker(&self) -> &Ticker {
        &self.ticker
    }

    pub(crate) fn physics(&self) -> &Mutex<PhysicsWorld> {
        &self.physics
    }

    pub(crate) fn light_pool(&self) -> &rayon::ThreadPool {
        &self.light_pool
    }

    pub(crate) fn network(&self) -> Option<Arc<dyn BlockUpdateSink>> {
        self.network.clone()
    }

    pub(crate) fn renderer(&self) -> Option<Arc<dyn RenderSink>> {
        self.renderer.clone()
    }

    /// Number of physics bodies, chunk and entity bodies alike.
    #[must_use]
    pub fn physics_body_count(&self) -> usize {
        self.physics.lock().body_count()
    }

    // ------------------------------------------------------------------------
    // Chunks
    // ------------------------------------------------------------------------

    /// Chunk at `pos` if it is in the map. Never loads.
    #[must_use]
    pub fn loaded_chunk(&self, pos: ChunkPos) -> Option<Arc<Chunk>> {
        self.chunks.get(&pos).map(|entry| Arc::clone(entry.value()))
    }

    /// Every chunk in the map.
    #[must_use]
    pub fn loaded_chunks(&self) -> Vec<Arc<Chunk>> {
        self.chunks.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    /// Number of chunks in the map.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Returns the chunk at `pos`, loading or generating it if needed.
    ///
    /// Returns `None` only while the ticker is paused and the chunk is
    /// neither in the map nor in the store.
    ///
    /// # Panics
    ///
    /// Panics if the store holds a record for another position under `pos`,
    /// or if the produced chunk does not become valid.
    pub fn get_chunk(&self, pos: ChunkPos) -> Option<Arc<Chunk>> {
        // A chunk still finishing its load is only handed out once the
        // loader releases `load_lock`.
        if let Some(chunk) = self.loaded_chunk(pos).filter(|chunk| chunk.is_valid()) {
            return Some(chunk);
        }
        if self.ticker.is_paused() && !self.chunks.contains_key(&pos) && !self.store.has_chunk(pos) {
            debug!(chunk = %pos, "not generating while paused");
            return None;
        }

        let _guard = self.load_lock.lock();
        if let Some(chunk) = self.loaded_chunk(pos) {
            return Some(chunk);
        }

        let (chunk, entities) = self.produce_chunk(pos);
        assert_eq!(chunk.pos(), pos, "chunk produced for the wrong position");
        let chunk = Arc::new(chunk);
        self.chunks.insert(pos, Arc::clone(&chunk));
        self.restore_entities(entities);
        chunk.finish_loading();
        self.spawn_missing_anchors(&chunk);
        assert!(chunk.is_valid(), "chunk {pos} is not valid after loading");
        Some(chunk)
    }

    fn produce_chunk(&self, pos: ChunkPos) -> (Chunk, Vec<Entity>) {
        match self.store.load_chunk(pos) {
            Ok(Some(data)) => (Chunk::from_data(self, &data), data.entities),
            Ok(None) => (self.generator.generate(self, pos), Vec::new()),
            Err(StoreError::CoordinateMismatch { expected, found }) => {
                panic!("chunk record for {found} stored where {expected} was expected")
            }
            Err(err) => {
                error!(chunk = %pos, %err, "failed to load chunk, regenerating");
                (self.generator.generate(self, pos), Vec::new())
            }
        }
    }

    /// Saves a chunk with its entities. Failures are logged.
    pub fn save_chunk(&self, chunk: &Chunk) -> bool {
        let mut data = chunk.to_data();
        data.entities = self.entities_in_chunk(chunk.pos());
        match self.store.save_chunk(&data) {
            Ok(()) => {
                chunk.mark_saved();
                true
            }
            Err(err) => {
                error!(chunk = %chunk.pos(), %err, "failed to save chunk");
                false
            }
        }
    }

    /// Saves metadata and every loaded chunk. Returns how many chunks saved.
    pub fn save_all(&self) -> usize {
        if let Err(err) = self.store.save_info(&self.info()) {
            error!(%err, "failed to save world info");
        }
        let saved = self
            .loaded_chunks()
            .iter()
            .filter(|chunk| chunk.is_loaded())
            .filter(|chunk| self.save_chunk(chunk))
            .count();
        debug!(saved, "saved world");
        saved
    }

    /// Unloads a chunk: save, drop its entities, dispose, remove from map.
    ///
    /// Without `force`, pinned and still-initializing chunks are refused.
    /// Returns true if the chunk was unloaded.
    pub fn unload_chunk(&self, chunk: &Arc<Chunk>, force: bool, save: bool) -> bool {
        let pos = chunk.pos();
        let _guard = self.load_lock.lock();
        if chunk.is_disposed() {
            return false;
        }
        if !force && (!chunk.allow_unload() || chunk.is_initializing()) {
            debug!(chunk = %pos, "unload refused");
            return false;
        }

        if save {
            self.save_chunk(chunk);
        }
        for entity in self.entities_in_chunk(pos) {
            self.remove_entity(entity.uuid);
        }
        chunk.dispose();
        self.chunks.remove_if(&pos, |_, stored| Arc::ptr_eq(stored, chunk));
        self.update_column(pos.x);
        debug!(chunk = %pos, "chunk unloaded");
        true
    }

    /// Loads every chunk within `load_radius` of `points` and unloads
    /// (saving) loaded chunks farther than `unload_radius` from all of them.
    pub fn update_loaded_region(&self, points: &[ChunkPos]) {
        if points.is_empty() {
            return;
        }
        self.load_around(points);

        let radius = self.config.unload_radius;
        let far: Vec<Arc<Chunk>> = self
            .loaded_chunks()
            .into_iter()
            .filter(|chunk| points.iter().all(|p| p.distance(chunk.pos()) > radius))
            .collect();
        let unloaded = far
            .iter()
            .filter(|chunk| self.unload_chunk(chunk, false, true))
            .count();
        if unloaded > 0 {
            debug!(unloaded, "unloaded distant chunks");
        }
    }

    fn load_around(&self, points: &[ChunkPos]) {
        let r = self.config.load_radius;
        for point in points {
            for dy in -r..=r {
                for dx in -r..=r {
                    // None only while paused; the next region update retries.
                    let _ = self.get_chunk(point.offset(dx, dy));
                }
            }
        }
    }

    /// Loads the chunks around the spawn point.
    pub fn load_spawn_area(&self) {
        self.load_around(&[self.spawn().chunk()]);
    }

    fn points_of_interest(&self) -> Vec<ChunkPos> {
        let mut points = BTreeSet::new();
        points.insert(self.spawn().chunk());
        for entity in self.entities.read().values() {
            if entity.kind == EntityKind::Dynamic {
                points.insert(entity.home_chunk());
            }
        }
        points.into_iter().collect()
    }

    // ------------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------------

    /// Replaces a block. Returns the previous cell.
    ///
    /// Does nothing (with a warning) if the chunk is not loaded.
    pub fn set_block(&self, world_x: i32, world_y: i32, block: Option<Block>, options: SetBlockOptions) -> Option<Block> {
        let pos = WorldPos::new(world_x, world_y);
        match self.loaded_chunk(pos.chunk()) {
            Some(chunk) if chunk.is_loaded() => chunk.set_block(pos.local(), block, options),
            _ => {
                warn!(x = world_x, y = world_y, "set_block outside loaded chunks");
                None
            }
        }
    }

    /// Places a fresh block of `material` with default options.
    pub fn set_material(&self, world_x: i32, world_y: i32, material: MaterialId) -> Option<Block> {
        self.set_block(world_x, world_y, Some(Block::new(material)), SetBlockOptions::default())
    }

    /// Reads a block of a loaded chunk.
    ///
    /// With `raw` the stored cell is returned as is (`None` for air).
    /// Otherwise air is returned as [`Block::AIR`]. Unloaded chunks give
    /// `None` either way.
    #[must_use]
    pub fn get_block(&self, world_x: i32, world_y: i32, raw: bool) -> Option<Block> {
        let pos = WorldPos::new(world_x, world_y);
        let chunk = self.loaded_chunk(pos.chunk())?;
        if !chunk.is_loaded() {
            return None;
        }
        let cell = chunk.get_block(pos.local());
        if raw {
            cell
        } else {
            Some(cell.unwrap_or(Block::AIR))
        }
    }

    /// Returns true if the cell is air. Unloaded chunks count as not air.
    #[must_use]
    pub fn is_air_block(&self, world_x: i32, world_y: i32) -> bool {
        let pos = WorldPos::new(world_x, world_y);
        self.loaded_chunk(pos.chunk())
            .filter(|chunk| chunk.is_loaded())
            .is_some_and(|chunk| chunk.get_block(pos.local()).is_none())
    }

    /// Returns true if entities can move through the cell. Unloaded chunks
    /// block.
    #[must_use]
    pub fn can_pass_through(&self, world_x: i32, world_y: i32) -> bool {
        let pos = WorldPos::new(world_x, world_y);
        self.loaded_chunk(pos.chunk())
            .filter(|chunk| chunk.is_loaded())
            .is_some_and(|chunk| !chunk.is_solid(pos.local()))
    }

    /// Light of a cell in a loaded chunk.
    #[must_use]
    pub fn light_at(&self, world_x: i32, world_y: i32) -> Option<BlockLight> {
        let pos = WorldPos::new(world_x, world_y);
        self.loaded_chunk(pos.chunk()).map(|chunk| chunk.light_at(pos.local()))
    }

    /// Lets the four neighbours of a changed cell re-check themselves.
    pub(crate) fn notify_neighbours(&self, pos: WorldPos) {
        for neighbour in pos.neighbors4() {
            if let Some(chunk) = self.loaded_chunk(neighbour.chunk()) {
                if chunk.is_loaded() {
                    chunk.neighbour_changed(neighbour.local());
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Lighting and columns
    // ------------------------------------------------------------------------

    /// Light sources around a chunk from the loaded 3x3 neighbourhood.
    pub(crate) fn light_sources(&self, pos: ChunkPos) -> LightSources {
        let mut sources = LightSources::new();
        let in_window = |v: i32| (-LIGHT_REACH..CHUNK_SIZE_I32 + LIGHT_REACH).contains(&v);

        for dy in -1..=1 {
            for dx in -1..=1 {
                let npos = pos.offset(dx, dy);
                let Some(chunk) = self.loaded_chunk(npos) else {
                    continue;
                };
                if chunk.is_disposed() {
                    continue;
                }
                let cells = chunk.snapshot_cells();
                let column = self.columns.get(&npos.x).map(|c| Arc::clone(c.value()));

                for local in LocalPos::all() {
                    let rx = dx * CHUNK_SIZE_I32 + i32::from(local.x);
                    let ry = dy * CHUNK_SIZE_I32 + i32::from(local.y);
                    if !in_window(rx) || !in_window(ry) {
                        continue;
                    }
                    let at = local.to_world(npos);
                    let strength = match cells[local.index()] {
                        Some(block) => block.material().luminescence,
                        None if column.as_ref().map_or(true, |c| c.is_sky_lit(at.x, at.y)) => SKY_LIGHT,
                        None => 0.0,
                    };
                    if strength > 0.0 {
                        sources.set(rx, ry, strength);
                    }
                }
            }
        }
        sources
    }

    /// Topmost light-blocking y at `world_x`, if any loaded chunk has one.
    #[must_use]
    pub fn column_top(&self, world_x: i32) -> Option<i32> {
        self.columns
            .get(&world_to_chunk(world_x))
            .and_then(|column| column.top(world_x))
    }

    /// Recomputes the column cache of a chunk-x stripe and relights the
    /// chunks whose sky light moved.
    pub(crate) fn update_column(&self, chunk_x: i32) {
        let changes = {
            let _guard = self.column_lock.lock();
            let members: Vec<Arc<Chunk>> = self
                .chunks
                .iter()
                .filter(|entry| entry.key().x == chunk_x && entry.value().is_loaded())
                .map(|entry| Arc::clone(entry.value()))
                .collect();
            if members.is_empty() {
                self.columns.remove(&chunk_x);
                return;
            }
            let column = Arc::clone(
                self.columns
                    .entry(chunk_x)
                    .or_insert_with(|| Arc::new(ChunkColumn::new(chunk_x)))
                    .value(),
            );
            column.recompute(members.iter().map(|chunk| (chunk.pos().y, chunk.opacity_mask())))
        };
        if changes.is_empty() {
            return;
        }

        let candidates: Vec<Arc<Chunk>> = self
            .chunks
            .iter()
            .filter(|entry| (entry.key().x - chunk_x).abs() <= 1)
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut targets: BTreeSet<ChunkPos> = BTreeSet::new();
        for change in &changes {
            let low = match (change.old, change.new) {
                (Some(a), Some(b)) => a.min(b) - LIGHT_REACH,
                _ => i32::MIN,
            };
            let high = change
                .old
                .max(change.new)
                .map_or(i32::MAX, |top| top.saturating_add(LIGHT_REACH));
            for chunk in &candidates {
                let pos = chunk.pos();
                let (x0, y0) = (pos.world_x(), pos.world_y());
                let x_hit = x0 <= change.world_x + LIGHT_REACH && x0 + CHUNK_SIZE_I32 > change.world_x - LIGHT_REACH;
                let y_hit = y0 <= high && y0 + CHUNK_SIZE_I32 > low;
                if x_hit && y_hit {
                    targets.insert(pos);
                }
            }
        }
        debug!(chunk_x, moved = changes.len(), relit = targets.len(), "column tops moved");
        for pos in targets {
            if let Some(chunk) = self.loaded_chunk(pos) {
                if chunk.is_loaded() {
                    chunk.request_light_update();
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------------

    /// Adds an entity, loading its home chunk.
    ///
    /// # Errors
    ///
    /// [`WorldError::DuplicateEntity`] if the UUID is taken, and
    /// [`WorldError::HomeChunkUnavailable`] if the home chunk cannot load.
    /// Either way the entity is dropped.
    pub fn add_entity(&self, entity: Entity) -> WorldResult<Uuid> {
        let uuid = entity.uuid;
        if self.entities.read().contains_key(&uuid) {
            warn!(%uuid, "rejecting duplicate entity");
            return Err(WorldError::DuplicateEntity(uuid));
        }
        let home = entity.home_chunk();
        if self.get_chunk(home).is_none() {
            warn!(%uuid, chunk = %home, "home chunk unavailable, dropping entity");
            return Err(WorldError::HomeChunkUnavailable { uuid, chunk: home });
        }
        self.insert_entity(entity)
    }

    fn insert_entity(&self, mut entity: Entity) -> WorldResult<Uuid> {
        let uuid = entity.uuid;
        let mut entities = self.entities.write();
        if entities.contains_key(&uuid) {
            return Err(WorldError::DuplicateEntity(uuid));
        }
        if entity.kind == EntityKind::Dynamic {
            let mut physics = self.physics.lock();
            let handle = physics.create_body(BodyKind::Dynamic, BodyOwner::Entity(uuid), entity.position);
            if let Some(body) = physics.body_mut(handle) {
                body.velocity = entity.velocity;
            }
            let shape = Shape::Box {
                width: entity.size[0],
                height: entity.size[1],
            };
            if physics.add_fixture(handle, shape).is_none() {
                error!(%uuid, "entity body vanished while attaching its box");
            }
            entity.body = Some(handle);
        }
        entities.insert(uuid, entity);
        Ok(uuid)
    }

    fn restore_entities(&self, entities: Vec<Entity>) {
        for entity in entities {
            if let Err(err) = self.insert_entity(entity) {
                warn!(%err, "dropping persisted entity");
            }
        }
    }

    /// Removes an entity and its body.
    pub fn remove_entity(&self, uuid: Uuid) -> Option<Entity> {
        let removed = self.entities.write().remove(&uuid)?;
        if let Some(body) = removed.body {
            self.physics.lock().destroy_body(body);
        }
        Some(removed)
    }

    /// Snapshot of one entity.
    #[must_use]
    pub fn entity(&self, uuid: Uuid) -> Option<Entity> {
        self.entities.read().get(&uuid).cloned()
    }

    /// Feet position of an entity as of the last physics step.
    #[must_use]
    pub fn entity_position(&self, uuid: Uuid) -> Option<[f32; 2]> {
        self.entities.read().get(&uuid).map(|e| e.position)
    }

    /// Number of entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.read().len()
    }

    /// Entities whose home is `pos`.
    #[must_use]
    pub fn entities_in_chunk(&self, pos: ChunkPos) -> Vec<Entity> {
        self.entities
            .read()
            .values()
            .filter(|e| e.home_chunk() == pos)
            .cloned()
            .collect()
    }

    /// Spawns the entity backing the block at `(x, y)` unless one exists.
    pub(crate) fn ensure_anchor(&self, x: i32, y: i32) {
        let backed = self
            .get_block(x, y, true)
            .is_some_and(|b| b.material().capabilities().backs_entity);
        if !backed {
            return;
        }
        let kind = EntityKind::BlockAnchored { x, y };
        let mut entities = self.entities.write();
        if entities.values().any(|e| e.kind == kind) {
            return;
        }
        let entity = Entity::anchored(x, y);
        debug!(uuid = %entity.uuid, x, y, "spawned block entity");
        entities.insert(entity.uuid, entity);
    }

    /// Removes the entity backing the block at `(x, y)`.
    pub(crate) fn remove_anchor(&self, x: i32, y: i32) {
        let kind = EntityKind::BlockAnchored { x, y };
        let anchored: Vec<Uuid> = self
            .entities
            .read()
            .values()
            .filter(|e| e.kind == kind)
            .map(|e| e.uuid)
            .collect();
        for uuid in anchored {
            self.remove_entity(uuid);
        }
    }

    fn spawn_missing_anchors(&self, chunk: &Chunk) {
        let pos = chunk.pos();
        for (index, cell) in chunk.snapshot_cells().iter().enumerate() {
            if cell.is_some_and(|b| b.material().capabilities().backs_entity) {
                let at = LocalPos::from_index(index).to_world(pos);
                self.ensure_anchor(at.x, at.y);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Simulation
    // ------------------------------------------------------------------------

    /// Ticks every valid chunk, then applies the collected block actions.
    /// A block moved by an action is not ticked again until the next pass.
    fn tick_chunks(&self, rare: bool) -> Result<(), TickError> {
        let mut errors = Vec::new();
        let chunks: Vec<Arc<Chunk>> = self
            .loaded_chunks()
            .into_iter()
            .filter(|chunk| chunk.is_valid())
            .collect();
        let actions: Vec<PendingAction> = chunks
            .iter()
            .flat_map(|chunk| chunk.collect_actions(rare, &mut errors))
            .collect();
        for action in actions {
            action.apply(self);
        }
        if !rare {
            for chunk in &chunks {
                chunk.update_if_dirty();
            }
        }
        TickError::combine(errors).map_or(Ok(()), Err)
    }

    /// Steps physics by one tick and copies body motion back to entities.
    pub fn step_physics(&self) {
        #[allow(clippy::cast_precision_loss)]
        let dt = 1.0 / self.ticker.config().tps.max(1) as f32;
        let moved: Vec<(Uuid, [f32; 2], [f32; 2])> = {
            let mut physics = self.physics.lock();
            physics.step(dt);
            physics
                .bodies()
                .filter_map(|(_, body)| match body.owner {
                    BodyOwner::Entity(uuid) if body.kind == BodyKind::Dynamic => {
                        Some((uuid, body.position, body.velocity))
                    }
                    _ => None,
                })
                .collect()
        };
        let mut entities = self.entities.write();
        for (uuid, position, velocity) in moved {
            if let Some(entity) = entities.get_mut(&uuid) {
                entity.position = position;
                entity.velocity = velocity;
            }
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Starts ticking this world. Must be called from the scheduler's main
    /// thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the ticker thread cannot start.
    pub fn start_ticker(self: &Arc<Self>) -> WorldResult<()> {
        let weak: Weak<World> = Arc::downgrade(self);
        let target: Weak<dyn Tickable> = weak;
        self.ticker.start(&self.scheduler, target)?;
        Ok(())
    }

    /// Tears everything down and reloads from the store.
    ///
    /// Pauses the ticker, drains the scheduler, saves, drops every entity and
    /// unloads every chunk (pinned ones too with `force`), destroys dangling
    /// physics bodies, then reloads metadata, restores the entities of the
    /// chunks that stayed, loads the spawn area and resumes the ticker.
    ///
    /// # Errors
    ///
    /// [`WorldError::InconsistentTeardown`] if teardown left chunks that
    /// should be gone, or any entity. The ticker stays paused.
    pub fn reload(&self, force: bool) -> WorldResult<()> {
        info!(force, "reloading world");
        let was_paused = self.ticker.is_paused();
        self.ticker.pause();

        let cancelled = self.scheduler.cancel_tasks();
        if !self.scheduler.wait_idle(self.config.drain_timeout()) {
            warn!(cancelled, "tasks still running after the drain timeout");
        }
        self.save_all();

        let uuids: Vec<Uuid> = self.entities.read().keys().copied().collect();
        for uuid in uuids {
            self.remove_entity(uuid);
        }
        for chunk in self.loaded_chunks() {
            self.unload_chunk(&chunk, force, false);
        }

        let resident = self.loaded_chunks();
        let unexpected = resident
            .iter()
            .filter(|chunk| force || chunk.allow_unload())
            .count();
        let entities = self.entity_count();
        if unexpected > 0 || entities > 0 {
            error!(chunks = unexpected, entities, "reload teardown left state behind");
            return Err(WorldError::InconsistentTeardown {
                chunks: unexpected,
                entities,
            });
        }

        let keep: HashSet<ChunkPos> = resident.iter().map(|chunk| chunk.pos()).collect();
        let destroyed = self
            .physics
            .lock()
            .retain_bodies(|owner| matches!(owner, BodyOwner::Chunk(pos) if keep.contains(pos)));
        if destroyed > 0 {
            warn!(destroyed, "destroyed dangling physics bodies");
        }

        match self.store.load_info() {
            Ok(Some(info)) => *self.info.write() = info,
            Ok(None) => {}
            Err(err) => error!(%err, "failed to reload world info"),
        }
        for chunk in &resident {
            match self.store.load_chunk(chunk.pos()) {
                Ok(Some(data)) => self.restore_entities(data.entities),
                Ok(None) => {}
                Err(err) => error!(chunk = %chunk.pos(), %err, "failed to restore entities"),
            }
            chunk.request_light_update();
        }
        self.load_spawn_area();

        if !was_paused {
            self.ticker.resume();
        }
        info!(resident = resident.len(), chunks = self.chunk_count(), "world reloaded");
        Ok(())
    }

    /// Stops the ticker, drains tasks, saves and unloads everything.
    pub fn shutdown(&self) {
        info!(name = %self.info.read().name, "shutting down world");
        self.ticker.stop();
        self.scheduler.cancel_tasks();
        if !self.scheduler.wait_idle(self.config.drain_timeout()) {
            warn!("tasks still running at shutdown");
        }
        self.save_all();
        for chunk in self.loaded_chunks() {
            self.unload_chunk(&chunk, true, false);
        }
        let leftover: Vec<Uuid> = self.entities.read().keys().copied().collect();
        for uuid in leftover {
            self.remove_entity(uuid);
        }
    }
}

impl Tickable for World {
    fn tick(&self) -> Result<(), TickError> {
        let result = self.tick_chunks(false);
        self.step_physics();
        result
    }

    fn tick_rare(&self) -> Result<(), TickError> {
        let result = self.tick_chunks(true);
        let weak = self.downgrade();
        self.scheduler.execute_async(move || {
            if let Some(world) = weak.upgrade() {
                let points = world.points_of_interest();
                world.update_loaded_region(&points);
            }
        });
        result
    }
}
