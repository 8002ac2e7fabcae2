//! # Chunks
//!
//! A chunk owns a `CHUNK_SIZE`² grid of cells and everything derived from
//! it: the ticking index, the collision body, and the lighting grid.
//!
//! ## Mutation Path
//!
//! ```text
//! set_block
//!   │  cells lock ─┬─ airish no-op? return
//!   │              ├─ install block, ticking index, solidity/opacity masks
//!   │              └─ dirty / prioritize / modified flags
//!   │  (lock released)
//!   ├─ light changed?    ──> request_light_update (async, generation checked)
//!   ├─ solidity changed? ──> ChunkBody::refresh_around (inline, physics lock)
//!   ├─ opacity changed?  ──> column update (async)
//!   ├─ send_update?      ──> BlockUpdateSink (async)
//!   └─ update_texture?   ──> neighbour notification (async)
//! ```
//!
//! ## Locks
//!
//! `cells` before `ticking`; `body` before the world's physics lock. Side
//! effects run only after `cells` is released, and neighbours are reached by
//! coordinate through [`World::loaded_chunk`], never by stored reference.

use crate::block::{both_airish, is_airish, Block, BlockAction};
use crate::chunk_body::{ChunkBody, Face, Solidity, SolidityMask, SolidityProbe};
use crate::coords::{ChunkPos, LocalPos, WorldPos, CHUNK_AREA, CHUNK_SIZE, CHUNK_SIZE_I32};
use crate::light::{compute_light, BlockLight, ChunkLighting, LightTicket, LIGHT_REACH};
use crate::persistence::ChunkData;
use crate::world::World;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use strata_core::TickError;
use tracing::{debug, trace, warn};

/// Options for a block mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SetBlockOptions {
    /// Mark the chunk for re-render and notify neighbouring blocks.
    pub update_texture: bool,
    /// Jump the render queue. Sticky until the next render.
    pub prioritize: bool,
    /// Hand the change to the network sink.
    pub send_update: bool,
}

impl Default for SetBlockOptions {
    fn default() -> Self {
        Self {
            update_texture: true,
            prioritize: false,
            send_update: true,
        }
    }
}

impl SetBlockOptions {
    /// Options for changes that must not be echoed to the network.
    #[must_use]
    pub fn silent() -> Self {
        Self {
            send_update: false,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct Cells {
    blocks: Vec<Option<Block>>,
    dirty: bool,
    prioritize: bool,
    all_air: bool,
}

/// What a mutation changed, decided under the cells lock.
#[derive(Clone, Copy, Debug, Default)]
struct Transition {
    light: bool,
    solid: bool,
    opaque: bool,
    material: bool,
    removed_anchor: bool,
    added_anchor: bool,
}

impl Transition {
    #[allow(clippy::float_cmp)]
    fn between(old: Option<&Block>, new: Option<&Block>) -> Self {
        let solid = |cell: Option<&Block>| cell.is_some_and(|b| b.material().solid);
        let opaque = |cell: Option<&Block>| cell.is_some_and(|b| b.material().blocks_light);
        let glow = |cell: Option<&Block>| cell.map_or(0.0, |b| b.material().luminescence);
        let anchor = |cell: Option<&Block>| cell.is_some_and(|b| b.material().capabilities().backs_entity);

        Self {
            light: glow(old) != glow(new) || is_airish(old) != is_airish(new),
            solid: solid(old) != solid(new),
            opaque: opaque(old) != opaque(new),
            material: old.map(Block::id) != new.map(Block::id),
            removed_anchor: anchor(old),
            added_anchor: anchor(new),
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum BodyOp {
    Around(LocalPos),
    Cell(LocalPos),
    Border(Face),
    Deferred,
}

/// A chunk of the world.
#[derive(Debug)]
pub struct Chunk {
    pos: ChunkPos,
    world: Weak<World>,
    cells: Mutex<Cells>,
    solidity: SolidityMask,
    opacity: SolidityMask,
    ticking: Mutex<BTreeSet<LocalPos>>,
    body: Mutex<Option<ChunkBody>>,
    lighting: ChunkLighting,
    initializing: AtomicBool,
    disposed: AtomicBool,
    allow_unload: AtomicBool,
    modified: AtomicBool,
    retry_pending: AtomicBool,
}

impl Chunk {
    /// An empty, initializing chunk belonging to `world`.
    #[must_use]
    pub fn new(world: &World, pos: ChunkPos) -> Self {
        Self::with_world(world.downgrade(), pos)
    }

    /// An empty, initializing chunk attached to no world.
    ///
    /// Such a chunk can be filled and serialized but never becomes valid.
    #[must_use]
    pub fn detached(pos: ChunkPos) -> Self {
        Self::with_world(Weak::new(), pos)
    }

    fn with_world(world: Weak<World>, pos: ChunkPos) -> Self {
        Self {
            pos,
            world,
            cells: Mutex::new(Cells {
                blocks: vec![None; CHUNK_AREA],
                dirty: false,
                prioritize: false,
                all_air: true,
            }),
            solidity: SolidityMask::new(),
            opacity: SolidityMask::new(),
            ticking: Mutex::new(BTreeSet::new()),
            body: Mutex::new(None),
            lighting: ChunkLighting::new(),
            initializing: AtomicBool::new(true),
            disposed: AtomicBool::new(false),
            allow_unload: AtomicBool::new(true),
            modified: AtomicBool::new(false),
            retry_pending: AtomicBool::new(false),
        }
    }

    /// Rebuilds an initializing chunk from its persisted cells.
    ///
    /// Entities in `data` are not touched; the world restores them.
    #[must_use]
    pub fn from_data(world: &World, data: &ChunkData) -> Self {
        let chunk = Self::new(world, data.pos);
        for (index, cell) in data.blocks.iter().enumerate() {
            chunk.fill(LocalPos::from_index(index), *cell);
        }
        chunk
    }

    /// Writes a cell of an initializing chunk without side effects.
    ///
    /// # Panics
    ///
    /// Panics once the chunk has finished loading.
    pub fn fill(&self, local: LocalPos, block: Option<Block>) {
        assert!(
            self.is_initializing(),
            "fill on chunk {} after it finished loading",
            self.pos
        );
        let block = Block::normalize(block);
        self.cells.lock().blocks[local.index()] = block;
        self.solidity.set(local, block.is_some_and(|b| b.material().solid));
        self.opacity.set(local, block.is_some_and(|b| b.material().blocks_light));
    }

    /// Persistable cells. Entities are left empty for the world to fill in.
    #[must_use]
    pub fn to_data(&self) -> ChunkData {
        ChunkData {
            pos: self.pos,
            blocks: self.cells.lock().blocks.clone(),
            entities: Vec::new(),
        }
    }

    /// Chunk position.
    #[inline]
    #[must_use]
    pub fn pos(&self) -> ChunkPos {
        self.pos
    }

    /// Stored cell; `None` is air.
    #[must_use]
    pub fn get_block(&self, local: LocalPos) -> Option<Block> {
        self.cells.lock().blocks[local.index()]
    }

    /// Copy of every cell in row-major order.
    #[must_use]
    pub fn snapshot_cells(&self) -> Vec<Option<Block>> {
        self.cells.lock().blocks.clone()
    }

    /// Returns true if the cell is solid.
    #[inline]
    #[must_use]
    pub fn is_solid(&self, local: LocalPos) -> bool {
        self.solidity.get(local)
    }

    /// Per-cell solidity bits.
    #[must_use]
    pub fn solidity_mask(&self) -> &SolidityMask {
        &self.solidity
    }

    /// Per-cell light-blocking bits.
    #[must_use]
    pub fn opacity_mask(&self) -> &SolidityMask {
        &self.opacity
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Returns true until [`Self::finish_loading`] completes.
    #[inline]
    #[must_use]
    pub fn is_initializing(&self) -> bool {
        self.initializing.load(Ordering::Acquire)
    }

    /// Returns true once [`Self::dispose`] has run.
    #[inline]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Finished loading and not yet disposed.
    #[inline]
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        !self.is_initializing() && !self.is_disposed()
    }

    /// Loaded and carrying a collision body.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_loaded() && self.body.lock().is_some()
    }

    /// Returns true if the chunk may be unloaded without force.
    #[must_use]
    pub fn allow_unload(&self) -> bool {
        self.allow_unload.load(Ordering::Acquire)
    }

    /// Pins (`false`) or unpins the chunk.
    pub fn set_allow_unload(&self, allow: bool) {
        self.allow_unload.store(allow, Ordering::Release);
    }

    /// Returns true if cells changed since the last save.
    #[must_use]
    pub fn should_save(&self) -> bool {
        self.modified.load(Ordering::Acquire)
    }

    /// Clears the modified flag after a successful save.
    pub fn mark_saved(&self) {
        self.modified.store(false, Ordering::Release);
    }

    /// Cached all-air flag, refreshed by loading and [`Self::update_if_dirty`].
    #[must_use]
    pub fn is_all_air(&self) -> bool {
        self.cells.lock().all_air
    }

    /// Returns true if a re-render is pending.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.cells.lock().dirty
    }

    /// Returns true if the pending re-render is prioritized.
    #[must_use]
    pub fn is_prioritized(&self) -> bool {
        self.cells.lock().prioritize
    }

    /// Cells in the ticking index.
    #[must_use]
    pub fn ticking_blocks(&self) -> Vec<LocalPos> {
        self.ticking.lock().iter().copied().collect()
    }

    /// Completes loading: ticking index, collision body, column, lighting.
    ///
    /// # Panics
    ///
    /// Panics if the chunk is not initializing.
    pub fn finish_loading(self: &Arc<Self>) {
        assert!(
            self.is_initializing(),
            "finish_loading on chunk {} which is not initializing",
            self.pos
        );
        let Some(world) = self.world.upgrade() else {
            warn!(chunk = %self.pos, "finish_loading on a chunk without a world");
            return;
        };

        {
            let mut cells = self.cells.lock();
            let mut ticking = self.ticking.lock();
            ticking.clear();
            for (index, cell) in cells.blocks.iter().enumerate() {
                if cell.is_some_and(|b| b.material().capabilities().ticks) {
                    ticking.insert(LocalPos::from_index(index));
                }
            }
            cells.all_air = cells.blocks.iter().all(Option::is_none);
            cells.dirty = true;
        }

        let probe = self.probe(&world);
        let deferred = {
            let mut body = self.body.lock();
            let mut physics = world.physics().lock();
            let built = ChunkBody::build(&mut physics, self.pos, &probe);
            let deferred = built.deferred_cells() > 0;
            *body = Some(built);
            deferred
        };
        drop(probe);
        self.initializing.store(false, Ordering::Release);

        for face in Face::ALL {
            let (dx, dy) = face.offset();
            if let Some(neighbour) = world.loaded_chunk(self.pos.offset(dx, dy)) {
                if neighbour.is_loaded() {
                    neighbour.refresh_body(&world, BodyOp::Border(face.opposite()), 0);
                }
            }
        }
        if deferred {
            self.schedule_body_retry(&world, 0);
        }

        world.update_column(self.pos.x);
        self.request_light_update();
        for pos in self.pos.neighbors8() {
            if let Some(neighbour) = world.loaded_chunk(pos) {
                if neighbour.is_loaded() {
                    neighbour.request_light_update();
                }
            }
        }
        debug!(chunk = %self.pos, "chunk loaded");
    }

    /// Tears the chunk down: lighting, collision body, ticking index.
    ///
    /// # Panics
    ///
    /// Panics on a second call.
    pub fn dispose(&self) {
        assert!(
            !self.disposed.swap(true, Ordering::AcqRel),
            "chunk {} disposed twice",
            self.pos
        );
        self.lighting.shutdown();
        let body = self.body.lock().take();
        if let Some(body) = body {
            match self.world.upgrade() {
                Some(world) => body.destroy(&mut world.physics().lock()),
                None => trace!(chunk = %self.pos, "world gone, body dropped with it"),
            }
        }
        self.ticking.lock().clear();
        debug!(chunk = %self.pos, "chunk disposed");
    }

    // ------------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------------

    /// Replaces a cell. Returns the previous cell.
    ///
    /// Replacing air with air changes nothing. A disposed chunk logs and
    /// returns `None`.
    pub fn set_block(self: &Arc<Self>, local: LocalPos, block: Option<Block>, options: SetBlockOptions) -> Option<Block> {
        if self.is_disposed() {
            warn!(chunk = %self.pos, x = local.x, y = local.y, "set_block on disposed chunk");
            return None;
        }
        let new = Block::normalize(block);

        let (previous, transition) = {
            let mut cells = self.cells.lock();
            let index = local.index();
            let current = cells.blocks[index];
            if both_airish(current.as_ref(), new.as_ref()) {
                return current;
            }

            cells.blocks[index] = new;
            if options.update_texture {
                cells.dirty = true;
                cells.prioritize |= options.prioritize;
            }
            {
                let mut ticking = self.ticking.lock();
                if new.is_some_and(|b| b.material().capabilities().ticks) {
                    ticking.insert(local);
                } else {
                    ticking.remove(&local);
                }
            }
            self.solidity.set(local, new.is_some_and(|b| b.material().solid));
            self.opacity.set(local, new.is_some_and(|b| b.material().blocks_light));
            self.modified.store(true, Ordering::Release);
            (current, Transition::between(current.as_ref(), new.as_ref()))
        };

        let Some(world) = self.world.upgrade() else {
            return previous;
        };
        let world_pos = local.to_world(self.pos);
        let valid = self.is_valid();

        if transition.light && valid {
            self.request_light_update();
            self.relight_neighbours_near(&world, local);
        }

        if transition.solid && valid {
            self.refresh_body(&world, BodyOp::Around(local), 0);
            self.refresh_neighbour_body(&world, local);
        }

        if transition.opaque {
            let weak = world.downgrade();
            let chunk_x = self.pos.x;
            world.scheduler().execute_async(move || {
                if let Some(world) = weak.upgrade() {
                    world.update_column(chunk_x);
                }
            });
        }

        if options.send_update && valid && transition.material {
            if let Some(network) = world.network() {
                world.scheduler().execute_async(move || {
                    network.block_changed(world_pos.x, world_pos.y, new);
                });
            }
        }

        if options.update_texture {
            let weak = world.downgrade();
            world.scheduler().execute_async(move || {
                if let Some(world) = weak.upgrade() {
                    world.notify_neighbours(world_pos);
                }
            });
        }

        if transition.removed_anchor || (transition.added_anchor && valid) {
            let weak = world.downgrade();
            let (removed, added) = (transition.removed_anchor, transition.added_anchor && valid);
            world.scheduler().execute_async(move || {
                let Some(world) = weak.upgrade() else { return };
                if removed {
                    world.remove_anchor(world_pos.x, world_pos.y);
                }
                if added {
                    world.ensure_anchor(world_pos.x, world_pos.y);
                }
            });
        }

        previous
    }

    /// Re-checks a cell after a neighbouring block changed.
    pub(crate) fn neighbour_changed(&self, local: LocalPos) {
        let ticks = self.cells.lock().blocks[local.index()]
            .is_some_and(|b| b.material().capabilities().ticks);
        if ticks && self.ticking.lock().insert(local) {
            debug!(chunk = %self.pos, x = local.x, y = local.y, "re-indexed ticking block");
        }
    }

    /// Clears the dirty flag, refreshes the all-air cache and requests a
    /// render. Returns false if nothing was pending.
    pub fn update_if_dirty(&self) -> bool {
        let prioritize = {
            let mut cells = self.cells.lock();
            if !cells.dirty {
                return false;
            }
            let prioritize = cells.prioritize;
            cells.dirty = false;
            cells.prioritize = false;
            cells.all_air = cells.blocks.iter().all(Option::is_none);
            prioritize
        };
        if let Some(renderer) = self.world.upgrade().and_then(|world| world.renderer()) {
            renderer.request_render(self.pos, prioritize);
        }
        true
    }

    // ------------------------------------------------------------------------
    // Ticking
    // ------------------------------------------------------------------------

    /// Ticks every indexed block, then applies their actions through the
    /// world once no chunk lock is held.
    ///
    /// # Errors
    ///
    /// Returns the combined failures of individual blocks. Every block is
    /// ticked regardless.
    pub fn tick(&self, rare: bool) -> Result<(), TickError> {
        let mut errors = Vec::new();
        let actions = self.collect_actions(rare, &mut errors);
        if let Some(world) = self.world.upgrade() {
            for action in actions {
                action.apply(&world);
            }
        }
        TickError::combine(errors).map_or(Ok(()), Err)
    }

    /// Ticks every indexed block and returns the actions they asked for
    /// without applying them. Failures are appended to `errors`.
    pub(crate) fn collect_actions(&self, rare: bool, errors: &mut Vec<TickError>) -> Vec<PendingAction> {
        if !self.is_loaded() {
            return Vec::new();
        }
        let snapshot = self.ticking_blocks();
        let mut actions = Vec::new();

        for local in snapshot {
            let outcome = {
                let mut cells = self.cells.lock();
                match cells.blocks[local.index()].as_mut() {
                    Some(block) if block.material().capabilities().ticks => {
                        let before = block.payload();
                        let outcome = block.try_tick(rare).map(|action| (action, *block));
                        if block.payload() != before {
                            self.modified.store(true, Ordering::Release);
                        }
                        Some(outcome)
                    }
                    _ => None,
                }
            };
            let pos = local.to_world(self.pos);
            match outcome {
                Some(Ok((Some(action), block))) => actions.push(PendingAction { pos, block, action }),
                Some(Ok((None, _))) => {}
                Some(Err(reason)) => errors.push(Block::tick_error(pos.x, pos.y, reason)),
                None => {
                    self.ticking.lock().remove(&local);
                }
            }
        }
        actions
    }

    // ------------------------------------------------------------------------
    // Lighting
    // ------------------------------------------------------------------------

    /// Starts a new lighting generation and computes it off-thread.
    pub fn request_light_update(self: &Arc<Self>) {
        if self.is_disposed() {
            return;
        }
        let Some(world) = self.world.upgrade() else {
            return;
        };
        let ticket = self.lighting.begin();
        let chunk = Arc::clone(self);
        world.scheduler().execute_async(move || chunk.recompute_light(&ticket));
    }

    fn recompute_light(&self, ticket: &LightTicket) {
        if self.is_disposed() || !self.lighting.is_current(ticket) {
            return;
        }
        let Some(world) = self.world.upgrade() else {
            return;
        };
        let sources = world.light_sources(self.pos);
        let Some(grid) = compute_light(&sources, world.light_pool(), ticket) else {
            trace!(chunk = %self.pos, generation = ticket.generation(), "lighting superseded");
            return;
        };
        if self.lighting.commit(ticket, grid) {
            if let Some(renderer) = world.renderer() {
                renderer.request_render(self.pos, false);
            }
        } else {
            trace!(chunk = %self.pos, generation = ticket.generation(), "stale lighting discarded");
        }
    }

    fn relight_neighbours_near(&self, world: &World, local: LocalPos) {
        let x = i32::from(local.x);
        let y = i32::from(local.y);
        let near = |v: i32, d: i32| match d {
            -1 => v < LIGHT_REACH,
            1 => v >= CHUNK_SIZE_I32 - LIGHT_REACH,
            _ => true,
        };
        for dy in -1..=1 {
            for dx in -1..=1 {
                if (dx, dy) == (0, 0) || !near(x, dx) || !near(y, dy) {
                    continue;
                }
                if let Some(neighbour) = world.loaded_chunk(self.pos.offset(dx, dy)) {
                    if neighbour.is_loaded() {
                        neighbour.request_light_update();
                    }
                }
            }
        }
    }

    /// Lighting state.
    #[must_use]
    pub fn lighting(&self) -> &ChunkLighting {
        &self.lighting
    }

    /// Light of one cell.
    #[must_use]
    pub fn light_at(&self, local: LocalPos) -> BlockLight {
        self.lighting.light_at(local)
    }

    // ------------------------------------------------------------------------
    // Collision body
    // ------------------------------------------------------------------------

    /// Number of collision edges, `None` without a body.
    #[must_use]
    pub fn edge_count(&self) -> Option<usize> {
        self.body.lock().as_ref().map(ChunkBody::edge_count)
    }

    /// Body revision, bumped on every edge change. `None` without a body.
    #[must_use]
    pub fn body_revision(&self) -> Option<u64> {
        self.body.lock().as_ref().map(ChunkBody::revision)
    }

    /// Returns true if an edge exists on `face` of `cell`.
    #[must_use]
    pub fn has_edge(&self, cell: LocalPos, face: Face) -> bool {
        self.body.lock().as_ref().is_some_and(|body| body.has_edge(cell, face))
    }

    /// Returns true while a timed retry of the deferred edges is scheduled.
    #[must_use]
    pub fn is_body_retry_pending(&self) -> bool {
        self.retry_pending.load(Ordering::Acquire)
    }

    /// Cells waiting on an unloaded neighbour.
    #[must_use]
    pub fn deferred_edges(&self) -> usize {
        self.body.lock().as_ref().map_or(0, ChunkBody::deferred_cells)
    }

    fn probe(&self, world: &World) -> NeighbourProbe<'_> {
        let side = |face: Face| {
            let (dx, dy) = face.offset();
            world.loaded_chunk(self.pos.offset(dx, dy))
        };
        NeighbourProbe {
            chunk: self,
            left: side(Face::Left),
            right: side(Face::Right),
            bottom: side(Face::Bottom),
            top: side(Face::Top),
        }
    }

    fn refresh_body(self: &Arc<Self>, world: &World, op: BodyOp, attempt: u32) {
        let probe = self.probe(world);
        let deferred = {
            let mut body = self.body.lock();
            let Some(body) = body.as_mut() else {
                return;
            };
            let mut physics = world.physics().lock();
            let changed = match op {
                BodyOp::Around(cell) => body.refresh_around(&mut physics, cell, &probe),
                BodyOp::Cell(cell) => body.refresh_cell(&mut physics, cell, &probe),
                BodyOp::Border(side) => body.refresh_border(&mut physics, side, &probe),
                BodyOp::Deferred => {
                    let before = body.revision();
                    body.retry_deferred(&mut physics, &probe);
                    body.revision() != before
                }
            };
            if changed {
                trace!(chunk = %self.pos, ?op, revision = body.revision(), "edges refreshed");
            }
            body.deferred_cells() > 0
        };
        if deferred {
            self.schedule_body_retry(world, attempt);
        }
    }

    /// A border cell's solidity feeds the neighbour's edge across that border.
    fn refresh_neighbour_body(&self, world: &World, local: LocalPos) {
        let last = CHUNK_SIZE - 1;
        let (x, y) = (usize::from(local.x), usize::from(local.y));
        let across = [
            (x == 0, Face::Left, LocalPos::new(last, y)),
            (x == last, Face::Right, LocalPos::new(0, y)),
            (y == 0, Face::Bottom, LocalPos::new(x, last)),
            (y == last, Face::Top, LocalPos::new(x, 0)),
        ];
        for (on_border, face, cell) in across {
            if !on_border {
                continue;
            }
            let (dx, dy) = face.offset();
            if let Some(neighbour) = world.loaded_chunk(self.pos.offset(dx, dy)) {
                if neighbour.is_loaded() {
                    neighbour.refresh_body(world, BodyOp::Cell(cell), 0);
                }
            }
        }
    }

    fn schedule_body_retry(self: &Arc<Self>, world: &World, attempt: u32) {
        let max = world.config().body_retry_attempts;
        if attempt >= max {
            debug!(chunk = %self.pos, attempts = max, "edges still deferred, waiting for neighbour load");
            return;
        }
        if self.retry_pending.swap(true, Ordering::AcqRel) {
            return;
        }
        let chunk = Arc::clone(self);
        world
            .scheduler()
            .schedule_async(world.config().body_retry_delay(), move || {
                chunk.retry_pending.store(false, Ordering::Release);
                if chunk.is_disposed() {
                    return;
                }
                if let Some(world) = chunk.world.upgrade() {
                    chunk.refresh_body(&world, BodyOp::Deferred, attempt + 1);
                }
            });
    }
}

/// Solidity lookups for a chunk and its four neighbours via their lock-free
/// masks.
struct NeighbourProbe<'a> {
    chunk: &'a Chunk,
    left: Option<Arc<Chunk>>,
    right: Option<Arc<Chunk>>,
    bottom: Option<Arc<Chunk>>,
    top: Option<Arc<Chunk>>,
}

impl SolidityProbe for NeighbourProbe<'_> {
    #[allow(clippy::cast_sign_loss)]
    fn solidity(&self, x: i32, y: i32) -> Solidity {
        let (chunk, lx, ly) = if x < 0 {
            (self.left.as_deref(), x + CHUNK_SIZE_I32, y)
        } else if x >= CHUNK_SIZE_I32 {
            (self.right.as_deref(), x - CHUNK_SIZE_I32, y)
        } else if y < 0 {
            (self.bottom.as_deref(), x, y + CHUNK_SIZE_I32)
        } else if y >= CHUNK_SIZE_I32 {
            (self.top.as_deref(), x, y - CHUNK_SIZE_I32)
        } else {
            (Some(self.chunk), x, y)
        };
        let in_range = |v: i32| (0..CHUNK_SIZE_I32).contains(&v);
        match chunk {
            Some(chunk) if !chunk.is_disposed() && in_range(lx) && in_range(ly) => {
                if chunk.solidity.get(LocalPos::new(lx as usize, ly as usize)) {
                    Solidity::Solid
                } else {
                    Solidity::Open
                }
            }
            _ => Solidity::Unknown,
        }
    }
}

/// A block action recorded during a tick, applied once every chunk has
/// ticked.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PendingAction {
    pos: WorldPos,
    block: Block,
    action: BlockAction,
}

impl PendingAction {
    pub(crate) fn apply(self, world: &World) {
        let Self { pos, block, action } = self;
        match action {
            BlockAction::Fall => {
                if world.get_block(pos.x, pos.y, true) != Some(block) {
                    trace!(x = pos.x, y = pos.y, "falling block already gone");
                    return;
                }
                let Some(below) = pos.checked_offset(0, -1) else {
                    return;
                };
                if world.is_air_block(below.x, below.y) {
                    world.set_block(below.x, below.y, Some(block), SetBlockOptions::default());
                    world.set_block(pos.x, pos.y, None, SetBlockOptions::default());
                }
            }
            BlockAction::Explode { radius } => {
                let r = i32::from(radius);
                debug!(x = pos.x, y = pos.y, radius, "explosion");
                for dy in -r..=r {
                    for dx in -r..=r {
                        if dx * dx + dy * dy > r * r {
                            continue;
                        }
                        let Some(target) = pos.checked_offset(dx, dy) else {
                            continue;
                        };
                        let breakable = world
                            .get_block(target.x, target.y, true)
                            .is_some_and(|b| b.material().is_breakable());
                        if breakable {
                            world.set_block(target.x, target.y, None, SetBlockOptions::default());
                        }
                    }
                }
            }
        }
    }
}
