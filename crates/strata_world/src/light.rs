//! # Block Lighting
//!
//! Each cell owns a `LIGHT_RESOLUTION`² grid of sub-cell intensities derived
//! from nearby light sources.
//!
//! ## Algorithm
//!
//! ```text
//!   LightSources (40 x 40, chunk padded by LIGHT_REACH)
//!         │
//!         ├── column 0  ─┐
//!         ├── column 1  ─┤  rayon fan-out, one task per local x
//!         │     ...      ├──> join ──> LightGrid ──> commit if generation current
//!         └── column 31 ─┘
//! ```
//!
//! A source is a luminescent block or a sky-lit air cell. A sub-cell's
//! intensity is `strength * (1 - distance / LIGHT_RADIUS)` for the strongest
//! source in reach. Overlapping sources combine by max, never by sum.
//!
//! ## Generations
//!
//! [`ChunkLighting::begin`] bumps the chunk's generation and cancels any
//! in-flight ticket. [`ChunkLighting::commit`] swaps a result in only if its
//! ticket is still the current generation, checked under the same lock that
//! bumps it, so a superseded computation can never overwrite a newer one.

use crate::coords::{LocalPos, CHUNK_AREA, CHUNK_SIZE};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Sub-cells per cell edge.
pub const LIGHT_RESOLUTION: usize = 2;

/// Sub-cells per cell.
pub const LIGHT_CELLS: usize = LIGHT_RESOLUTION * LIGHT_RESOLUTION;

/// Maximum distance, in blocks, a source reaches.
pub const LIGHT_RADIUS: f32 = 3.5;

/// Whole-block reach of a source, `ceil(LIGHT_RADIUS)`.
pub const LIGHT_REACH: i32 = 4;

/// Strength of a sky-lit air cell.
pub const SKY_LIGHT: f32 = 1.0;

/// Light of one cell.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BlockLight {
    values: [f32; LIGHT_CELLS],
}

impl BlockLight {
    /// No light.
    pub const DARK: Self = Self {
        values: [0.0; LIGHT_CELLS],
    };

    /// Intensity of sub-cell `(sx, sy)`, each in `0..LIGHT_RESOLUTION`.
    #[inline]
    #[must_use]
    pub fn get(&self, sx: usize, sy: usize) -> f32 {
        self.values[sy * LIGHT_RESOLUTION + sx]
    }

    /// All sub-cell intensities, row-major.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[f32; LIGHT_CELLS] {
        &self.values
    }

    /// Brightest sub-cell.
    #[must_use]
    pub fn max(&self) -> f32 {
        self.values.iter().copied().fold(0.0, f32::max)
    }

    /// Returns true if every sub-cell is zero.
    #[must_use]
    pub fn is_dark(&self) -> bool {
        self.values.iter().all(|v| *v <= 0.0)
    }
}

/// Light of every cell in a chunk.
#[derive(Clone, Debug, PartialEq)]
pub struct LightGrid {
    cells: Vec<BlockLight>,
}

impl LightGrid {
    /// A fully dark grid.
    #[must_use]
    pub fn dark() -> Self {
        Self {
            cells: vec![BlockLight::DARK; CHUNK_AREA],
        }
    }

    fn from_columns(columns: &[[BlockLight; CHUNK_SIZE]]) -> Self {
        let mut grid = Self::dark();
        for (x, column) in columns.iter().enumerate() {
            for (y, light) in column.iter().enumerate() {
                grid.cells[LocalPos::new(x, y).index()] = *light;
            }
        }
        grid
    }

    /// Light of one cell.
    #[inline]
    #[must_use]
    pub fn get(&self, local: LocalPos) -> BlockLight {
        self.cells[local.index()]
    }

    /// Returns true if no cell is lit.
    #[must_use]
    pub fn is_dark(&self) -> bool {
        self.cells.iter().all(BlockLight::is_dark)
    }
}

/// Source strengths around a chunk.
///
/// Addressed relative to the chunk origin; valid coordinates are
/// `-LIGHT_REACH..CHUNK_SIZE + LIGHT_REACH` on both axes. Cells in unloaded
/// chunks stay at zero.
#[derive(Clone, Debug)]
pub struct LightSources {
    strengths: Vec<f32>,
}

impl LightSources {
    /// Edge length of the padded window.
    #[allow(clippy::cast_possible_wrap)]
    pub const SIDE: i32 = CHUNK_SIZE as i32 + 2 * LIGHT_REACH;

    /// An empty window.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn new() -> Self {
        Self {
            strengths: vec![0.0; (Self::SIDE * Self::SIDE) as usize],
        }
    }

    #[allow(clippy::cast_sign_loss)]
    fn index(x: i32, y: i32) -> Option<usize> {
        let px = x + LIGHT_REACH;
        let py = y + LIGHT_REACH;
        if (0..Self::SIDE).contains(&px) && (0..Self::SIDE).contains(&py) {
            Some((py * Self::SIDE + px) as usize)
        } else {
            None
        }
    }

    /// Sets the strength at chunk-relative `(x, y)`. Out-of-window writes are
    /// ignored.
    pub fn set(&mut self, x: i32, y: i32, strength: f32) {
        if let Some(index) = Self::index(x, y) {
            self.strengths[index] = strength;
        }
    }

    /// Strength at chunk-relative `(x, y)`, zero outside the window.
    #[must_use]
    pub fn get(&self, x: i32, y: i32) -> f32 {
        Self::index(x, y).map_or(0.0, |index| self.strengths[index])
    }

    /// Returns true if any source is present.
    #[must_use]
    pub fn has_any(&self) -> bool {
        self.strengths.iter().any(|s| *s > 0.0)
    }
}

impl Default for LightSources {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes one column, scanning local y from top to bottom.
#[must_use]
#[allow(clippy::cast_possible_wrap, clippy::cast_precision_loss)]
pub fn light_column(sources: &LightSources, local_x: usize) -> [BlockLight; CHUNK_SIZE] {
    let mut column = [BlockLight::DARK; CHUNK_SIZE];
    let cx = local_x as i32;

    for local_y in (0..CHUNK_SIZE).rev() {
        let cy = local_y as i32;
        let light = &mut column[local_y];

        for dy in -LIGHT_REACH..=LIGHT_REACH {
            for dx in -LIGHT_REACH..=LIGHT_REACH {
                let strength = sources.get(cx + dx, cy + dy);
                if strength <= 0.0 {
                    continue;
                }
                let source_x = (cx + dx) as f32 + 0.5;
                let source_y = (cy + dy) as f32 + 0.5;

                for sy in 0..LIGHT_RESOLUTION {
                    for sx in 0..LIGHT_RESOLUTION {
                        let px = cx as f32 + (sx as f32 + 0.5) / LIGHT_RESOLUTION as f32;
                        let py = cy as f32 + (sy as f32 + 0.5) / LIGHT_RESOLUTION as f32;
                        let distance = (px - source_x).hypot(py - source_y);
                        if distance >= LIGHT_RADIUS {
                            continue;
                        }
                        let intensity = strength * (1.0 - distance / LIGHT_RADIUS);
                        let slot = &mut light.values[sy * LIGHT_RESOLUTION + sx];
                        *slot = slot.max(intensity);
                    }
                }
            }
        }
    }
    column
}

/// Recomputes a whole chunk on `pool`, one task per column.
///
/// Returns `None` if `ticket` was superseded before the join completed.
#[must_use]
pub fn compute_light(
    sources: &LightSources,
    pool: &rayon::ThreadPool,
    ticket: &LightTicket,
) -> Option<LightGrid> {
    if !sources.has_any() {
        return (!ticket.is_cancelled()).then(LightGrid::dark);
    }

    let columns: Option<Vec<[BlockLight; CHUNK_SIZE]>> = pool.install(|| {
        (0..CHUNK_SIZE)
            .into_par_iter()
            .map(|x| (!ticket.is_cancelled()).then(|| light_column(sources, x)))
            .collect()
    });

    columns
        .filter(|_| !ticket.is_cancelled())
        .map(|columns| LightGrid::from_columns(&columns))
}

/// Claim on one lighting generation.
#[derive(Clone, Debug)]
pub struct LightTicket {
    generation: u64,
    cancelled: Arc<AtomicBool>,
}

impl LightTicket {
    /// Generation this ticket computes.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns true once a newer generation has started.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[derive(Debug, Default)]
struct LightState {
    generation: u64,
    committed: u64,
    in_flight: Option<Arc<AtomicBool>>,
}

/// Per-chunk lighting: the live grid plus its generation counter.
#[derive(Debug)]
pub struct ChunkLighting {
    state: Mutex<LightState>,
    grid: RwLock<Arc<LightGrid>>,
}

impl ChunkLighting {
    /// Dark lighting at generation zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LightState::default()),
            grid: RwLock::new(Arc::new(LightGrid::dark())),
        }
    }

    /// Starts a new generation, cancelling the in-flight one.
    pub fn begin(&self) -> LightTicket {
        let mut state = self.state.lock();
        if let Some(previous) = state.in_flight.take() {
            previous.store(true, Ordering::Release);
        }
        state.generation += 1;
        let cancelled = Arc::new(AtomicBool::new(false));
        state.in_flight = Some(Arc::clone(&cancelled));
        LightTicket {
            generation: state.generation,
            cancelled,
        }
    }

    /// Returns true if `ticket` is still the newest generation.
    #[must_use]
    pub fn is_current(&self, ticket: &LightTicket) -> bool {
        self.state.lock().generation == ticket.generation && !ticket.is_cancelled()
    }

    /// Installs `grid` if `ticket` is still current. Returns whether it did.
    pub fn commit(&self, ticket: &LightTicket, grid: LightGrid) -> bool {
        let mut state = self.state.lock();
        if state.generation != ticket.generation || ticket.is_cancelled() {
            return false;
        }
        *self.grid.write() = Arc::new(grid);
        state.committed = ticket.generation;
        state.in_flight = None;
        true
    }

    /// Invalidates any in-flight generation and darkens the grid.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        if let Some(previous) = state.in_flight.take() {
            previous.store(true, Ordering::Release);
        }
        state.generation += 1;
        *self.grid.write() = Arc::new(LightGrid::dark());
    }

    /// Newest generation started.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Generation of the live grid.
    #[must_use]
    pub fn committed_generation(&self) -> u64 {
        self.state.lock().committed
    }

    /// Returns true if a started generation has not committed yet.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state.lock().in_flight.is_some()
    }

    /// The live grid.
    #[must_use]
    pub fn grid(&self) -> Arc<LightGrid> {
        Arc::clone(&self.grid.read())
    }

    /// Light of one cell in the live grid.
    #[must_use]
    pub fn light_at(&self, local: LocalPos) -> BlockLight {
        self.grid.read().get(local)
    }
}

impl Default for ChunkLighting {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    fn single_source(x: i32, y: i32, strength: f32) -> LightSources {
        let mut sources = LightSources::new();
        sources.set(x, y, strength);
        sources
    }

    #[test]
    fn test_intensity_falls_off_with_distance() {
        let sources = single_source(10, 10, 1.0);
        let column = light_column(&sources, 10);

        let at_source = column[10].max();
        let one_away = column[11].max();
        let three_away = column[13].max();
        let far = column[16].max();
        println!("source={at_source} one={one_away} three={three_away} far={far}");

        assert!(at_source > one_away);
        assert!(one_away > three_away);
        assert!(three_away > 0.0);
        assert!(far <= 0.0, "light must not reach beyond the radius");
    }

    #[test]
    fn test_overlapping_sources_take_max() {
        let mut both = LightSources::new();
        both.set(10, 10, 1.0);
        both.set(12, 10, 1.0);
        let single = single_source(10, 10, 1.0);

        let combined = light_column(&both, 11)[10];
        let left_only = light_column(&single, 11)[10];
        for (sy, sx) in [(0, 0), (1, 0)] {
            assert!(combined.get(sx, sy) <= 1.0);
        }
        // Left half of cell 11 is closest to the left source, so adding the
        // right source cannot brighten it.
        assert!((combined.get(0, 0) - left_only.get(0, 0)).abs() < f32::EPSILON);
    }

    #[test]
    fn test_padding_lights_border_cells() {
        // Source just outside the chunk, in the left neighbour.
        let sources = single_source(-1, 5, 1.0);
        let column = light_column(&sources, 0);
        assert!(column[5].max() > 0.0);
    }

    #[test]
    fn test_no_sources_is_dark() {
        let lighting = ChunkLighting::new();
        let ticket = lighting.begin();
        let grid = compute_light(&LightSources::new(), &pool(), &ticket).unwrap();
        assert!(grid.is_dark());
    }

    #[test]
    fn test_compute_matches_columns() {
        let sources = single_source(7, 20, 0.5);
        let lighting = ChunkLighting::new();
        let ticket = lighting.begin();
        let grid = compute_light(&sources, &pool(), &ticket).unwrap();
        let column = light_column(&sources, 7);
        for (y, light) in column.iter().enumerate() {
            assert_eq!(grid.get(LocalPos::new(7, y)), *light);
        }
    }

    #[test]
    fn test_stale_generation_never_commits() {
        let lighting = ChunkLighting::new();
        let lit = {
            let mut grid = LightGrid::dark();
            grid.cells[0] = BlockLight { values: [1.0; LIGHT_CELLS] };
            grid
        };

        let first = lighting.begin();
        let second = lighting.begin();
        assert!(first.is_cancelled());
        assert!(!lighting.is_current(&first));

        assert!(lighting.commit(&second, LightGrid::dark()));
        assert!(!lighting.commit(&first, lit), "stale result overwrote the live grid");
        assert!(lighting.grid().is_dark());
        assert_eq!(lighting.committed_generation(), second.generation());
        assert!(!lighting.is_pending());
    }

    #[test]
    fn test_cancelled_ticket_aborts_compute() {
        let lighting = ChunkLighting::new();
        let ticket = lighting.begin();
        let _newer = lighting.begin();
        assert!(compute_light(&single_source(1, 1, 1.0), &pool(), &ticket).is_none());
    }

    #[test]
    fn test_shutdown_invalidates_in_flight() {
        let lighting = ChunkLighting::new();
        let ticket = lighting.begin();
        lighting.shutdown();
        assert!(!lighting.commit(&ticket, LightGrid::dark()));
    }
}
