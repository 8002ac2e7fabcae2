//! # Chunk Collision Body
//!
//! One static physics body per chunk whose fixtures are the edges between
//! solid and non-solid cells.
//!
//! ## Edge Ownership
//!
//! ```text
//!        open
//!     ┌───────┐
//!  open│ solid │open      an edge exists on a face of a solid cell
//!     └───────┘           iff the cell across that face is open
//!        open
//! ```
//!
//! Every edge is owned by the chunk holding the solid cell, so a face on a
//! chunk border is never duplicated by the neighbour. Faces whose far side
//! lies in an unloaded chunk are left out and remembered as deferred; the
//! chunk retries them later.
//!
//! Solidity is read through [`SolidityProbe`], backed by each chunk's
//! lock-free [`SolidityMask`], so refreshing edges never takes another
//! chunk's block lock.

use crate::coords::{ChunkPos, LocalPos, CHUNK_SIZE};
use crate::physics::{BodyHandle, BodyKind, BodyOwner, FixtureHandle, PhysicsWorld, Shape};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};

/// One bit per cell: set when the cell is solid.
#[derive(Debug)]
pub struct SolidityMask {
    rows: [AtomicU32; CHUNK_SIZE],
}

impl SolidityMask {
    /// All cells open.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: std::array::from_fn(|_| AtomicU32::new(0)),
        }
    }

    /// Returns true if the cell is solid.
    #[inline]
    #[must_use]
    pub fn get(&self, cell: LocalPos) -> bool {
        self.rows[usize::from(cell.y)].load(Ordering::Acquire) & (1 << cell.x) != 0
    }

    /// Marks the cell solid or open.
    #[inline]
    pub fn set(&self, cell: LocalPos, solid: bool) {
        let row = &self.rows[usize::from(cell.y)];
        if solid {
            row.fetch_or(1 << cell.x, Ordering::AcqRel);
        } else {
            row.fetch_and(!(1 << cell.x), Ordering::AcqRel);
        }
    }

    /// Bits of one row; bit `x` is cell `(x, y)`.
    #[inline]
    #[must_use]
    pub fn row(&self, y: usize) -> u32 {
        self.rows[y].load(Ordering::Acquire)
    }

    /// Number of solid cells.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.rows.iter().map(|row| row.load(Ordering::Acquire).count_ones()).sum()
    }
}

impl Default for SolidityMask {
    fn default() -> Self {
        Self::new()
    }
}

/// Solidity of a cell as seen by the body being built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Solidity {
    /// Collides.
    Solid,
    /// Does not collide.
    Open,
    /// Lies in a chunk that is not loaded.
    Unknown,
}

/// Answers solidity for chunk-relative coordinates in `-1..=CHUNK_SIZE`.
pub trait SolidityProbe {
    /// Solidity at chunk-relative `(x, y)`.
    fn solidity(&self, x: i32, y: i32) -> Solidity;
}

/// Side of a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Face {
    /// `-x` side.
    Left,
    /// `+x` side.
    Right,
    /// `-y` side.
    Bottom,
    /// `+y` side.
    Top,
}

impl Face {
    /// Every face.
    pub const ALL: [Face; 4] = [Face::Left, Face::Right, Face::Bottom, Face::Top];

    /// Step from a cell to the cell across this face.
    #[must_use]
    pub const fn offset(self) -> (i32, i32) {
        match self {
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
            Self::Bottom => (0, -1),
            Self::Top => (0, 1),
        }
    }

    /// The face seen from the other side.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
            Self::Bottom => Self::Top,
            Self::Top => Self::Bottom,
        }
    }

    /// Segment of this face for `cell`, relative to the chunk origin.
    #[must_use]
    fn segment(self, cell: LocalPos) -> ([f32; 2], [f32; 2]) {
        let x = f32::from(cell.x);
        let y = f32::from(cell.y);
        match self {
            Self::Left => ([x, y], [x, y + 1.0]),
            Self::Right => ([x + 1.0, y], [x + 1.0, y + 1.0]),
            Self::Bottom => ([x, y], [x + 1.0, y]),
            Self::Top => ([x, y + 1.0], [x + 1.0, y + 1.0]),
        }
    }

    /// Cells of a chunk lying against this side of the chunk.
    pub fn border_cells(self) -> impl Iterator<Item = LocalPos> {
        (0..CHUNK_SIZE).map(move |i| match self {
            Self::Left => LocalPos::new(0, i),
            Self::Right => LocalPos::new(CHUNK_SIZE - 1, i),
            Self::Bottom => LocalPos::new(i, 0),
            Self::Top => LocalPos::new(i, CHUNK_SIZE - 1),
        })
    }
}

/// Identifies one potential edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    /// Solid cell owning the edge.
    pub cell: LocalPos,
    /// Face of the cell.
    pub face: Face,
}

/// Collision mesh of one chunk.
#[derive(Debug)]
pub struct ChunkBody {
    pos: ChunkPos,
    body: BodyHandle,
    edges: HashMap<EdgeKey, FixtureHandle>,
    deferred: BTreeSet<LocalPos>,
    revision: u64,
}

impl ChunkBody {
    /// Creates the body and every edge the probe can resolve.
    #[allow(clippy::cast_precision_loss)]
    pub fn build(physics: &mut PhysicsWorld, pos: ChunkPos, probe: &impl SolidityProbe) -> Self {
        let body = physics.create_body(
            BodyKind::Static,
            BodyOwner::Chunk(pos),
            [pos.world_x() as f32, pos.world_y() as f32],
        );
        let mut chunk_body = Self {
            pos,
            body,
            edges: HashMap::new(),
            deferred: BTreeSet::new(),
            revision: 0,
        };
        for cell in LocalPos::all() {
            chunk_body.refresh_cell(physics, cell, probe);
        }
        chunk_body
    }

    /// Re-derives the four edges of `cell`. Returns true if any changed.
    pub fn refresh_cell(&mut self, physics: &mut PhysicsWorld, cell: LocalPos, probe: &impl SolidityProbe) -> bool {
        let x = i32::from(cell.x);
        let y = i32::from(cell.y);
        let solid = probe.solidity(x, y) == Solidity::Solid;
        let mut unresolved = false;
        let mut changed = false;

        for face in Face::ALL {
            let (dx, dy) = face.offset();
            let wanted = solid
                && match probe.solidity(x + dx, y + dy) {
                    Solidity::Open => true,
                    Solidity::Solid => false,
                    Solidity::Unknown => {
                        unresolved = true;
                        false
                    }
                };
            changed |= self.set_edge(physics, EdgeKey { cell, face }, wanted);
        }

        if unresolved {
            self.deferred.insert(cell);
        } else {
            self.deferred.remove(&cell);
        }
        changed
    }

    /// Refreshes `cell` and its in-chunk 4-neighbours.
    pub fn refresh_around(&mut self, physics: &mut PhysicsWorld, cell: LocalPos, probe: &impl SolidityProbe) -> bool {
        let mut changed = self.refresh_cell(physics, cell, probe);
        for face in Face::ALL {
            let (dx, dy) = face.offset();
            let nx = i32::from(cell.x) + dx;
            let ny = i32::from(cell.y) + dy;
            if let (Ok(nx), Ok(ny)) = (usize::try_from(nx), usize::try_from(ny)) {
                if nx < CHUNK_SIZE && ny < CHUNK_SIZE {
                    changed |= self.refresh_cell(physics, LocalPos::new(nx, ny), probe);
                }
            }
        }
        changed
    }

    /// Refreshes every cell on one side of the chunk.
    pub fn refresh_border(&mut self, physics: &mut PhysicsWorld, side: Face, probe: &impl SolidityProbe) -> bool {
        let mut changed = false;
        for cell in side.border_cells() {
            changed |= self.refresh_cell(physics, cell, probe);
        }
        changed
    }

    /// Retries every deferred cell. Returns true if none remain deferred.
    pub fn retry_deferred(&mut self, physics: &mut PhysicsWorld, probe: &impl SolidityProbe) -> bool {
        let pending: Vec<LocalPos> = self.deferred.iter().copied().collect();
        for cell in pending {
            self.refresh_cell(physics, cell, probe);
        }
        self.deferred.is_empty()
    }

    fn set_edge(&mut self, physics: &mut PhysicsWorld, key: EdgeKey, wanted: bool) -> bool {
        match (wanted, self.edges.get(&key).copied()) {
            (true, None) => {
                let (from, to) = key.face.segment(key.cell);
                match physics.add_fixture(self.body, Shape::Edge { from, to }) {
                    Some(fixture) => {
                        self.edges.insert(key, fixture);
                        self.revision += 1;
                        true
                    }
                    None => {
                        tracing::error!(chunk = %self.pos, "chunk body missing from physics world");
                        false
                    }
                }
            }
            (false, Some(fixture)) => {
                physics.remove_fixture(self.body, fixture);
                self.edges.remove(&key);
                self.revision += 1;
                true
            }
            _ => false,
        }
    }

    /// Destroys the physics body.
    pub fn destroy(self, physics: &mut PhysicsWorld) {
        physics.destroy_body(self.body);
    }

    /// Chunk this body belongs to.
    #[must_use]
    pub fn pos(&self) -> ChunkPos {
        self.pos
    }

    /// Physics handle.
    #[must_use]
    pub fn handle(&self) -> BodyHandle {
        self.body
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns true if the given face of `cell` carries an edge.
    #[must_use]
    pub fn has_edge(&self, cell: LocalPos, face: Face) -> bool {
        self.edges.contains_key(&EdgeKey { cell, face })
    }

    /// Cells with at least one face waiting on an unloaded neighbour.
    #[must_use]
    pub fn deferred_cells(&self) -> usize {
        self.deferred.len()
    }

    /// Incremented on every edge added or removed.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::GRAVITY;
    use std::collections::HashSet;

    /// Solid cells listed explicitly; anything outside `0..CHUNK_SIZE` is
    /// `outside`.
    struct Grid {
        solid: HashSet<(i32, i32)>,
        outside: Solidity,
    }

    impl SolidityProbe for Grid {
        fn solidity(&self, x: i32, y: i32) -> Solidity {
            #[allow(clippy::cast_possible_wrap)]
            let size = CHUNK_SIZE as i32;
            if !(0..size).contains(&x) || !(0..size).contains(&y) {
                return self.outside;
            }
            if self.solid.contains(&(x, y)) {
                Solidity::Solid
            } else {
                Solidity::Open
            }
        }
    }

    #[test]
    fn test_single_block_has_four_edges() {
        let mut physics = PhysicsWorld::new(GRAVITY);
        let grid = Grid {
            solid: [(5, 5)].into_iter().collect(),
            outside: Solidity::Open,
        };
        let body = ChunkBody::build(&mut physics, ChunkPos::new(0, 0), &grid);
        assert_eq!(body.edge_count(), 4);
        for face in Face::ALL {
            assert!(body.has_edge(LocalPos::new(5, 5), face));
        }
        assert_eq!(physics.body(body.handle()).unwrap().fixture_count(), 4);
    }

    #[test]
    fn test_shared_faces_have_no_edge() {
        let mut physics = PhysicsWorld::new(GRAVITY);
        let grid = Grid {
            solid: [(5, 5), (6, 5)].into_iter().collect(),
            outside: Solidity::Open,
        };
        let body = ChunkBody::build(&mut physics, ChunkPos::new(0, 0), &grid);
        assert_eq!(body.edge_count(), 6);
        assert!(!body.has_edge(LocalPos::new(5, 5), Face::Right));
        assert!(!body.has_edge(LocalPos::new(6, 5), Face::Left));
    }

    #[test]
    fn test_incremental_refresh_touches_neighbours() {
        let mut physics = PhysicsWorld::new(GRAVITY);
        let mut grid = Grid {
            solid: [(5, 5)].into_iter().collect(),
            outside: Solidity::Open,
        };
        let mut body = ChunkBody::build(&mut physics, ChunkPos::new(0, 0), &grid);
        let before = body.revision();

        grid.solid.insert((6, 5));
        assert!(body.refresh_around(&mut physics, LocalPos::new(6, 5), &grid));
        assert_eq!(body.edge_count(), 6);
        assert!(body.revision() > before);

        let settled = body.revision();
        assert!(!body.refresh_around(&mut physics, LocalPos::new(6, 5), &grid));
        assert_eq!(body.revision(), settled, "a no-op refresh must not touch edges");
    }

    #[test]
    fn test_unknown_neighbours_are_deferred() {
        let mut physics = PhysicsWorld::new(GRAVITY);
        let mut grid = Grid {
            solid: [(0, 10)].into_iter().collect(),
            outside: Solidity::Unknown,
        };
        let mut body = ChunkBody::build(&mut physics, ChunkPos::new(0, 0), &grid);
        assert!(!body.has_edge(LocalPos::new(0, 10), Face::Left));
        assert_eq!(body.deferred_cells(), 1);

        grid.outside = Solidity::Open;
        assert!(body.retry_deferred(&mut physics, &grid));
        assert!(body.has_edge(LocalPos::new(0, 10), Face::Left));
        assert_eq!(body.deferred_cells(), 0);
    }

    #[test]
    fn test_full_floor_is_one_surface() {
        let mut physics = PhysicsWorld::new(GRAVITY);
        #[allow(clippy::cast_possible_wrap)]
        let solid = (0..CHUNK_SIZE as i32).map(|x| (x, 0)).collect();
        let grid = Grid {
            solid,
            outside: Solidity::Solid,
        };
        let body = ChunkBody::build(&mut physics, ChunkPos::new(0, 0), &grid);
        // Only the top faces are exposed.
        assert_eq!(body.edge_count(), CHUNK_SIZE);
    }

    #[test]
    fn test_mask_bits() {
        let mask = SolidityMask::new();
        let cell = LocalPos::new(31, 7);
        assert!(!mask.get(cell));
        mask.set(cell, true);
        assert!(mask.get(cell));
        assert_eq!(mask.count(), 1);
        mask.set(cell, false);
        assert!(!mask.get(cell));
    }

    #[test]
    fn test_destroy_removes_body() {
        let mut physics = PhysicsWorld::new(GRAVITY);
        let grid = Grid {
            solid: HashSet::new(),
            outside: Solidity::Open,
        };
        let body = ChunkBody::build(&mut physics, ChunkPos::new(2, 3), &grid);
        assert_eq!(physics.body_count(), 1);
        body.destroy(&mut physics);
        assert_eq!(physics.body_count(), 0);
    }
}
