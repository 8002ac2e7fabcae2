//! # Coordinate Spaces
//!
//! World coordinates address individual blocks; chunk coordinates address
//! chunks. Conversions are shifts and masks, so negative coordinates floor
//! toward negative infinity:
//!
//! ```text
//!   world x:  -33 -32 | -31 ... -1 | 0 ... 31 | 32
//!   chunk x:   -2  -1 |  -1 ... -1 | 0 ...  0 |  1
//!   offset:    31   0 |   1 ... 31 | 0 ... 31 |  0
//! ```

use serde::{Deserialize, Serialize};

/// log2 of [`CHUNK_SIZE`].
pub const CHUNK_SIZE_SHIFT: u32 = 5;

/// Chunk width and height in blocks.
pub const CHUNK_SIZE: usize = 1 << CHUNK_SIZE_SHIFT;

/// [`CHUNK_SIZE`] as a signed world distance.
pub const CHUNK_SIZE_I32: i32 = 1 << CHUNK_SIZE_SHIFT;

/// Mask extracting the in-chunk offset from a world coordinate.
pub const CHUNK_MASK: i32 = CHUNK_SIZE_I32 - 1;

/// Cells per chunk.
pub const CHUNK_AREA: usize = CHUNK_SIZE * CHUNK_SIZE;

/// Chunk coordinate containing `world`.
#[inline]
#[must_use]
pub const fn world_to_chunk(world: i32) -> i32 {
    world >> CHUNK_SIZE_SHIFT
}

/// Offset of `world` inside its chunk, always in `0..CHUNK_SIZE`.
#[inline]
#[must_use]
pub const fn chunk_offset(world: i32) -> i32 {
    world & CHUNK_MASK
}

/// World coordinate of a chunk's origin.
#[inline]
#[must_use]
pub const fn chunk_to_world(chunk: i32) -> i32 {
    chunk << CHUNK_SIZE_SHIFT
}

/// Chunk coordinate (identifies a chunk in the world grid).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkPos {
    /// X coordinate (in chunks, not blocks).
    pub x: i32,
    /// Y coordinate (in chunks, not blocks).
    pub y: i32,
}

impl ChunkPos {
    /// Creates a new chunk coordinate.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Chunk containing the given world block.
    #[inline]
    #[must_use]
    pub const fn from_world(world_x: i32, world_y: i32) -> Self {
        Self {
            x: world_to_chunk(world_x),
            y: world_to_chunk(world_y),
        }
    }

    /// World X of the chunk's origin (bottom-left corner).
    #[inline]
    #[must_use]
    pub const fn world_x(self) -> i32 {
        chunk_to_world(self.x)
    }

    /// World Y of the chunk's origin.
    #[inline]
    #[must_use]
    pub const fn world_y(self) -> i32 {
        chunk_to_world(self.y)
    }

    /// Chunk offset by `(dx, dy)`, wrapping at the edge of the coordinate
    /// range.
    #[inline]
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.wrapping_add(dx),
            y: self.y.wrapping_add(dy),
        }
    }

    /// Chunk offset by `(dx, dy)`, or `None` past the edge of the coordinate
    /// range.
    #[inline]
    #[must_use]
    pub const fn checked_offset(self, dx: i32, dy: i32) -> Option<Self> {
        match (self.x.checked_add(dx), self.y.checked_add(dy)) {
            (Some(x), Some(y)) => Some(Self { x, y }),
            _ => None,
        }
    }

    /// The four edge-adjacent chunks: left, right, below, above.
    #[must_use]
    pub const fn neighbors4(self) -> [Self; 4] {
        [
            self.offset(-1, 0),
            self.offset(1, 0),
            self.offset(0, -1),
            self.offset(0, 1),
        ]
    }

    /// The eight surrounding chunks.
    #[must_use]
    pub fn neighbors8(self) -> [Self; 8] {
        let mut out = [self; 8];
        let mut i = 0;
        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx != 0 || dy != 0 {
                    out[i] = self.offset(dx, dy);
                    i += 1;
                }
            }
        }
        out
    }

    /// Chebyshev distance in chunks.
    #[inline]
    #[must_use]
    pub fn distance(self, other: Self) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

impl std::fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.x, self.y)
    }
}

/// Cell inside a chunk. Both components are in `0..CHUNK_SIZE`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalPos {
    /// Local y. Ordered first so sorted positions are row-major.
    pub y: u8,
    /// Local x.
    pub x: u8,
}

impl LocalPos {
    /// Creates a local position.
    ///
    /// # Panics
    ///
    /// Panics if either component is outside the chunk.
    #[inline]
    #[must_use]
    pub fn new(x: usize, y: usize) -> Self {
        assert!(
            x < CHUNK_SIZE && y < CHUNK_SIZE,
            "local position ({x}, {y}) outside chunk"
        );
        #[allow(clippy::cast_possible_truncation)]
        Self { x: x as u8, y: y as u8 }
    }

    /// Local position of a world block inside its chunk.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub const fn from_world(world_x: i32, world_y: i32) -> Self {
        Self {
            x: chunk_offset(world_x) as u8,
            y: chunk_offset(world_y) as u8,
        }
    }

    /// Row-major index (`y` outer, `x` inner).
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.y as usize * CHUNK_SIZE + self.x as usize
    }

    /// Inverse of [`Self::index`].
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_index(index: usize) -> Self {
        Self {
            x: (index % CHUNK_SIZE) as u8,
            y: (index / CHUNK_SIZE) as u8,
        }
    }

    /// World coordinates of this cell inside `chunk`.
    #[inline]
    #[must_use]
    pub const fn to_world(self, chunk: ChunkPos) -> WorldPos {
        WorldPos {
            x: chunk.world_x() + self.x as i32,
            y: chunk.world_y() + self.y as i32,
        }
    }

    /// Iterates every cell of a chunk in row-major order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..CHUNK_AREA).map(Self::from_index)
    }
}

/// Absolute block position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorldPos {
    /// World x.
    pub x: i32,
    /// World y.
    pub y: i32,
}

impl WorldPos {
    /// Creates a world position.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Chunk containing this block.
    #[inline]
    #[must_use]
    pub const fn chunk(self) -> ChunkPos {
        ChunkPos::from_world(self.x, self.y)
    }

    /// Cell of this block inside its chunk.
    #[inline]
    #[must_use]
    pub const fn local(self) -> LocalPos {
        LocalPos::from_world(self.x, self.y)
    }

    /// Position offset by `(dx, dy)`, wrapping at the edge of the
    /// coordinate range.
    #[inline]
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.wrapping_add(dx),
            y: self.y.wrapping_add(dy),
        }
    }

    /// Position offset by `(dx, dy)`, or `None` past the edge of the
    /// coordinate range.
    #[inline]
    #[must_use]
    pub const fn checked_offset(self, dx: i32, dy: i32) -> Option<Self> {
        match (self.x.checked_add(dx), self.y.checked_add(dy)) {
            (Some(x), Some(y)) => Some(Self { x, y }),
            _ => None,
        }
    }

    /// The four edge-adjacent blocks: left, right, below, above.
    #[must_use]
    pub const fn neighbors4(self) -> [Self; 4] {
        [
            self.offset(-1, 0),
            self.offset(1, 0),
            self.offset(0, -1),
            self.offset(0, 1),
        ]
    }
}
