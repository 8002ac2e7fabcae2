//! # Chunk Columns
//!
//! Per chunk-x cache of the topmost light-blocking block in every world
//! column, across all loaded chunks. Air above the top is sky-lit.

use crate::chunk_body::SolidityMask;
use crate::coords::{chunk_offset, chunk_to_world, CHUNK_SIZE};
use parking_lot::RwLock;

/// A moved column top.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TopChange {
    /// World x of the column.
    pub world_x: i32,
    /// Previous top.
    pub old: Option<i32>,
    /// New top.
    pub new: Option<i32>,
}

/// Topmost light-blocking world y per column of one chunk-x stripe.
#[derive(Debug)]
pub struct ChunkColumn {
    chunk_x: i32,
    tops: RwLock<[Option<i32>; CHUNK_SIZE]>,
}

impl ChunkColumn {
    /// A column with no known tops.
    #[must_use]
    pub fn new(chunk_x: i32) -> Self {
        Self {
            chunk_x,
            tops: RwLock::new([None; CHUNK_SIZE]),
        }
    }

    /// Chunk x of this stripe.
    #[must_use]
    pub fn chunk_x(&self) -> i32 {
        self.chunk_x
    }

    /// Topmost light-blocking y at `world_x`, if any loaded chunk has one.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn top(&self, world_x: i32) -> Option<i32> {
        self.tops.read()[chunk_offset(world_x) as usize]
    }

    /// Returns true if an air cell at `(world_x, world_y)` sees the sky.
    #[must_use]
    pub fn is_sky_lit(&self, world_x: i32, world_y: i32) -> bool {
        self.top(world_x).map_or(true, |top| world_y > top)
    }

    /// Recomputes every top from the opacity masks of the loaded chunks in
    /// this stripe, given as `(chunk_y, mask)`. Returns the tops that moved.
    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    pub fn recompute<'a>(&self, chunks: impl IntoIterator<Item = (i32, &'a SolidityMask)>) -> Vec<TopChange> {
        let mut fresh: [Option<i32>; CHUNK_SIZE] = [None; CHUNK_SIZE];
        for (chunk_y, mask) in chunks {
            let base = chunk_to_world(chunk_y);
            for (x, top) in fresh.iter_mut().enumerate() {
                let highest = (0..CHUNK_SIZE).rev().find(|&y| mask.row(y) & (1 << x) != 0);
                if let Some(y) = highest {
                    let world_y = base + y as i32;
                    *top = Some(top.map_or(world_y, |t| t.max(world_y)));
                }
            }
        }

        let mut tops = self.tops.write();
        let mut changes = Vec::new();
        for (x, (current, new)) in tops.iter_mut().zip(fresh).enumerate() {
            if *current != new {
                changes.push(TopChange {
                    world_x: chunk_to_world(self.chunk_x) + x as i32,
                    old: *current,
                    new,
                });
                *current = new;
            }
        }
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::LocalPos;

    #[test]
    fn test_empty_column_is_sky_lit() {
        let column = ChunkColumn::new(0);
        assert_eq!(column.top(5), None);
        assert!(column.is_sky_lit(5, -1000));
    }

    #[test]
    fn test_top_spans_chunks() {
        let lower = SolidityMask::new();
        let upper = SolidityMask::new();
        lower.set(LocalPos::new(3, 31), true);
        upper.set(LocalPos::new(3, 2), true);

        let column = ChunkColumn::new(1);
        let changes = column.recompute([(-1, &lower), (0, &upper)]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0], TopChange { world_x: 35, old: None, new: Some(2) });

        assert_eq!(column.top(35), Some(2));
        assert!(column.is_sky_lit(35, 3));
        assert!(!column.is_sky_lit(35, 2));
        assert!(!column.is_sky_lit(35, -10));
    }

    #[test]
    fn test_recompute_reports_only_moves() {
        let mask = SolidityMask::new();
        mask.set(LocalPos::new(0, 0), true);
        let column = ChunkColumn::new(0);
        assert_eq!(column.recompute([(0, &mask)]).len(), 1);
        assert!(column.recompute([(0, &mask)]).is_empty());

        // Unloading the only chunk clears the top.
        let changes = column.recompute(std::iter::empty());
        assert_eq!(changes, vec![TopChange { world_x: 0, old: Some(0), new: None }]);
    }
}
