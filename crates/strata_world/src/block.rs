//! # Blocks
//!
//! Per-cell block state: a material plus a small payload.
//!
//! A chunk cell holds `Option<Block>`. `None` is air, and it is the only
//! stored form of air: [`Block::normalize`] turns an AIR block into `None`
//! at every entry point, so consumers never have to tell "no block" and "air
//! block" apart. [`is_airish`] and [`both_airish`] express the equivalence
//! for values arriving from outside.

use crate::material::{BlockKind, Material, MaterialId, TickBehavior};
use bytemuck::{Pod, Zeroable};
use strata_core::TickError;

/// A block instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Block {
    material: MaterialId,
    payload: u16,
}

/// Effect of a tick that the chunk applies once its locks are released.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockAction {
    /// Move this block one cell down if that cell is air.
    Fall,
    /// Clear every breakable block within `radius`.
    Explode {
        /// Blast radius in blocks.
        radius: u8,
    },
}

impl Block {
    /// An air block value. Never stored.
    pub const AIR: Self = Self {
        material: MaterialId::AIR,
        payload: 0,
    };

    /// Creates a block with its material's initial payload.
    #[must_use]
    pub fn new(material: MaterialId) -> Self {
        let payload = match material.material().kind {
            BlockKind::Ticking(TickBehavior::Fuse { fuse_ticks, .. }) => fuse_ticks,
            _ => 0,
        };
        Self { material, payload }
    }

    /// Creates a block with an explicit payload.
    #[inline]
    #[must_use]
    pub const fn with_payload(material: MaterialId, payload: u16) -> Self {
        Self { material, payload }
    }

    /// Material id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> MaterialId {
        self.material
    }

    /// Material descriptor.
    #[inline]
    #[must_use]
    pub fn material(&self) -> &'static Material {
        self.material.material()
    }

    /// Material-specific payload (fuse ticks for explosives).
    #[inline]
    #[must_use]
    pub const fn payload(&self) -> u16 {
        self.payload
    }

    /// Returns true if this is an air block.
    #[inline]
    #[must_use]
    pub fn is_air(&self) -> bool {
        self.material == MaterialId::AIR
    }

    /// Canonical stored form: air becomes `None`.
    #[inline]
    #[must_use]
    pub fn normalize(block: Option<Block>) -> Option<Block> {
        block.filter(|b| !b.is_air())
    }

    /// Advances this block's behaviour by one tick.
    ///
    /// Rare ticks are ignored by every current behaviour; the flag is passed
    /// through so slow behaviours can hook in.
    ///
    /// # Errors
    ///
    /// Returns an error if the block's material does not tick, which means
    /// the chunk's ticking index is out of sync.
    pub fn try_tick(&mut self, rare: bool) -> Result<Option<BlockAction>, String> {
        let BlockKind::Ticking(behavior) = self.material().kind else {
            return Err(format!("{} does not tick", self.material().name));
        };
        if rare {
            return Ok(None);
        }
        match behavior {
            TickBehavior::Falling => Ok(Some(BlockAction::Fall)),
            TickBehavior::Fuse { radius, .. } => {
                self.payload = self.payload.saturating_sub(1);
                if self.payload == 0 {
                    Ok(Some(BlockAction::Explode { radius }))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Builds the tick error for a failure at a world position.
    #[must_use]
    pub fn tick_error(world_x: i32, world_y: i32, reason: String) -> TickError {
        TickError::Block {
            x: world_x,
            y: world_y,
            reason,
        }
    }
}

/// Returns true for an empty cell or an AIR block.
#[inline]
#[must_use]
pub fn is_airish(cell: Option<&Block>) -> bool {
    cell.map_or(true, Block::is_air)
}

/// Returns true when replacing `current` with `new` changes nothing.
#[inline]
#[must_use]
pub fn both_airish(current: Option<&Block>, new: Option<&Block>) -> bool {
    is_airish(current) && is_airish(new)
}

/// On-disk form of one cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct BlockRecord {
    /// Material ordinal.
    pub material: u16,
    /// Material-specific payload.
    pub payload: u16,
}

impl BlockRecord {
    /// Record for a cell.
    #[must_use]
    pub fn from_cell(cell: Option<&Block>) -> Self {
        cell.map_or(Self::default(), |block| Self {
            material: block.material.0,
            payload: block.payload,
        })
    }

    /// Cell for a record, or `None` if the ordinal is unknown.
    ///
    /// Air records decode to `Some(None)`.
    #[must_use]
    pub fn to_cell(self) -> Option<Option<Block>> {
        let material = Material::by_id(self.material)?;
        Some(Block::normalize(Some(Block::with_payload(material.id, self.payload))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_airish_equivalence() {
        let air = Block::AIR;
        let stone = Block::new(MaterialId::STONE);
        assert!(both_airish(None, None));
        assert!(both_airish(None, Some(&air)));
        assert!(both_airish(Some(&air), None));
        assert!(!both_airish(None, Some(&stone)));
        assert!(!both_airish(Some(&stone), Some(&air)));
    }

    #[test]
    fn test_normalize_drops_air() {
        assert_eq!(Block::normalize(Some(Block::AIR)), None);
        let sand = Block::new(MaterialId::SAND);
        assert_eq!(Block::normalize(Some(sand)), Some(sand));
    }

    #[test]
    fn test_fuse_counts_down_then_explodes() {
        let mut explosive = Block::new(MaterialId::EXPLOSIVE);
        let fuse = explosive.payload();
        assert!(fuse > 1);

        for _ in 1..fuse {
            assert_eq!(explosive.try_tick(false), Ok(None));
        }
        assert_eq!(explosive.try_tick(false), Ok(Some(BlockAction::Explode { radius: 3 })));
    }

    #[test]
    fn test_rare_tick_leaves_fuse_alone() {
        let mut explosive = Block::new(MaterialId::EXPLOSIVE);
        let fuse = explosive.payload();
        assert_eq!(explosive.try_tick(true), Ok(None));
        assert_eq!(explosive.payload(), fuse);
    }

    #[test]
    fn test_sand_falls() {
        let mut sand = Block::new(MaterialId::SAND);
        assert_eq!(sand.try_tick(false), Ok(Some(BlockAction::Fall)));
    }

    #[test]
    fn test_non_ticking_block_errors() {
        let mut stone = Block::new(MaterialId::STONE);
        assert!(stone.try_tick(false).is_err());
    }

    #[test]
    fn test_record_conversion() {
        let fuse = Block::with_payload(MaterialId::EXPLOSIVE, 7);
        let record = BlockRecord::from_cell(Some(&fuse));
        assert_eq!(record, BlockRecord { material: 9, payload: 7 });
        assert_eq!(record.to_cell(), Some(Some(fuse)));

        assert_eq!(BlockRecord::from_cell(None), BlockRecord::default());
        assert_eq!(BlockRecord::default().to_cell(), Some(None));
        assert_eq!(BlockRecord { material: 500, payload: 0 }.to_cell(), None);
    }
}
