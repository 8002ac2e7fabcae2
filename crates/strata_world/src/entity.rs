//! Entities: things that live in the world but not on the block grid.

use crate::coords::{ChunkPos, WorldPos};
use crate::physics::BodyHandle;
use bytemuck::{Pod, Zeroable};
use uuid::Uuid;

/// What an entity is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Free-moving, simulated by a dynamic physics body.
    Dynamic,
    /// Pinned to the block cell that backs it.
    BlockAnchored {
        /// World x of the backing cell.
        x: i32,
        /// World y of the backing cell.
        y: i32,
    },
}

impl EntityKind {
    const TAG_DYNAMIC: u32 = 0;
    const TAG_ANCHORED: u32 = 1;
}

/// An entity instance.
#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    /// Identity, unique per world.
    pub uuid: Uuid,
    /// Kind.
    pub kind: EntityKind,
    /// Feet position (bottom centre), world units.
    pub position: [f32; 2],
    /// Velocity, blocks per second.
    pub velocity: [f32; 2],
    /// Width and height.
    pub size: [f32; 2],
    pub(crate) body: Option<BodyHandle>,
}

impl Entity {
    /// A dynamic entity standing at `position`.
    #[must_use]
    pub fn dynamic(position: [f32; 2], size: [f32; 2]) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            kind: EntityKind::Dynamic,
            position,
            velocity: [0.0, 0.0],
            size,
            body: None,
        }
    }

    /// An entity backing the block at `(x, y)`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn anchored(x: i32, y: i32) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            kind: EntityKind::BlockAnchored { x, y },
            position: [x as f32 + 0.5, y as f32],
            velocity: [0.0, 0.0],
            size: [1.0, 1.0],
            body: None,
        }
    }

    /// Replaces the generated UUID.
    #[must_use]
    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = uuid;
        self
    }

    /// Block cell the entity's feet are in.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn block_pos(&self) -> WorldPos {
        match self.kind {
            EntityKind::BlockAnchored { x, y } => WorldPos::new(x, y),
            EntityKind::Dynamic => WorldPos::new(
                self.position[0].floor() as i32,
                self.position[1].floor() as i32,
            ),
        }
    }

    /// Chunk that owns the entity for loading and persistence.
    #[must_use]
    pub fn home_chunk(&self) -> ChunkPos {
        self.block_pos().chunk()
    }

    /// Physics body, if the entity is simulated.
    #[must_use]
    pub fn body(&self) -> Option<BodyHandle> {
        self.body
    }
}

/// On-disk form of an entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct EntityRecord {
    /// UUID bytes.
    pub uuid: [u8; 16],
    /// Kind tag.
    pub kind: u32,
    /// Anchor x (anchored entities).
    pub anchor_x: i32,
    /// Anchor y (anchored entities).
    pub anchor_y: i32,
    /// Feet position.
    pub position: [f32; 2],
    /// Velocity.
    pub velocity: [f32; 2],
    /// Size.
    pub size: [f32; 2],
}

impl EntityRecord {
    /// Record size in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Record for an entity.
    #[must_use]
    pub fn from_entity(entity: &Entity) -> Self {
        let (kind, anchor_x, anchor_y) = match entity.kind {
            EntityKind::Dynamic => (EntityKind::TAG_DYNAMIC, 0, 0),
            EntityKind::BlockAnchored { x, y } => (EntityKind::TAG_ANCHORED, x, y),
        };
        Self {
            uuid: *entity.uuid.as_bytes(),
            kind,
            anchor_x,
            anchor_y,
            position: entity.position,
            velocity: entity.velocity,
            size: entity.size,
        }
    }

    /// Entity for a record, or `None` if the kind tag is unknown.
    #[must_use]
    pub fn to_entity(&self) -> Option<Entity> {
        let kind = match self.kind {
            EntityKind::TAG_DYNAMIC => EntityKind::Dynamic,
            EntityKind::TAG_ANCHORED => EntityKind::BlockAnchored {
                x: self.anchor_x,
                y: self.anchor_y,
            },
            _ => return None,
        };
        Some(Entity {
            uuid: Uuid::from_bytes(self.uuid),
            kind,
            position: self.position,
            velocity: self.velocity,
            size: self.size,
            body: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_layout() {
        assert_eq!(EntityRecord::SIZE, 52);
    }

    #[test]
    fn test_home_chunk() {
        let walker = Entity::dynamic([-0.5, 40.0], [0.8, 1.8]);
        assert_eq!(walker.block_pos(), WorldPos::new(-1, 40));
        assert_eq!(walker.home_chunk(), ChunkPos::new(-1, 1));

        let anchored = Entity::anchored(33, -1);
        assert_eq!(anchored.home_chunk(), ChunkPos::new(1, -1));
    }

    #[test]
    fn test_record_keeps_identity_and_anchor() {
        let entity = Entity::anchored(5, 6);
        let restored = EntityRecord::from_entity(&entity).to_entity();
        assert_eq!(restored, Some(entity));

        let bogus = EntityRecord {
            kind: 9,
            ..EntityRecord::default()
        };
        assert!(bogus.to_entity().is_none());
    }
}
