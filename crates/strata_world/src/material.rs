//! # Materials
//!
//! Immutable physical descriptors shared by every block of a kind.
//!
//! ## Design
//!
//! A block's behaviour is a closed set of variants ([`BlockKind`]) rather
//! than a type hierarchy. Code that needs to know what a block can do asks
//! for its [`Capabilities`] and pattern-matches on the kind.
//!
//! The table index of a material is its [`MaterialId`], which is also the
//! ordinal written to disk. Never reorder the table.

/// What a ticking block does on each tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TickBehavior {
    /// Falls one cell per tick while the cell below is air.
    Falling,
    /// Counts down its payload and then clears a disc of blocks.
    Fuse {
        /// Ticks from placement to detonation.
        fuse_ticks: u16,
        /// Blast radius in blocks.
        radius: u8,
    },
}

/// Behaviour variant a material instantiates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// No behaviour beyond occupying the cell.
    Plain,
    /// Runs logic every tick.
    Ticking(TickBehavior),
    /// Emits light.
    LightEmitting,
    /// Anchors a block entity to its cell.
    EntityBacked,
}

/// Capability set derived from a [`BlockKind`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Capabilities {
    /// Needs `try_tick` calls.
    pub ticks: bool,
    /// Contributes to lighting.
    pub emits_light: bool,
    /// Owns a block entity.
    pub backs_entity: bool,
}

impl BlockKind {
    /// Capabilities of this kind.
    #[must_use]
    pub const fn capabilities(self) -> Capabilities {
        match self {
            Self::Plain => Capabilities {
                ticks: false,
                emits_light: false,
                backs_entity: false,
            },
            Self::Ticking(_) => Capabilities {
                ticks: true,
                emits_light: false,
                backs_entity: false,
            },
            Self::LightEmitting => Capabilities {
                ticks: false,
                emits_light: true,
                backs_entity: false,
            },
            Self::EntityBacked => Capabilities {
                ticks: false,
                emits_light: false,
                backs_entity: true,
            },
        }
    }
}

/// Index into the material table and persisted ordinal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u16);

impl MaterialId {
    /// Empty space.
    pub const AIR: Self = Self(0);
    /// Stone.
    pub const STONE: Self = Self(1);
    /// Dirt.
    pub const DIRT: Self = Self(2);
    /// Grass-topped dirt.
    pub const GRASS: Self = Self(3);
    /// Sand. Falls.
    pub const SAND: Self = Self(4);
    /// Wood planks.
    pub const WOOD: Self = Self(5);
    /// Glass. Solid but lets light through.
    pub const GLASS: Self = Self(6);
    /// Torch. Emits light, not solid.
    pub const TORCH: Self = Self(7);
    /// Glowstone. Emits light, solid.
    pub const GLOWSTONE: Self = Self(8);
    /// Lit explosive.
    pub const EXPLOSIVE: Self = Self(9);
    /// Bedrock. Indestructible.
    pub const BEDROCK: Self = Self(10);
    /// Crate. Backed by a block entity.
    pub const CRATE: Self = Self(11);

    /// Material descriptor for this id.
    ///
    /// # Panics
    ///
    /// Panics if the id is not in the table. Ids read from disk go through
    /// [`Material::by_id`] instead.
    #[inline]
    #[must_use]
    pub fn material(self) -> &'static Material {
        &MATERIALS[usize::from(self.0)]
    }
}

/// Immutable physical descriptor.
#[derive(Debug, PartialEq)]
pub struct Material {
    /// Table index and persisted ordinal.
    pub id: MaterialId,
    /// Lowercase name.
    pub name: &'static str,
    /// Collides with entities.
    pub solid: bool,
    /// Stops sky light from passing below it.
    pub blocks_light: bool,
    /// Light emitted, `0.0..=1.0`.
    pub luminescence: f32,
    /// Resistance to breaking. `f32::INFINITY` is indestructible.
    pub hardness: f32,
    /// Players may place it.
    pub placeable: bool,
    /// Behaviour variant.
    pub kind: BlockKind,
}

const fn plain(id: u16, name: &'static str, hardness: f32) -> Material {
    Material {
        id: MaterialId(id),
        name,
        solid: true,
        blocks_light: true,
        luminescence: 0.0,
        hardness,
        placeable: true,
        kind: BlockKind::Plain,
    }
}

/// The material table. Index == [`MaterialId`].
pub static MATERIALS: [Material; 12] = [
    Material {
        id: MaterialId::AIR,
        name: "air",
        solid: false,
        blocks_light: false,
        luminescence: 0.0,
        hardness: 0.0,
        placeable: false,
        kind: BlockKind::Plain,
    },
    plain(1, "stone", 1.5),
    plain(2, "dirt", 0.5),
    plain(3, "grass", 0.6),
    Material {
        kind: BlockKind::Ticking(TickBehavior::Falling),
        ..plain(4, "sand", 0.5)
    },
    plain(5, "wood", 2.0),
    Material {
        blocks_light: false,
        ..plain(6, "glass", 0.3)
    },
    Material {
        solid: false,
        blocks_light: false,
        luminescence: 1.0,
        kind: BlockKind::LightEmitting,
        ..plain(7, "torch", 0.0)
    },
    Material {
        luminescence: 0.8,
        kind: BlockKind::LightEmitting,
        ..plain(8, "glowstone", 0.3)
    },
    Material {
        kind: BlockKind::Ticking(TickBehavior::Fuse {
            fuse_ticks: 40,
            radius: 3,
        }),
        ..plain(9, "explosive", 0.0)
    },
    Material {
        placeable: false,
        ..plain(10, "bedrock", f32::INFINITY)
    },
    Material {
        kind: BlockKind::EntityBacked,
        ..plain(11, "crate", 2.5)
    },
];

impl Material {
    /// Looks up a material by persisted ordinal.
    #[must_use]
    pub fn by_id(id: u16) -> Option<&'static Material> {
        MATERIALS.get(usize::from(id))
    }

    /// Looks up a material by name.
    #[must_use]
    pub fn by_name(name: &str) -> Option<&'static Material> {
        MATERIALS.iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }

    /// Returns true for the air material.
    #[inline]
    #[must_use]
    pub fn is_air(&self) -> bool {
        self.id == MaterialId::AIR
    }

    /// Returns true if the material emits any light.
    #[inline]
    #[must_use]
    pub fn is_luminescent(&self) -> bool {
        self.luminescence > 0.0
    }

    /// Capabilities of this material's behaviour variant.
    #[inline]
    #[must_use]
    pub const fn capabilities(&self) -> Capabilities {
        self.kind.capabilities()
    }

    /// Returns true if blocks of this material can be destroyed.
    #[inline]
    #[must_use]
    pub fn is_breakable(&self) -> bool {
        self.hardness.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_index_matches_id() {
        for (index, material) in MATERIALS.iter().enumerate() {
            assert_eq!(usize::from(material.id.0), index, "{} is out of place", material.name);
        }
    }

    #[test]
    fn test_air_is_inert() {
        let air = MaterialId::AIR.material();
        assert!(air.is_air());
        assert!(!air.solid);
        assert!(!air.blocks_light);
        assert!(!air.is_luminescent());
        assert_eq!(air.capabilities(), Capabilities::default());
    }

    #[test]
    fn test_capabilities_follow_kind() {
        assert!(MaterialId::SAND.material().capabilities().ticks);
        assert!(MaterialId::EXPLOSIVE.material().capabilities().ticks);
        assert!(MaterialId::TORCH.material().capabilities().emits_light);
        assert!(MaterialId::CRATE.material().capabilities().backs_entity);
        assert_eq!(MaterialId::STONE.material().capabilities(), Capabilities::default());
    }

    #[test]
    fn test_light_emitters_are_luminescent() {
        for material in &MATERIALS {
            assert_eq!(
                material.capabilities().emits_light,
                material.is_luminescent(),
                "{} luminescence disagrees with its kind",
                material.name
            );
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(Material::by_name("Torch").map(|m| m.id), Some(MaterialId::TORCH));
        assert!(Material::by_id(999).is_none());
        assert!(!MaterialId::BEDROCK.material().is_breakable());
    }
}
