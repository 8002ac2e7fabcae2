//! # Physics World
//!
//! Minimal 2D rigid-body world: static bodies made of axis-aligned edges
//! (one per chunk) and dynamic boxes (one per entity) that fall under
//! gravity and stop against those edges.
//!
//! The world itself is not synchronized. The owning [`crate::world::World`]
//! keeps it behind its physics lock, and every body creation, fixture edit
//! and step happens under that lock.

use crate::coords::ChunkPos;
use std::collections::HashMap;
use uuid::Uuid;

/// Gravity acceleration (blocks per second squared).
pub const GRAVITY: f32 = 32.0;

/// Terminal velocity (blocks per second).
pub const TERMINAL_VELOCITY: f32 = 50.0;

/// Contact slop, in blocks.
const EPSILON: f32 = 1e-4;

// ============================================================================
// AABB (Axis-Aligned Bounding Box)
// ============================================================================

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Minimum corner (x, y).
    pub min: [f32; 2],
    /// Maximum corner (x, y).
    pub max: [f32; 2],
}

impl Aabb {
    /// Creates a new box.
    #[must_use]
    pub fn new(min: [f32; 2], max: [f32; 2]) -> Self {
        Self { min, max }
    }

    /// Box standing on `feet` (bottom centre) with the given size.
    #[must_use]
    pub fn from_feet(feet: [f32; 2], width: f32, height: f32) -> Self {
        let half_w = width / 2.0;
        Self {
            min: [feet[0] - half_w, feet[1]],
            max: [feet[0] + half_w, feet[1] + height],
        }
    }

    /// Returns true if the boxes overlap with positive area.
    #[must_use]
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min[0] < other.max[0]
            && self.max[0] > other.min[0]
            && self.min[1] < other.max[1]
            && self.max[1] > other.min[1]
    }

    /// Box moved by `delta`.
    #[must_use]
    pub fn translate(&self, delta: [f32; 2]) -> Self {
        Self {
            min: [self.min[0] + delta[0], self.min[1] + delta[1]],
            max: [self.max[0] + delta[0], self.max[1] + delta[1]],
        }
    }
}

// ============================================================================
// BODIES
// ============================================================================

/// Handle to a body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(u64);

/// Handle to a fixture on a body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FixtureHandle(u64);

/// Whether a body moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyKind {
    /// Never moves; carries edges.
    Static,
    /// Integrated every step; carries a box.
    Dynamic,
}

/// Who a body belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BodyOwner {
    /// Collision mesh of a chunk.
    Chunk(ChunkPos),
    /// An entity.
    Entity(Uuid),
}

/// Fixture geometry, relative to the body position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Shape {
    /// Axis-aligned segment.
    Edge {
        /// First endpoint.
        from: [f32; 2],
        /// Second endpoint.
        to: [f32; 2],
    },
    /// Box whose bottom centre sits on the body position.
    Box {
        /// Width.
        width: f32,
        /// Height.
        height: f32,
    },
}

/// A rigid body.
#[derive(Clone, Debug)]
pub struct Body {
    /// Static or dynamic.
    pub kind: BodyKind,
    /// Owner, used to find dangling bodies.
    pub owner: BodyOwner,
    /// Origin (static) or feet position (dynamic).
    pub position: [f32; 2],
    /// Velocity, blocks per second.
    pub velocity: [f32; 2],
    /// Set when the last step ended resting on an edge.
    pub on_ground: bool,
    fixtures: HashMap<FixtureHandle, Shape>,
}

impl Body {
    /// Number of fixtures.
    #[must_use]
    pub fn fixture_count(&self) -> usize {
        self.fixtures.len()
    }

    /// Fixture geometry.
    #[must_use]
    pub fn fixture(&self, handle: FixtureHandle) -> Option<&Shape> {
        self.fixtures.get(&handle)
    }

    /// World-space box of the first box fixture.
    #[must_use]
    pub fn aabb(&self) -> Option<Aabb> {
        self.fixtures.values().find_map(|shape| match shape {
            Shape::Box { width, height } => Some(Aabb::from_feet(self.position, *width, *height)),
            Shape::Edge { .. } => None,
        })
    }
}

/// Edge in world space, classified by orientation.
#[derive(Clone, Copy, Debug)]
enum WorldEdge {
    /// `y` fixed, spanning `x0..x1`.
    Horizontal { y: f32, x0: f32, x1: f32 },
    /// `x` fixed, spanning `y0..y1`.
    Vertical { x: f32, y0: f32, y1: f32 },
}

/// The physics world.
#[derive(Debug)]
pub struct PhysicsWorld {
    bodies: HashMap<BodyHandle, Body>,
    next_body: u64,
    next_fixture: u64,
    gravity: f32,
}

impl PhysicsWorld {
    /// Creates an empty world with the given gravity.
    #[must_use]
    pub fn new(gravity: f32) -> Self {
        Self {
            bodies: HashMap::new(),
            next_body: 1,
            next_fixture: 1,
            gravity,
        }
    }

    /// Adds a body with no fixtures.
    pub fn create_body(&mut self, kind: BodyKind, owner: BodyOwner, position: [f32; 2]) -> BodyHandle {
        let handle = BodyHandle(self.next_body);
        self.next_body += 1;
        self.bodies.insert(
            handle,
            Body {
                kind,
                owner,
                position,
                velocity: [0.0, 0.0],
                on_ground: false,
                fixtures: HashMap::new(),
            },
        );
        handle
    }

    /// Removes a body and all its fixtures.
    pub fn destroy_body(&mut self, handle: BodyHandle) -> bool {
        self.bodies.remove(&handle).is_some()
    }

    /// Attaches a fixture. Returns `None` if the body does not exist.
    pub fn add_fixture(&mut self, body: BodyHandle, shape: Shape) -> Option<FixtureHandle> {
        let body = self.bodies.get_mut(&body)?;
        let handle = FixtureHandle(self.next_fixture);
        self.next_fixture += 1;
        body.fixtures.insert(handle, shape);
        Some(handle)
    }

    /// Detaches a fixture.
    pub fn remove_fixture(&mut self, body: BodyHandle, fixture: FixtureHandle) -> bool {
        self.bodies
            .get_mut(&body)
            .is_some_and(|body| body.fixtures.remove(&fixture).is_some())
    }

    /// Looks up a body.
    #[must_use]
    pub fn body(&self, handle: BodyHandle) -> Option<&Body> {
        self.bodies.get(&handle)
    }

    /// Looks up a body mutably.
    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut Body> {
        self.bodies.get_mut(&handle)
    }

    /// Every body with its handle.
    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &Body)> {
        self.bodies.iter().map(|(handle, body)| (*handle, body))
    }

    /// Number of bodies.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Keeps only bodies whose owner satisfies `keep`. Returns how many were
    /// destroyed.
    pub fn retain_bodies(&mut self, mut keep: impl FnMut(&BodyOwner) -> bool) -> usize {
        let before = self.bodies.len();
        self.bodies.retain(|_, body| keep(&body.owner));
        before - self.bodies.len()
    }

    #[allow(clippy::float_cmp)]
    fn static_edges(&self) -> Vec<WorldEdge> {
        let mut edges = Vec::new();
        for body in self.bodies.values().filter(|b| b.kind == BodyKind::Static) {
            let [ox, oy] = body.position;
            for shape in body.fixtures.values() {
                let Shape::Edge { from, to } = *shape else {
                    continue;
                };
                let (ax, ay, bx, by) = (from[0] + ox, from[1] + oy, to[0] + ox, to[1] + oy);
                if ay == by {
                    edges.push(WorldEdge::Horizontal {
                        y: ay,
                        x0: ax.min(bx),
                        x1: ax.max(bx),
                    });
                } else {
                    edges.push(WorldEdge::Vertical {
                        x: ax,
                        y0: ay.min(by),
                        y1: ay.max(by),
                    });
                }
            }
        }
        edges
    }

    /// Advances every dynamic body by `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        let edges = self.static_edges();
        let gravity = self.gravity;

        for body in self.bodies.values_mut().filter(|b| b.kind == BodyKind::Dynamic) {
            let Some(aabb) = body.aabb() else {
                continue;
            };
            body.velocity[1] = (body.velocity[1] - gravity * dt).max(-TERMINAL_VELOCITY);

            // X axis
            let dx = body.velocity[0] * dt;
            let aabb = if dx.abs() > EPSILON {
                let (moved, blocked) = sweep_x(&aabb, dx, &edges);
                if blocked {
                    body.velocity[0] = 0.0;
                }
                body.position[0] += moved;
                aabb.translate([moved, 0.0])
            } else {
                aabb
            };

            // Y axis
            let dy = body.velocity[1] * dt;
            let (moved, blocked) = sweep_y(&aabb, dy, &edges);
            body.on_ground = blocked && dy < 0.0;
            if blocked {
                body.velocity[1] = 0.0;
            }
            body.position[1] += moved;
        }
    }
}

/// Distance `aabb` can travel along x before hitting a vertical edge.
fn sweep_x(aabb: &Aabb, dx: f32, edges: &[WorldEdge]) -> (f32, bool) {
    let mut allowed = dx;
    let mut blocked = false;
    for edge in edges {
        let WorldEdge::Vertical { x, y0, y1 } = *edge else {
            continue;
        };
        if aabb.min[1] >= y1 - EPSILON || aabb.max[1] <= y0 + EPSILON {
            continue;
        }
        if dx > 0.0 && aabb.max[0] <= x + EPSILON {
            let gap = (x - aabb.max[0]).max(0.0);
            if gap < allowed {
                allowed = gap;
                blocked = true;
            }
        } else if dx < 0.0 && aabb.min[0] >= x - EPSILON {
            let gap = (x - aabb.min[0]).min(0.0);
            if gap > allowed {
                allowed = gap;
                blocked = true;
            }
        }
    }
    (allowed, blocked)
}

/// Distance `aabb` can travel along y before hitting a horizontal edge.
fn sweep_y(aabb: &Aabb, dy: f32, edges: &[WorldEdge]) -> (f32, bool) {
    let mut allowed = dy;
    let mut blocked = false;
    for edge in edges {
        let WorldEdge::Horizontal { y, x0, x1 } = *edge else {
            continue;
        };
        if aabb.min[0] >= x1 - EPSILON || aabb.max[0] <= x0 + EPSILON {
            continue;
        }
        if dy < 0.0 && aabb.min[1] >= y - EPSILON {
            let gap = (y - aabb.min[1]).min(0.0);
            if gap >= allowed {
                allowed = gap;
                blocked = true;
            }
        } else if dy > 0.0 && aabb.max[1] <= y + EPSILON {
            let gap = (y - aabb.max[1]).max(0.0);
            if gap <= allowed {
                allowed = gap;
                blocked = true;
            }
        }
    }
    (allowed, blocked)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floor(world: &mut PhysicsWorld, y: f32) -> BodyHandle {
        let body = world.create_body(BodyKind::Static, BodyOwner::Chunk(ChunkPos::new(0, 0)), [0.0, 0.0]);
        world
            .add_fixture(body, Shape::Edge { from: [-10.0, y], to: [10.0, y] })
            .unwrap();
        body
    }

    fn crate_body(world: &mut PhysicsWorld, at: [f32; 2]) -> BodyHandle {
        let body = world.create_body(BodyKind::Dynamic, BodyOwner::Entity(Uuid::new_v4()), at);
        world.add_fixture(body, Shape::Box { width: 0.8, height: 0.8 }).unwrap();
        body
    }

    #[test]
    fn test_aabb_intersects() {
        let a = Aabb::new([0.0, 0.0], [1.0, 1.0]);
        assert!(a.intersects(&Aabb::new([0.5, 0.5], [2.0, 2.0])));
        assert!(!a.intersects(&Aabb::new([1.0, 0.0], [2.0, 1.0])), "touching is not overlapping");
        assert_eq!(a.translate([1.0, 2.0]).min, [1.0, 2.0]);
    }

    #[test]
    fn test_body_lands_on_floor() {
        let mut world = PhysicsWorld::new(GRAVITY);
        floor(&mut world, 0.0);
        let body = crate_body(&mut world, [0.0, 5.0]);

        for _ in 0..200 {
            world.step(1.0 / 20.0);
        }

        let body = world.body(body).unwrap();
        println!("rest position: {:?}", body.position);
        assert!(body.on_ground);
        assert!(body.position[1].abs() < 1e-3, "body must rest on the edge");
    }

    #[test]
    fn test_body_without_floor_keeps_falling() {
        let mut world = PhysicsWorld::new(GRAVITY);
        let body = crate_body(&mut world, [0.0, 5.0]);
        for _ in 0..20 {
            world.step(1.0 / 20.0);
        }
        let body = world.body(body).unwrap();
        assert!(!body.on_ground);
        assert!(body.position[1] < 0.0);
        assert!(body.velocity[1] >= -TERMINAL_VELOCITY);
    }

    #[test]
    fn test_wall_blocks_horizontal_motion() {
        let mut world = PhysicsWorld::new(0.0);
        let wall = world.create_body(BodyKind::Static, BodyOwner::Chunk(ChunkPos::new(0, 0)), [0.0, 0.0]);
        world
            .add_fixture(wall, Shape::Edge { from: [3.0, -5.0], to: [3.0, 5.0] })
            .unwrap();
        let body = crate_body(&mut world, [0.0, 0.0]);
        world.body_mut(body).unwrap().velocity = [10.0, 0.0];

        for _ in 0..20 {
            world.step(1.0 / 20.0);
        }

        let body = world.body(body).unwrap();
        assert!((body.position[0] - 2.6).abs() < 1e-3, "stopped at {:?}", body.position);
        assert!(body.velocity[0].abs() < f32::EPSILON);
    }

    #[test]
    fn test_fixture_management() {
        let mut world = PhysicsWorld::new(GRAVITY);
        let body = floor(&mut world, 0.0);
        assert_eq!(world.body(body).unwrap().fixture_count(), 1);

        let extra = world
            .add_fixture(body, Shape::Edge { from: [0.0, 1.0], to: [1.0, 1.0] })
            .unwrap();
        assert!(world.remove_fixture(body, extra));
        assert!(!world.remove_fixture(body, extra));

        assert!(world.destroy_body(body));
        assert!(world.add_fixture(body, Shape::Box { width: 1.0, height: 1.0 }).is_none());
    }

    #[test]
    fn test_retain_bodies() {
        let mut world = PhysicsWorld::new(GRAVITY);
        floor(&mut world, 0.0);
        crate_body(&mut world, [0.0, 1.0]);
        crate_body(&mut world, [1.0, 1.0]);

        let removed = world.retain_bodies(|owner| matches!(owner, BodyOwner::Chunk(_)));
        assert_eq!(removed, 2);
        assert_eq!(world.body_count(), 1);
    }
}
