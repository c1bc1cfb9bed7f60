//! Physics collaborator interface and a small built-in world.
//!
//! The playground only needs body creation plus translation/velocity access,
//! so any engine can be plugged in behind [`PhysicsWorld`]. [`SimpleWorld`]
//! is enough for the headless driver and the tests: gravity, a ground plane,
//! and push-out of dynamic bodies against fixed boxes.

use glam::Vec3;

/// Handle to a body created in a [`PhysicsWorld`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Never integrated; moved only by explicit translation commands.
    Fixed,
    /// Integrated every step under gravity and contacts.
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Collider {
    Cuboid { half_extents: Vec3 },
    /// Vertical capsule: `half_height` of the cylinder part plus hemispheres of `radius`.
    Capsule { half_height: f32, radius: f32 },
}

impl Collider {
    /// Half extents of the axis-aligned box around the collider.
    pub fn half_extents(&self) -> Vec3 {
        match *self {
            Collider::Cuboid { half_extents } => half_extents,
            Collider::Capsule {
                half_height,
                radius,
            } => Vec3::new(radius, half_height + radius, radius),
        }
    }
}

/// Operations the playground issues against the physics engine.
///
/// Translation commands are not required to be visible before the next
/// [`PhysicsWorld::step`]; callers read back poses only after stepping.
pub trait PhysicsWorld {
    fn create_body(&mut self, kind: BodyKind, position: Vec3, collider: Collider) -> BodyHandle;
    fn contains(&self, body: BodyHandle) -> bool;
    fn set_translation(&mut self, body: BodyHandle, position: Vec3);
    fn set_linear_velocity(&mut self, body: BodyHandle, velocity: Vec3);
    fn apply_impulse(&mut self, body: BodyHandle, impulse: Vec3);
    fn translation(&self, body: BodyHandle) -> Option<Vec3>;
    fn linear_velocity(&self, body: BodyHandle) -> Option<Vec3>;
    /// Destroy a body. Its handle is never valid again.
    fn remove_body(&mut self, body: BodyHandle);
    fn step(&mut self, dt: f32);
}

#[derive(Debug, Clone)]
struct Body {
    kind: BodyKind,
    collider: Collider,
    translation: Vec3,
    pending_translation: Option<Vec3>,
    linvel: Vec3,
    pending_impulse: Vec3,
}

/// Minimal rigid-body world. Dynamic bodies have unit mass and locked rotations.
#[derive(Debug, Clone)]
pub struct SimpleWorld {
    /// Indexed by handle; removed bodies leave a `None` so handles are not reused.
    bodies: Vec<Option<Body>>,
    gravity: f32,
    /// y of the ground plane, or `None` for no ground.
    ground: Option<f32>,
    /// Half the ground's side length. Bodies past the edge fall.
    ground_half_size: f32,
}

impl SimpleWorld {
    pub fn new(gravity: f32) -> Self {
        Self {
            bodies: Vec::new(),
            gravity,
            ground: Some(0.0),
            ground_half_size: f32::INFINITY,
        }
    }

    /// Limit the ground to a square of side `size` centred on the origin.
    pub fn with_ground_size(mut self, size: f32) -> Self {
        self.ground_half_size = size / 2.0;
        self
    }

    fn body(&self, handle: BodyHandle) -> Option<&Body> {
        self.bodies.get(handle.0 as usize)?.as_ref()
    }

    fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut Body> {
        self.bodies.get_mut(handle.0 as usize)?.as_mut()
    }

    /// Number of live bodies.
    pub fn body_count(&self) -> usize {
        self.bodies.iter().flatten().count()
    }

    /// Push a dynamic body out of every fixed box it overlaps, along the
    /// axis of least penetration, and cancel velocity into the contact.
    fn resolve_fixed_contacts(&mut self, dynamic: usize) {
        let fixed: Vec<(Vec3, Vec3)> = self
            .bodies
            .iter()
            .flatten()
            .filter(|b| b.kind == BodyKind::Fixed)
            .map(|b| (b.translation, b.collider.half_extents()))
            .collect();

        let Some(body) = self.bodies[dynamic].as_mut() else {
            return;
        };
        let half = body.collider.half_extents();
        for (centre, other_half) in fixed {
            let delta = body.translation - centre;
            let overlap = (half + other_half) - delta.abs();
            if overlap.x <= 0.0 || overlap.y <= 0.0 || overlap.z <= 0.0 {
                continue;
            }

            let axis = if overlap.x < overlap.y && overlap.x < overlap.z {
                0
            } else if overlap.y < overlap.z {
                1
            } else {
                2
            };
            let sign = if delta[axis] >= 0.0 { 1.0 } else { -1.0 };
            body.translation[axis] += overlap[axis] * sign;
            if body.linvel[axis] * sign < 0.0 {
                body.linvel[axis] = 0.0;
            }
        }
    }
}

impl Default for SimpleWorld {
    fn default() -> Self {
        Self::new(9.81)
    }
}

impl PhysicsWorld for SimpleWorld {
    fn create_body(&mut self, kind: BodyKind, position: Vec3, collider: Collider) -> BodyHandle {
        let handle = BodyHandle(self.bodies.len() as u32);
        self.bodies.push(Some(Body {
            kind,
            collider,
            translation: position,
            pending_translation: None,
            linvel: Vec3::ZERO,
            pending_impulse: Vec3::ZERO,
        }));
        handle
    }

    fn contains(&self, body: BodyHandle) -> bool {
        self.body(body).is_some()
    }

    fn set_translation(&mut self, body: BodyHandle, position: Vec3) {
        if let Some(b) = self.body_mut(body) {
            b.pending_translation = Some(position);
        }
    }

    fn set_linear_velocity(&mut self, body: BodyHandle, velocity: Vec3) {
        if let Some(b) = self.body_mut(body) {
            if b.kind == BodyKind::Dynamic {
                b.linvel = velocity;
            }
        }
    }

    fn apply_impulse(&mut self, body: BodyHandle, impulse: Vec3) {
        if let Some(b) = self.body_mut(body) {
            if b.kind == BodyKind::Dynamic {
                b.pending_impulse += impulse;
            }
        }
    }

    fn translation(&self, body: BodyHandle) -> Option<Vec3> {
        self.body(body).map(|b| b.translation)
    }

    fn linear_velocity(&self, body: BodyHandle) -> Option<Vec3> {
        self.body(body).map(|b| b.linvel)
    }

    fn remove_body(&mut self, body: BodyHandle) {
        if let Some(slot) = self.bodies.get_mut(body.0 as usize) {
            *slot = None;
        }
    }

    fn step(&mut self, dt: f32) {
        // Teleports land first so contacts see the new layout
        for body in self.bodies.iter_mut().flatten() {
            if let Some(target) = body.pending_translation.take() {
                body.translation = target;
            }
        }

        for i in 0..self.bodies.len() {
            let Some(body) = self.bodies[i].as_mut() else {
                continue;
            };
            if body.kind != BodyKind::Dynamic {
                continue;
            }

            {
                body.linvel += body.pending_impulse;
                body.pending_impulse = Vec3::ZERO;
                body.linvel.y -= self.gravity * dt;
                body.translation += body.linvel * dt;

                let t = body.translation;
                let over_ground =
                    t.x.abs() <= self.ground_half_size && t.z.abs() <= self.ground_half_size;
                if let (Some(ground), true) = (self.ground, over_ground) {
                    let bottom = t.y - body.collider.half_extents().y;
                    if bottom < ground {
                        body.translation.y += ground - bottom;
                        if body.linvel.y < 0.0 {
                            body.linvel.y = 0.0;
                        }
                    }
                }
            }

            self.resolve_fixed_contacts(i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capsule() -> Collider {
        Collider::Capsule {
            half_height: 0.5,
            radius: 0.5,
        }
    }

    #[test]
    fn test_translation_applies_on_next_step() {
        let mut world = SimpleWorld::default();
        let cube = world.create_body(
            BodyKind::Fixed,
            Vec3::new(0.0, 0.5, 0.0),
            Collider::Cuboid {
                half_extents: Vec3::splat(0.5),
            },
        );

        world.set_translation(cube, Vec3::new(3.0, 0.5, 0.0));
        assert_eq!(world.translation(cube), Some(Vec3::new(0.0, 0.5, 0.0)));

        world.step(1.0 / 60.0);
        assert_eq!(world.translation(cube), Some(Vec3::new(3.0, 0.5, 0.0)));
    }

    #[test]
    fn test_dynamic_body_settles_on_ground() {
        let mut world = SimpleWorld::default();
        let player = world.create_body(BodyKind::Dynamic, Vec3::new(0.0, 2.0, 0.0), capsule());

        for _ in 0..120 {
            world.step(1.0 / 60.0);
        }

        let pos = world.translation(player).unwrap();
        assert!((pos.y - 1.0).abs() < 1e-4, "capsule should rest at y=1, got {}", pos.y);
        assert_eq!(world.linear_velocity(player).unwrap().y, 0.0);
    }

    #[test]
    fn test_impulse_launches_dynamic_body() {
        let mut world = SimpleWorld::default();
        let player = world.create_body(BodyKind::Dynamic, Vec3::new(0.0, 1.0, 0.0), capsule());
        world.step(1.0 / 60.0);

        world.apply_impulse(player, Vec3::new(0.0, 5.0, 0.0));
        world.step(1.0 / 60.0);
        assert!(world.linear_velocity(player).unwrap().y > 4.0);
        assert!(world.translation(player).unwrap().y > 1.0);
    }

    #[test]
    fn test_fixed_body_ignores_velocity() {
        let mut world = SimpleWorld::default();
        let cube = world.create_body(
            BodyKind::Fixed,
            Vec3::new(0.0, 0.5, 0.0),
            Collider::Cuboid {
                half_extents: Vec3::splat(0.5),
            },
        );
        world.set_linear_velocity(cube, Vec3::X);
        world.apply_impulse(cube, Vec3::Y);
        world.step(0.1);
        assert_eq!(world.translation(cube), Some(Vec3::new(0.0, 0.5, 0.0)));
    }

    #[test]
    fn test_dynamic_body_is_pushed_out_of_block() {
        let mut world = SimpleWorld::default();
        world.create_body(
            BodyKind::Fixed,
            Vec3::new(0.0, 1.0, 0.0),
            Collider::Cuboid {
                half_extents: Vec3::new(0.5, 1.0, 0.5),
            },
        );
        let player = world.create_body(BodyKind::Dynamic, Vec3::new(0.8, 1.0, 0.0), capsule());
        world.set_linear_velocity(player, Vec3::new(-1.0, 0.0, 0.0));
        world.step(1.0 / 60.0);

        let pos = world.translation(player).unwrap();
        assert!(pos.x >= 1.0 - 1e-5, "player should be pushed to x>=1, got {}", pos.x);
        assert_eq!(world.linear_velocity(player).unwrap().x, 0.0);
    }

    #[test]
    fn test_body_past_ground_edge_falls() {
        let mut world = SimpleWorld::default().with_ground_size(30.0);
        let inside = world.create_body(BodyKind::Dynamic, Vec3::new(14.0, 1.0, 0.0), capsule());
        let outside = world.create_body(BodyKind::Dynamic, Vec3::new(16.0, 1.0, 0.0), capsule());
        for _ in 0..30 {
            world.step(1.0 / 60.0);
        }
        assert!((world.translation(inside).unwrap().y - 1.0).abs() < 1e-4);
        assert!(world.translation(outside).unwrap().y < 0.0);
    }

    #[test]
    fn test_removed_body_stops_colliding() {
        let mut world = SimpleWorld::default();
        let block = world.create_body(
            BodyKind::Fixed,
            Vec3::new(0.0, 1.0, 0.0),
            Collider::Cuboid {
                half_extents: Vec3::new(0.5, 1.0, 0.5),
            },
        );
        let player = world.create_body(BodyKind::Dynamic, Vec3::new(0.8, 1.0, 0.0), capsule());

        world.remove_body(block);
        assert!(!world.contains(block));
        assert_eq!(world.translation(block), None);
        assert_eq!(world.body_count(), 1);

        world.set_linear_velocity(player, Vec3::new(-1.0, 0.0, 0.0));
        world.step(1.0 / 60.0);
        assert!(world.translation(player).unwrap().x < 0.8);

        // Handles are not recycled
        let next = world.create_body(BodyKind::Fixed, Vec3::ZERO, capsule());
        assert_ne!(next, block);
    }

    #[test]
    fn test_unknown_handle() {
        let world = SimpleWorld::default();
        assert!(!world.contains(BodyHandle(3)));
        assert_eq!(world.translation(BodyHandle(3)), None);
    }
}
