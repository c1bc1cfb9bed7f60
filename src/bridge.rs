//! Translation layer between logical blocks and physics bodies.
//!
//! The bridge is the only component that issues physics commands for blocks.
//! Commands are fire-and-forget: a `place_body` becomes visible in
//! `read_pose` only after the next physics step, and pacing scripts against
//! that delay is the scheduler's job.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::Serialize;

use crate::block_registry::BlockRegistry;
use crate::error::{PlaygroundError, Result};
use crate::physics::{BodyHandle, BodyKind, Collider, PhysicsWorld};

/// One block as handed to the renderer (instanced-draw friendly).
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable, Serialize)]
pub struct BlockInstance {
    pub position: [f32; 3],
    pub dimensions: [f32; 3],
    pub color: [f32; 4],
}

pub struct PhysicsBridge<W: PhysicsWorld> {
    world: W,
    /// Body for each block, indexed by block identity.
    block_bodies: Vec<Option<BodyHandle>>,
    player: Option<BodyHandle>,
    block_width: f32,
    steps: u64,
}

impl<W: PhysicsWorld> PhysicsBridge<W> {
    pub fn new(world: W, block_width: f32) -> Self {
        Self {
            world,
            block_bodies: Vec::new(),
            player: None,
            block_width,
            steps: 0,
        }
    }

    /// Create a fixed box body for every block in the registry. Blocks that
    /// already have a body are moved to their registry position instead.
    pub fn spawn_blocks(&mut self, registry: &BlockRegistry) {
        for block in registry.blocks() {
            if block.index >= self.block_bodies.len() {
                self.block_bodies.resize(block.index + 1, None);
            }
            match self.block_bodies[block.index] {
                Some(handle) => self.world.set_translation(handle, block.position),
                None => {
                    let half = Vec3::new(self.block_width, block.height, self.block_width) / 2.0;
                    let handle = self.world.create_body(
                        BodyKind::Fixed,
                        block.position,
                        Collider::Cuboid { half_extents: half },
                    );
                    self.block_bodies[block.index] = Some(handle);
                }
            }
        }
        log::debug!("Spawned bodies for {} blocks", registry.len());
    }

    /// Destroy every block body. The player body is kept.
    pub fn despawn_blocks(&mut self) {
        let mut removed = 0;
        for handle in self.block_bodies.drain(..).flatten() {
            self.world.remove_body(handle);
            removed += 1;
        }
        log::debug!("Despawned {} block bodies", removed);
    }

    pub fn spawn_player(&mut self, position: Vec3, collider: Collider) -> BodyHandle {
        let handle = self.world.create_body(BodyKind::Dynamic, position, collider);
        self.player = Some(handle);
        handle
    }

    fn block_body(&self, block: usize) -> Result<BodyHandle> {
        self.block_bodies
            .get(block)
            .copied()
            .flatten()
            .filter(|h| self.world.contains(*h))
            .ok_or(PlaygroundError::UnavailableBody(block))
    }

    fn player_body(&self) -> Result<BodyHandle> {
        self.player
            .filter(|h| self.world.contains(*h))
            .ok_or(PlaygroundError::PlayerUnavailable)
    }

    pub fn has_body(&self, block: usize) -> bool {
        self.block_body(block).is_ok()
    }

    /// Command a block's body to `position`. Does not wait for the step.
    pub fn place_body(&mut self, block: usize, position: Vec3) -> Result<()> {
        let handle = self.block_body(block)?;
        self.world.set_translation(handle, position);
        Ok(())
    }

    /// Latest pose the physics engine reports for a block.
    pub fn read_pose(&self, block: usize) -> Result<Vec3> {
        let handle = self.block_body(block)?;
        self.world
            .translation(handle)
            .ok_or(PlaygroundError::UnavailableBody(block))
    }

    /// Per-frame payload for the renderer, in block identity order.
    /// Positions come from physics, so a block may be seen mid-transit.
    pub fn current_frame_snapshot(&self, registry: &BlockRegistry) -> Vec<BlockInstance> {
        registry
            .blocks()
            .map(|block| {
                let position = self.read_pose(block.index).unwrap_or(block.position);
                BlockInstance {
                    position: position.to_array(),
                    dimensions: [self.block_width, block.height, self.block_width],
                    color: block.color.rgba(),
                }
            })
            .collect()
    }

    pub fn step(&mut self, dt: f32) {
        self.world.step(dt);
        self.steps += 1;
    }

    /// Number of physics steps taken so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn player_translation(&self) -> Result<Vec3> {
        let handle = self.player_body()?;
        self.world
            .translation(handle)
            .ok_or(PlaygroundError::PlayerUnavailable)
    }

    pub fn player_velocity(&self) -> Result<Vec3> {
        let handle = self.player_body()?;
        self.world
            .linear_velocity(handle)
            .ok_or(PlaygroundError::PlayerUnavailable)
    }

    pub fn set_player_velocity(&mut self, velocity: Vec3) -> Result<()> {
        let handle = self.player_body()?;
        self.world.set_linear_velocity(handle, velocity);
        Ok(())
    }

    pub fn apply_player_impulse(&mut self, impulse: Vec3) -> Result<()> {
        let handle = self.player_body()?;
        self.world.apply_impulse(handle, impulse);
        Ok(())
    }
}
