//! The narrow set of block operations a script can perform.
//!
//! The surface keeps a cached slot order (slot -> block identity) that
//! `refresh` resynchronizes with the registry before each run. Every
//! mutation goes registry first, then bridge, and both halves of a swap are
//! validated before either is committed.

use std::time::Duration;

use glam::Vec3;

use crate::block_registry::BlockRegistry;
use crate::bridge::PhysicsBridge;
use crate::error::{PlaygroundError, Result};
use crate::physics::PhysicsWorld;

#[derive(Debug, Clone)]
pub struct CommandSurface {
    order: Vec<usize>,
    rest_z: f32,
    settle_delay: Duration,
    swaps: usize,
}

impl CommandSurface {
    pub fn new(rest_z: f32, settle_delay: Duration) -> Self {
        Self {
            order: Vec::new(),
            rest_z,
            settle_delay,
            swaps: 0,
        }
    }

    /// Rebuild the cached slot order from the registry's current positions.
    pub fn refresh(&mut self, registry: &BlockRegistry) {
        self.order = registry.slot_order();
    }

    /// Heights in slot order.
    pub fn heights(&self, registry: &BlockRegistry) -> Vec<f32> {
        registry.ordered_heights()
    }

    /// Block identities in slot order, as last refreshed or swapped.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// Number of committed swaps since the surface was created or reset.
    pub fn swap_count(&self) -> usize {
        self.swaps
    }

    /// Exchange the blocks in slots `i` and `j`.
    ///
    /// On success returns how long the caller should wait before treating the
    /// swap as visually complete. On error nothing has been modified.
    pub fn swap<W: PhysicsWorld>(
        &mut self,
        registry: &mut BlockRegistry,
        bridge: &mut PhysicsBridge<W>,
        i: i64,
        j: i64,
    ) -> Result<Duration> {
        if self.order.len() != registry.len() {
            self.refresh(registry);
        }

        let len = self.order.len();
        let in_range = |k: i64| k >= 0 && (k as usize) < len;
        if !in_range(i) || !in_range(j) {
            return Err(PlaygroundError::IndexOutOfRange { i, j, len });
        }
        let (i, j) = (i as usize, j as usize);
        if i == j {
            self.swaps += 1;
            return Ok(self.settle_delay);
        }

        let a = self.order[i];
        let b = self.order[j];
        for block in [a, b] {
            if !bridge.has_body(block) {
                return Err(PlaygroundError::UnavailableBody(block));
            }
        }

        let pa = registry.get(a)?.position;
        let pb = registry.get(b)?.position;
        let new_a = Vec3::new(pb.x, pa.y, self.rest_z);
        let new_b = Vec3::new(pa.x, pb.y, self.rest_z);

        registry.set_position(a, new_a)?;
        registry.set_position(b, new_b)?;
        bridge.place_body(a, new_a)?;
        bridge.place_body(b, new_b)?;
        self.order.swap(i, j);
        self.swaps += 1;

        log::debug!("swap({}, {}): blocks {} <-> {}", i, j, a, b);
        Ok(self.settle_delay)
    }

    /// Translate every block by `delta`. Blocks without a body are skipped
    /// (and logged); returns how many blocks moved.
    pub fn bulk_offset<W: PhysicsWorld>(
        &mut self,
        registry: &mut BlockRegistry,
        bridge: &mut PhysicsBridge<W>,
        delta: Vec3,
    ) -> usize {
        let mut moved = 0;
        for index in 0..registry.len() {
            if !bridge.has_body(index) {
                log::warn!("bulkOffset: {}", PlaygroundError::UnavailableBody(index));
                continue;
            }
            let Ok(block) = registry.get(index) else {
                continue;
            };
            let target = block.position + delta;
            if registry.set_position(index, target).is_ok() && bridge.place_body(index, target).is_ok() {
                moved += 1;
            }
        }
        moved
    }
}
