//! Authoritative logical model of the block row.
//!
//! Blocks have a stable identity (`index`) and occupy slots on a uniform
//! horizontal lattice. "Slot order" is always derived from the current x
//! coordinates, so a swap only has to exchange positions to reorder the row.

use glam::Vec3;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

use crate::error::{PlaygroundError, Result};

/// Color tag handed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockColor {
    Red,
    Yellow,
    Purple,
    Cyan,
    Orange,
    Green,
    Blue,
    Pink,
}

impl BlockColor {
    pub const PALETTE: [BlockColor; 8] = [
        BlockColor::Red,
        BlockColor::Yellow,
        BlockColor::Purple,
        BlockColor::Cyan,
        BlockColor::Orange,
        BlockColor::Green,
        BlockColor::Blue,
        BlockColor::Pink,
    ];

    pub fn for_index(index: usize) -> Self {
        Self::PALETTE[index % Self::PALETTE.len()]
    }

    pub fn rgba(self) -> [f32; 4] {
        match self {
            BlockColor::Red => [1.0, 0.0, 0.0, 1.0],
            BlockColor::Yellow => [1.0, 1.0, 0.0, 1.0],
            BlockColor::Purple => [0.5, 0.0, 0.5, 1.0],
            BlockColor::Cyan => [0.0, 1.0, 1.0, 1.0],
            BlockColor::Orange => [1.0, 0.65, 0.0, 1.0],
            BlockColor::Green => [0.0, 0.5, 0.0, 1.0],
            BlockColor::Blue => [0.0, 0.0, 1.0, 1.0],
            BlockColor::Pink => [1.0, 0.75, 0.8, 1.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    /// Stable identity, 0..N-1. Never changes for the block's lifetime.
    pub index: usize,
    pub height: f32,
    pub position: Vec3,
    pub color: BlockColor,
}

impl Block {
    /// y of the block's centre when its base sits on the ground plane.
    pub fn rest_y(&self) -> f32 {
        self.height / 2.0
    }
}

/// How heights are distributed over slots when a row is created.
#[derive(Debug, Clone)]
pub enum HeightAssignment {
    /// Block `i` gets `heights[i]` and starts in slot `i`.
    InOrder(Vec<f32>),
    /// Block `i` gets `heights[i]`; slots are a seeded random permutation.
    Shuffled { heights: Vec<f32>, seed: u64 },
    /// Heights `1..=count`, shuffled across slots.
    Random { seed: u64 },
}

/// Geometry of the slot lattice, centred on x = 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotLattice {
    pub spacing: f32,
    pub rest_z: f32,
}

impl SlotLattice {
    pub fn slot_x(&self, slot: usize, count: usize) -> f32 {
        let centre = (count as f32 - 1.0) / 2.0;
        (slot as f32 - centre) * self.spacing
    }

    pub fn rest_position(&self, slot: usize, count: usize, height: f32) -> Vec3 {
        Vec3::new(self.slot_x(slot, count), height / 2.0, self.rest_z)
    }
}

impl Default for SlotLattice {
    fn default() -> Self {
        Self {
            spacing: 1.5,
            rest_z: -6.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlockRegistry {
    blocks: Vec<Block>,
    lattice: SlotLattice,
}

impl BlockRegistry {
    pub fn new(lattice: SlotLattice) -> Self {
        Self {
            blocks: Vec::new(),
            lattice,
        }
    }

    /// Create the session's blocks. Replaces any previous row.
    pub fn initialize(&mut self, count: usize, assignment: HeightAssignment) -> Result<()> {
        if count == 0 {
            return Err(PlaygroundError::InvalidBlockCount);
        }

        let (heights, seed) = match assignment {
            HeightAssignment::InOrder(heights) => (heights, None),
            HeightAssignment::Shuffled { heights, seed } => (heights, Some(seed)),
            HeightAssignment::Random { seed } => ((1..=count).map(|h| h as f32).collect(), Some(seed)),
        };

        if heights.len() != count {
            return Err(PlaygroundError::HeightCountMismatch {
                expected: count,
                actual: heights.len(),
            });
        }
        if let Some(&bad) = heights.iter().find(|h| !h.is_finite() || **h <= 0.0) {
            return Err(PlaygroundError::InvalidHeight(bad));
        }

        // slots[i] is the slot block i starts in
        let mut slots: Vec<usize> = (0..count).collect();
        if let Some(seed) = seed {
            let mut rng = StdRng::seed_from_u64(seed);
            slots.shuffle(&mut rng);
        }

        self.blocks = heights
            .into_iter()
            .zip(slots)
            .enumerate()
            .map(|(index, (height, slot))| Block {
                index,
                height,
                position: self.lattice.rest_position(slot, count, height),
                color: BlockColor::for_index(index),
            })
            .collect();

        log::info!(
            "Block registry initialized: {} blocks, heights by slot {:?}",
            count,
            self.ordered_heights()
        );
        Ok(())
    }

    /// Drop every block (session teardown).
    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&Block> {
        self.blocks.get(index).ok_or(PlaygroundError::NotFound(index))
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    /// Move a block to a resting position: x and z are taken from `position`,
    /// y is forced to `height / 2` so the base stays on the ground.
    pub fn set_slot_position(&mut self, index: usize, position: Vec3) -> Result<()> {
        let block = self
            .blocks
            .get_mut(index)
            .ok_or(PlaygroundError::NotFound(index))?;
        block.position = Vec3::new(position.x, block.height / 2.0, position.z);
        Ok(())
    }

    /// Move a block without re-seating it on the ground.
    pub fn set_position(&mut self, index: usize, position: Vec3) -> Result<()> {
        let block = self
            .blocks
            .get_mut(index)
            .ok_or(PlaygroundError::NotFound(index))?;
        block.position = position;
        Ok(())
    }

    /// Block indices ordered by slot (x ascending, ties broken by identity).
    pub fn slot_order(&self) -> Vec<usize> {
        let mut order: Vec<&Block> = self.blocks.iter().collect();
        order.sort_by(|a, b| {
            a.position
                .x
                .total_cmp(&b.position.x)
                .then(a.index.cmp(&b.index))
        });
        order.into_iter().map(|b| b.index).collect()
    }

    /// Heights read off in slot order; this is what scripts see as `heights()`.
    pub fn ordered_heights(&self) -> Vec<f32> {
        self.slot_order()
            .into_iter()
            .map(|i| self.blocks[i].height)
            .collect()
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new(SlotLattice::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> BlockRegistry {
        BlockRegistry::new(SlotLattice {
            spacing: 2.0,
            rest_z: -5.0,
        })
    }

    #[test]
    fn test_in_order_layout() {
        let mut reg = registry();
        reg.initialize(3, HeightAssignment::InOrder(vec![2.0, 4.0, 6.0]))
            .unwrap();

        assert_eq!(reg.ordered_heights(), vec![2.0, 4.0, 6.0]);
        let b = reg.get(1).unwrap();
        assert_eq!(b.position, Vec3::new(0.0, 2.0, -5.0));
        assert_eq!(reg.get(0).unwrap().position.x, -2.0);
        assert_eq!(reg.get(2).unwrap().position.x, 2.0);
    }

    #[test]
    fn test_shuffled_is_a_permutation_with_rest_invariant() {
        let heights = vec![3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0];
        let mut reg = registry();
        reg.initialize(
            8,
            HeightAssignment::Shuffled {
                heights: heights.clone(),
                seed: 7,
            },
        )
        .unwrap();

        let mut observed = reg.ordered_heights();
        let mut expected = heights;
        observed.sort_by(f32::total_cmp);
        expected.sort_by(f32::total_cmp);
        assert_eq!(observed, expected);

        // Identity keeps its own height and every block rests on the ground
        for block in reg.blocks() {
            assert_eq!(block.position.y, block.height / 2.0);
            assert_eq!(block.position.z, -5.0);
        }

        // Slots form a uniform lattice
        let xs: Vec<f32> = reg
            .slot_order()
            .into_iter()
            .map(|i| reg.get(i).unwrap().position.x)
            .collect();
        for pair in xs.windows(2) {
            assert!((pair[1] - pair[0] - 2.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_same_seed_same_layout() {
        let mut a = registry();
        let mut b = registry();
        a.initialize(6, HeightAssignment::Random { seed: 42 }).unwrap();
        b.initialize(6, HeightAssignment::Random { seed: 42 }).unwrap();
        assert_eq!(a.ordered_heights(), b.ordered_heights());
    }

    #[test]
    fn test_initialize_errors() {
        let mut reg = registry();
        assert_eq!(
            reg.initialize(0, HeightAssignment::InOrder(vec![])),
            Err(PlaygroundError::InvalidBlockCount)
        );
        assert_eq!(
            reg.initialize(2, HeightAssignment::InOrder(vec![1.0])),
            Err(PlaygroundError::HeightCountMismatch {
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(
            reg.initialize(2, HeightAssignment::InOrder(vec![1.0, -1.0])),
            Err(PlaygroundError::InvalidHeight(-1.0))
        );
    }

    #[test]
    fn test_get_out_of_range() {
        let mut reg = registry();
        reg.initialize(2, HeightAssignment::InOrder(vec![1.0, 2.0]))
            .unwrap();
        assert_eq!(reg.get(2), Err(PlaygroundError::NotFound(2)));
    }

    #[test]
    fn test_set_slot_position_keeps_block_on_ground() {
        let mut reg = registry();
        reg.initialize(2, HeightAssignment::InOrder(vec![1.0, 3.0]))
            .unwrap();
        reg.set_slot_position(1, Vec3::new(-10.0, 99.0, 1.0)).unwrap();

        let b = reg.get(1).unwrap();
        assert_eq!(b.position, Vec3::new(-10.0, 1.5, 1.0));
        // Moving left of block 0 changes the observable order immediately
        assert_eq!(reg.ordered_heights(), vec![3.0, 1.0]);
    }
}
