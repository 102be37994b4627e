//! World Block Store — server-side voxel state for placed structures
//!
//! The simulation owns a sparse block grid: structure generation writes
//! blocks in, the collapse sequencer clears them layer by layer, and the
//! damage pipeline consults it for protection and line-of-sight checks.
//! Anything not present in the map is air.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Block Kinds
// ============================================================================

/// Block material at a world cell. `Fire` is tracked separately because
/// teardown must leave burning cells alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    Air,
    Fire,
    Stone,
    Wood,
    Plank,
    Brick,
    Glass,
}

impl BlockKind {
    pub fn is_air(&self) -> bool {
        matches!(self, BlockKind::Air)
    }

    /// Blocks the collapse teardown skips instead of clearing.
    pub fn survives_teardown(&self) -> bool {
        matches!(self, BlockKind::Air | BlockKind::Fire)
    }

    /// Blocks that stop a creature's line of sight.
    pub fn is_opaque(&self) -> bool {
        !matches!(self, BlockKind::Air | BlockKind::Fire | BlockKind::Glass)
    }
}

// ============================================================================
// Block Store
// ============================================================================

/// Sparse world block grid, keyed by floored world cell.
#[derive(Resource, Default)]
pub struct WorldBlocks {
    cells: HashMap<IVec3, BlockKind>,
}

impl WorldBlocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cell_of(point: Vec3) -> IVec3 {
        IVec3::new(
            point.x.floor() as i32,
            point.y.floor() as i32,
            point.z.floor() as i32,
        )
    }

    pub fn get(&self, cell: IVec3) -> BlockKind {
        self.cells.get(&cell).copied().unwrap_or(BlockKind::Air)
    }

    pub fn get_at(&self, point: Vec3) -> BlockKind {
        self.get(Self::cell_of(point))
    }

    pub fn set(&mut self, cell: IVec3, kind: BlockKind) {
        if kind.is_air() {
            self.cells.remove(&cell);
        } else {
            self.cells.insert(cell, kind);
        }
    }

    pub fn set_at(&mut self, point: Vec3, kind: BlockKind) {
        self.set(Self::cell_of(point), kind);
    }

    /// Clear a cell unless fire or already air. Returns true if a block
    /// was actually removed.
    pub fn tear_down(&mut self, point: Vec3) -> bool {
        let cell = Self::cell_of(point);
        if self.get(cell).survives_teardown() {
            return false;
        }
        self.cells.remove(&cell);
        true
    }

    pub fn solid_count(&self) -> usize {
        self.cells.len()
    }
}

// ============================================================================
// Line of Sight
// ============================================================================

/// Sample step for the line-of-sight march (half a block).
const LOS_STEP: f32 = 0.5;

/// Segment visibility test: marches from `from` to `to` in half-block steps
/// and fails on the first opaque cell. Endpoints themselves are excluded so
/// an eye embedded in a wall face still sees outward.
pub fn line_of_sight(blocks: &WorldBlocks, from: Vec3, to: Vec3) -> bool {
    let delta = to - from;
    let length = delta.length();
    if length < LOS_STEP {
        return true;
    }
    let dir = delta / length;
    let mut travelled = LOS_STEP;
    while travelled < length - LOS_STEP {
        let sample = from + dir * travelled;
        if blocks.get_at(sample).is_opaque() {
            return false;
        }
        travelled += LOS_STEP;
    }
    true
}

// ============================================================================
// Tests
// ============================================================================
