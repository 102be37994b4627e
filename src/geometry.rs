//! Rotation & Bounding Geometry — pure spatial math for placed structures
//!
//! Every structure is placed with a bottom-center anchor, integer dimensions,
//! and a cardinal rotation. All containment, range, and teardown checks go
//! through the functions here:
//!
//! ```text
//! anchor + (w,h,l) + rotation
//!       ↓
//! exact_bounding_box (computed once, cached on the structure)
//!       ↓
//! distance_to_surface / distance_to_bounds  →  attack range gating
//! block_position                            →  build placement + collapse layers
//! ```
//!
//! No state, no world access — everything is a pure function so range rules
//! can be tested without an ECS world.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

// ============================================================================
// Bounding Box
// ============================================================================

/// Axis-aligned box, authoritative spatial extent of a structure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Point containment, inclusive on all faces.
    pub fn contains(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Box grown by `margin` on every face (melee checks use a small margin).
    pub fn expanded(&self, margin: f32) -> BoundingBox {
        BoundingBox {
            min: self.min - Vec3::splat(margin),
            max: self.max + Vec3::splat(margin),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }
}

// ============================================================================
// Rotation
// ============================================================================

/// Normalize an arbitrary integer angle onto {0, 90, 180, 270}.
/// Reduces modulo 360 into the non-negative range, then floors to the
/// nearest 90° multiple. Idempotent.
pub fn normalize_rotation(degrees: i32) -> i32 {
    let mut r = degrees % 360;
    if r < 0 {
        r += 360;
    }
    (r / 90) * 90
}

/// Footprint after rotation: width and length swap at 90° and 270°.
pub fn rotated_footprint(width: i32, length: i32, rotation: i32) -> (i32, i32) {
    match normalize_rotation(rotation) {
        90 | 270 => (length, width),
        _ => (width, length),
    }
}

/// Rotate an offset vector about the vertical axis by a cardinal angle.
/// Coordinates are rounded to 3 decimals to suppress float drift in
/// repeated block-position math.
pub fn rotate_offset(offset: Vec3, rotation: i32) -> Vec3 {
    let radians = (normalize_rotation(rotation) as f32).to_radians();
    let (sin, cos) = radians.sin_cos();
    let x = offset.x * cos - offset.z * sin;
    let z = offset.x * sin + offset.z * cos;
    Vec3::new(round3(x), offset.y, round3(z))
}

fn round3(v: f32) -> f32 {
    (v * 1000.0).round() / 1000.0
}

// ============================================================================
// Bounding Box Construction
// ============================================================================

/// Compute the rotation-aware exact bounding box for a structure anchored at
/// its bottom-center point. The four footprint corners are rotated about the
/// anchor and min/maxed in X/Z; Y spans [anchor.y, anchor.y + height].
pub fn exact_bounding_box(
    anchor: Vec3,
    width: i32,
    height: i32,
    length: i32,
    rotation: i32,
) -> BoundingBox {
    debug_assert!(
        width > 0 && height > 0 && length > 0,
        "structure dimensions must be positive"
    );

    let half_w = width as f32 / 2.0;
    let half_l = length as f32 / 2.0;
    let corners = [
        Vec3::new(-half_w, 0.0, -half_l),
        Vec3::new(half_w, 0.0, -half_l),
        Vec3::new(-half_w, 0.0, half_l),
        Vec3::new(half_w, 0.0, half_l),
    ];

    let mut min_x = f32::MAX;
    let mut max_x = f32::MIN;
    let mut min_z = f32::MAX;
    let mut max_z = f32::MIN;
    for corner in corners {
        let world = anchor + rotate_offset(corner, rotation);
        min_x = min_x.min(world.x);
        max_x = max_x.max(world.x);
        min_z = min_z.min(world.z);
        max_z = max_z.max(world.z);
    }

    BoundingBox {
        min: Vec3::new(min_x, anchor.y, min_z),
        max: Vec3::new(max_x, anchor.y + height as f32, max_z),
    }
}

// ============================================================================
// Distance Queries
// ============================================================================

/// Minimum absolute distance from a point to any of the box's six face
/// planes. This is the shell-proximity metric used by attack validation,
/// not the true nearest-point distance.
pub fn distance_to_surface(point: Vec3, bounds: &BoundingBox) -> f32 {
    let faces = [
        (point.x - bounds.min.x).abs(),
        (point.x - bounds.max.x).abs(),
        (point.y - bounds.min.y).abs(),
        (point.y - bounds.max.y).abs(),
        (point.z - bounds.min.z).abs(),
        (point.z - bounds.max.z).abs(),
    ];
    faces.iter().fold(f32::MAX, |acc, &d| acc.min(d))
}

/// True outside-distance to the box: zero anywhere inside, euclidean
/// distance from the nearest face otherwise.
pub fn distance_to_bounds(point: Vec3, bounds: &BoundingBox) -> f32 {
    let dx = (bounds.min.x - point.x).max(0.0).max(point.x - bounds.max.x);
    let dy = (bounds.min.y - point.y).max(0.0).max(point.y - bounds.max.y);
    let dz = (bounds.min.z - point.z).max(0.0).max(point.z - bounds.max.z);
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Nearest point of the box to `point`, per-axis clamp. Exterior points map
/// onto the shell; interior points map to themselves. Attack payloads aim
/// here so impacts resolve at the shell rather than deep inside the volume.
pub fn closest_point_on_bounds(point: Vec3, bounds: &BoundingBox) -> Vec3 {
    point.clamp(bounds.min, bounds.max)
}

// ============================================================================
// Block Mapping
// ============================================================================

/// Map a local block-grid coordinate to a world position under the
/// structure's rotation. Local coordinates are centered on the footprint
/// ((w−1)/2, (l−1)/2) so the anchor stays at the bottom-center regardless
/// of rotation. Used for both build placement and collapse teardown.
pub fn block_position(
    anchor: Vec3,
    x: i32,
    y: i32,
    z: i32,
    width: i32,
    length: i32,
    rotation: i32,
) -> Vec3 {
    let offset = Vec3::new(
        x as f32 - (width as f32 - 1.0) / 2.0,
        y as f32,
        z as f32 - (length as f32 - 1.0) / 2.0,
    );
    anchor + rotate_offset(offset, rotation)
}

// ============================================================================
// Tests
// ============================================================================
