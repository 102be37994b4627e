//! Siege Bevy Server Library
//!
//! This library provides the core modules for the siege defense server:
//! - Rotation-aware placement geometry (footprints, bounds, surface ranges)
//! - Building registry with the full generating → active → collapsing lifecycle
//! - Threat ledger with periodic retargeting and attraction broadcast
//! - Per-species monster behavior engine (melee, ranged kiting, specials)
//! - Gated damage pipeline ending in layer-by-layer collapse teardown
//! - Construction service ↔ Bevy ECS communication bridge

pub mod geometry; // Rotation, bounding boxes, surface/bounds distances
pub mod blocks; // Sparse world block store and line of sight
pub mod species; // Species stats, equipment bonuses, difficulty scaling
pub mod components; // Shared ECS components (Player, Creature, Projectile)
pub mod building; // Building registry, proxy side-table, purge
pub mod threat; // Threat ledger, retargeting, attraction, selection veto
pub mod damage; // Damage validation, armor reduction, projectile flight
pub mod behavior; // Per-creature siege decisions, fuses, drop missions
pub mod collapse; // Collapse jobs and teardown systems
pub mod bridge; // Construction ↔ Bevy ECS communication bridge

// Re-export commonly used types
pub use building::{Building, BuildingRegistry, BuildingSpec, DamageOutcome};
pub use species::{Difficulty, Species};
pub use threat::ThreatLedger;
