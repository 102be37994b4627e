//! Shared ECS components — world entities the siege systems operate on.
//!
//! These are the canonical entity types: queried by the behavior and threat
//! systems, snapshotted by the construction bridge, and referenced from the
//! proxy side-table.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::species::{HeldItem, ProjectileKind, Species};

/// Player avatar. Spectator/creative players are invisible to creature
/// target selection.
#[derive(Component, Serialize, Deserialize, Debug, Clone)]
pub struct Player {
    pub id: u64,
    pub position: Vec3,
    pub health: f32,
    pub game_mode: GameMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GameMode {
    #[default]
    Survival,
    Adventure,
    Creative,
    Spectator,
}

impl GameMode {
    /// Whether creatures may pick this player as an attack target.
    pub fn is_attackable(&self) -> bool {
        matches!(self, GameMode::Survival | GameMode::Adventure)
    }
}

/// Autonomous creature. Movement itself belongs to a general behavior
/// subsystem; the siege engine only sets targets and runs attacks.
#[derive(Component, Serialize, Deserialize, Debug, Clone)]
pub struct Creature {
    pub species: Species,
    pub position: Vec3,
    pub health: f32,
    pub max_health: f32,
    pub held_item: HeldItem,
    /// Pursuit attribute: how far this creature will chase a player.
    pub follow_range: f32,
}

impl Creature {
    pub fn new(species: Species, position: Vec3) -> Self {
        Self {
            species,
            position,
            health: 20.0,
            max_health: 20.0,
            held_item: HeldItem::None,
            follow_range: 16.0,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }
}

/// Current attack target reference (world state, not registry state).
/// Cleared by the stale-target pass when the target entity goes away.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct CreatureTarget(pub Option<Entity>);

/// Marker for the invisible targetable stand-in entity of a structure.
/// The owning structure id is recovered through the proxy side-table,
/// never stored on the entity itself.
#[derive(Component, Debug, Clone, Copy)]
pub struct BuildingProxy;

/// In-flight attack payload. Resolved into a projectile-impact event when
/// it reaches its aim point or expires.
#[derive(Component, Debug, Clone)]
pub struct Projectile {
    pub kind: ProjectileKind,
    pub damage: f32,
    /// Explicit structure reference for payloads that lock on (fireballs).
    pub target_building: Option<u64>,
    pub shooter_species: Species,
    pub aim: Vec3,
    pub remaining_life: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_mode_attackability() {
        assert!(GameMode::Survival.is_attackable());
        assert!(GameMode::Adventure.is_attackable());
        assert!(!GameMode::Creative.is_attackable());
        assert!(!GameMode::Spectator.is_attackable());
    }

    #[test]
    fn test_creature_defaults() {
        let c = Creature::new(Species::Zombie, Vec3::new(1.0, 0.0, 2.0));
        assert!(c.is_alive());
        assert_eq!(c.follow_range, 16.0);
        assert_eq!(c.held_item, HeldItem::None);
    }
}
