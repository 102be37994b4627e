//! Creature Species Data — classification and damage tables for siege combat
//!
//! Species behavior is data, not subtypes: every per-species number the
//! behavior engine needs (hostility, melee/ranged role, base damage, ranged
//! reach, attack cooldown, special routine) lives in the match tables here.
//! Adding a species means adding match arms, nothing else.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

// ============================================================================
// Species
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Species {
    Zombie,
    Husk,
    Drowned,
    Spider,
    CaveSpider,
    Vindicator,
    Piglin,
    PiglinBrute,
    ZombifiedPiglin,
    Ravager,
    Creeper,
    Skeleton,
    Witch,
    Blaze,
    Evoker,
    Pillager,
    Ghast,
    Slime,
    Phantom,
    Vex,
    Villager,
}

/// How a species engages a structure once it is the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttackRole {
    Melee,
    Ranged,
}

/// Non-standard attack path a species runs instead of (or on top of) the
/// plain swing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecialRoutine {
    None,
    /// Primes a fuse in trigger range, detonates against health directly.
    Detonate,
    /// Chance-based amplified secondary hit that ignores armor.
    Roar,
    /// Receives post-collapse drop missions and flies to them.
    DropMission,
}

impl Species {
    /// Hostile capability set: only these may hold threat entries.
    pub fn is_hostile(&self) -> bool {
        !matches!(self, Species::Villager)
    }

    /// Whether the species participates in structure sieges at all.
    /// Vex-style summons harass players but never damage structures.
    pub fn can_siege(&self) -> bool {
        self.is_hostile() && !matches!(self, Species::Vex)
    }

    pub fn role(&self) -> AttackRole {
        match self {
            Species::Skeleton
            | Species::Witch
            | Species::Blaze
            | Species::Evoker
            | Species::Pillager
            | Species::Ghast => AttackRole::Ranged,
            _ => AttackRole::Melee,
        }
    }

    /// Unmodified structure damage per hit.
    pub fn base_damage(&self) -> f32 {
        match self {
            Species::Zombie => 3.0,
            Species::Skeleton => 2.5,
            Species::Creeper => 6.0,
            Species::Ravager => 7.0,
            Species::Ghast => 5.0,
            Species::Evoker => 4.0,
            Species::Vindicator => 4.0,
            Species::PiglinBrute => 4.0,
            Species::Piglin => 3.5,
            Species::Husk => 3.0,
            Species::Drowned => 3.0,
            _ => 2.0,
        }
    }

    /// Seconds between attacks against a structure.
    pub fn attack_cooldown(&self) -> f32 {
        match self {
            Species::Ghast => 5.0,
            Species::Pillager => 3.5,
            Species::Witch => 3.0,
            Species::Creeper => 2.0,
            Species::Skeleton => 2.0,
            _ => 1.5,
        }
    }

    /// Firing reach for ranged species, measured to the structure's center.
    pub fn ranged_attack_range(&self) -> f32 {
        match self {
            Species::Ghast => 30.0,
            Species::Blaze => 20.0,
            _ => 15.0,
        }
    }

    pub fn special_routine(&self) -> SpecialRoutine {
        match self {
            Species::Creeper => SpecialRoutine::Detonate,
            Species::Ravager => SpecialRoutine::Roar,
            Species::Ghast => SpecialRoutine::DropMission,
            _ => SpecialRoutine::None,
        }
    }

    /// Projectile launched by ranged species.
    pub fn projectile(&self) -> Option<ProjectileKind> {
        match self {
            Species::Skeleton | Species::Pillager => Some(ProjectileKind::Arrow),
            Species::Witch => Some(ProjectileKind::Potion),
            Species::Blaze => Some(ProjectileKind::SmallFireball),
            Species::Ghast => Some(ProjectileKind::Fireball),
            Species::Evoker => Some(ProjectileKind::Fangs),
            _ => None,
        }
    }
}

/// Projectile flavors carried through the impact pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectileKind {
    Arrow,
    Potion,
    SmallFireball,
    Fireball,
    Fangs,
}

impl ProjectileKind {
    /// Flight speed in blocks per second. Fangs erupt in place.
    pub fn speed(&self) -> f32 {
        match self {
            ProjectileKind::Arrow => 20.0,
            ProjectileKind::Potion => 8.0,
            ProjectileKind::SmallFireball => 12.0,
            ProjectileKind::Fireball => 10.0,
            ProjectileKind::Fangs => 0.0,
        }
    }

    /// Seconds before an in-flight payload expires and resolves where it is.
    pub fn lifetime(&self) -> f32 {
        match self {
            ProjectileKind::Fangs => 0.5,
            _ => 6.0,
        }
    }
}

// ============================================================================
// Equipment
// ============================================================================

/// Held item inspected on the attacker when computing structure damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum HeldItem {
    #[default]
    None,
    StoneSword,
    GoldenSword,
    IronSword,
    DiamondSword,
    NetheriteSword,
    Axe,
    Bow,
    Crossbow,
    Trident,
}

impl HeldItem {
    /// Flat damage bonus. Axes hit harder in the hands of the species bred
    /// to swing them.
    pub fn damage_bonus(&self, wielder: Species) -> f32 {
        match self {
            HeldItem::None => 0.0,
            HeldItem::StoneSword => 1.0,
            HeldItem::GoldenSword => 0.5,
            HeldItem::IronSword => 2.0,
            HeldItem::DiamondSword => 3.0,
            HeldItem::NetheriteSword => 4.0,
            HeldItem::Axe => match wielder {
                Species::Vindicator | Species::PiglinBrute => 3.0,
                _ => 2.0,
            },
            HeldItem::Bow | HeldItem::Crossbow => 1.5,
            HeldItem::Trident => 2.5,
        }
    }
}

// ============================================================================
// Difficulty
// ============================================================================

/// World difficulty, a global damage dial inserted as a resource.
#[derive(Resource, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Difficulty {
    Peaceful,
    Easy,
    #[default]
    Normal,
    Hard,
}

impl Difficulty {
    pub fn damage_multiplier(&self) -> f32 {
        match self {
            Difficulty::Hard => 1.3,
            Difficulty::Normal => 1.1,
            _ => 1.0,
        }
    }
}

// ============================================================================
// Damage Computation
// ============================================================================

/// Raw (pre-armor) structure damage for one attack:
/// (species base + equipment bonus) × difficulty.
pub fn mob_damage(species: Species, held: HeldItem, difficulty: Difficulty) -> f32 {
    (species.base_damage() + held.damage_bonus(species)) * difficulty.damage_multiplier()
}

// ============================================================================
// Tests
// ============================================================================
