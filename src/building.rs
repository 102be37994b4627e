//! Building Registry & Lifecycle — canonical store of every placed structure
//!
//! All health, armor, and flag mutation goes through the registry; other
//! systems read structure state but never write it directly.
//!
//! ## Lifecycle
//! ```text
//! register (generating=true, inert)
//!       ↓  building_completed
//! active (damage pipeline + behavior engine operate)
//!       ↓  health reaches 0 (exactly once)
//! collapsing (proxy removed, collapse job running)
//!       ↓  terminal layer
//! purged (record + threat + cooldowns + proxy index all gone)
//! ```

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::behavior::AttackCooldowns;
use crate::components::CreatureTarget;
use crate::geometry::{self, BoundingBox};
use crate::threat::ThreatLedger;

/// Creatures whose target stands within this distance of a removed
/// structure's center are force-retargeted on purge.
pub const TARGET_SNAP_DISTANCE: f32 = 1.0;

// ============================================================================
// Building Record
// ============================================================================

/// One placed structure. Owned exclusively by the registry.
#[derive(Debug, Clone)]
pub struct Building {
    pub id: u64,
    pub owner_id: u64,
    /// Bottom-center placement point.
    pub anchor: Vec3,
    pub width: i32,
    pub height: i32,
    pub length: i32,
    /// Always one of {0, 90, 180, 270}.
    pub rotation: i32,
    pub health: f32,
    pub max_health: f32,
    pub armor: f32,
    /// Still being built: invulnerable and untargetable.
    pub generating: bool,
    /// Monotone: set at most once, never cleared.
    pub collapsing: bool,
    /// Whether detonation-style attacks affect this structure.
    pub explosion_damage: bool,
    /// Broadcasts a recurring threat ring while active.
    pub attracts_monsters: bool,
    /// Rotation-aware extent, computed once at registration.
    pub bounds: BoundingBox,
    /// Physical, targetable stand-in entity in the world.
    pub proxy: Entity,
}

impl Building {
    pub fn center(&self) -> Vec3 {
        self.anchor + Vec3::new(0.0, self.height as f32 / 2.0, 0.0)
    }

    /// Active structures take damage and draw attacks.
    pub fn is_active(&self) -> bool {
        !self.generating && !self.collapsing && self.health > 0.0
    }
}

/// Placement request handed over by the construction supply collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingSpec {
    pub owner_id: u64,
    pub anchor: Vec3,
    pub width: i32,
    pub height: i32,
    pub length: i32,
    pub rotation: i32,
    pub max_health: f32,
    pub armor: f32,
    pub explosion_damage: bool,
    pub attracts_monsters: bool,
}

/// Result of one registry damage application.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DamageOutcome {
    /// Missing, generating, collapsing, or already at zero.
    Ignored,
    Damaged { remaining: f32 },
    /// Health just hit zero; caller must start the collapse exactly once.
    Destroyed,
}

// ============================================================================
// Registry
// ============================================================================

/// Single source of truth for all placed structures.
#[derive(Resource, Default)]
pub struct BuildingRegistry {
    buildings: HashMap<u64, Building>,
    next_building_id: u64,
}

impl BuildingRegistry {
    pub fn new() -> Self {
        Self {
            buildings: HashMap::new(),
            next_building_id: 1,
        }
    }

    /// Store a new structure. Rotation is normalized and the exact bounding
    /// box computed here, once. Starts in the generating phase at full
    /// health. The proxy entity must already have been spawned on the
    /// simulation thread.
    pub fn register(&mut self, spec: &BuildingSpec, proxy: Entity) -> u64 {
        let id = self.next_building_id;
        self.next_building_id += 1;

        let rotation = geometry::normalize_rotation(spec.rotation);
        let bounds = geometry::exact_bounding_box(
            spec.anchor,
            spec.width,
            spec.height,
            spec.length,
            rotation,
        );

        self.buildings.insert(
            id,
            Building {
                id,
                owner_id: spec.owner_id,
                anchor: spec.anchor,
                width: spec.width,
                height: spec.height,
                length: spec.length,
                rotation,
                health: spec.max_health,
                max_health: spec.max_health,
                armor: spec.armor,
                generating: true,
                collapsing: false,
                explosion_damage: spec.explosion_damage,
                attracts_monsters: spec.attracts_monsters,
                bounds,
                proxy,
            },
        );

        info!(
            "Registered structure {} ({}x{}x{} rot {}) for owner {}",
            id, spec.width, spec.height, spec.length, rotation, spec.owner_id
        );
        id
    }

    pub fn get(&self, id: u64) -> Option<&Building> {
        self.buildings.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut Building> {
        self.buildings.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Building> {
        self.buildings.values()
    }

    pub fn len(&self) -> usize {
        self.buildings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buildings.is_empty()
    }

    /// Pre-armor to post-armor damage: each armor point shaves 1%, hard
    /// capped at 80% reduction.
    pub fn actual_damage(raw: f32, armor: f32) -> f32 {
        let reduction = (armor * 0.01).min(0.8);
        raw * (1.0 - reduction)
    }

    /// Subtract already-reduced damage from a structure's health.
    /// Generating, collapsing, missing, or already-destroyed structures
    /// ignore the hit. Returns `Destroyed` exactly once per structure.
    pub fn apply_damage(&mut self, id: u64, amount: f32) -> DamageOutcome {
        let Some(building) = self.buildings.get_mut(&id) else {
            return DamageOutcome::Ignored;
        };
        if building.generating || building.collapsing || building.health <= 0.0 {
            return DamageOutcome::Ignored;
        }

        building.health = (building.health - amount).max(0.0);
        debug!(
            "Structure {} took {:.1} damage, {:.1}/{:.1} left",
            id, amount, building.health, building.max_health
        );

        if building.health <= 0.0 {
            DamageOutcome::Destroyed
        } else {
            DamageOutcome::Damaged {
                remaining: building.health,
            }
        }
    }

    /// Restore health, clamped to the maximum. Ignored while collapsing.
    pub fn repair(&mut self, id: u64, amount: f32) -> bool {
        let Some(building) = self.buildings.get_mut(&id) else {
            return false;
        };
        if building.collapsing {
            return false;
        }
        building.health = (building.health + amount).min(building.max_health);
        true
    }

    /// Generation finished: the structure becomes vulnerable and targetable
    /// at full health. A duplicate completion is rejected so it cannot heal
    /// an already-active structure.
    pub fn building_completed(&mut self, id: u64) -> bool {
        let Some(building) = self.buildings.get_mut(&id) else {
            return false;
        };
        if !building.generating {
            return false;
        }
        building.generating = false;
        building.health = building.max_health;
        info!("Structure {} completed, entering active phase", id);
        true
    }

    /// Linear scan for the structure whose exact bounding box contains the
    /// point. Fine at siege scale; structures number in the dozens.
    pub fn find_at(&self, point: Vec3) -> Option<u64> {
        self.buildings
            .values()
            .find(|b| b.bounds.contains(point))
            .map(|b| b.id)
    }

    /// Whether a world cell belongs to a structure that still defends its
    /// blocks (alive and not collapsing).
    pub fn is_protected(&self, point: Vec3) -> bool {
        self.buildings
            .values()
            .any(|b| b.health > 0.0 && !b.collapsing && b.bounds.contains(point))
    }

    /// Drop the record. Callers are responsible for the surrounding purge
    /// (proxy despawn, threat, cooldowns); missing ids are a no-op.
    pub fn remove(&mut self, id: u64) -> Option<Building> {
        self.buildings.remove(&id)
    }
}

// ============================================================================
// Proxy Side-Table
// ============================================================================

/// Bidirectional entity ↔ structure id mapping. The structure id is never
/// stored on the proxy entity itself; this table is the only way back.
#[derive(Resource, Default)]
pub struct ProxyIndex {
    by_entity: HashMap<Entity, u64>,
    by_building: HashMap<u64, Entity>,
}

impl ProxyIndex {
    pub fn insert(&mut self, proxy: Entity, building_id: u64) {
        self.by_entity.insert(proxy, building_id);
        self.by_building.insert(building_id, proxy);
    }

    pub fn building_of(&self, proxy: Entity) -> Option<u64> {
        self.by_entity.get(&proxy).copied()
    }

    pub fn proxy_of(&self, building_id: u64) -> Option<Entity> {
        self.by_building.get(&building_id).copied()
    }

    pub fn remove_building(&mut self, building_id: u64) -> Option<Entity> {
        let proxy = self.by_building.remove(&building_id)?;
        self.by_entity.remove(&proxy);
        Some(proxy)
    }

    pub fn len(&self) -> usize {
        self.by_building.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_building.is_empty()
    }
}

// ============================================================================
// Purge (full deregistration)
// ============================================================================

/// Request to remove a structure and every piece of bookkeeping attached to
/// it. Emitted by the collapse terminal tick and by forced removal.
#[derive(Event, Debug, Clone, Copy)]
pub struct PurgeBuilding {
    pub building_id: u64,
}

/// Notification to external collaborators (outline records, dashboards)
/// that a structure is gone.
#[derive(Event, Debug, Clone, Copy)]
pub struct BuildingRemoved {
    pub building_id: u64,
    pub owner_id: u64,
}

/// System: perform the full purge for each requested structure, atomically
/// within this tick. Retargets creatures aimed at the proxy or anything
/// standing within snap distance of the old center.
pub fn purge_buildings(
    mut requests: EventReader<PurgeBuilding>,
    mut commands: Commands,
    mut registry: ResMut<BuildingRegistry>,
    mut proxies: ResMut<ProxyIndex>,
    mut ledger: ResMut<ThreatLedger>,
    mut cooldowns: ResMut<AttackCooldowns>,
    mut targets: Query<(Entity, &mut CreatureTarget)>,
    transforms: Query<&Transform>,
    mut removed: EventWriter<BuildingRemoved>,
) {
    for request in requests.read() {
        let id = request.building_id;
        let Some(building) = registry.remove(id) else {
            continue; // already purged, idempotent
        };

        ledger.remove_building(id);

        // the collapse entry normally despawned the proxy already
        let proxy = proxies.remove_building(id).unwrap_or(building.proxy);
        if let Some(mut entity) = commands.get_entity(proxy) {
            entity.despawn();
        }

        let center = building.center();
        for (creature, mut target) in &mut targets {
            let Some(aim) = target.0 else { continue };
            let snapped = aim == building.proxy
                || transforms
                    .get(aim)
                    .map(|t| t.translation.distance(center) <= TARGET_SNAP_DISTANCE)
                    .unwrap_or(false);
            if snapped {
                target.0 = None;
                cooldowns.forget(creature);
            }
        }

        info!("Structure {} fully removed", id);
        removed.send(BuildingRemoved {
            building_id: id,
            owner_id: building.owner_id,
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
