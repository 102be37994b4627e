//! Damage Pipeline — validation, armor reduction, and collapse hand-off
//!
//! Two admission paths, both ending in the registry's `apply_damage`:
//!
//! ```text
//! melee/player hit on a proxy ──► BuildingDamageEvent
//!                                       │ surface/bounds gate
//! projectile payload lands ─────► ProjectileImpactEvent
//!                                       │ resolve target, surface gate
//!                                       ▼
//!                         actual_damage (armor formula)
//!                                       ▼
//!                         registry.apply_damage
//!                                       ▼ health hit zero (once)
//!                               BeginCollapse
//! ```
//!
//! Rejected hits change no state; the rejection reason is surfaced so a
//! collaborator can show "too far to attack" style feedback. Structures
//! never take generic environmental damage regardless of outcome.

use bevy::prelude::*;
use thiserror::Error;
use tracing::debug;

use crate::building::{BuildingRegistry, DamageOutcome, ProxyIndex};
use crate::geometry;
use crate::species::{ProjectileKind, Species};
use crate::threat::ThreatLedger;

/// Surface-distance gate for melee attackers.
pub const MELEE_SURFACE_RANGE: f32 = 1.5;
/// Surface-distance gate for projectile payloads, slightly looser.
pub const PROJECTILE_SURFACE_RANGE: f32 = 2.0;
/// Players attacking from beyond this bounds-distance are rejected.
pub const PLAYER_BOUNDS_RANGE: f32 = 2.0;

// ============================================================================
// Events
// ============================================================================

/// Incoming hit on a structure's proxy entity (direct path).
#[derive(Event, Debug, Clone)]
pub struct BuildingDamageEvent {
    pub proxy: Entity,
    pub raw_damage: f32,
    /// Where the attack came from, for the range gate.
    pub source: Vec3,
    pub attacker: AttackerKind,
    pub attacker_entity: Option<Entity>,
    pub attacker_species: Option<Species>,
}

/// Landed projectile payload (projectile/area path).
#[derive(Event, Debug, Clone)]
pub struct ProjectileImpactEvent {
    pub kind: ProjectileKind,
    pub damage: f32,
    /// Explicit structure lock, preferred over impact-point lookup.
    pub target_building: Option<u64>,
    pub impact: Vec3,
    pub shooter_species: Species,
    pub shooter: Option<Entity>,
}

/// Zero-health transition; consumed by the collapse sequencer.
#[derive(Event, Debug, Clone, Copy)]
pub struct BeginCollapse {
    pub building_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackerKind {
    Melee,
    Projectile,
    Player,
}

// ============================================================================
// Validation
// ============================================================================

/// Why a hit was turned away. Exposed so collaborators can produce
/// transient actor feedback; the core itself just drops the hit.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum DamageRejection {
    #[error("no structure at the impact point")]
    NoTarget,
    #[error("structure is still generating")]
    Generating,
    #[error("structure is collapsing")]
    Collapsing,
    #[error("structure is already destroyed")]
    AlreadyDestroyed,
    #[error("attack from {distance:.1} blocks, limit {limit:.1}")]
    OutOfRange { distance: f32, limit: f32 },
}

/// Gate a hit on structure state and attacker geometry. No state change.
pub fn validate_hit(
    registry: &BuildingRegistry,
    building_id: u64,
    source: Vec3,
    kind: AttackerKind,
) -> Result<(), DamageRejection> {
    let building = registry.get(building_id).ok_or(DamageRejection::NoTarget)?;
    if building.generating {
        return Err(DamageRejection::Generating);
    }
    if building.collapsing {
        return Err(DamageRejection::Collapsing);
    }
    if building.health <= 0.0 {
        return Err(DamageRejection::AlreadyDestroyed);
    }

    let (distance, limit) = match kind {
        AttackerKind::Melee => (
            geometry::distance_to_surface(source, &building.bounds),
            MELEE_SURFACE_RANGE,
        ),
        AttackerKind::Projectile => {
            // a payload carried past the shell into the volume is a hit
            let distance = if building.bounds.contains(source) {
                0.0
            } else {
                geometry::distance_to_surface(source, &building.bounds)
            };
            (distance, PROJECTILE_SURFACE_RANGE)
        }
        AttackerKind::Player => (
            geometry::distance_to_bounds(source, &building.bounds),
            PLAYER_BOUNDS_RANGE,
        ),
    };
    if distance > limit {
        return Err(DamageRejection::OutOfRange { distance, limit });
    }
    Ok(())
}

// ============================================================================
// Admission
// ============================================================================

/// Direct path: validate, reduce through armor, apply.
pub fn admit_direct_hit(
    registry: &mut BuildingRegistry,
    building_id: u64,
    raw_damage: f32,
    source: Vec3,
    kind: AttackerKind,
) -> Result<DamageOutcome, DamageRejection> {
    validate_hit(registry, building_id, source, kind)?;
    let armor = registry
        .get(building_id)
        .map(|b| b.armor)
        .ok_or(DamageRejection::NoTarget)?;
    let actual = BuildingRegistry::actual_damage(raw_damage, armor);
    Ok(registry.apply_damage(building_id, actual))
}

/// Projectile path: prefer the payload's explicit target if it is still
/// active, otherwise resolve the structure at the impact point, then gate
/// and apply like any projectile hit.
pub fn admit_projectile_impact(
    registry: &mut BuildingRegistry,
    target_building: Option<u64>,
    impact: Vec3,
    damage: f32,
) -> Result<(u64, DamageOutcome), DamageRejection> {
    let explicit = target_building
        .and_then(|id| registry.get(id))
        .filter(|b| b.is_active())
        .map(|b| b.id);
    let building_id = explicit
        .or_else(|| registry.find_at(impact))
        .ok_or(DamageRejection::NoTarget)?;

    let outcome = admit_direct_hit(
        registry,
        building_id,
        damage,
        impact,
        AttackerKind::Projectile,
    )?;
    Ok((building_id, outcome))
}

// ============================================================================
// Systems
// ============================================================================

/// System: run every direct hit through the gate. Accepted hits from
/// non-player living attackers also seed threat at priority 1.
pub fn process_damage_events(
    mut events: EventReader<BuildingDamageEvent>,
    mut registry: ResMut<BuildingRegistry>,
    proxies: Res<ProxyIndex>,
    mut ledger: ResMut<ThreatLedger>,
    mut collapses: EventWriter<BeginCollapse>,
) {
    for event in events.read() {
        let Some(building_id) = proxies.building_of(event.proxy) else {
            debug!("Dropped damage event for unknown proxy {:?}", event.proxy);
            continue;
        };

        match admit_direct_hit(
            &mut registry,
            building_id,
            event.raw_damage,
            event.source,
            event.attacker,
        ) {
            Ok(outcome) => {
                if event.attacker != AttackerKind::Player {
                    if let (Some(attacker), Some(species)) =
                        (event.attacker_entity, event.attacker_species)
                    {
                        ledger.add_threat(building_id, attacker, species, 1);
                    }
                }
                if outcome == DamageOutcome::Destroyed {
                    collapses.send(BeginCollapse { building_id });
                }
            }
            Err(reason) => {
                debug!("Rejected hit on structure {}: {}", building_id, reason);
            }
        }
    }
}

/// System: resolve landed projectile payloads against structures.
pub fn process_projectile_impacts(
    mut events: EventReader<ProjectileImpactEvent>,
    mut registry: ResMut<BuildingRegistry>,
    mut ledger: ResMut<ThreatLedger>,
    mut collapses: EventWriter<BeginCollapse>,
) {
    for event in events.read() {
        match admit_projectile_impact(
            &mut registry,
            event.target_building,
            event.impact,
            event.damage,
        ) {
            Ok((building_id, outcome)) => {
                if let Some(shooter) = event.shooter {
                    ledger.add_threat(building_id, shooter, event.shooter_species, 1);
                }
                if outcome == DamageOutcome::Destroyed {
                    collapses.send(BeginCollapse { building_id });
                }
            }
            Err(reason) => {
                debug!("Projectile payload fizzled: {}", reason);
            }
        }
    }
}

/// System: fly projectile payloads toward their aim point and convert them
/// into impact events on arrival or expiry.
pub fn update_projectiles(
    time: Res<Time>,
    mut commands: Commands,
    mut projectiles: Query<(Entity, &mut crate::components::Projectile, &mut Transform)>,
    mut impacts: EventWriter<ProjectileImpactEvent>,
) {
    let dt = time.delta_secs();

    for (entity, mut projectile, mut transform) in &mut projectiles {
        projectile.remaining_life -= dt;
        let speed = projectile.kind.speed();
        let to_aim = projectile.aim - transform.translation;
        let step = speed * dt;

        let arrived = to_aim.length() <= step.max(0.5);
        if !arrived && speed > 0.0 {
            transform.translation += to_aim.normalize_or_zero() * step;
        }

        if arrived || projectile.remaining_life <= 0.0 {
            let impact = if arrived {
                projectile.aim
            } else {
                transform.translation
            };
            impacts.send(ProjectileImpactEvent {
                kind: projectile.kind,
                damage: projectile.damage,
                target_building: projectile.target_building,
                impact,
                shooter_species: projectile.shooter_species,
                shooter: None,
            });
            commands.entity(entity).despawn();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::building::BuildingSpec;

    fn active_registry(armor: f32) -> (BuildingRegistry, u64) {
        let mut registry = BuildingRegistry::new();
        let id = registry.register(
            &BuildingSpec {
                owner_id: 1,
                anchor: Vec3::ZERO,
                width: 5,
                height: 3,
                length: 5,
                rotation: 90,
                max_health: 100.0,
                armor,
                explosion_damage: true,
                attracts_monsters: false,
            },
            Entity::from_raw(1),
        );
        registry.building_completed(id);
        (registry, id)
    }

    #[test]
    fn test_melee_hit_at_surface_applies_reduced_damage() {
        let (mut registry, id) = active_registry(50.0);
        // exactly on the +X bounding face
        let source = Vec3::new(2.5, 1.0, 0.0);
        let outcome = admit_direct_hit(&mut registry, id, 10.0, source, AttackerKind::Melee)
            .expect("hit should be admitted");
        assert_eq!(outcome, DamageOutcome::Damaged { remaining: 95.0 });
    }

    #[test]
    fn test_melee_hit_beyond_threshold_rejected() {
        let (mut registry, id) = active_registry(0.0);
        // every face plane is exactly 3.0 away from this point
        let source = Vec3::new(5.5, 6.0, 5.5);
        let err = admit_direct_hit(&mut registry, id, 10.0, source, AttackerKind::Melee)
            .expect_err("hit should be rejected");
        assert!(matches!(err, DamageRejection::OutOfRange { .. }));
        assert_eq!(registry.get(id).unwrap().health, 100.0);
    }

    #[test]
    fn test_projectile_gate_is_looser_than_melee() {
        let (mut registry, id) = active_registry(0.0);
        let source = Vec3::new(4.3, 4.8, 0.0); // nearest face plane 1.8 away
        assert!(admit_direct_hit(&mut registry, id, 1.0, source, AttackerKind::Melee).is_err());
        assert!(
            admit_direct_hit(&mut registry, id, 1.0, source, AttackerKind::Projectile).is_ok()
        );
    }

    #[test]
    fn test_player_gate_uses_bounds_distance() {
        let (mut registry, id) = active_registry(0.0);
        // inside the box: bounds distance 0, admitted
        assert!(admit_direct_hit(
            &mut registry,
            id,
            1.0,
            Vec3::new(0.0, 1.0, 0.0),
            AttackerKind::Player
        )
        .is_ok());
        // 2.5 outside
        let err = admit_direct_hit(
            &mut registry,
            id,
            1.0,
            Vec3::new(5.0, 1.0, 0.0),
            AttackerKind::Player,
        )
        .expect_err("too far");
        assert!(matches!(err, DamageRejection::OutOfRange { .. }));
    }

    #[test]
    fn test_generating_and_collapsing_rejections() {
        let (mut registry, id) = active_registry(0.0);
        registry.get_mut(id).unwrap().generating = true;
        assert_eq!(
            validate_hit(&registry, id, Vec3::ZERO, AttackerKind::Melee),
            Err(DamageRejection::Generating)
        );

        let b = registry.get_mut(id).unwrap();
        b.generating = false;
        b.collapsing = true;
        assert_eq!(
            validate_hit(&registry, id, Vec3::ZERO, AttackerKind::Melee),
            Err(DamageRejection::Collapsing)
        );
    }

    #[test]
    fn test_missing_structure_rejection() {
        let registry = BuildingRegistry::new();
        assert_eq!(
            validate_hit(&registry, 42, Vec3::ZERO, AttackerKind::Melee),
            Err(DamageRejection::NoTarget)
        );
    }

    #[test]
    fn test_projectile_impact_resolves_explicit_target() {
        let (mut registry, id) = active_registry(0.0);
        // impact point sits on the surface, explicit lock provided
        let (hit, _) = admit_projectile_impact(
            &mut registry,
            Some(id),
            Vec3::new(2.5, 1.5, 0.0),
            6.0,
        )
        .expect("locked payload should land");
        assert_eq!(hit, id);
        assert_eq!(registry.get(id).unwrap().health, 94.0);
    }

    #[test]
    fn test_interior_impact_on_large_structure_is_admitted() {
        // 5x5x5: the center sits 2.5 from every face plane, beyond the
        // exterior projectile gate, but inside the volume
        let mut registry = BuildingRegistry::new();
        let id = registry.register(
            &BuildingSpec {
                owner_id: 1,
                anchor: Vec3::ZERO,
                width: 5,
                height: 5,
                length: 5,
                rotation: 0,
                max_health: 100.0,
                armor: 0.0,
                explosion_damage: true,
                attracts_monsters: false,
            },
            Entity::from_raw(1),
        );
        registry.building_completed(id);
        let center = registry.get(id).unwrap().center();

        let (hit, outcome) = admit_projectile_impact(&mut registry, Some(id), center, 6.0)
            .expect("interior impact should land");
        assert_eq!(hit, id);
        assert_eq!(outcome, DamageOutcome::Damaged { remaining: 94.0 });
    }

    #[test]
    fn test_projectile_impact_falls_back_to_location() {
        let (mut registry, id) = active_registry(0.0);
        // stale lock on a structure that never existed
        let (hit, _) = admit_projectile_impact(
            &mut registry,
            Some(999),
            Vec3::new(0.0, 1.0, 0.0),
            4.0,
        )
        .expect("should resolve by impact point");
        assert_eq!(hit, id);
    }

    #[test]
    fn test_projectile_impact_in_open_field_fizzles() {
        let (mut registry, _id) = active_registry(0.0);
        let err = admit_projectile_impact(&mut registry, None, Vec3::new(200.0, 1.0, 0.0), 4.0)
            .expect_err("nothing there");
        assert_eq!(err, DamageRejection::NoTarget);
    }

    #[test]
    fn test_destroyed_outcome_emitted_once() {
        let (mut registry, id) = active_registry(0.0);
        let source = Vec3::new(2.5, 1.0, 0.0);
        let outcome =
            admit_direct_hit(&mut registry, id, 100.0, source, AttackerKind::Melee).unwrap();
        assert_eq!(outcome, DamageOutcome::Destroyed);

        // second lethal hit is a rejection, not another Destroyed
        let err = admit_direct_hit(&mut registry, id, 100.0, source, AttackerKind::Melee)
            .expect_err("already destroyed");
        assert_eq!(err, DamageRejection::AlreadyDestroyed);
    }
}
