//! End-to-end siege scenarios exercising the registry, damage pipeline,
//! behavior decisions, and collapse sequencing together, without a running
//! Bevy app.

use bevy::prelude::*;

use siege_bevy_server::behavior::{
    choose_target, melee_step, ranged_step, AttackCooldowns, AttackStep, PlayerSighting,
    PlayerTargetFailures, TargetChoice, CLOSE_IN_STEP,
};
use siege_bevy_server::blocks::{BlockKind, WorldBlocks};
use siege_bevy_server::building::{BuildingRegistry, BuildingSpec, ProxyIndex};
use siege_bevy_server::collapse::CollapseJob;
use siege_bevy_server::damage::{admit_direct_hit, admit_projectile_impact, AttackerKind, DamageRejection};
use siege_bevy_server::geometry;
use siege_bevy_server::species::{mob_damage, HeldItem, Species};
use siege_bevy_server::{DamageOutcome, Difficulty, ThreatLedger};

fn register_structure(armor: f32) -> (BuildingRegistry, u64) {
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
        Entity::from_raw(100),
    );
    registry.building_completed(id);
    (registry, id)
}

// ============================================================================
// Scenario A: armored melee hit at the surface
// ============================================================================

#[test]
fn melee_hit_through_armor_leaves_95() {
    let (mut registry, id) = register_structure(50.0);

    // point exactly on the +X bounding face of the rotated 5x3x5 box
    let source = Vec3::new(2.5, 1.0, 0.0);
    let outcome = admit_direct_hit(&mut registry, id, 10.0, source, AttackerKind::Melee)
        .expect("surface hit should be admitted");

    assert_eq!(outcome, DamageOutcome::Damaged { remaining: 95.0 });
    assert_eq!(registry.get(id).unwrap().health, 95.0);
}

// ============================================================================
// Scenario B: destruction starts exactly one collapse, purged at cursor < 0
// ============================================================================

#[test]
fn repeated_damage_destroys_once_and_collapse_purges() {
    let (mut registry, id) = register_structure(50.0);
    let source = Vec3::new(2.5, 1.0, 0.0);

    let mut destroyed_count = 0;
    for _ in 0..40 {
        match admit_direct_hit(&mut registry, id, 10.0, source, AttackerKind::Melee) {
            Ok(DamageOutcome::Destroyed) => destroyed_count += 1,
            Ok(_) => {}
            Err(DamageRejection::AlreadyDestroyed) => {}
            Err(other) => panic!("unexpected rejection: {other}"),
        }
    }
    assert_eq!(destroyed_count, 1);

    // collapse entry is monotone: the flag blocks any re-trigger
    registry.get_mut(id).unwrap().collapsing = true;
    assert_eq!(registry.apply_damage(id, 999.0), DamageOutcome::Ignored);

    // materialize the blocks, then run the job to the terminal cursor
    let mut blocks = WorldBlocks::new();
    {
        let b = registry.get(id).unwrap();
        for y in 0..b.height {
            for x in 0..b.width {
                for z in 0..b.length {
                    let p = geometry::block_position(
                        b.anchor, x, y, z, b.width, b.length, b.rotation,
                    );
                    blocks.set_at(p, BlockKind::Stone);
                }
            }
        }
    }
    assert_eq!(blocks.solid_count(), 75);

    let mut job = CollapseJob::new(registry.get(id).unwrap());
    assert_eq!(job.cursor(), 2);

    let mut finished = false;
    for _ in 0..3 {
        assert!(!finished, "finished before the height-th tick");
        finished = job.tick(&mut blocks).finished;
    }
    assert!(finished);
    assert_eq!(job.cursor(), -1);
    assert_eq!(blocks.solid_count(), 0);

    // terminal tick purges the record and its bookkeeping
    let mut ledger = ThreatLedger::default();
    ledger.add_threat(id, Entity::from_raw(5), Species::Zombie, 1);
    let mut cooldowns = AttackCooldowns::default();
    cooldowns.mark(Entity::from_raw(5), 10.0);
    let mut proxies = ProxyIndex::default();
    proxies.insert(Entity::from_raw(100), id);

    registry.remove(id);
    ledger.remove_building(id);
    cooldowns.forget(Entity::from_raw(5));
    proxies.remove_building(id);

    assert!(registry.get(id).is_none());
    assert!(ledger.is_empty());
    assert!(cooldowns.is_empty());
    assert!(proxies.is_empty());
}

// ============================================================================
// Scenario C: ranged creature closes in, then fires once per cooldown window
// ============================================================================

#[test]
fn ranged_creature_kites_into_band_and_fires_per_window() {
    let (registry, id) = register_structure(0.0);
    let building = registry.get(id).unwrap();
    let center = building.center();

    // start well beyond the maximum ranged distance
    let mut position = center + Vec3::new(26.0, 0.0, 0.0);
    let mut approach_ticks = 0;
    loop {
        match ranged_step(Species::Skeleton, position, center, true) {
            AttackStep::CloseIn(delta) => {
                assert!((delta.length() - CLOSE_IN_STEP).abs() < 0.001);
                position += delta;
                approach_ticks += 1;
                assert!(approach_ticks < 60, "never reached firing range");
            }
            AttackStep::Fire => break,
            other => panic!("unexpected step while approaching: {other:?}"),
        }
    }
    assert!(position.distance(center) <= 15.0);

    // one shot per cooldown window
    let skeleton = Entity::from_raw(7);
    let mut cooldowns = AttackCooldowns::default();
    let cooldown = Species::Skeleton.attack_cooldown();

    let mut shots = 0;
    let mut now = 100.0;
    for _ in 0..8 {
        let ready = cooldowns.ready(skeleton, now, cooldown);
        if let AttackStep::Fire = ranged_step(Species::Skeleton, position, center, ready) {
            cooldowns.mark(skeleton, now);
            shots += 1;
        }
        now += 0.5; // behavior cadence
    }
    // 8 ticks over 3.5s at a 2.0s cooldown: shots at t=0 and t=2.0
    assert_eq!(shots, 2);
}

// ============================================================================
// Scenario C2: fired payload lands on a thick structure and drops health
// ============================================================================

#[test]
fn ranged_payload_damages_structure_wider_than_the_gate() {
    // every half-dimension of this box exceeds the 2.0 projectile gate
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
        Entity::from_raw(100),
    );
    registry.building_completed(id);
    let building = registry.get(id).unwrap().clone();
    let center = building.center();

    // in the kiting band and within skeleton reach: the decision is Fire
    let shooter = Vec3::new(12.0, 1.0, 0.0);
    assert_eq!(
        ranged_step(Species::Skeleton, shooter, center, true),
        AttackStep::Fire
    );

    // the payload aims at the shell, which sits inside the impact gate
    let aim = geometry::closest_point_on_bounds(shooter, &building.bounds);
    assert_eq!(geometry::distance_to_surface(aim, &building.bounds), 0.0);

    let raw = mob_damage(Species::Skeleton, HeldItem::None, Difficulty::Normal);
    let (hit_id, outcome) = admit_projectile_impact(&mut registry, None, aim, raw)
        .expect("shell impact should be admitted");
    assert_eq!(hit_id, id);
    assert!(matches!(outcome, DamageOutcome::Damaged { .. }));
    assert!(registry.get(id).unwrap().health < 100.0);

    // a locked-on flier payload resolving inside the volume also lands
    let (hit_id, _) = admit_projectile_impact(&mut registry, Some(id), center, 10.0)
        .expect("interior impact on the locked target should be admitted");
    assert_eq!(hit_id, id);
}

// ============================================================================
// Scenario D: an eligible player outranks held structure threat
// ============================================================================

#[test]
fn visible_player_outranks_structure_threat() {
    let (_registry, id) = register_structure(0.0);

    let zombie = Entity::from_raw(3);
    let player = Entity::from_raw(40);

    let mut ledger = ThreatLedger::default();
    ledger.add_threat(id, zombie, Species::Zombie, 8);
    assert!(ledger.has_threat(id, zombie));

    let sighting = PlayerSighting {
        entity: player,
        distance: 12.0,
        line_of_sight: true,
    };
    let mut failures = PlayerTargetFailures::default();
    let choice = choose_target(zombie, Some(&sighting), 16.0, &mut failures, 50.0);

    assert_eq!(choice, TargetChoice::Player(player));
    // the threat entry survives for when the player escapes
    assert!(ledger.has_threat(id, zombie));
}

#[test]
fn unreachable_player_reverts_to_structure_after_timeout() {
    let zombie = Entity::from_raw(3);
    let sighting = PlayerSighting {
        entity: Entity::from_raw(40),
        distance: 12.0,
        line_of_sight: false, // wall in the way
    };
    let mut failures = PlayerTargetFailures::default();

    assert_eq!(
        choose_target(zombie, Some(&sighting), 16.0, &mut failures, 50.0),
        TargetChoice::Waiting
    );
    assert_eq!(
        choose_target(zombie, Some(&sighting), 16.0, &mut failures, 55.5),
        TargetChoice::Building
    );
}

// ============================================================================
// Scenario E: out-of-range melee hit is cancelled with no state change
// ============================================================================

#[test]
fn melee_hit_at_surface_distance_three_is_rejected() {
    let (mut registry, id) = register_structure(0.0);

    // every face plane of the rotated box is exactly 3.0 from this point
    let source = Vec3::new(5.5, 6.0, 5.5);
    let err = admit_direct_hit(&mut registry, id, 10.0, source, AttackerKind::Melee)
        .expect_err("surface distance 3.0 exceeds the 1.5 melee gate");

    match err {
        DamageRejection::OutOfRange { distance, limit } => {
            assert!((distance - 3.0).abs() < 0.001);
            assert_eq!(limit, 1.5);
        }
        other => panic!("unexpected rejection: {other:?}"),
    }
    assert_eq!(registry.get(id).unwrap().health, 100.0);
}

// ============================================================================
// Lifecycle: generating structures are inert until completion
// ============================================================================

#[test]
fn generating_structure_cannot_be_attacked_or_approached() {
    let mut registry = BuildingRegistry::new();
    let id = registry.register(
        &BuildingSpec {
            owner_id: 1,
            anchor: Vec3::ZERO,
            width: 3,
            height: 3,
            length: 3,
            rotation: 0,
            max_health: 60.0,
            armor: 0.0,
            explosion_damage: true,
            attracts_monsters: true,
        },
        Entity::from_raw(100),
    );

    let source = Vec3::new(1.5, 1.0, 0.0);
    assert_eq!(
        admit_direct_hit(&mut registry, id, 10.0, source, AttackerKind::Melee),
        Err(DamageRejection::Generating)
    );
    assert!(!registry.get(id).unwrap().is_active());

    registry.building_completed(id);
    assert!(registry.get(id).unwrap().is_active());
    assert!(admit_direct_hit(&mut registry, id, 10.0, source, AttackerKind::Melee).is_ok());
}

// ============================================================================
// Behavior: melee reach honors the expanded-bounds margin
// ============================================================================

#[test]
fn melee_reach_respects_bounds_margin() {
    let (registry, id) = register_structure(0.0);
    let bounds = registry.get(id).unwrap().bounds;

    // +X face at 2.5; margin 0.5 + reach 1.0 admits up to 4.0
    assert_eq!(
        melee_step(Species::Zombie, Vec3::new(3.9, 1.0, 0.0), &bounds, true),
        AttackStep::Melee
    );
    assert_eq!(
        melee_step(Species::Zombie, Vec3::new(4.5, 1.0, 0.0), &bounds, true),
        AttackStep::OutOfReach
    );
}
