//! Monster Behavior Engine — per-creature siege decision procedure
//!
//! Every behavior tick, for each active structure, nearby siege-capable
//! creatures run the same procedure:
//!
//! ```text
//! stale-target cleanup (dangling proxies never reach decisions)
//!       ↓
//! player priority: eligible player in range + line of sight + follow range?
//!       ├─ yes → target the player, skip structure logic
//!       └─ no  → fail-timestamp window, then target the structure proxy
//!                     ↓
//!       melee: inside expanded-bounds margin → swing (cooldown gated)
//!       ranged: kite into [min,max] band → fire payload (cooldown gated)
//!                     ↓
//! one-shot drop missions for fliers after a collapse
//! ```
//!
//! Species numbers live in `species.rs`; this module owns the procedure,
//! the cooldown/fail bookkeeping, fuses, and missions.

use bevy::prelude::*;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::blocks::{self, WorldBlocks};
use crate::building::{Building, BuildingRegistry, DamageOutcome};
use crate::components::{Creature, CreatureTarget, Player, Projectile};
use crate::damage::BeginCollapse;
use crate::geometry::{self, BoundingBox};
use crate::species::{mob_damage, AttackRole, Difficulty, SpecialRoutine, Species};
use crate::threat::ThreatLedger;

// ============================================================================
// Constants
// ============================================================================

/// Melee swing reach, measured against the margin-expanded bounds.
pub const MELEE_ATTACK_RANGE: f32 = 1.0;
/// Margin added to the exact bounds for melee reach checks.
pub const BUILDING_BOUNDS_MARGIN: f32 = 0.5;
/// Radius in which an eligible player outranks any structure target.
pub const PLAYER_PRIORITY_RANGE: f32 = 16.0;
/// Scan radius around a structure for melee-classified creatures.
pub const MELEE_AGGRO_RANGE: f32 = 16.0;
/// Scan radius around a structure for ranged-classified creatures.
pub const RANGED_AGGRO_RANGE: f32 = 25.0;
/// Seconds a creature keeps waiting on an unreachable player before it
/// reverts to the structure.
pub const PLAYER_TARGET_TIMEOUT: f64 = 5.0;
/// Ranged kiting band, measured to the structure's center.
pub const MIN_RANGED_DISTANCE: f32 = 5.0;
pub const MAX_RANGED_DISTANCE: f32 = 20.0;
/// Per-decision-step movement factors while kiting.
pub const CLOSE_IN_STEP: f32 = 0.5;
pub const BACK_AWAY_STEP: f32 = 0.3;
/// Fliers within this range of a collapse receive a drop mission.
pub const MISSION_RANGE: f32 = 50.0;
/// Per-tick mission flight step.
pub const MISSION_FLY_STEP: f32 = 0.5;
/// Arrival threshold at the drop point.
pub const MISSION_ARRIVAL_RANGE: f32 = 5.0;
/// Ground units spawned when a flier completes its mission.
pub const MISSION_SPAWN_COUNT: usize = 6;
/// Detonation fuse length and damage factor (applied to health directly).
pub const FUSE_SECS: f64 = 1.0;
pub const DETONATE_DAMAGE_FACTOR: f32 = 3.0;
/// Roar secondary attack: chance, and armor-ignoring damage factor.
pub const ROAR_CHANCE: f32 = 0.25;
pub const ROAR_DAMAGE_FACTOR: f32 = 1.5;
/// Locked-on flier payloads carry double damage.
pub const LOCKED_PAYLOAD_FACTOR: f32 = 2.0;

// ============================================================================
// Bookkeeping Resources
// ============================================================================

/// Per-creature timestamp of the last structure attack. One window per
/// creature: a creature standing between two structures still attacks at
/// its species rate, not double it.
#[derive(Resource, Default)]
pub struct AttackCooldowns {
    last_attack: HashMap<Entity, f64>,
}

impl AttackCooldowns {
    pub fn ready(&self, creature: Entity, now: f64, cooldown: f32) -> bool {
        match self.last_attack.get(&creature) {
            Some(&last) => now - last >= cooldown as f64,
            None => true,
        }
    }

    pub fn mark(&mut self, creature: Entity, now: f64) {
        self.last_attack.insert(creature, now);
    }

    pub fn forget(&mut self, creature: Entity) {
        self.last_attack.remove(&creature);
    }

    /// Keep only entries whose creature still exists.
    pub fn retain(&mut self, mut keep: impl FnMut(Entity) -> bool) {
        self.last_attack.retain(|&creature, _| keep(creature));
    }

    pub fn len(&self) -> usize {
        self.last_attack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_attack.is_empty()
    }
}

/// Per-creature "can't reach the player" timestamps.
#[derive(Resource, Default)]
pub struct PlayerTargetFailures {
    since: HashMap<Entity, f64>,
}

impl PlayerTargetFailures {
    /// Record the first failure time; later calls return the original one.
    pub fn record_if_absent(&mut self, creature: Entity, now: f64) -> f64 {
        *self.since.entry(creature).or_insert(now)
    }

    pub fn clear(&mut self, creature: Entity) {
        self.since.remove(&creature);
    }

    pub fn is_empty(&self) -> bool {
        self.since.is_empty()
    }
}

/// One-shot post-collapse directives: flier → drop point.
#[derive(Resource, Default)]
pub struct MissionBoard {
    missions: HashMap<Entity, Vec3>,
}

impl MissionBoard {
    pub fn assign(&mut self, creature: Entity, destination: Vec3) {
        self.missions.insert(creature, destination);
    }

    pub fn destination_of(&self, creature: Entity) -> Option<Vec3> {
        self.missions.get(&creature).copied()
    }

    pub fn len(&self) -> usize {
        self.missions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.missions.is_empty()
    }
}

/// Lit fuse of a primed detonator creature.
#[derive(Debug, Clone, Copy)]
pub struct Fuse {
    pub creature: Entity,
    pub building_id: u64,
    pub damage: f32,
    pub detonate_at: f64,
}

#[derive(Resource, Default)]
pub struct PrimedFuses {
    fuses: Vec<Fuse>,
}

impl PrimedFuses {
    pub fn prime(&mut self, fuse: Fuse) {
        self.fuses.push(fuse);
    }

    pub fn contains(&self, creature: Entity) -> bool {
        self.fuses.iter().any(|f| f.creature == creature)
    }

    pub fn len(&self) -> usize {
        self.fuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fuses.is_empty()
    }
}

/// Deterministic LCG roll source for chance-based routines.
#[derive(Resource)]
pub struct BehaviorRng(pub u64);

impl Default for BehaviorRng {
    fn default() -> Self {
        Self(0x9E37_79B9_7F4A_7C15)
    }
}

impl BehaviorRng {
    pub fn next_f32(&mut self) -> f32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 40) as f32) / (1u64 << 24) as f32
    }

    pub fn chance(&mut self, probability: f32) -> bool {
        self.next_f32() < probability
    }
}

// ============================================================================
// Decision Procedure (pure)
// ============================================================================

/// Nearest eligible player as seen by one creature.
#[derive(Debug, Clone, Copy)]
pub struct PlayerSighting {
    pub entity: Entity,
    pub distance: f32,
    pub line_of_sight: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetChoice {
    /// Attack the player; structure logic is skipped this tick.
    Player(Entity),
    /// Player seen but unreachable; timeout window still running.
    Waiting,
    /// Target the structure's proxy.
    Building,
}

/// Player-priority check. A visible player within follow range always wins;
/// an unreachable one opens a timeout window that ends at the structure.
pub fn choose_target(
    creature: Entity,
    sighting: Option<&PlayerSighting>,
    follow_range: f32,
    failures: &mut PlayerTargetFailures,
    now: f64,
) -> TargetChoice {
    match sighting {
        Some(s) if s.line_of_sight && s.distance <= follow_range => {
            failures.clear(creature);
            TargetChoice::Player(s.entity)
        }
        Some(_) => {
            let since = failures.record_if_absent(creature, now);
            if now - since >= PLAYER_TARGET_TIMEOUT {
                failures.clear(creature);
                TargetChoice::Building
            } else {
                TargetChoice::Waiting
            }
        }
        None => TargetChoice::Building,
    }
}

/// What a creature targeting a structure should do this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttackStep {
    /// Swing at the shell.
    Melee,
    /// Light the fuse (detonator species).
    Prime,
    /// Move by this offset toward the firing band.
    CloseIn(Vec3),
    /// Move by this offset away from the structure.
    BackAway(Vec3),
    /// Launch the species projectile payload.
    Fire,
    /// In position but the cooldown window is still open.
    Cooldown,
    /// Too far for a melee swing; movement AI will keep approaching.
    OutOfReach,
}

/// Melee branch: attack when within the margin-expanded bounds reach.
pub fn melee_step(
    species: Species,
    position: Vec3,
    bounds: &BoundingBox,
    cooldown_ready: bool,
) -> AttackStep {
    let reach = geometry::distance_to_bounds(position, &bounds.expanded(BUILDING_BOUNDS_MARGIN));
    if reach > MELEE_ATTACK_RANGE {
        return AttackStep::OutOfReach;
    }
    if !cooldown_ready {
        return AttackStep::Cooldown;
    }
    if species.special_routine() == SpecialRoutine::Detonate {
        AttackStep::Prime
    } else {
        AttackStep::Melee
    }
}

/// Ranged branch: kite into the [min, max] band, fire within species reach.
pub fn ranged_step(
    species: Species,
    position: Vec3,
    center: Vec3,
    cooldown_ready: bool,
) -> AttackStep {
    let distance = position.distance(center);
    if distance > MAX_RANGED_DISTANCE {
        let step = (center - position).normalize_or_zero() * CLOSE_IN_STEP;
        return AttackStep::CloseIn(step);
    }
    if distance < MIN_RANGED_DISTANCE {
        let step = (position - center).normalize_or_zero() * BACK_AWAY_STEP;
        return AttackStep::BackAway(step);
    }
    if distance <= species.ranged_attack_range() {
        if cooldown_ready {
            AttackStep::Fire
        } else {
            AttackStep::Cooldown
        }
    } else {
        // inside the band but out of this species' own reach
        let step = (center - position).normalize_or_zero() * CLOSE_IN_STEP;
        AttackStep::CloseIn(step)
    }
}

// ============================================================================
// Systems
// ============================================================================

/// System: clear creature targets that point at proxies of missing or
/// collapsing structures, drop their threat entries, and prune cooldown
/// stamps of despawned creatures, before any decision runs this tick.
pub fn clean_stale_targets(
    registry: Res<BuildingRegistry>,
    proxies: Res<crate::building::ProxyIndex>,
    mut ledger: ResMut<ThreatLedger>,
    mut cooldowns: ResMut<AttackCooldowns>,
    creatures: Query<(), With<Creature>>,
    mut targets: Query<&mut CreatureTarget>,
) {
    cooldowns.retain(|creature| creatures.contains(creature));

    for mut target in &mut targets {
        let Some(aim) = target.0 else { continue };
        if let Some(building_id) = proxies.building_of(aim) {
            let alive = registry
                .get(building_id)
                .map(|b| !b.collapsing)
                .unwrap_or(false);
            if !alive {
                target.0 = None;
            }
        }
    }

    for building_id in ledger.building_ids() {
        let gone = registry
            .get(building_id)
            .map(|b| b.collapsing)
            .unwrap_or(true);
        if gone {
            ledger.remove_building(building_id);
        }
    }
}

/// System: the attack/target decision pass. Runs on the behavior cadence.
#[allow(clippy::too_many_arguments)]
pub fn update_building_attacks(
    time: Res<Time>,
    mut commands: Commands,
    mut registry: ResMut<BuildingRegistry>,
    blocks: Res<WorldBlocks>,
    difficulty: Res<Difficulty>,
    mut cooldowns: ResMut<AttackCooldowns>,
    mut failures: ResMut<PlayerTargetFailures>,
    mut primed: ResMut<PrimedFuses>,
    mut rng: ResMut<BehaviorRng>,
    players: Query<(Entity, &Player)>,
    mut creatures: Query<(Entity, &mut Creature, &mut CreatureTarget)>,
    mut collapses: EventWriter<BeginCollapse>,
) {
    let now = time.elapsed_secs_f64();
    let active: Vec<Building> = registry.iter().filter(|b| b.is_active()).cloned().collect();

    for building in &active {
        let center = building.center();

        for (entity, mut creature, mut target) in &mut creatures {
            if !creature.species.can_siege() || !creature.is_alive() {
                continue;
            }
            let scan_range = match creature.species.role() {
                AttackRole::Melee => MELEE_AGGRO_RANGE,
                AttackRole::Ranged => RANGED_AGGRO_RANGE,
            };
            if creature.position.distance(center) > scan_range {
                continue;
            }
            if primed.contains(entity) {
                continue; // fuse is lit, nothing left to decide
            }

            let sighting = nearest_attackable_player(creature.position, &players, &blocks);
            match choose_target(entity, sighting.as_ref(), creature.follow_range, &mut failures, now)
            {
                TargetChoice::Player(player) => {
                    target.0 = Some(player);
                    continue;
                }
                TargetChoice::Waiting => continue,
                TargetChoice::Building => {
                    target.0 = Some(building.proxy);
                }
            }

            let ready = cooldowns.ready(entity, now, creature.species.attack_cooldown());
            let step = match creature.species.role() {
                AttackRole::Melee => {
                    melee_step(creature.species, creature.position, &building.bounds, ready)
                }
                AttackRole::Ranged => {
                    ranged_step(creature.species, creature.position, center, ready)
                }
            };

            match step {
                AttackStep::Melee => {
                    cooldowns.mark(entity, now);
                    let raw = mob_damage(creature.species, creature.held_item, *difficulty);
                    let outcome = if creature.species.special_routine() == SpecialRoutine::Roar
                        && rng.chance(ROAR_CHANCE)
                    {
                        // roar slam skips armor entirely
                        debug!("Creature {:?} roars at structure {}", entity, building.id);
                        registry.apply_damage(building.id, raw * ROAR_DAMAGE_FACTOR)
                    } else {
                        let actual = BuildingRegistry::actual_damage(raw, building.armor);
                        registry.apply_damage(building.id, actual)
                    };
                    if outcome == DamageOutcome::Destroyed {
                        collapses.send(BeginCollapse {
                            building_id: building.id,
                        });
                    }
                }
                AttackStep::Prime => {
                    cooldowns.mark(entity, now);
                    let raw = mob_damage(creature.species, creature.held_item, *difficulty);
                    primed.prime(Fuse {
                        creature: entity,
                        building_id: building.id,
                        damage: raw * DETONATE_DAMAGE_FACTOR,
                        detonate_at: now + FUSE_SECS,
                    });
                    debug!("Creature {:?} primed against structure {}", entity, building.id);
                }
                AttackStep::CloseIn(delta) | AttackStep::BackAway(delta) => {
                    creature.position += delta;
                }
                AttackStep::Fire => {
                    cooldowns.mark(entity, now);
                    launch_payload(&mut commands, entity, &creature, building, *difficulty);
                }
                AttackStep::Cooldown | AttackStep::OutOfReach => {}
            }
        }
    }
}

/// Spawn the species projectile aimed at the structure. Locked-on flier
/// payloads carry doubled damage plus the explicit structure reference.
fn launch_payload(
    commands: &mut Commands,
    shooter: Entity,
    creature: &Creature,
    building: &Building,
    difficulty: Difficulty,
) {
    let Some(kind) = creature.species.projectile() else {
        return;
    };
    let raw = mob_damage(creature.species, creature.held_item, difficulty);
    let (damage, target_building) = match creature.species.special_routine() {
        SpecialRoutine::DropMission => (raw * LOCKED_PAYLOAD_FACTOR, Some(building.id)),
        _ => (raw, None),
    };

    // aim at the nearest shell point, inside the projectile surface gate
    let aim = geometry::closest_point_on_bounds(creature.position, &building.bounds);
    // fangs erupt at the wall itself, everything else flies from the shooter
    let origin = if kind.speed() == 0.0 {
        aim
    } else {
        creature.position
    };

    commands.spawn((
        Projectile {
            kind,
            damage,
            target_building,
            shooter_species: creature.species,
            aim,
            remaining_life: kind.lifetime(),
        },
        Transform::from_translation(origin),
    ));
    debug!(
        "Creature {:?} ({:?}) launched {:?} at structure {}",
        shooter, creature.species, kind, building.id
    );
}

/// System: burn down lit fuses. Detonation applies its damage to health
/// directly (no armor) when the structure accepts explosion damage, then
/// the detonator self-destructs.
pub fn detonate_fuses(
    time: Res<Time>,
    mut commands: Commands,
    mut primed: ResMut<PrimedFuses>,
    mut registry: ResMut<BuildingRegistry>,
    mut collapses: EventWriter<BeginCollapse>,
) {
    let now = time.elapsed_secs_f64();
    primed.fuses.retain(|fuse| {
        if fuse.detonate_at > now {
            return true;
        }

        let accepts = registry
            .get(fuse.building_id)
            .map(|b| b.explosion_damage)
            .unwrap_or(false);
        if accepts {
            let outcome = registry.apply_damage(fuse.building_id, fuse.damage);
            info!(
                "Detonation against structure {} for {:.1}",
                fuse.building_id, fuse.damage
            );
            if outcome == DamageOutcome::Destroyed {
                collapses.send(BeginCollapse {
                    building_id: fuse.building_id,
                });
            }
        }
        if let Some(mut creature) = commands.get_entity(fuse.creature) {
            creature.despawn();
        }
        false
    });
}

/// System: fly mission holders toward their drop points. On arrival the
/// flier despawns and ground units rise in its place; invalid holders are
/// dropped from the board.
pub fn handle_missions(
    mut commands: Commands,
    mut missions: ResMut<MissionBoard>,
    mut creatures: Query<&mut Creature>,
) {
    missions.missions.retain(|&flier, destination| {
        let Ok(mut creature) = creatures.get_mut(flier) else {
            return false;
        };
        if !creature.is_alive() {
            return false;
        }

        let to_drop = *destination - creature.position;
        if to_drop.length() >= MISSION_ARRIVAL_RANGE {
            creature.position += to_drop.normalize_or_zero() * MISSION_FLY_STEP;
            return true;
        }

        // touchdown: replace the flier with a ground squad
        for i in 0..MISSION_SPAWN_COUNT {
            let angle = (i as f32 / MISSION_SPAWN_COUNT as f32) * std::f32::consts::TAU;
            let offset = Vec3::new(angle.cos() * 1.5, 0.0, angle.sin() * 1.5);
            commands.spawn((
                Creature::new(Species::ZombifiedPiglin, *destination + offset),
                CreatureTarget::default(),
            ));
        }
        if let Some(mut entity) = commands.get_entity(flier) {
            entity.despawn();
        }
        info!("Drop mission completed at {:?}", destination);
        false
    });
}

/// Nearest living, attackable player within the priority radius, with a
/// line-of-sight check through the block store.
pub fn nearest_attackable_player(
    from: Vec3,
    players: &Query<(Entity, &Player)>,
    world: &WorldBlocks,
) -> Option<PlayerSighting> {
    let mut nearest: Option<(Entity, Vec3, f32)> = None;
    for (entity, player) in players.iter() {
        if !player.game_mode.is_attackable() || player.health <= 0.0 {
            continue;
        }
        let distance = player.position.distance(from);
        if distance > PLAYER_PRIORITY_RANGE {
            continue;
        }
        if nearest.map_or(true, |(_, _, best)| distance < best) {
            nearest = Some((entity, player.position, distance));
        }
    }

    nearest.map(|(entity, position, distance)| PlayerSighting {
        entity,
        distance,
        line_of_sight: blocks::line_of_sight(world, from, position),
    })
}

// ============================================================================
// Tests
// ============================================================================
