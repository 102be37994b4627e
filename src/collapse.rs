//! Collapse Sequencer — layer-by-layer teardown of destroyed structures
//!
//! ```text
//! BeginCollapse (health hit zero, exactly once)
//!       ↓
//! mark collapsing, despawn proxy, hand out drop missions
//!       ↓
//! CollapseJob: precomputed rotation-transformed layers, cursor = top
//!       ↓  one layer per teardown tick, top to bottom
//! cursor below zero → PurgeBuilding (full deregistration)
//! ```
//!
//! A job owns its own progress; it self-cancels if its structure record
//! vanishes mid-sequence and never carries an error past a tick boundary.

use bevy::prelude::*;
use tracing::{debug, info};

use crate::behavior::{MissionBoard, MISSION_RANGE};
use crate::blocks::WorldBlocks;
use crate::building::{Building, BuildingRegistry, ProxyIndex, PurgeBuilding};
use crate::components::Creature;
use crate::damage::BeginCollapse;
use crate::geometry;
use crate::species::SpecialRoutine;

// ============================================================================
// Collapse Job
// ============================================================================

/// One running teardown. Layers are precomputed once at entry so the job
/// never touches geometry again; the cursor walks from the top layer down
/// to −1 (terminal).
#[derive(Debug, Clone)]
pub struct CollapseJob {
    pub building_id: u64,
    /// Block world-positions grouped by local layer, index = local y.
    layers: Vec<Vec<Vec3>>,
    /// Current layer, `height − 1` down to −1.
    cursor: i32,
}

/// Outcome of one teardown tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollapseTickResult {
    /// Layer that was torn down this tick.
    pub layer: i32,
    /// Blocks actually cleared (air and fire cells are skipped).
    pub cleared: usize,
    /// Cursor passed below the lowest layer; purge now.
    pub finished: bool,
}

impl CollapseJob {
    pub fn new(building: &Building) -> Self {
        let mut layers = Vec::with_capacity(building.height as usize);
        for y in 0..building.height {
            let mut layer = Vec::with_capacity((building.width * building.length) as usize);
            for x in 0..building.width {
                for z in 0..building.length {
                    layer.push(geometry::block_position(
                        building.anchor,
                        x,
                        y,
                        z,
                        building.width,
                        building.length,
                        building.rotation,
                    ));
                }
            }
            layers.push(layer);
        }
        Self {
            building_id: building.id,
            layers,
            cursor: building.height - 1,
        }
    }

    pub fn cursor(&self) -> i32 {
        self.cursor
    }

    /// Tear down the current layer and advance the cursor.
    pub fn tick(&mut self, blocks: &mut WorldBlocks) -> CollapseTickResult {
        if self.cursor < 0 {
            return CollapseTickResult {
                layer: self.cursor,
                cleared: 0,
                finished: true,
            };
        }

        let layer = self.cursor;
        let mut cleared = 0;
        for position in &self.layers[layer as usize] {
            if blocks.tear_down(*position) {
                cleared += 1;
            }
        }
        self.cursor -= 1;

        CollapseTickResult {
            layer,
            cleared,
            finished: self.cursor < 0,
        }
    }
}

/// All running teardown jobs.
#[derive(Resource, Default)]
pub struct ActiveCollapses {
    pub jobs: Vec<CollapseJob>,
}

// ============================================================================
// Systems
// ============================================================================

/// System: enter the collapsing state for each destroyed structure, exactly
/// once. Removes the proxy immediately, assigns drop missions to eligible
/// fliers near the rubble, and queues the teardown job.
pub fn start_collapse_jobs(
    mut events: EventReader<BeginCollapse>,
    mut commands: Commands,
    mut registry: ResMut<BuildingRegistry>,
    creatures: Query<(Entity, &Creature)>,
    mut missions: ResMut<MissionBoard>,
    mut collapses: ResMut<ActiveCollapses>,
) {
    for event in events.read() {
        let Some(building) = registry.get_mut(event.building_id) else {
            continue;
        };
        if building.collapsing {
            continue; // the transition is monotone
        }
        building.collapsing = true;

        if let Some(mut proxy) = commands.get_entity(building.proxy) {
            proxy.despawn();
        }

        let center = building.center();
        let drop_point = building.anchor + Vec3::new(0.0, building.height as f32 + 2.0, 0.0);
        let mut assigned = 0;
        for (entity, creature) in &creatures {
            if creature.species.special_routine() == SpecialRoutine::DropMission
                && creature.is_alive()
                && creature.position.distance(center) <= MISSION_RANGE
            {
                missions.assign(entity, drop_point);
                assigned += 1;
            }
        }

        collapses.jobs.push(CollapseJob::new(building));
        info!(
            "Structure {} collapsing: {} layers queued, {} drop missions",
            event.building_id, building.height, assigned
        );
    }
}

/// System: advance every teardown job by one layer. Lingering proxies are
/// re-despawned defensively; a job whose structure record vanished finishes
/// its deregistration idempotently.
pub fn advance_collapses(
    mut collapses: ResMut<ActiveCollapses>,
    mut blocks: ResMut<WorldBlocks>,
    registry: Res<BuildingRegistry>,
    proxies: Res<ProxyIndex>,
    mut commands: Commands,
    mut purges: EventWriter<PurgeBuilding>,
) {
    collapses.jobs.retain_mut(|job| {
        if registry.get(job.building_id).is_none() {
            // concurrent forced removal beat us to it
            purges.send(PurgeBuilding {
                building_id: job.building_id,
            });
            return false;
        }

        if let Some(proxy) = proxies.proxy_of(job.building_id) {
            if let Some(mut entity) = commands.get_entity(proxy) {
                entity.despawn();
            }
        }

        let result = job.tick(&mut blocks);
        debug!(
            "Structure {} teardown: layer {} cleared {} blocks",
            job.building_id, result.layer, result.cleared
        );

        if result.finished {
            purges.send(PurgeBuilding {
                building_id: job.building_id,
            });
            false
        } else {
            true
        }
    });
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::BlockKind;
    use crate::building::BuildingSpec;

    fn build(w: i32, h: i32, l: i32, rotation: i32) -> (BuildingRegistry, u64) {
        let mut registry = BuildingRegistry::new();
        let id = registry.register(
            &BuildingSpec {
                owner_id: 1,
                anchor: Vec3::new(10.0, 0.0, 10.0),
                width: w,
                height: h,
                length: l,
                rotation,
                max_health: 100.0,
                armor: 0.0,
                explosion_damage: true,
                attracts_monsters: false,
            },
            Entity::from_raw(1),
        );
        registry.building_completed(id);
        (registry, id)
    }

    fn fill_blocks(registry: &BuildingRegistry, id: u64, blocks: &mut WorldBlocks) {
        let b = registry.get(id).unwrap();
        for y in 0..b.height {
            for x in 0..b.width {
                for z in 0..b.length {
                    let p = geometry::block_position(b.anchor, x, y, z, b.width, b.length, b.rotation);
                    blocks.set_at(p, BlockKind::Stone);
                }
            }
        }
    }

    #[test]
    fn test_cursor_starts_at_top_layer() {
        let (registry, id) = build(5, 3, 5, 90);
        let job = CollapseJob::new(registry.get(id).unwrap());
        assert_eq!(job.cursor(), 2);
    }

    #[test]
    fn test_three_ticks_drive_cursor_to_terminal() {
        let (registry, id) = build(5, 3, 5, 90);
        let mut blocks = WorldBlocks::new();
        fill_blocks(&registry, id, &mut blocks);
        let mut job = CollapseJob::new(registry.get(id).unwrap());

        let t1 = job.tick(&mut blocks);
        assert_eq!(t1.layer, 2);
        assert!(!t1.finished);
        assert_eq!(job.cursor(), 1);

        let t2 = job.tick(&mut blocks);
        assert_eq!(t2.layer, 1);
        assert!(!t2.finished);

        let t3 = job.tick(&mut blocks);
        assert_eq!(t3.layer, 0);
        assert!(t3.finished);
        assert_eq!(job.cursor(), -1);
        assert_eq!(blocks.solid_count(), 0);
    }

    #[test]
    fn test_layers_destroyed_top_down() {
        let (registry, id) = build(2, 2, 2, 0);
        let mut blocks = WorldBlocks::new();
        fill_blocks(&registry, id, &mut blocks);
        let mut job = CollapseJob::new(registry.get(id).unwrap());

        let before = blocks.solid_count();
        let result = job.tick(&mut blocks);
        assert_eq!(result.cleared, 4); // one 2x2 layer gone
        assert_eq!(blocks.solid_count(), before - 4);

        // bottom layer still present
        let b = registry.get(id).unwrap();
        let ground = geometry::block_position(b.anchor, 0, 0, 0, 2, 2, 0);
        assert!(!blocks.get_at(ground).is_air());
    }

    #[test]
    fn test_teardown_skips_fire_cells() {
        let (registry, id) = build(2, 1, 2, 0);
        let mut blocks = WorldBlocks::new();
        fill_blocks(&registry, id, &mut blocks);

        let b = registry.get(id).unwrap();
        let burning = geometry::block_position(b.anchor, 0, 0, 0, 2, 2, 0);
        blocks.set_at(burning, BlockKind::Fire);

        let mut job = CollapseJob::new(b);
        let result = job.tick(&mut blocks);
        assert_eq!(result.cleared, 3);
        assert_eq!(blocks.get_at(burning), BlockKind::Fire);
    }

    #[test]
    fn test_tick_past_terminal_is_harmless() {
        let (registry, id) = build(2, 1, 2, 0);
        let mut blocks = WorldBlocks::new();
        let mut job = CollapseJob::new(registry.get(id).unwrap());

        assert!(job.tick(&mut blocks).finished);
        let again = job.tick(&mut blocks);
        assert!(again.finished);
        assert_eq!(again.cleared, 0);
    }

    #[test]
    fn test_rotated_layers_match_rotated_footprint() {
        // 1x1x3 sliver rotated 90 lays its blocks along X instead of Z
        let (registry, id) = build(1, 1, 3, 90);
        let mut blocks = WorldBlocks::new();
        fill_blocks(&registry, id, &mut blocks);
        assert_eq!(blocks.solid_count(), 3);

        let b = registry.get(id).unwrap();
        let mut job = CollapseJob::new(b);
        job.tick(&mut blocks);
        assert_eq!(blocks.solid_count(), 0);
    }
}
