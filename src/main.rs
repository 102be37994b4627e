use bevy::app::ScheduleRunnerPlugin;
use bevy::prelude::*;
use bevy::time::common_conditions::on_timer;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

// Shared modules from the library crate
use siege_bevy_server::{
    behavior, blocks, bridge,
    bridge::{ConstructionCommandSender, ServerUptime, SiegeSnapshotResource},
    building, collapse, damage,
    species::Difficulty,
    threat,
};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    info!("Starting Siege Bevy Server...");

    // ========================================================================
    // 1. Server configuration from the environment
    // ========================================================================
    let tick_rate: u32 = std::env::var("SIEGE_TICK_RATE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(20);
    let frame_time = Duration::from_millis(1000 / tick_rate.max(1) as u64);

    let difficulty = match std::env::var("SIEGE_DIFFICULTY").as_deref() {
        Ok("peaceful") => Difficulty::Peaceful,
        Ok("easy") => Difficulty::Easy,
        Ok("hard") => Difficulty::Hard,
        _ => Difficulty::Normal,
    };
    let config = SimConfig {
        tick_rate,
        difficulty,
    };
    info!("Tick rate {} Hz, difficulty {:?}", tick_rate, difficulty);

    // ========================================================================
    // 2. Create the construction ↔ ECS bridge
    // ========================================================================
    let (cmd_sender, cmd_receiver, siege_snapshot) = bridge::create_bridge();

    App::new()
        // Headless Bevy (no rendering)
        .add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(frame_time)))
        .add_plugins(TransformPlugin)

        // Events
        .add_event::<damage::BuildingDamageEvent>()
        .add_event::<damage::ProjectileImpactEvent>()
        .add_event::<damage::BeginCollapse>()
        .add_event::<building::PurgeBuilding>()
        .add_event::<building::BuildingRemoved>()
        .add_event::<threat::TargetSelectionEvent>()

        // Resources
        .insert_resource(config)
        .insert_resource(difficulty)
        .insert_resource(building::BuildingRegistry::new())
        .init_resource::<building::ProxyIndex>()
        .init_resource::<blocks::WorldBlocks>()
        .init_resource::<threat::ThreatLedger>()
        .init_resource::<behavior::AttackCooldowns>()
        .init_resource::<behavior::PlayerTargetFailures>()
        .init_resource::<behavior::MissionBoard>()
        .init_resource::<behavior::PrimedFuses>()
        .init_resource::<behavior::BehaviorRng>()
        .init_resource::<collapse::ActiveCollapses>()

        // Bridge resources
        .insert_resource(cmd_receiver)
        .insert_resource(ConstructionCommandSender(cmd_sender))
        .insert_resource(SiegeSnapshotResource {
            snapshot: siege_snapshot,
        })
        .insert_resource(ServerUptime::default())

        // Damage pipeline: gate hits, resolve payloads, tear down one layer
        // per teardown tick, then purge — strictly in that order
        .add_systems(
            Update,
            (
                damage::update_projectiles,
                damage::process_damage_events,
                damage::process_projectile_impacts,
                collapse::start_collapse_jobs,
                collapse::advance_collapses.run_if(on_timer(Duration::from_millis(100))),
                building::purge_buildings,
            )
                .chain(),
        )
        // Behavior runs after the purge so decisions never see a record the
        // pipeline removed this tick; fuses and missions burn every tick
        .add_systems(
            Update,
            (
                (
                    behavior::clean_stale_targets,
                    behavior::update_building_attacks,
                )
                    .chain()
                    .run_if(on_timer(Duration::from_millis(500))),
                behavior::detonate_fuses,
                behavior::handle_missions,
            )
                .chain()
                .after(building::purge_buildings),
        )
        // Threat cadence (1 Hz)
        .add_systems(
            Update,
            (threat::update_threat_targets, threat::broadcast_attraction)
                .chain()
                .run_if(on_timer(Duration::from_secs(1))),
        )
        .add_systems(Update, threat::filter_target_selection)
        // Bridge systems (snapshot + command processing)
        .add_systems(
            Update,
            (
                bridge::update_uptime,
                bridge::update_siege_snapshot,
                bridge::process_construction_commands,
            ),
        )
        .run();

    Ok(())
}

// ============================================================================
// Resources
// ============================================================================

/// Server configuration resolved from the environment at startup.
#[derive(Resource, Debug, Clone, Serialize)]
#[allow(dead_code)]
struct SimConfig {
    tick_rate: u32,
    difficulty: Difficulty,
}
