//! Construction Bridge — connects the construction service to the live
//! Bevy ECS world
//!
//! The construction service runs on its own tokio runtime while Bevy runs
//! the game loop. This module provides two-way communication:
//!
//! ```text
//! Construction Handler (tokio async)
//!       │
//!       ▼
//! ConstructionCommand → mpsc channel → Bevy System (process_construction_commands)
//!       │                                   │
//!       │                                   ▼
//!       │                      Mutate registry / ECS World
//!       │                                   │
//!       ▼                                   ▼
//! oneshot::Receiver ◄──────── oneshot::Sender (response)
//! ```
//!
//! For read-only queries, handlers read from a shared `SiegeWorldSnapshot`
//! that a Bevy system refreshes every tick.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, oneshot};

use crate::blocks::WorldBlocks;
use crate::building::{BuildingRegistry, BuildingSpec, ProxyIndex, PurgeBuilding};
use crate::collapse::ActiveCollapses;
use crate::components::{BuildingProxy, Creature, Player};

// ============================================================================
// Siege World Snapshot (read-only, updated every tick)
// ============================================================================

/// Snapshot of live siege state, readable by service handlers without
/// blocking the ECS.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiegeWorldSnapshot {
    /// Current server tick number
    pub tick: u64,
    /// Server uptime in seconds
    pub uptime_secs: f64,
    /// All registered structures
    pub buildings: HashMap<u64, BuildingSnapshot>,
    /// All live creatures
    pub creatures: Vec<CreatureSnapshot>,
    /// All connected players
    pub players: HashMap<u64, PlayerSnapshot>,
    /// Teardown jobs currently running
    pub active_collapses: usize,
    /// Solid blocks in the sparse world store
    pub solid_blocks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingSnapshot {
    pub id: u64,
    pub owner_id: u64,
    pub anchor: [f32; 3],
    pub health: f32,
    pub max_health: f32,
    pub armor: f32,
    pub generating: bool,
    pub collapsing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatureSnapshot {
    pub species: String,
    pub position: [f32; 3],
    pub health: f32,
    pub max_health: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: u64,
    pub position: [f32; 3],
    pub health: f32,
}

/// Shared handle to the siege snapshot (Arc<RwLock<>> for handler access)
pub type SharedSiegeSnapshot = Arc<RwLock<SiegeWorldSnapshot>>;

// ============================================================================
// Construction Commands (service → Bevy ECS)
// ============================================================================

/// Commands sent from construction handlers to the Bevy ECS world
#[derive(Debug)]
pub enum ConstructionCommand {
    /// Register a newly placed structure (enters the generating state)
    Register {
        spec: BuildingSpec,
        reply: oneshot::Sender<RegisterResult>,
    },
    /// Generation finished; the structure becomes damageable
    Completed {
        building_id: u64,
        reply: oneshot::Sender<CommandResult>,
    },
    /// Restore health (no-op while collapsing)
    Repair {
        building_id: u64,
        amount: f32,
        reply: oneshot::Sender<CommandResult>,
    },
    /// Forced removal, bypassing the collapse sequence
    Remove {
        building_id: u64,
        reply: oneshot::Sender<CommandResult>,
    },
    /// Live structure state
    GetBuilding {
        building_id: u64,
        reply: oneshot::Sender<Option<BuildingSnapshot>>,
    },
    /// Whether a world position lies inside a protected footprint
    IsProtected {
        position: [f32; 3],
        reply: oneshot::Sender<bool>,
    },
    /// Live structure count
    GetBuildingCount { reply: oneshot::Sender<usize> },
}

#[derive(Debug, Serialize)]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResult {
    pub success: bool,
    pub building_id: Option<u64>,
}

/// Channel sender type for construction handlers to send commands
pub type CommandSender = mpsc::UnboundedSender<ConstructionCommand>;
/// Channel receiver type for the Bevy system to receive commands
pub type CommandReceiver = mpsc::UnboundedReceiver<ConstructionCommand>;

// ============================================================================
// Bevy Resources
// ============================================================================

/// Resource holding the command receiver (consumed by the Bevy system)
#[derive(Resource)]
pub struct ConstructionCommandReceiver {
    pub receiver: CommandReceiver,
}

/// Resource exposing the command sender so colocated plugins can issue
/// construction commands from their own async tasks
#[derive(Resource, Clone)]
pub struct ConstructionCommandSender(pub CommandSender);

/// Resource holding the shared siege snapshot
#[derive(Resource)]
pub struct SiegeSnapshotResource {
    pub snapshot: SharedSiegeSnapshot,
}

/// Resource tracking server uptime
#[derive(Resource, Default)]
pub struct ServerUptime {
    pub ticks: u64,
    pub total_time: f64,
}

// ============================================================================
// Bevy Systems
// ============================================================================

/// System: process incoming construction commands from service handlers
pub fn process_construction_commands(
    mut cmd_res: ResMut<ConstructionCommandReceiver>,
    mut commands: Commands,
    mut registry: ResMut<BuildingRegistry>,
    mut proxies: ResMut<ProxyIndex>,
    mut purges: EventWriter<PurgeBuilding>,
) {
    // Process up to 64 commands per tick to avoid stalling the game loop
    let mut processed = 0;
    while let Ok(cmd) = cmd_res.receiver.try_recv() {
        if processed >= 64 {
            break;
        }
        processed += 1;

        match cmd {
            ConstructionCommand::Register { spec, reply } => {
                let center =
                    spec.anchor + Vec3::new(0.0, spec.height as f32 / 2.0, 0.0);
                let proxy = commands
                    .spawn((BuildingProxy, Transform::from_translation(center)))
                    .id();
                let building_id = registry.register(&spec, proxy);
                proxies.insert(proxy, building_id);
                let _ = reply.send(RegisterResult {
                    success: true,
                    building_id: Some(building_id),
                });
            }

            ConstructionCommand::Completed { building_id, reply } => {
                let result = if registry.building_completed(building_id) {
                    CommandResult {
                        success: true,
                        message: "Completed".into(),
                    }
                } else {
                    CommandResult {
                        success: false,
                        message: "Structure not found or already completed".into(),
                    }
                };
                let _ = reply.send(result);
            }

            ConstructionCommand::Repair {
                building_id,
                amount,
                reply,
            } => {
                let result = if registry.repair(building_id, amount) {
                    CommandResult {
                        success: true,
                        message: "Repaired".into(),
                    }
                } else {
                    CommandResult {
                        success: false,
                        message: "Structure not found or collapsing".into(),
                    }
                };
                let _ = reply.send(result);
            }

            ConstructionCommand::Remove { building_id, reply } => {
                let result = if registry.get(building_id).is_some() {
                    purges.send(PurgeBuilding { building_id });
                    CommandResult {
                        success: true,
                        message: "Removal queued".into(),
                    }
                } else {
                    CommandResult {
                        success: false,
                        message: "Structure not found".into(),
                    }
                };
                let _ = reply.send(result);
            }

            ConstructionCommand::GetBuilding { building_id, reply } => {
                let snap = registry.get(building_id).map(snapshot_building);
                let _ = reply.send(snap);
            }

            ConstructionCommand::IsProtected { position, reply } => {
                let point = Vec3::from_array(position);
                let _ = reply.send(registry.is_protected(point));
            }

            ConstructionCommand::GetBuildingCount { reply } => {
                let _ = reply.send(registry.len());
            }
        }
    }
}

fn snapshot_building(building: &crate::building::Building) -> BuildingSnapshot {
    BuildingSnapshot {
        id: building.id,
        owner_id: building.owner_id,
        anchor: building.anchor.to_array(),
        health: building.health,
        max_health: building.max_health,
        armor: building.armor,
        generating: building.generating,
        collapsing: building.collapsing,
    }
}

/// System: refresh the siege snapshot every tick (runs at 20 Hz)
pub fn update_siege_snapshot(
    snapshot_res: Res<SiegeSnapshotResource>,
    registry: Res<BuildingRegistry>,
    blocks: Res<WorldBlocks>,
    collapses: Res<ActiveCollapses>,
    creatures: Query<&Creature>,
    players: Query<&Player>,
    uptime: Res<ServerUptime>,
) {
    let mut snap = SiegeWorldSnapshot {
        tick: uptime.ticks,
        uptime_secs: uptime.total_time,
        active_collapses: collapses.jobs.len(),
        solid_blocks: blocks.solid_count(),
        ..Default::default()
    };

    for building in registry.iter() {
        snap.buildings.insert(building.id, snapshot_building(building));
    }

    for creature in &creatures {
        snap.creatures.push(CreatureSnapshot {
            species: format!("{:?}", creature.species),
            position: creature.position.to_array(),
            health: creature.health,
            max_health: creature.max_health,
        });
    }

    for player in &players {
        snap.players.insert(
            player.id,
            PlayerSnapshot {
                id: player.id,
                position: player.position.to_array(),
                health: player.health,
            },
        );
    }

    // Write snapshot (blocks readers briefly)
    if let Ok(mut lock) = snapshot_res.snapshot.write() {
        *lock = snap;
    }
}

/// System: track server uptime
pub fn update_uptime(time: Res<Time>, mut uptime: ResMut<ServerUptime>) {
    uptime.ticks += 1;
    uptime.total_time += time.delta_secs() as f64;
}

// ============================================================================
// Channel Factory
// ============================================================================

/// Create the bridge channels and shared resources.
/// Returns (CommandSender for the service, receiver resource for Bevy,
/// SharedSiegeSnapshot)
pub fn create_bridge() -> (CommandSender, ConstructionCommandReceiver, SharedSiegeSnapshot) {
    let (tx, rx) = mpsc::unbounded_channel();
    let snapshot = Arc::new(RwLock::new(SiegeWorldSnapshot::default()));

    (tx, ConstructionCommandReceiver { receiver: rx }, snapshot)
}

// ============================================================================
// Tests
// ============================================================================
