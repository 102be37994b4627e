//! Threat Ledger — per-structure aggro bookkeeping and periodic retargeting
//!
//! Hostile creatures that hit a structure (or wander into an attraction
//! ring) are recorded here with a priority. A 1 Hz pass re-applies
//! targeting from the recorded priorities and prunes entries whose creature
//! died, despawned, or wandered out of range.
//!
//! The ledger never mutates structure health; it only sets creature target
//! references, which are world state.

use bevy::prelude::*;
use std::collections::HashMap;
use tracing::debug;

use crate::behavior::RANGED_AGGRO_RANGE;
use crate::building::{BuildingRegistry, ProxyIndex};
use crate::components::{Creature, CreatureTarget};
use crate::species::Species;

/// Creatures farther than this from the structure's center are dropped
/// from its threat set.
pub const THREAT_RANGE: f32 = 50.0;

// ============================================================================
// Ledger
// ============================================================================

#[derive(Resource, Default)]
pub struct ThreatLedger {
    entries: HashMap<u64, HashMap<Entity, u32>>,
}

impl ThreatLedger {
    /// Record (or raise) a creature's threat against a structure. Rejected
    /// silently for species outside the hostile capability set.
    pub fn add_threat(
        &mut self,
        building_id: u64,
        creature: Entity,
        species: Species,
        priority: u32,
    ) -> bool {
        if !species.is_hostile() {
            return false;
        }
        self.entries
            .entry(building_id)
            .or_default()
            .insert(creature, priority);
        true
    }

    /// Threat entries for one structure, priority descending. Ties break on
    /// ascending entity id so reassignment order is deterministic.
    pub fn sorted_threats(&self, building_id: u64) -> Vec<(Entity, u32)> {
        let Some(set) = self.entries.get(&building_id) else {
            return Vec::new();
        };
        let mut ordered: Vec<(Entity, u32)> = set.iter().map(|(e, p)| (*e, *p)).collect();
        ordered.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ordered
    }

    pub fn building_ids(&self) -> Vec<u64> {
        self.entries.keys().copied().collect()
    }

    pub fn threat_count(&self, building_id: u64) -> usize {
        self.entries.get(&building_id).map_or(0, |s| s.len())
    }

    pub fn has_threat(&self, building_id: u64, creature: Entity) -> bool {
        self.entries
            .get(&building_id)
            .is_some_and(|s| s.contains_key(&creature))
    }

    pub fn remove_creature(&mut self, building_id: u64, creature: Entity) {
        if let Some(set) = self.entries.get_mut(&building_id) {
            set.remove(&creature);
            if set.is_empty() {
                self.entries.remove(&building_id);
            }
        }
    }

    /// Clear an entire structure entry, returning the creatures that held
    /// threat so the caller can clear their targets.
    pub fn remove_building(&mut self, building_id: u64) -> Vec<Entity> {
        self.entries
            .remove(&building_id)
            .map(|set| set.into_keys().collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Periodic Retargeting (1 Hz)
// ============================================================================

/// System: re-apply targeting from recorded threat, highest priority first,
/// and prune dead/missing/out-of-range creatures. Empty entries are dropped
/// after the pass.
pub fn update_threat_targets(
    registry: Res<BuildingRegistry>,
    mut ledger: ResMut<ThreatLedger>,
    mut creatures: Query<(&Creature, &mut CreatureTarget)>,
) {
    for building_id in ledger.building_ids() {
        let Some(building) = registry.get(building_id) else {
            ledger.remove_building(building_id);
            continue;
        };
        if !building.is_active() {
            continue;
        }

        let center = building.center();
        for (creature_entity, _priority) in ledger.sorted_threats(building_id) {
            match creatures.get_mut(creature_entity) {
                Ok((creature, mut target))
                    if creature.is_alive() && creature.position.distance(center) <= THREAT_RANGE =>
                {
                    target.0 = Some(building.proxy);
                }
                _ => {
                    // dead, despawned, or wandered off
                    ledger.remove_creature(building_id, creature_entity);
                }
            }
        }
    }
}

// ============================================================================
// Attraction Broadcast (1 Hz)
// ============================================================================

/// System: structures flagged `attracts_monsters` seed baseline threat for
/// every siege-capable creature inside the ranged scan radius. The visual
/// ring itself is a client concern; the server only broadcasts the pull.
pub fn broadcast_attraction(
    registry: Res<BuildingRegistry>,
    mut ledger: ResMut<ThreatLedger>,
    creatures: Query<(Entity, &Creature)>,
) {
    for building in registry.iter() {
        if !building.attracts_monsters || !building.is_active() {
            continue;
        }
        let center = building.center();
        let mut pulled = 0;
        for (entity, creature) in &creatures {
            if !creature.species.can_siege() || !creature.is_alive() {
                continue;
            }
            if creature.position.distance(center) <= RANGED_AGGRO_RANGE
                && !ledger.has_threat(building.id, entity)
            {
                ledger.add_threat(building.id, entity, creature.species, 1);
                pulled += 1;
            }
        }
        if pulled > 0 {
            debug!("Structure {} attraction ring pulled {} creatures", building.id, pulled);
        }
    }
}

// ============================================================================
// Target-Selection Veto
// ============================================================================

/// External target-selection request for a creature. The siege engine may
/// veto selections that point at proxies of generating or collapsing
/// structures.
#[derive(Event, Debug, Clone, Copy)]
pub struct TargetSelectionEvent {
    pub creature: Entity,
    pub target: Entity,
}

/// System: apply target selections, vetoing those aimed at proxies of
/// structures that are not currently targetable.
pub fn filter_target_selection(
    mut events: EventReader<TargetSelectionEvent>,
    registry: Res<BuildingRegistry>,
    proxies: Res<ProxyIndex>,
    mut targets: Query<&mut CreatureTarget>,
) {
    for event in events.read() {
        if let Some(building_id) = proxies.building_of(event.target) {
            let targetable = registry
                .get(building_id)
                .map(|b| b.is_active())
                .unwrap_or(false);
            if !targetable {
                debug!(
                    "Vetoed target selection on structure {} (not targetable)",
                    building_id
                );
                continue;
            }
        }
        if let Ok(mut target) = targets.get_mut(event.creature) {
            target.0 = Some(event.target);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_threat_rejects_non_hostile() {
        let mut ledger = ThreatLedger::default();
        assert!(!ledger.add_threat(1, Entity::from_raw(1), Species::Villager, 5));
        assert!(ledger.is_empty());

        assert!(ledger.add_threat(1, Entity::from_raw(1), Species::Zombie, 5));
        assert_eq!(ledger.threat_count(1), 1);
    }

    #[test]
    fn test_add_threat_upserts_priority() {
        let mut ledger = ThreatLedger::default();
        let creature = Entity::from_raw(1);
        ledger.add_threat(1, creature, Species::Zombie, 1);
        ledger.add_threat(1, creature, Species::Zombie, 9);
        assert_eq!(ledger.sorted_threats(1), vec![(creature, 9)]);
    }

    #[test]
    fn test_sorted_threats_priority_descending() {
        let mut ledger = ThreatLedger::default();
        let low = Entity::from_raw(1);
        let high = Entity::from_raw(2);
        ledger.add_threat(1, low, Species::Zombie, 1);
        ledger.add_threat(1, high, Species::Skeleton, 10);
        assert_eq!(ledger.sorted_threats(1), vec![(high, 10), (low, 1)]);
    }

    #[test]
    fn test_sorted_threats_tie_breaks_on_entity() {
        let mut ledger = ThreatLedger::default();
        let a = Entity::from_raw(3);
        let b = Entity::from_raw(8);
        ledger.add_threat(1, b, Species::Zombie, 4);
        ledger.add_threat(1, a, Species::Zombie, 4);
        // equal priority: lower entity id first, every run
        assert_eq!(ledger.sorted_threats(1), vec![(a, 4), (b, 4)]);
    }

    #[test]
    fn test_remove_creature_drops_empty_entry() {
        let mut ledger = ThreatLedger::default();
        let creature = Entity::from_raw(1);
        ledger.add_threat(1, creature, Species::Zombie, 1);
        ledger.remove_creature(1, creature);
        assert!(ledger.is_empty());
        assert_eq!(ledger.threat_count(1), 0);
    }

    #[test]
    fn test_remove_building_returns_holders() {
        let mut ledger = ThreatLedger::default();
        ledger.add_threat(1, Entity::from_raw(1), Species::Zombie, 1);
        ledger.add_threat(1, Entity::from_raw(2), Species::Ghast, 2);
        let holders = ledger.remove_building(1);
        assert_eq!(holders.len(), 2);
        assert!(ledger.is_empty());
        assert!(ledger.remove_building(1).is_empty());
    }
}
