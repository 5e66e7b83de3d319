//! Remembers which of a faction's units can harvest each resource type.

use std::collections::BTreeMap;

use crate::components::UnitId;
use crate::factions::Faction;
use crate::tech::{ResourceTypeId, TechTree};

/// Resource type to a unit known to harvest it.
///
/// Entries are hints: a cached unit may have died since, so every hit is
/// checked against the faction's live units before it is trusted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestCache {
    entries: BTreeMap<ResourceTypeId, UnitId>,
    scans: u64,
}

impl HarvestCache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached harvester for `resource`.
    #[must_use]
    pub fn get(&self, resource: ResourceTypeId) -> Option<UnitId> {
        self.entries.get(&resource).copied()
    }

    /// Remember `unit` as a harvester of `resource`.
    pub fn remember(&mut self, resource: ResourceTypeId, unit: UnitId) {
        self.entries.insert(resource, unit);
    }

    /// Drop the entry for `resource`.
    pub fn forget(&mut self, resource: ResourceTypeId) {
        self.entries.remove(&resource);
    }

    /// Drop every entry. The scan counter is kept.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries in resource type order.
    pub fn entries(&self) -> impl Iterator<Item = (ResourceTypeId, UnitId)> + '_ {
        self.entries.iter().map(|(r, u)| (*r, *u))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Full unit-list scans performed so far.
    #[must_use]
    pub fn scans(&self) -> u64 {
        self.scans
    }

    /// Whether any unit of `faction` can harvest `resource`.
    ///
    /// A live cached unit answers without scanning. Otherwise the unit list is
    /// scanned once and the first capable unit is cached.
    pub fn can_harvest(
        &mut self,
        faction: &Faction,
        tech: &TechTree,
        resource: ResourceTypeId,
    ) -> bool {
        if let Some(id) = self.get(resource) {
            if faction.find_unit(id).is_some() {
                return true;
            }
        }

        self.scans += 1;
        let harvester = faction.units().iter().find(|unit| {
            tech.unit_type(unit.unit_type)
                .and_then(|ut| ut.first_harvest_command(resource))
                .is_some()
        });
        match harvester {
            Some(unit) => {
                self.remember(resource, unit.id);
                true
            }
            None => {
                self.forget(resource);
                false
            }
        }
    }
}
