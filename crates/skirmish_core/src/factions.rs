//! Faction state: control, units, stockpile, upgrades and harvest targets.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::components::{Unit, UnitId};
use crate::config::NetworkRole;
use crate::math::GridPos;
use crate::tech::{Requirements, ResourceTypeId, UnitType, UpgradeTypeId};

/// Who drives a faction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlType {
    /// Empty slot.
    Closed,
    /// Local human player.
    Human,
    /// Local easy AI.
    CpuEasy,
    /// Local AI.
    Cpu,
    /// Local hard AI.
    CpuUltra,
    /// Easy AI hosted by a remote peer.
    NetworkCpuEasy,
    /// AI hosted by a remote peer.
    NetworkCpu,
    /// Hard AI hosted by a remote peer.
    NetworkCpuUltra,
    /// Remote human player.
    Network,
}

impl ControlType {
    /// Local AI control types.
    #[must_use]
    pub const fn is_local_cpu(self) -> bool {
        matches!(self, Self::CpuEasy | Self::Cpu | Self::CpuUltra)
    }

    /// AI control types hosted on another peer.
    #[must_use]
    pub const fn is_network_cpu(self) -> bool {
        matches!(
            self,
            Self::NetworkCpuEasy | Self::NetworkCpu | Self::NetworkCpuUltra
        )
    }

    /// Any AI control type.
    #[must_use]
    pub const fn is_cpu(self) -> bool {
        self.is_local_cpu() || self.is_network_cpu()
    }
}

/// One side in the game.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Faction {
    /// Faction index, also its slot in the world.
    pub index: usize,
    /// Team; factions on the same team are allies.
    pub team: usize,
    /// Faction type name.
    pub name: String,
    /// Who controls the faction.
    pub control: ControlType,
    /// Index into the map's start locations.
    pub start_location: usize,
    units: Vec<Unit>,
    resources: BTreeMap<ResourceTypeId, i64>,
    resource_targets: BTreeMap<ResourceTypeId, Vec<GridPos>>,
    #[serde(default)]
    upgrades: BTreeSet<UpgradeTypeId>,
}

impl Faction {
    /// Create a faction with no units and an empty stockpile.
    #[must_use]
    pub fn new(
        index: usize,
        team: usize,
        name: impl Into<String>,
        control: ControlType,
        start_location: usize,
    ) -> Self {
        Self {
            index,
            team,
            name: name.into(),
            control,
            start_location,
            units: Vec::new(),
            resources: BTreeMap::new(),
            resource_targets: BTreeMap::new(),
            upgrades: BTreeSet::new(),
        }
    }

    /// Whether the local peer runs this faction's AI.
    ///
    /// Without server-controlled AI (or outside a network game) every peer
    /// runs its own local CPU factions. With server-controlled AI the server
    /// runs the local CPU slots and clients run the network CPU slots.
    #[must_use]
    pub fn cpu_control(
        &self,
        server_controlled_ai: bool,
        network_game: bool,
        role: NetworkRole,
    ) -> bool {
        if !server_controlled_ai || !network_game {
            self.control.is_local_cpu()
        } else if role == NetworkRole::Server {
            self.control.is_local_cpu()
        } else {
            self.control.is_network_cpu()
        }
    }

    /// Units in creation order.
    #[must_use]
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Number of units.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Unit by position in the unit list.
    #[must_use]
    pub fn unit(&self, index: usize) -> Option<&Unit> {
        self.units.get(index)
    }

    /// Unit by id.
    #[must_use]
    pub fn find_unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.iter().find(|u| u.id == id)
    }

    /// Mutable unit by id.
    pub fn find_unit_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.units.iter_mut().find(|u| u.id == id)
    }

    pub(crate) fn units_mut(&mut self) -> &mut Vec<Unit> {
        &mut self.units
    }

    pub(crate) fn push_unit(&mut self, unit: Unit) {
        self.units.push(unit);
    }

    /// Whether `team` is on our side.
    #[must_use]
    pub fn is_ally(&self, team: usize) -> bool {
        self.team == team
    }

    /// Stockpiled amount of a resource.
    #[must_use]
    pub fn resource(&self, resource: ResourceTypeId) -> i64 {
        self.resources.get(&resource).copied().unwrap_or(0)
    }

    /// Add (or with a negative amount, remove) stockpiled resources.
    pub fn add_resource(&mut self, resource: ResourceTypeId, amount: i64) {
        *self.resources.entry(resource).or_insert(0) += amount;
    }

    /// Whether the stockpile covers the unit type's cost.
    #[must_use]
    pub fn check_costs(&self, unit_type: &UnitType) -> bool {
        unit_type
            .cost
            .iter()
            .all(|(rt, amount)| self.resource(*rt) >= *amount)
    }

    /// Pay the unit type's cost. Returns false, paying nothing, if short.
    pub fn apply_costs(&mut self, unit_type: &UnitType) -> bool {
        if !self.check_costs(unit_type) {
            return false;
        }
        for (rt, amount) in &unit_type.cost {
            self.add_resource(*rt, -amount);
        }
        true
    }

    /// Number of researched upgrades.
    #[must_use]
    pub fn upgrade_count(&self) -> usize {
        self.upgrades.len()
    }

    /// Whether `upgrade` has been researched.
    #[must_use]
    pub fn has_upgrade(&self, upgrade: UpgradeTypeId) -> bool {
        self.upgrades.contains(&upgrade)
    }

    /// Record a finished upgrade. Returns false if it was already known.
    pub fn add_upgrade(&mut self, upgrade: UpgradeTypeId) -> bool {
        self.upgrades.insert(upgrade)
    }

    /// Whether the faction owns a living unit of every required type and has
    /// every required upgrade.
    #[must_use]
    pub fn reqs_ok(&self, requirements: &Requirements) -> bool {
        requirements.units.iter().all(|ut| {
            self.units
                .iter()
                .any(|u| u.unit_type == *ut && u.is_alive())
        }) && requirements.upgrades.iter().all(|up| self.has_upgrade(*up))
    }

    /// Remember a cell a harvester of this faction is working.
    pub fn add_resource_target(&mut self, resource: ResourceTypeId, pos: GridPos) {
        let targets = self.resource_targets.entry(resource).or_default();
        if !targets.contains(&pos) {
            targets.push(pos);
        }
    }

    /// Forget a harvest target, e.g. when the deposit ran out.
    pub fn remove_resource_target(&mut self, resource: ResourceTypeId, pos: GridPos) {
        if let Some(targets) = self.resource_targets.get_mut(&resource) {
            targets.retain(|p| *p != pos);
        }
    }

    /// Closest known harvest target for `resource`; first registered wins ties.
    #[must_use]
    pub fn closest_resource_target(
        &self,
        pos: GridPos,
        resource: ResourceTypeId,
    ) -> Option<GridPos> {
        let targets = self.resource_targets.get(&resource)?;
        let mut best: Option<(i64, GridPos)> = None;
        for target in targets {
            let dist = pos.distance_squared(*target);
            if best.map_or(true, |(d, _)| dist < d) {
                best = Some((dist, *target));
            }
        }
        best.map(|(_, p)| p)
    }
}
