//! Authoritative world state and its deterministic update step.
//!
//! The world is shared between the master loop and every AI worker through
//! [`crate::ai::GameContext`]. AI threads only read it during a tick, except
//! for commands applied through [`World::give_unit_command`].
//!
//! # Determinism
//!
//! - Factions are processed in index order, units in creation order
//! - All maps are `BTreeMap`, never `HashMap`
//! - Integer math only

use std::collections::hash_map::DefaultHasher;
use std::fmt::Write as _;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::components::{Command, CommandResult, CommandTarget, Field, Unit, UnitId};
use crate::error::{GameError, Result};
use crate::factions::{ControlType, Faction};
use crate::map::Map;
use crate::math::GridPos;
use crate::tech::{CommandClass, ResourceTypeId, TechTree, UnitTypeId};

/// Amount a harvester gathers per tick.
pub const HARVEST_PER_TICK: i64 = 1;

/// Everything the simulation knows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct World {
    tech: TechTree,
    map: Map,
    factions: Vec<Faction>,
    frame: u64,
    next_unit_id: UnitId,
}

impl World {
    /// Create a world with no factions.
    #[must_use]
    pub fn new(tech: TechTree, map: Map) -> Self {
        Self {
            tech,
            map,
            factions: Vec::new(),
            frame: 0,
            next_unit_id: 1,
        }
    }

    /// Add a faction and return its index.
    pub fn add_faction(
        &mut self,
        team: usize,
        name: impl Into<String>,
        control: ControlType,
        start_location: usize,
    ) -> usize {
        let index = self.factions.len();
        self.factions
            .push(Faction::new(index, team, name, control, start_location));
        index
    }

    /// The tech tree.
    #[must_use]
    pub fn tech(&self) -> &TechTree {
        &self.tech
    }

    /// The map.
    #[must_use]
    pub fn map(&self) -> &Map {
        &self.map
    }

    /// Mutable map, for scenario setup.
    pub fn map_mut(&mut self) -> &mut Map {
        &mut self.map
    }

    /// All factions by index.
    #[must_use]
    pub fn factions(&self) -> &[Faction] {
        &self.factions
    }

    /// Number of factions.
    #[must_use]
    pub fn faction_count(&self) -> usize {
        self.factions.len()
    }

    /// Faction by index.
    #[must_use]
    pub fn faction(&self, index: usize) -> Option<&Faction> {
        self.factions.get(index)
    }

    /// Mutable faction by index.
    pub fn faction_mut(&mut self, index: usize) -> Option<&mut Faction> {
        self.factions.get_mut(index)
    }

    /// Frames simulated so far.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Home cell of a faction.
    #[must_use]
    pub fn home_location(&self, faction: usize) -> Option<GridPos> {
        let faction = self.faction(faction)?;
        self.map.start_location(faction.start_location)
    }

    /// Find a unit in any faction.
    #[must_use]
    pub fn find_unit(&self, id: UnitId) -> Option<&Unit> {
        self.factions.iter().find_map(|f| f.find_unit(id))
    }

    /// Place a new unit on a free cell.
    pub fn spawn_unit(
        &mut self,
        faction: usize,
        unit_type: UnitTypeId,
        pos: GridPos,
        field: Field,
    ) -> Result<UnitId> {
        let ut = self.tech.unit_type(unit_type).ok_or_else(|| {
            GameError::InvalidState(format!("Unknown unit type {unit_type}"))
        })?;
        let (max_hp, sight) = (ut.max_hp, ut.sight);
        if !self.map.is_free_cell(pos, field) {
            return Err(GameError::InvalidState(format!(
                "Cell {pos} is not free for a new unit"
            )));
        }
        let id = self.next_unit_id;
        let f = self
            .factions
            .get_mut(faction)
            .ok_or_else(|| GameError::InvalidState(format!("Unknown faction {faction}")))?;
        f.push_unit(Unit {
            id,
            unit_type,
            faction,
            pos,
            field,
            hp: max_hp.max(1),
            commands: Default::default(),
        });
        let team = f.team;
        self.next_unit_id += 1;
        self.map.set_occupant(pos, field, Some(id));
        self.map.reveal(pos, sight, team);
        Ok(id)
    }

    /// Remove a unit from the world, freeing its cell.
    pub fn remove_unit(&mut self, id: UnitId) -> Option<Unit> {
        for faction in &mut self.factions {
            if let Some(i) = faction.units().iter().position(|u| u.id == id) {
                let unit = faction.units_mut().remove(i);
                self.map.set_occupant(unit.pos, unit.field, None);
                return Some(unit);
            }
        }
        None
    }

    /// Validate a command against the unit's type and queue it.
    ///
    /// This is the single entry point for authoritative state mutation by
    /// commands, whether they arrive directly or through the commander.
    pub fn give_unit_command(
        &mut self,
        faction: usize,
        unit: UnitId,
        mut command: Command,
    ) -> (CommandResult, String) {
        let Some(f) = self.factions.get(faction) else {
            return (CommandResult::FailUndefined, format!("No faction {faction}"));
        };
        let Some(u) = f.find_unit(unit) else {
            return (CommandResult::FailUndefined, format!("No unit {unit}"));
        };
        if !u.is_alive() {
            return (CommandResult::FailUndefined, format!("Unit {unit} is dead"));
        }
        let Some(ut) = self.tech.unit_type(u.unit_type) else {
            return (
                CommandResult::FailUndefined,
                format!("Unit {unit} has unknown type"),
            );
        };
        let Some(ct) = ut.find_command_type(command.command_type) else {
            return (
                CommandResult::FailUndefined,
                format!("Unit {unit} can not execute command {}", command.command_type),
            );
        };

        if !f.reqs_ok(&ct.requirements) {
            return (
                CommandResult::FailRequirements,
                format!("Requirements not met for {}", ct.name),
            );
        }

        let (class, produces, researches) = (ct.class, ct.produces, ct.researches);
        match class {
            CommandClass::Stop => {
                if let Some(u) = self.factions[faction].find_unit_mut(unit) {
                    u.commands.clear();
                }
                return (CommandResult::Success, String::new());
            }
            CommandClass::Produce | CommandClass::Build => {
                let Some(product) = command.unit_type.or(produces) else {
                    return (
                        CommandResult::FailRequirements,
                        "Nothing to produce".to_string(),
                    );
                };
                let Some(pt) = self.tech.unit_type(product) else {
                    return (
                        CommandResult::FailRequirements,
                        format!("Unknown unit type {product}"),
                    );
                };
                if !self.factions[faction].reqs_ok(&pt.requirements) {
                    return (
                        CommandResult::FailRequirements,
                        format!("Requirements not met for {}", pt.name),
                    );
                }
                if !self.factions[faction].check_costs(pt) {
                    return (
                        CommandResult::FailResources,
                        format!("Not enough resources for {}", pt.name),
                    );
                }
                command.unit_type = Some(product);
            }
            CommandClass::Upgrade => {
                let Some(upgrade) = researches else {
                    return (
                        CommandResult::FailRequirements,
                        "Nothing to research".to_string(),
                    );
                };
                if self.factions[faction].has_upgrade(upgrade) {
                    return (
                        CommandResult::FailRequirements,
                        format!("Upgrade {upgrade} already researched"),
                    );
                }
            }
            _ => {}
        }

        if let Some(u) = self.factions[faction].find_unit_mut(unit) {
            u.commands.push_back(command);
        }
        (CommandResult::Success, String::new())
    }

    /// Recompute every team's current sight.
    pub fn refresh_visibility(&mut self) {
        self.map.clear_visibility();
        for faction in &self.factions {
            for unit in faction.units().iter().filter(|u| u.is_alive()) {
                let sight = self.tech.unit_type(unit.unit_type).map_or(0, |ut| ut.sight);
                self.map.reveal(unit.pos, sight, faction.team);
            }
        }
    }

    /// Advance one frame.
    pub fn update(&mut self) {
        self.frame += 1;
        for fi in 0..self.factions.len() {
            let ids: Vec<UnitId> = self.factions[fi].units().iter().map(|u| u.id).collect();
            for id in ids {
                self.step_unit(fi, id);
            }
        }
        self.remove_dead();
        self.refresh_visibility();
    }

    fn step_unit(&mut self, fi: usize, id: UnitId) {
        let Some(unit) = self.factions[fi].find_unit(id) else {
            return;
        };
        if !unit.is_alive() {
            return;
        }
        let Some(cmd) = unit.current_command().cloned() else {
            return;
        };
        let (pos, type_id) = (unit.pos, unit.unit_type);
        let Some(ut) = self.tech.unit_type(type_id) else {
            self.pop_command(fi, id);
            return;
        };
        let attack = ut.attack;
        let Some(ct) = ut.find_command_type(cmd.command_type) else {
            self.pop_command(fi, id);
            return;
        };
        let class = ct.class;
        let researches = ct.researches;
        let harvests = ct.harvests.clone();

        match class {
            CommandClass::Move => match cmd.target_pos() {
                Some(target) if pos != target => {
                    if !self.move_unit(fi, id, target) {
                        self.pop_command(fi, id);
                    }
                }
                _ => self.pop_command(fi, id),
            },
            CommandClass::Attack => self.step_attack(fi, id, pos, attack, cmd.target),
            CommandClass::Harvest => match cmd.target_pos() {
                Some(target) => self.step_harvest(fi, id, pos, target, &harvests),
                None => self.pop_command(fi, id),
            },
            CommandClass::Produce => {
                if let Some(product) = cmd.unit_type {
                    if let Some(spot) = self.free_cell_near(pos, Field::Land) {
                        if self.pay_and_spawn(fi, product, spot) {
                            self.pop_command(fi, id);
                        }
                    }
                } else {
                    self.pop_command(fi, id);
                }
            }
            CommandClass::Build => match (cmd.target_pos(), cmd.unit_type) {
                (Some(site), Some(product)) if pos.chebyshev(site) <= 1 => {
                    if self.map.is_free_cell(site, Field::Land) {
                        self.pay_and_spawn(fi, product, site);
                    }
                    self.pop_command(fi, id);
                }
                (Some(site), Some(_)) => {
                    if !self.move_unit(fi, id, site) {
                        self.pop_command(fi, id);
                    }
                }
                _ => self.pop_command(fi, id),
            },
            CommandClass::Upgrade => {
                if let Some(upgrade) = researches {
                    self.factions[fi].add_upgrade(upgrade);
                }
                self.pop_command(fi, id);
            }
            CommandClass::Stop
            | CommandClass::Repair
            | CommandClass::Morph
            | CommandClass::SwitchTeam => self.pop_command(fi, id),
        }
    }

    fn step_attack(&mut self, fi: usize, id: UnitId, pos: GridPos, attack: u32, target: CommandTarget) {
        match target {
            CommandTarget::Unit(target_id) => {
                let Some(victim) = self.find_unit(target_id) else {
                    self.pop_command(fi, id);
                    return;
                };
                if !victim.is_alive() {
                    self.pop_command(fi, id);
                    return;
                }
                let (victim_pos, victim_faction) = (victim.pos, victim.faction);
                if pos.chebyshev(victim_pos) <= 1 {
                    if let Some(v) = self
                        .factions
                        .get_mut(victim_faction)
                        .and_then(|f| f.find_unit_mut(target_id))
                    {
                        v.hp = v.hp.saturating_sub(attack);
                    }
                } else if !self.move_unit(fi, id, victim_pos) {
                    self.pop_command(fi, id);
                }
            }
            CommandTarget::Position(target) => {
                if pos.chebyshev(target) <= 1 || !self.move_unit(fi, id, target) {
                    self.pop_command(fi, id);
                }
            }
            CommandTarget::None => self.pop_command(fi, id),
        }
    }

    fn step_harvest(
        &mut self,
        fi: usize,
        id: UnitId,
        pos: GridPos,
        target: GridPos,
        harvests: &[ResourceTypeId],
    ) {
        let Some(resource) = self.map.resource_at(target).copied() else {
            // Deposit ran out under us.
            for rt in harvests {
                self.factions[fi].remove_resource_target(*rt, target);
            }
            self.pop_command(fi, id);
            return;
        };
        if !harvests.contains(&resource.resource_type) {
            self.pop_command(fi, id);
            return;
        }
        if pos.chebyshev(target) <= 1 {
            let taken = self.map.take_resource(target, HARVEST_PER_TICK);
            let faction = &mut self.factions[fi];
            faction.add_resource(resource.resource_type, taken);
            if self.map.resource_at(target).is_some() {
                faction.add_resource_target(resource.resource_type, target);
            } else {
                faction.remove_resource_target(resource.resource_type, target);
            }
        } else if !self.move_unit(fi, id, target) {
            self.pop_command(fi, id);
        }
    }

    fn pay_and_spawn(&mut self, fi: usize, product: UnitTypeId, spot: GridPos) -> bool {
        let Some(pt) = self.tech.unit_type(product) else {
            return false;
        };
        if !self.factions[fi].apply_costs(pt) {
            return false;
        }
        match self.spawn_unit(fi, product, spot, Field::Land) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(faction = fi, error = %e, "Spawn failed");
                false
            }
        }
    }

    fn free_cell_near(&self, pos: GridPos, field: Field) -> Option<GridPos> {
        for radius in 1..=2 {
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    let p = pos + GridPos::new(dx, dy);
                    if p.chebyshev(pos) == radius && self.map.is_free_cell(p, field) {
                        return Some(p);
                    }
                }
            }
        }
        None
    }

    /// Step toward `target`; returns false when blocked.
    fn move_unit(&mut self, fi: usize, id: UnitId, target: GridPos) -> bool {
        let Some(unit) = self.factions[fi].find_unit(id) else {
            return false;
        };
        let (from, field) = (unit.pos, unit.field);
        let next = from.step_toward(target);
        if next == from || !self.map.is_free_cell(next, field) {
            return false;
        }
        self.map.set_occupant(from, field, None);
        self.map.set_occupant(next, field, Some(id));
        if let Some(unit) = self.factions[fi].find_unit_mut(id) {
            unit.pos = next;
        }
        true
    }

    fn pop_command(&mut self, fi: usize, id: UnitId) {
        if let Some(unit) = self.factions[fi].find_unit_mut(id) {
            unit.commands.pop_front();
        }
    }

    fn remove_dead(&mut self) {
        for faction in &mut self.factions {
            for unit in faction.units().iter().filter(|u| !u.is_alive()) {
                self.map.set_occupant(unit.pos, unit.field, None);
            }
            faction.units_mut().retain(Unit::is_alive);
        }
    }

    /// Hash of the full world state, for lockstep and determinism checks.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.frame.hash(&mut hasher);
        self.next_unit_id.hash(&mut hasher);
        self.factions.hash(&mut hasher);
        self.map.hash(&mut hasher);
        hasher.finish()
    }

    /// Human-readable snapshot attached to desync errors.
    #[must_use]
    pub fn dump_to_log(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "World frame {} tech [{}] map {}x{} hash {:016x}",
            self.frame,
            self.tech.name,
            self.map.width(),
            self.map.height(),
            self.state_hash()
        );
        for faction in &self.factions {
            let _ = writeln!(
                out,
                "Faction #{} [{}] team {} control {:?} units {}",
                faction.index,
                faction.name,
                faction.team,
                faction.control,
                faction.unit_count()
            );
            for rt in &self.tech.resource_types {
                let _ = writeln!(out, "  resource {} = {}", rt.name, faction.resource(rt.id));
            }
            for unit in faction.units() {
                let type_name = self
                    .tech
                    .unit_type(unit.unit_type)
                    .map_or("?", |ut| ut.name.as_str());
                let _ = writeln!(
                    out,
                    "  unit {} [{}] pos {} hp {} commands {}",
                    unit.id,
                    type_name,
                    unit.pos,
                    unit.hp,
                    unit.commands.len()
                );
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tech::{CommandType, Requirements, ResourceType, UnitType};

    const GOLD: u32 = 0;
    const ARMOR: u32 = 3;

    fn tech() -> TechTree {
        TechTree {
            name: "test".into(),
            resource_types: vec![ResourceType {
                id: GOLD,
                name: "gold".into(),
            }],
            unit_types: vec![UnitType {
                id: 1,
                name: "worker".into(),
                max_hp: 10,
                sight: 3,
                attack: 4,
                cost: vec![(GOLD, 5)],
                command_types: vec![
                    CommandType::new(1, CommandClass::Stop, "stop"),
                    CommandType::new(2, CommandClass::Move, "move"),
                    CommandType::new(3, CommandClass::Attack, "attack"),
                    CommandType::new(4, CommandClass::Harvest, "harvest").harvesting(&[GOLD]),
                    CommandType::new(5, CommandClass::Produce, "produce").producing(1),
                    CommandType::new(6, CommandClass::Upgrade, "drill").researching(ARMOR),
                    CommandType::new(7, CommandClass::Produce, "produce_veteran")
                        .producing(1)
                        .requiring(Requirements {
                            units: Vec::new(),
                            upgrades: vec![ARMOR],
                        }),
                ],
                hidden: false,
                requirements: Requirements::default(),
            }],
        }
    }

    fn world() -> World {
        let mut w = World::new(tech(), Map::new(16, 16));
        w.map_mut().add_start_location(GridPos::new(2, 2));
        w.map_mut().add_start_location(GridPos::new(13, 13));
        w.add_faction(0, "a", ControlType::Cpu, 0);
        w.add_faction(1, "b", ControlType::Cpu, 1);
        w
    }

    #[test]
    fn test_move_reaches_target() {
        let mut w = world();
        let id = w.spawn_unit(0, 1, GridPos::new(0, 0), Field::Land).unwrap();
        let (result, _) = w.give_unit_command(0, id, Command::at(2, GridPos::new(3, 0)));
        assert_eq!(result, CommandResult::Success);
        for _ in 0..5 {
            w.update();
        }
        let unit = w.find_unit(id).unwrap();
        assert_eq!(unit.pos, GridPos::new(3, 0));
        assert!(unit.is_idle());
        assert_eq!(w.map().occupant(GridPos::new(0, 0), Field::Land), None);
    }

    #[test]
    fn test_unknown_command_type_is_rejected() {
        let mut w = world();
        let id = w.spawn_unit(0, 1, GridPos::new(0, 0), Field::Land).unwrap();
        let (result, msg) = w.give_unit_command(0, id, Command::at(99, GridPos::ZERO));
        assert_eq!(result, CommandResult::FailUndefined);
        assert!(msg.contains("99"));
        assert!(w.find_unit(id).unwrap().is_idle());
    }

    #[test]
    fn test_produce_requires_resources() {
        let mut w = world();
        let id = w.spawn_unit(0, 1, GridPos::new(5, 5), Field::Land).unwrap();
        let (result, _) = w.give_unit_command(0, id, Command::untargeted(5));
        assert_eq!(result, CommandResult::FailResources);

        w.faction_mut(0).unwrap().add_resource(GOLD, 5);
        let (result, _) = w.give_unit_command(0, id, Command::untargeted(5));
        assert_eq!(result, CommandResult::Success);
        w.update();
        assert_eq!(w.faction(0).unwrap().unit_count(), 2);
        assert_eq!(w.faction(0).unwrap().resource(GOLD), 0);
    }

    #[test]
    fn test_upgrade_unlocks_commands_once() {
        let mut w = world();
        let id = w.spawn_unit(0, 1, GridPos::new(5, 5), Field::Land).unwrap();
        w.faction_mut(0).unwrap().add_resource(GOLD, 5);
        let (result, msg) = w.give_unit_command(0, id, Command::untargeted(7));
        assert_eq!(result, CommandResult::FailRequirements);
        assert!(msg.contains("produce_veteran"));

        let (result, _) = w.give_unit_command(0, id, Command::untargeted(6));
        assert_eq!(result, CommandResult::Success);
        w.update();
        assert!(w.faction(0).unwrap().has_upgrade(ARMOR));
        assert_eq!(w.faction(0).unwrap().upgrade_count(), 1);
        assert!(w.find_unit(id).unwrap().is_idle());

        let (result, _) = w.give_unit_command(0, id, Command::untargeted(6));
        assert_eq!(result, CommandResult::FailRequirements);
        let (result, _) = w.give_unit_command(0, id, Command::untargeted(7));
        assert_eq!(result, CommandResult::Success);
        // Faction 1 researched nothing.
        assert_eq!(w.faction(1).unwrap().upgrade_count(), 0);
    }

    #[test]
    fn test_harvest_gathers_and_registers_target() {
        let mut w = world();
        let deposit = GridPos::new(4, 0);
        w.map_mut().place_resource(deposit, GOLD, 2);
        let id = w.spawn_unit(0, 1, GridPos::new(0, 0), Field::Land).unwrap();
        w.give_unit_command(0, id, Command::at(4, deposit));
        for _ in 0..10 {
            w.update();
        }
        let faction = w.faction(0).unwrap();
        assert_eq!(faction.resource(GOLD), 2);
        assert!(w.map().resource_at(deposit).is_none());
        assert_eq!(faction.closest_resource_target(GridPos::ZERO, GOLD), None);
        assert!(w.find_unit(id).unwrap().is_idle());
    }

    #[test]
    fn test_attack_kills_and_frees_cell() {
        let mut w = world();
        let attacker = w.spawn_unit(0, 1, GridPos::new(5, 5), Field::Land).unwrap();
        let victim = w.spawn_unit(1, 1, GridPos::new(6, 5), Field::Land).unwrap();
        w.give_unit_command(0, attacker, Command::on_unit(3, victim));
        for _ in 0..3 {
            w.update();
        }
        assert!(w.find_unit(victim).is_none());
        assert_eq!(w.map().occupant(GridPos::new(6, 5), Field::Land), None);
    }

    #[test]
    fn test_state_hash_tracks_changes() {
        let mut a = world();
        let b = world();
        assert_eq!(a.state_hash(), b.state_hash());
        a.spawn_unit(0, 1, GridPos::new(1, 1), Field::Land).unwrap();
        assert_ne!(a.state_hash(), b.state_hash());
        assert!(a.dump_to_log().contains("unit 1 [worker]"));
    }
}
