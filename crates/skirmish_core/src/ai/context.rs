//! Queries and commands available to an AI brain during a tick.
//!
//! An [`AiContext`] only exists while the facade lock is held. Each query
//! takes the world read lock once, answers from that snapshot and releases
//! it before returning; commands take the world write lock or go through the
//! commander.

use std::collections::BTreeSet;
use std::io::Write as _;

use parking_lot::RwLockReadGuard;
use tracing::{trace, warn};

use super::interface::{AiShared, AiState};
use crate::commander::SwitchTeamVote;
use crate::components::{Command, CommandResult, CommandTarget, Field, Unit, UnitId};
use crate::config::AiConfig;
use crate::error::{GameError, Result};
use crate::factions::ControlType;
use crate::math::{CardinalDir, GridPos};
use crate::tech::{CommandClass, CommandTypeId, ResourceType, ResourceTypeId, UnitType, UnitTypeId};
use crate::world::World;

/// Which of the faction's units a command is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitRef {
    /// Position in the faction's unit list.
    Index(usize),
    /// Unit id.
    Id(UnitId),
}

/// How the command type is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandSpec {
    /// First command of the class the unit's type offers.
    Class(CommandClass),
    /// An exact command type, which the unit's type must own.
    Type(CommandTypeId),
}

/// What a command is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderTarget {
    /// Nothing (stop, produce).
    None,
    /// A cell.
    Position(GridPos),
    /// A cell where `unit_type` is to be built.
    Build {
        /// Build site.
        pos: GridPos,
        /// Unit type to build.
        unit_type: UnitTypeId,
    },
    /// Another unit.
    Unit(UnitId),
}

/// A command as an AI brain phrases it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AiOrder {
    /// Commanded unit.
    pub unit: UnitRef,
    /// Command type selection.
    pub command: CommandSpec,
    /// Target.
    pub target: OrderTarget,
    /// Group id shared by orders issued together.
    pub group_id: Option<i32>,
}

impl AiOrder {
    /// Order with no group.
    #[must_use]
    pub fn new(unit: UnitRef, command: CommandSpec, target: OrderTarget) -> Self {
        Self {
            unit,
            command,
            target,
            group_id: None,
        }
    }

    /// Same order in group `group_id`.
    #[must_use]
    pub fn in_group(mut self, group_id: i32) -> Self {
        self.group_id = Some(group_id);
        self
    }

    fn into_command(self, command_type: CommandTypeId) -> Command {
        let mut command = match self.target {
            OrderTarget::None => Command::untargeted(command_type),
            OrderTarget::Position(pos) => Command::at(command_type, pos),
            OrderTarget::Build { pos, unit_type } => Command {
                command_type,
                target: CommandTarget::Position(pos),
                unit_type: Some(unit_type),
                facing: CardinalDir::North,
                group_id: None,
            },
            OrderTarget::Unit(id) => Command::on_unit(command_type, id),
        };
        command.group_id = self.group_id;
        command
    }
}

/// An enemy unit spotted near home.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SightedEnemy {
    /// Unit id.
    pub id: UnitId,
    /// Owning faction.
    pub faction: usize,
    /// Cell it stands on.
    pub pos: GridPos,
    /// Layer it occupies.
    pub field: Field,
}

/// Lock-held view of the game for one faction's AI.
pub struct AiContext<'a> {
    shared: &'a AiShared,
    state: &'a mut AiState,
}

impl<'a> AiContext<'a> {
    pub(crate) fn new(shared: &'a AiShared, state: &'a mut AiState) -> Self {
        Self { shared, state }
    }

    fn world(&self) -> RwLockReadGuard<'a, World> {
        let shared: &'a AiShared = self.shared;
        shared.context.world.read()
    }

    // ----- identity and logging -----

    /// Faction this AI drives.
    #[must_use]
    pub fn faction_index(&self) -> usize {
        self.state.faction_index
    }

    /// The faction's team.
    #[must_use]
    pub fn team_index(&self) -> usize {
        self.state.team_index
    }

    /// Ticks run so far, including the current one.
    #[must_use]
    pub fn tick_counter(&self) -> u64 {
        self.state.tick_counter
    }

    /// Interface configuration.
    #[must_use]
    pub fn config(&self) -> &AiConfig {
        &self.shared.config
    }

    /// Whether messages at `level` are logged.
    #[must_use]
    pub fn is_log_level_enabled(&self, level: u8) -> bool {
        level <= self.state.log_level
    }

    /// Log `message` at `level` to the faction log, and to the console when
    /// redirection is on.
    pub fn print_log(&mut self, level: u8, message: &str) {
        if !self.is_log_level_enabled(level) {
            return;
        }
        let faction = self.state.faction_index;
        let line = format!("({faction}) {message}");
        trace!(faction, level, "{message}");
        if let Some(log) = self.state.log_file.as_mut() {
            if let Err(e) = writeln!(log, "{line}") {
                warn!(faction, error = %e, "Failed to write AI log line");
            }
        }
        if self.state.log_redirect {
            self.shared.context.console.add_line(&line);
        }
    }

    // ----- faction and map queries -----

    /// Number of units the faction owns.
    #[must_use]
    pub fn my_unit_count(&self) -> usize {
        self.world()
            .faction(self.state.faction_index)
            .map_or(0, |f| f.unit_count())
    }

    /// Copy of the unit at `index` in the faction's unit list.
    ///
    /// # Errors
    /// `UnitNotFound` when the index is out of range.
    pub fn my_unit(&self, index: usize) -> Result<Unit> {
        let world = self.world();
        self.resolve_unit(&world, UnitRef::Index(index)).cloned()
    }

    /// Copies of all the faction's units, in list order.
    #[must_use]
    pub fn my_units(&self) -> Vec<Unit> {
        self.world()
            .faction(self.state.faction_index)
            .map(|f| f.units().to_vec())
            .unwrap_or_default()
    }

    /// The faction's home cell.
    #[must_use]
    pub fn home_location(&self) -> Option<GridPos> {
        self.world().home_location(self.state.faction_index)
    }

    /// Start location `index` of the map.
    #[must_use]
    pub fn start_location(&self, index: usize) -> Option<GridPos> {
        self.world().map().start_location(index)
    }

    /// Number of factions in the game.
    #[must_use]
    pub fn faction_count(&self) -> usize {
        self.world().faction_count()
    }

    /// Players the map supports.
    #[must_use]
    pub fn map_max_players(&self) -> usize {
        self.world().map().max_players()
    }

    /// Map width and height.
    #[must_use]
    pub fn map_size(&self) -> (i32, i32) {
        let world = self.world();
        (world.map().width(), world.map().height())
    }

    /// Stockpile of `resource`.
    #[must_use]
    pub fn resource_amount(&self, resource: ResourceTypeId) -> i64 {
        self.world()
            .faction(self.state.faction_index)
            .map_or(0, |f| f.resource(resource))
    }

    /// Who controls the faction.
    #[must_use]
    pub fn control_type(&self) -> Option<ControlType> {
        self.world()
            .faction(self.state.faction_index)
            .map(|f| f.control)
    }

    /// Whether `unit` belongs to a faction on this AI's team.
    #[must_use]
    pub fn is_ally(&self, unit: &Unit) -> bool {
        let world = self.world();
        Self::is_ally_in(&world, self.state.team_index, unit)
    }

    /// Whether the faction can afford `unit_type`.
    #[must_use]
    pub fn check_costs(&self, unit_type: UnitTypeId) -> bool {
        let world = self.world();
        match (
            world.faction(self.state.faction_index),
            world.tech().unit_type(unit_type),
        ) {
            (Some(f), Some(ut)) => f.check_costs(ut),
            _ => false,
        }
    }

    /// Number of upgrades the faction has researched.
    #[must_use]
    pub fn my_upgrade_count(&self) -> usize {
        self.world()
            .faction(self.state.faction_index)
            .map_or(0, |f| f.upgrade_count())
    }

    /// Whether the faction meets a command type's requirements. Unknown
    /// command types never do.
    #[must_use]
    pub fn reqs_ok(&self, command_type: CommandTypeId) -> bool {
        let world = self.world();
        match (
            world.faction(self.state.faction_index),
            world.tech().command_type(command_type),
        ) {
            (Some(f), Some(ct)) => f.reqs_ok(&ct.requirements),
            _ => false,
        }
    }

    /// Whether the faction meets the requirements to produce `unit_type`.
    #[must_use]
    pub fn unit_type_reqs_ok(&self, unit_type: UnitTypeId) -> bool {
        let world = self.world();
        match (
            world.faction(self.state.faction_index),
            world.tech().unit_type(unit_type),
        ) {
            (Some(f), Some(ut)) => f.reqs_ok(&ut.requirements),
            _ => false,
        }
    }

    /// Whether a `size` x `size` square at `pos` is free in `field`.
    #[must_use]
    pub fn is_free_cells(&self, pos: GridPos, size: i32, field: Field) -> bool {
        self.world().map().is_free_cells(pos, size, field)
    }

    /// Whether any unit type of the tech tree consumes or harvests `resource`.
    #[must_use]
    pub fn faction_uses_resource_type(&self, resource: ResourceTypeId) -> bool {
        self.world().tech().uses_resource_type(resource)
    }

    /// Copy of a unit type.
    #[must_use]
    pub fn unit_type(&self, id: UnitTypeId) -> Option<UnitType> {
        self.world().tech().unit_type(id).cloned()
    }

    /// Copies of the tech tree's resource types.
    #[must_use]
    pub fn resource_types(&self) -> Vec<ResourceType> {
        self.world().tech().resource_types.clone()
    }

    // ----- resource queries -----

    /// First cell holding `resource` in the square of half-width `range`
    /// around `pos`, scanned column by column.
    #[must_use]
    pub fn is_resource_in_region(
        &self,
        pos: GridPos,
        resource: ResourceTypeId,
        range: i32,
    ) -> Option<GridPos> {
        let world = self.world();
        let map = world.map();
        for dx in -range..=range {
            for dy in -range..=range {
                let cell = pos + GridPos::new(dx, dy);
                if map
                    .resource_at(cell)
                    .is_some_and(|r| r.resource_type == resource)
                {
                    return Some(cell);
                }
            }
        }
        None
    }

    /// A cell holding `resource` next to `pos`.
    ///
    /// With `use_peer_targets`, a harvest target already known to the faction
    /// counts when it lies within one cell of `pos`.
    #[must_use]
    pub fn is_resource_near(
        &self,
        pos: GridPos,
        resource: ResourceTypeId,
        use_peer_targets: bool,
    ) -> Option<GridPos> {
        let world = self.world();
        Self::adjacent_resource(&world, pos, resource).or_else(|| {
            if !use_peer_targets {
                return None;
            }
            self.peer_resource_target(&world, pos, resource)
                .filter(|target| pos.distance_squared(*target) <= 1)
        })
    }

    /// Whether any of the faction's units can harvest `resource`.
    ///
    /// Answers from the harvest cache while its unit is alive, rescanning the
    /// unit list otherwise.
    pub fn can_use_resource_type(&mut self, resource: ResourceTypeId) -> bool {
        let world = self.world();
        let Some(faction) = world.faction(self.state.faction_index) else {
            return false;
        };
        self.state
            .harvest_cache
            .can_harvest(faction, world.tech(), resource)
    }

    /// The explored cell holding `resource` closest to `pos`.
    ///
    /// With `usable_only`, returns `None` unless some unit can harvest it.
    /// A deposit next to `pos` or a harvest target the faction already works
    /// wins outright; otherwise every explored cell is searched and the first
    /// of equally close cells is kept.
    pub fn nearest_sighted_resource(
        &mut self,
        resource: ResourceTypeId,
        pos: GridPos,
        usable_only: bool,
    ) -> Option<GridPos> {
        if usable_only && !self.can_use_resource_type(resource) {
            return None;
        }

        let world = self.world();
        if let Some(found) = Self::adjacent_resource(&world, pos, resource)
            .or_else(|| self.peer_resource_target(&world, pos, resource))
        {
            return Some(found);
        }

        let map = world.map();
        let team = self.state.team_index;
        let mut best: Option<(i64, GridPos)> = None;
        for x in 0..map.width() {
            for y in 0..map.height() {
                let cell = GridPos::new(x, y);
                if !map.is_explored(cell, team) {
                    continue;
                }
                if !map
                    .resource_at(cell)
                    .is_some_and(|r| r.resource_type == resource)
                {
                    continue;
                }
                let dist = pos.distance_squared(cell);
                if best.map_or(true, |(d, _)| dist < d) {
                    best = Some((dist, cell));
                }
            }
        }
        best.map(|(_, cell)| cell)
    }

    // ----- threat queries -----

    /// First visible enemy within `radius` of home, in faction and unit order.
    ///
    /// When enough distinct enemies stand around it, its position is added to
    /// the enemy warning list (once).
    pub fn first_sighted_enemy(&mut self, radius: i32) -> Option<SightedEnemy> {
        let (enemy, warn_here) = {
            let world = self.world();
            let team = self.state.team_index;
            let home = world.home_location(self.state.faction_index)?;
            let enemy = world
                .factions()
                .iter()
                .flat_map(|f| f.units())
                .find(|unit| {
                    Self::is_visible_enemy(&world, team, unit) && unit.pos.within(home, radius)
                })?;
            let nearby = self.count_enemies_around(&world, enemy.pos, enemy.field);
            (
                SightedEnemy {
                    id: enemy.id,
                    faction: enemy.faction,
                    pos: enemy.pos,
                    field: enemy.field,
                },
                nearby >= self.shared.config.warning_enemy_count,
            )
        };

        self.print_log(2, &format!("Being attacked at pos {}", enemy.pos));
        if warn_here && !self.state.enemy_warnings.contains(&enemy.pos) {
            self.state.enemy_warnings.push(enemy.pos);
        }
        Some(enemy)
    }

    /// Positions where large enemy groups were seen, oldest first.
    #[must_use]
    pub fn enemy_warning_positions(&self) -> &[GridPos] {
        &self.state.enemy_warnings
    }

    /// Forget a warning position. Returns whether it was present.
    pub fn remove_enemy_warning_position(&mut self, pos: GridPos) -> bool {
        match self.state.enemy_warnings.iter().position(|p| *p == pos) {
            Some(i) => {
                self.state.enemy_warnings.remove(i);
                true
            }
            None => false,
        }
    }

    // ----- commands -----

    /// Whether this faction's commands go through the commander rather than
    /// straight into the world.
    #[must_use]
    pub fn routes_through_commander(&self) -> bool {
        let world = self.world();
        self.routes_in(&world)
    }

    /// Resolve and issue an order.
    ///
    /// # Errors
    /// - `UnitNotFound` when the unit index or id does not resolve
    /// - `UnitTypeNotFound` when the unit's type is unknown
    /// - `CommandTypeUnsupported` when the unit's type has no command of the class
    /// - `Desync` when an exact command type is not owned by the unit's type
    ///
    /// None of these leave any trace in the world.
    pub fn issue_command(&mut self, order: AiOrder) -> Result<(CommandResult, String)> {
        let faction = self.state.faction_index;
        let (unit, command, via_commander) = {
            let world = self.world();
            let unit = self.resolve_unit(&world, order.unit)?;
            let ut = world
                .tech()
                .unit_type(unit.unit_type)
                .ok_or(GameError::UnitTypeNotFound {
                    faction,
                    unit: unit.id,
                })?;
            let command_type = match order.command {
                CommandSpec::Class(class) => ut
                    .first_command_of_class(class)
                    .ok_or_else(|| GameError::CommandTypeUnsupported {
                        faction,
                        unit: unit.id,
                        class: class.to_string(),
                    })?
                    .id,
                CommandSpec::Type(id) => {
                    ut.find_command_type(id)
                        .ok_or_else(|| GameError::Desync {
                            faction,
                            message: format!(
                                "Can not find AI command type {id} for unit {} [{}] of faction {}",
                                unit.id, ut.name, unit.faction
                            ),
                            world_dump: world.dump_to_log(),
                        })?
                        .id
                }
            };
            (
                unit.id,
                order.into_command(command_type),
                self.routes_in(&world),
            )
        };

        if self.is_log_level_enabled(4) {
            self.print_log(
                4,
                &format!(
                    "Unit {unit} command {} target {:?}",
                    command.command_type, command.target
                ),
            );
        }

        let context = &self.shared.context;
        let outcome = if via_commander {
            context.commander.try_give_command(faction, unit, command)
        } else {
            context.world.write().give_unit_command(faction, unit, command)
        };
        Ok(outcome)
    }

    /// Order the unit at `index` to run the first command of `class` at `pos`.
    ///
    /// # Errors
    /// See [`AiContext::issue_command`].
    pub fn give_command_class(
        &mut self,
        index: usize,
        class: CommandClass,
        pos: GridPos,
    ) -> Result<(CommandResult, String)> {
        self.issue_command(AiOrder::new(
            UnitRef::Index(index),
            CommandSpec::Class(class),
            OrderTarget::Position(pos),
        ))
    }

    /// Order the unit at `index` to run `command_type` at `pos`.
    ///
    /// # Errors
    /// See [`AiContext::issue_command`].
    pub fn give_command_at(
        &mut self,
        index: usize,
        command_type: CommandTypeId,
        pos: GridPos,
    ) -> Result<(CommandResult, String)> {
        self.issue_command(AiOrder::new(
            UnitRef::Index(index),
            CommandSpec::Type(command_type),
            OrderTarget::Position(pos),
        ))
    }

    /// Order the unit at `index` to build `unit_type` at `pos`.
    ///
    /// # Errors
    /// See [`AiContext::issue_command`].
    pub fn give_build_command(
        &mut self,
        index: usize,
        command_type: CommandTypeId,
        pos: GridPos,
        unit_type: UnitTypeId,
    ) -> Result<(CommandResult, String)> {
        self.issue_command(AiOrder::new(
            UnitRef::Index(index),
            CommandSpec::Type(command_type),
            OrderTarget::Build { pos, unit_type },
        ))
    }

    /// Order the unit at `index` to run `command_type` on `target`.
    ///
    /// # Errors
    /// See [`AiContext::issue_command`].
    pub fn give_command_on_unit(
        &mut self,
        index: usize,
        command_type: CommandTypeId,
        target: UnitId,
    ) -> Result<(CommandResult, String)> {
        self.issue_command(AiOrder::new(
            UnitRef::Index(index),
            CommandSpec::Type(command_type),
            OrderTarget::Unit(target),
        ))
    }

    /// Vote on `requesting_faction` joining `team`.
    pub fn switch_team_vote(&mut self, requesting_faction: usize, team: usize, allow: bool) {
        self.shared.context.commander.try_switch_team_vote(SwitchTeamVote {
            faction: self.state.faction_index,
            requesting_faction,
            team,
            allow,
        });
    }

    // ----- helpers on a held world snapshot -----

    fn routes_in(&self, world: &World) -> bool {
        let settings = &self.shared.context.settings;
        world
            .faction(self.state.faction_index)
            .is_some_and(|f| {
                f.cpu_control(
                    settings.server_controlled_ai,
                    settings.network_game,
                    settings.role,
                )
            })
    }

    fn resolve_unit<'w>(&self, world: &'w World, unit: UnitRef) -> Result<&'w Unit> {
        let faction = self.state.faction_index;
        let f = world.faction(faction).ok_or_else(|| GameError::UnitNotFound {
            faction,
            unit: format!("{unit:?}"),
        })?;
        match unit {
            UnitRef::Index(index) => f.unit(index).ok_or_else(|| GameError::UnitNotFound {
                faction,
                unit: format!("index {index} (unit count {})", f.unit_count()),
            }),
            UnitRef::Id(id) => f.find_unit(id).ok_or_else(|| GameError::UnitNotFound {
                faction,
                unit: format!("id {id}"),
            }),
        }
    }

    fn is_ally_in(world: &World, team: usize, unit: &Unit) -> bool {
        world.faction(unit.faction).is_some_and(|f| f.is_ally(team))
    }

    fn is_visible_enemy(world: &World, team: usize, unit: &Unit) -> bool {
        unit.is_alive()
            && world.map().is_visible(unit.pos, team)
            && !world
                .tech()
                .unit_type(unit.unit_type)
                .is_some_and(|ut| ut.hidden)
            && !Self::is_ally_in(world, team, unit)
    }

    fn count_enemies_around(&self, world: &World, center: GridPos, field: Field) -> usize {
        let radius = self.shared.config.warning_check_radius;
        let team = self.state.team_index;
        let mut seen = BTreeSet::new();
        for x in center.x - radius..center.x + radius {
            for y in center.y - radius..center.y + radius {
                let Some(id) = world.map().occupant(GridPos::new(x, y), field) else {
                    continue;
                };
                if seen.contains(&id) {
                    continue;
                }
                if world
                    .find_unit(id)
                    .is_some_and(|unit| Self::is_visible_enemy(world, team, unit))
                {
                    seen.insert(id);
                }
            }
        }
        seen.len()
    }

    fn adjacent_resource(world: &World, pos: GridPos, resource: ResourceTypeId) -> Option<GridPos> {
        let map = world.map();
        for dx in -1..=1 {
            for dy in -1..=1 {
                let cell = pos + GridPos::new(dx, dy);
                if map
                    .resource_at(cell)
                    .is_some_and(|r| r.resource_type == resource)
                {
                    return Some(cell);
                }
            }
        }
        None
    }

    fn peer_resource_target(
        &self,
        world: &World,
        pos: GridPos,
        resource: ResourceTypeId,
    ) -> Option<GridPos> {
        world
            .faction(self.state.faction_index)?
            .closest_resource_target(pos, resource)
    }
}
