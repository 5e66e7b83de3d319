//! Unit and command data.
//!
//! Units are pure data; the rules that advance them live in
//! [`crate::world::World::update`].

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::math::{CardinalDir, GridPos};
use crate::tech::{CommandTypeId, UnitTypeId};

/// Unique identifier for units. Never reused within a session.
pub type UnitId = u32;

/// Movement layer a unit occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Field {
    /// Ground units and buildings.
    #[default]
    Land,
    /// Flying units.
    Air,
}

/// What a command is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandTarget {
    /// No target (stop, produce).
    None,
    /// A map cell.
    Position(GridPos),
    /// Another unit.
    Unit(UnitId),
}

/// A command queued on a unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Command {
    /// Command type to execute.
    pub command_type: CommandTypeId,
    /// Target of the command.
    pub target: CommandTarget,
    /// Unit type to build, for build commands.
    pub unit_type: Option<UnitTypeId>,
    /// Facing for build commands.
    pub facing: CardinalDir,
    /// Group id shared by commands issued together.
    pub group_id: Option<i32>,
}

impl Command {
    /// Command aimed at a position.
    #[must_use]
    pub fn at(command_type: CommandTypeId, pos: GridPos) -> Self {
        Self {
            command_type,
            target: CommandTarget::Position(pos),
            unit_type: None,
            facing: CardinalDir::North,
            group_id: None,
        }
    }

    /// Command aimed at a unit.
    #[must_use]
    pub fn on_unit(command_type: CommandTypeId, unit: UnitId) -> Self {
        Self {
            command_type,
            target: CommandTarget::Unit(unit),
            unit_type: None,
            facing: CardinalDir::North,
            group_id: None,
        }
    }

    /// Command without a target.
    #[must_use]
    pub fn untargeted(command_type: CommandTypeId) -> Self {
        Self {
            command_type,
            target: CommandTarget::None,
            unit_type: None,
            facing: CardinalDir::North,
            group_id: None,
        }
    }

    /// Target position, if the command has one.
    #[must_use]
    pub fn target_pos(&self) -> Option<GridPos> {
        match self.target {
            CommandTarget::Position(pos) => Some(pos),
            _ => None,
        }
    }
}

/// Outcome of giving a command to a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandResult {
    /// The command was accepted.
    Success,
    /// Not enough resources.
    FailResources,
    /// Requirements not met.
    FailRequirements,
    /// Unit limit reached.
    FailUnitCount,
    /// Any other failure.
    FailUndefined,
    /// Some commands of a group failed.
    SomeFailed,
}

/// A unit on the map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unit {
    /// Unit id.
    pub id: UnitId,
    /// Unit type id.
    pub unit_type: UnitTypeId,
    /// Owning faction index.
    pub faction: usize,
    /// Current cell.
    pub pos: GridPos,
    /// Layer the unit occupies.
    pub field: Field,
    /// Hit points; zero means dead.
    pub hp: u32,
    /// Pending commands, front is current.
    pub commands: VecDeque<Command>,
}

impl Unit {
    /// Whether the unit still has hit points.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    /// Whether the unit has nothing to do.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.commands.is_empty()
    }

    /// The command being executed.
    #[must_use]
    pub fn current_command(&self) -> Option<&Command> {
        self.commands.front()
    }
}
