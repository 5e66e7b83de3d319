//! Network-aware command arbiter.
//!
//! AI factions that the local peer controls submit their commands here
//! instead of touching units directly. In a local game the commander applies
//! them at once; in a network game it holds them until the tick boundary so
//! every peer applies the same commands on the same frame.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::components::{Command, CommandResult, UnitId};
use crate::config::GameSettings;
use crate::world::World;

/// A command waiting for the lockstep boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkCommand {
    /// Issuing faction.
    pub faction: usize,
    /// Commanded unit.
    pub unit: UnitId,
    /// The command.
    pub command: Command,
}

/// A faction's vote on another faction's request to switch teams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchTeamVote {
    /// Voting faction.
    pub faction: usize,
    /// Faction asking to switch.
    pub requesting_faction: usize,
    /// Team it wants to join.
    pub team: usize,
    /// Whether the vote is in favour.
    pub allow: bool,
}

/// Command submission seam between AI code and the authoritative world.
pub trait Commander: Send + Sync {
    /// Submit a command for a unit of `faction`.
    fn try_give_command(
        &self,
        faction: usize,
        unit: UnitId,
        command: Command,
    ) -> (CommandResult, String);

    /// Submit a switch-team vote.
    fn try_switch_team_vote(&self, vote: SwitchTeamVote);
}

/// Commander for a lockstep session.
pub struct LockstepCommander {
    world: Arc<RwLock<World>>,
    settings: Arc<GameSettings>,
    pending: Mutex<Vec<NetworkCommand>>,
    votes: Mutex<Vec<SwitchTeamVote>>,
}

impl LockstepCommander {
    /// Create a commander over the session's world.
    pub fn new(world: Arc<RwLock<World>>, settings: Arc<GameSettings>) -> Self {
        Self {
            world,
            settings,
            pending: Mutex::new(Vec::new()),
            votes: Mutex::new(Vec::new()),
        }
    }

    /// Commands waiting for the next tick boundary.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Apply every held command.
    ///
    /// Factions submit from separate threads, so arrival order is not
    /// deterministic; commands are applied by faction index, keeping each
    /// faction's own issue order. Returns the number of commands applied.
    pub fn flush(&self) -> usize {
        let mut batch = std::mem::take(&mut *self.pending.lock());
        batch.sort_by_key(|c| c.faction);
        let count = batch.len();
        let mut world = self.world.write();
        for cmd in batch {
            let (result, message) = world.give_unit_command(cmd.faction, cmd.unit, cmd.command);
            if result != CommandResult::Success {
                tracing::debug!(
                    faction = cmd.faction,
                    unit = cmd.unit,
                    ?result,
                    %message,
                    "Held command rejected at tick boundary"
                );
            }
        }
        count
    }

    /// Drain recorded switch-team votes.
    pub fn take_votes(&self) -> Vec<SwitchTeamVote> {
        std::mem::take(&mut *self.votes.lock())
    }
}

impl Commander for LockstepCommander {
    fn try_give_command(
        &self,
        faction: usize,
        unit: UnitId,
        command: Command,
    ) -> (CommandResult, String) {
        if self.settings.network_game {
            self.pending.lock().push(NetworkCommand {
                faction,
                unit,
                command,
            });
            (CommandResult::Success, String::new())
        } else {
            self.world.write().give_unit_command(faction, unit, command)
        }
    }

    fn try_switch_team_vote(&self, vote: SwitchTeamVote) {
        self.votes.lock().push(vote);
    }
}
