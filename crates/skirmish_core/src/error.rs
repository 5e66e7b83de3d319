//! Error types for the skirmish core.

use std::path::PathBuf;

use thiserror::Error;

use crate::components::UnitId;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for simulation and AI interface errors.
///
/// Resolution failures against authoritative faction state (`UnitNotFound`,
/// `UnitTypeNotFound`, `CommandTypeUnsupported`, `Desync`) are fatal: they
/// mean the AI's view has diverged from the simulation, and no retry helps.
#[derive(Debug, Error)]
pub enum GameError {
    /// Unit index or id could not be resolved in the faction's unit list.
    #[error("Can not find AI unit {unit} in faction {faction}, game out of sync")]
    UnitNotFound {
        /// Faction the lookup ran against.
        faction: usize,
        /// Requested index or id, rendered for the message.
        unit: String,
    },

    /// A unit refers to a unit type the tech tree does not know.
    #[error("Can not find unit type for unit {unit} in faction {faction}, game out of sync")]
    UnitTypeNotFound {
        /// Faction the unit belongs to.
        faction: usize,
        /// Unit id.
        unit: UnitId,
    },

    /// The unit type has no command of the requested class.
    #[error("Unit {unit} in faction {faction} has no command of class {class}")]
    CommandTypeUnsupported {
        /// Faction the unit belongs to.
        faction: usize,
        /// Unit id.
        unit: UnitId,
        /// Requested command class.
        class: String,
    },

    /// The AI asked for a command type the authoritative unit type lacks.
    #[error("Desync in faction {faction}: {message}\nworld = {world_dump}")]
    Desync {
        /// Faction whose AI diverged.
        faction: usize,
        /// Description of the mismatch.
        message: String,
        /// World snapshot taken when the mismatch was detected.
        world_dump: String,
    },

    /// The per-faction AI log file could not be opened.
    #[error("Can't open AI log file: [{}]", path.display())]
    CannotOpenLog {
        /// Log file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// `start()` was called on a worker that already left the idle state.
    #[error("AI worker for faction {0} is already running")]
    AlreadyRunning(usize),

    /// A worker waited too long for the master/slave barrier.
    #[error("Master/slave barrier timed out after {timeout_ms} ms (faction {faction})")]
    BarrierTimeout {
        /// Faction whose worker timed out.
        faction: usize,
        /// Timeout that was exceeded.
        timeout_ms: u64,
    },

    /// The master loop gave up waiting for AI ticks to complete.
    #[error("AI tick {tick} did not complete within {timeout_ms} ms (factions {factions:?})")]
    TickTimeout {
        /// Tick being waited on.
        tick: u64,
        /// Factions still busy.
        factions: Vec<usize>,
        /// Timeout that was exceeded.
        timeout_ms: u64,
    },

    /// An AI worker died; the session cannot continue with divergent state.
    #[error("AI for faction {faction} failed: {message}")]
    AiFatal {
        /// Faction whose AI failed.
        faction: usize,
        /// Failure description.
        message: String,
    },

    /// Invalid game state.
    #[error("Invalid game state: {0}")]
    InvalidState(String),

    /// Save state could not be written or read.
    #[error("Save state error: {0}")]
    SaveState(String),
}
