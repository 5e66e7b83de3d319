//! # Skirmish Core
//!
//! Skirmish simulation core: a deterministic grid world and the per-faction
//! AI interfaces that play it.
//!
//! Each AI-controlled faction gets an [`ai::AiInterface`]: a lock-guarded
//! facade an [`ai::AiBrain`] runs behind, optionally on its own worker
//! thread. The master loop ([`session::Session`]) signals every worker once
//! per frame, waits for all of them, then advances the world. This keeps AI
//! thinking parallel while the world itself only ever changes between frames
//! or through validated commands.
//!
//! ## Crate Structure
//!
//! - [`world`], [`map`], [`factions`], [`components`], [`tech`] - the world model
//! - [`commander`] - network-aware command submission
//! - [`ai`] - AI interfaces, workers and synchronization primitives
//! - [`session`] - the master loop
//! - [`save`] - save games
//! - [`config`] - AI and session configuration

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod ai;
pub mod commander;
pub mod components;
pub mod config;
pub mod console;
pub mod error;
pub mod factions;
pub mod map;
pub mod math;
pub mod save;
pub mod session;
pub mod tech;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::ai::{
        AiBrain, AiContext, AiInterface, AiInterfaceRecord, AiOrder, BasicAi, BasicAiSettings,
        CommandSpec, FnBrain, GameContext, OrderTarget, UnitRef,
    };
    pub use crate::commander::{Commander, LockstepCommander};
    pub use crate::components::{Command, CommandResult, CommandTarget, Field, Unit, UnitId};
    pub use crate::config::{AiConfig, GameSettings, NetworkRole};
    pub use crate::console::{Console, MessageConsole};
    pub use crate::error::{GameError, Result};
    pub use crate::factions::{ControlType, Faction};
    pub use crate::map::Map;
    pub use crate::math::GridPos;
    pub use crate::save::SaveGame;
    pub use crate::session::Session;
    pub use crate::tech::{CommandClass, CommandType, ResourceType, TechTree, UnitType};
    pub use crate::world::World;
}
