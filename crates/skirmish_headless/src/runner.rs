//! Single headless game runs.
//!
//! A run builds the scenario world (or resumes a save), drives a
//! [`Session`] for a number of frames and reports the final state as a
//! serializable [`GameReport`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use skirmish_core::ai::{AiBrain, BasicAi};
use skirmish_core::config::{AiConfig, GameSettings};
use skirmish_core::error::GameError;
use skirmish_core::factions::{ControlType, Faction};
use skirmish_core::save::SaveGame;
use skirmish_core::session::Session;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::scenario::{Scenario, ScenarioError};

/// Error from a headless run.
#[derive(Error, Debug)]
pub enum RunError {
    /// The scenario could not be loaded or built.
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    /// The session failed.
    #[error(transparent)]
    Game(#[from] GameError),
}

/// Configuration for one game.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Identifier used in logs and reports.
    pub game_id: String,
    /// Scenario to build the world from.
    pub scenario: Scenario,
    /// Frames to run.
    pub frames: u64,
    /// AI interface configuration.
    pub ai: AiConfig,
    /// Write a save here after the last frame.
    pub save_to: Option<PathBuf>,
    /// Continue from this save instead of building the scenario world.
    pub resume_from: Option<PathBuf>,
}

impl GameConfig {
    /// Config running the scenario for its own frame count.
    pub fn new(game_id: impl Into<String>, scenario: Scenario) -> Self {
        Self {
            game_id: game_id.into(),
            frames: scenario.frames,
            ai: scenario.ai.clone(),
            scenario,
            save_to: None,
            resume_from: None,
        }
    }

    /// Set frame count
    pub fn with_frames(mut self, frames: u64) -> Self {
        self.frames = frames;
        self
    }

    /// Set whether AI runs on worker threads
    pub fn with_worker_threads(mut self, enabled: bool) -> Self {
        self.ai.worker_threads = enabled;
        self
    }
}

/// Final state of one faction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactionReport {
    /// Faction index.
    pub index: usize,
    /// Faction type name.
    pub name: String,
    /// Team.
    pub team: usize,
    /// Controller.
    pub control: ControlType,
    /// Units alive.
    pub units: usize,
    /// Stockpile by resource name.
    pub resources: BTreeMap<String, i64>,
    /// AI ticks run, if an AI drove this faction.
    pub ai_ticks: Option<u64>,
}

/// Result of one game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameReport {
    /// Game identifier.
    pub game_id: String,
    /// Scenario name.
    pub scenario: String,
    /// Frame the session ended on.
    pub frame: u64,
    /// Whether AI ran on worker threads.
    pub threaded: bool,
    /// Final world hash.
    pub state_hash: u64,
    /// Wall time in milliseconds.
    pub elapsed_ms: u64,
    /// Whether every worker stopped cleanly.
    pub clean_shutdown: bool,
    /// Per-faction final state.
    pub factions: Vec<FactionReport>,
    /// Console lines at the end of the game.
    pub console: Vec<String>,
}

/// Run one game to completion.
///
/// # Errors
/// Returns an error if the scenario is invalid, the save can't be read or
/// written, or the session fails.
pub fn run_game(config: &GameConfig) -> Result<GameReport, RunError> {
    let start = Instant::now();
    let settings = config.scenario.basic_ai.clone();
    let make_brain = move |faction: &Faction| -> Box<dyn AiBrain> {
        debug!(faction = faction.index, name = %faction.name, "Creating AI brain");
        Box::new(BasicAi::new(settings.clone()))
    };

    let mut session = match &config.resume_from {
        Some(path) => {
            info!(game = %config.game_id, path = %path.display(), "Resuming from save");
            let save = SaveGame::load(path)?;
            Session::from_save_with_brains(save, config.ai.clone(), make_brain)?
        }
        None => {
            let world = config.scenario.build_world()?;
            Session::with_brains(world, GameSettings::default(), config.ai.clone(), make_brain)?
        }
    };

    info!(
        game = %config.game_id,
        scenario = %config.scenario.name,
        frames = config.frames,
        threaded = config.ai.worker_threads,
        "Starting game"
    );
    session.run(config.frames)?;

    if let Some(path) = &config.save_to {
        session.save().save(path)?;
        info!(game = %config.game_id, path = %path.display(), "Saved game");
    }

    let report = report(config, &session, start);
    let clean_shutdown = session.shutdown();
    if !clean_shutdown {
        warn!(game = %config.game_id, "AI workers did not stop cleanly");
    }
    info!(
        game = %config.game_id,
        frame = report.frame,
        hash = report.state_hash,
        elapsed_ms = report.elapsed_ms,
        "Game finished"
    );
    Ok(GameReport {
        clean_shutdown,
        ..report
    })
}

fn report(config: &GameConfig, session: &Session, start: Instant) -> GameReport {
    let world = session.world().read();
    let tech = world.tech();
    let factions = world
        .factions()
        .iter()
        .map(|faction| FactionReport {
            index: faction.index,
            name: faction.name.clone(),
            team: faction.team,
            control: faction.control,
            units: faction.unit_count(),
            resources: tech
                .resource_types
                .iter()
                .map(|rt| (rt.name.clone(), faction.resource(rt.id)))
                .collect(),
            ai_ticks: session.ai(faction.index).map(|ai| ai.tick_counter()),
        })
        .collect();
    GameReport {
        game_id: config.game_id.clone(),
        scenario: config.scenario.name.clone(),
        frame: session.frame(),
        threaded: config.ai.worker_threads,
        state_hash: world.state_hash(),
        elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        clean_shutdown: true,
        factions,
        console: session.console().lines(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick(threaded: bool) -> GameConfig {
        let mut config = GameConfig::new("test", Scenario::skirmish_1v1())
            .with_frames(30)
            .with_worker_threads(threaded);
        config.ai.tick_timeout_ms = 5_000;
        config
    }

    #[test]
    fn test_inline_run_reports_every_faction() {
        let report = run_game(&quick(false)).unwrap();
        assert_eq!(report.frame, 30);
        assert_eq!(report.factions.len(), 2);
        for faction in &report.factions {
            assert_eq!(faction.ai_ticks, Some(30));
            assert!(faction.resources.contains_key("gold"));
        }
        assert!(report.clean_shutdown);
    }

    #[test]
    fn test_threaded_run_matches_inline() {
        let inline = run_game(&quick(false)).unwrap();
        let threaded = run_game(&quick(true)).unwrap();
        assert_eq!(inline.state_hash, threaded.state_hash);
    }

    #[test]
    fn test_save_then_resume_continues_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.ron");

        let mut first = quick(false).with_frames(10);
        first.save_to = Some(path.clone());
        run_game(&first).unwrap();

        let mut second = quick(false).with_frames(20);
        second.resume_from = Some(path);
        let resumed = run_game(&second).unwrap();

        let straight = run_game(&quick(false)).unwrap();
        assert_eq!(resumed.frame, 30);
        assert_eq!(resumed.state_hash, straight.state_hash);
    }
}
