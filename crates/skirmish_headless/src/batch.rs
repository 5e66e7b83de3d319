//! Batch game runner for AI soak testing.
//!
//! Runs many copies of a scenario in parallel using rayon. Every game starts
//! from the same world, so a healthy batch ends with a single state hash no
//! matter how the AI ticks were scheduled; anything else is a determinism
//! bug in the AI interface.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::runner::{run_game, GameConfig, GameReport};
use crate::scenario::{Scenario, ScenarioError};

/// How AI ticks are scheduled across a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThreadMode {
    /// Every game runs AI ticks inline.
    Inline,
    /// Every game gives each faction a worker thread.
    #[default]
    Threaded,
    /// Even games inline, odd games threaded.
    Mixed,
}

impl ThreadMode {
    fn worker_threads(self, game_index: u32) -> bool {
        match self {
            Self::Inline => false,
            Self::Threaded => true,
            Self::Mixed => game_index % 2 == 1,
        }
    }
}

/// Configuration for a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Built-in scenario name or scenario file
    pub scenario: String,
    /// Number of games to run
    pub game_count: u32,
    /// Maximum parallel games (0 = use rayon default)
    pub parallel_games: u32,
    /// Frames per game; the scenario's own count when unset
    pub frames: Option<u64>,
    /// AI scheduling
    pub mode: ThreadMode,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            scenario: "skirmish_1v1".to_string(),
            game_count: 16,
            parallel_games: 0,
            frames: None,
            mode: ThreadMode::default(),
        }
    }
}

impl BatchConfig {
    /// Create config for a specific scenario
    pub fn new(scenario: &str, game_count: u32) -> Self {
        Self {
            scenario: scenario.to_string(),
            game_count,
            ..Default::default()
        }
    }

    /// Set frames per game
    pub fn with_frames(mut self, frames: u64) -> Self {
        self.frames = Some(frames);
        self
    }

    /// Set scheduling mode
    pub fn with_mode(mut self, mode: ThreadMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Error during batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    /// Game index
    pub game_index: u32,
    /// Error message
    pub message: String,
}

/// Aggregate over a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Games that finished.
    pub completed: usize,
    /// Games that failed.
    pub failed: usize,
    /// Distinct final world hashes.
    pub unique_hashes: Vec<u64>,
    /// Games whose workers had to be detached.
    pub unclean_shutdowns: usize,
    /// Mean wall time per game.
    pub mean_elapsed_ms: f64,
}

impl BatchSummary {
    /// Summarize finished games.
    pub fn from_games(games: &[GameReport], failed: usize) -> Self {
        let mut unique_hashes: Vec<u64> = games.iter().map(|g| g.state_hash).collect();
        unique_hashes.sort_unstable();
        unique_hashes.dedup();
        let total_ms: u64 = games.iter().map(|g| g.elapsed_ms).sum();
        Self {
            completed: games.len(),
            failed,
            unique_hashes,
            unclean_shutdowns: games.iter().filter(|g| !g.clean_shutdown).count(),
            mean_elapsed_ms: total_ms as f64 / games.len().max(1) as f64,
        }
    }

    /// True if every game finished in the same state.
    pub fn is_deterministic(&self) -> bool {
        self.failed == 0 && self.unique_hashes.len() <= 1
    }
}

/// Results from a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// Configuration used
    pub config: BatchConfig,
    /// Individual game reports
    pub games: Vec<GameReport>,
    /// Aggregate summary
    pub summary: BatchSummary,
    /// Total runtime
    pub duration_seconds: f64,
    /// Errors encountered
    pub errors: Vec<BatchError>,
}

impl BatchResults {
    /// Save results to JSON file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load results from JSON file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }
}

/// Run a batch of games
///
/// # Errors
/// Returns an error if the scenario can't be resolved. Individual game
/// failures are collected in [`BatchResults::errors`].
pub fn run_batch(config: BatchConfig) -> Result<BatchResults, ScenarioError> {
    let scenario = Scenario::resolve(&config.scenario)?;
    // Fail fast on a broken world rather than once per game.
    scenario.build_world()?;

    let start = Instant::now();
    let completed = AtomicU32::new(0);
    info!(
        "Starting batch run: {} games of '{}' ({:?})",
        config.game_count, scenario.name, config.mode
    );

    let run_all = || -> Vec<Result<GameReport, BatchError>> {
        (0..config.game_count)
            .into_par_iter()
            .map(|i| {
                let mut game = GameConfig::new(format!("game_{i}"), scenario.clone())
                    .with_worker_threads(config.mode.worker_threads(i));
                if let Some(frames) = config.frames {
                    game = game.with_frames(frames);
                }
                match run_game(&game) {
                    Ok(report) => {
                        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                        if done % 10 == 0 {
                            debug!("Progress: {}/{}", done, config.game_count);
                        }
                        Ok(report)
                    }
                    Err(e) => {
                        warn!("Game {} failed: {}", i, e);
                        Err(BatchError {
                            game_index: i,
                            message: e.to_string(),
                        })
                    }
                }
            })
            .collect()
    };

    let results = if config.parallel_games > 0 {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel_games as usize)
            .build()
        {
            Ok(pool) => pool.install(run_all),
            Err(e) => {
                warn!("Failed to build thread pool: {}, using global pool", e);
                run_all()
            }
        }
    } else {
        run_all()
    };

    let (games, errors): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
    let games: Vec<GameReport> = games.into_iter().filter_map(Result::ok).collect();
    let errors: Vec<BatchError> = errors.into_iter().filter_map(Result::err).collect();

    let summary = BatchSummary::from_games(&games, errors.len());
    let duration_seconds = start.elapsed().as_secs_f64();

    info!(
        "Batch complete: {} games in {:.1}s, {} unique hashes, {} failed",
        summary.completed,
        duration_seconds,
        summary.unique_hashes.len(),
        summary.failed
    );

    Ok(BatchResults {
        config,
        games,
        summary,
        duration_seconds,
        errors,
    })
}

/// Default output path for batch results.
pub fn default_output_path(scenario: &str) -> PathBuf {
    PathBuf::from("results").join(format!("{scenario}_batch.json"))
}
