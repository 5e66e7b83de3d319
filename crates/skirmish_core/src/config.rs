//! AI tuning and session settings.
//!
//! Both are plain serde structs handed to each [`crate::ai::AiInterface`] at
//! construction; nothing here is read from global state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read file.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] ron::error::SpannedError),
}

/// Per-faction AI interface configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// AI log verbosity; 0 disables the per-faction log file.
    pub log_level: u8,
    /// Mirror AI log lines to the in-game console.
    pub log_redirect: bool,
    /// Run each faction's AI on its own worker thread.
    pub worker_threads: bool,
    /// Bound worker ticks with a master/slave barrier round per frame.
    pub master_slave_barrier: bool,
    /// Directory for `ai<faction>.log` files.
    pub log_dir: PathBuf,
    /// How long a worker may wait on the master/slave barrier.
    pub barrier_timeout_ms: u64,
    /// How long the master loop waits for all AI ticks to complete.
    pub tick_timeout_ms: u64,
    /// How long teardown waits for a worker to exit before detaching it.
    pub shutdown_timeout_ms: u64,
    /// Distinct enemies near a sighted enemy that raise a warning.
    pub warning_enemy_count: usize,
    /// Half-width of the square scanned around a sighted enemy.
    pub warning_check_radius: i32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            log_level: 0,
            log_redirect: false,
            worker_threads: true,
            master_slave_barrier: false,
            log_dir: PathBuf::from("."),
            barrier_timeout_ms: 20_000,
            tick_timeout_ms: 20_000,
            shutdown_timeout_ms: 5_000,
            warning_enemy_count: 6,
            warning_check_radius: 12,
        }
    }
}

impl AiConfig {
    /// Load from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_ron_str(&contents)
    }

    /// Parse from a RON string; missing fields take their defaults.
    pub fn from_ron_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(contents)?)
    }

    /// Same config with worker threads switched on or off.
    #[must_use]
    pub fn with_worker_threads(mut self, enabled: bool) -> Self {
        self.worker_threads = enabled;
        self
    }
}

/// This peer's role in a network game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NetworkRole {
    /// Not networked.
    #[default]
    Standalone,
    /// Hosting peer.
    Server,
    /// Joined peer.
    Client,
}

/// Session-wide settings owned by the game.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    /// Tech tree name, written to AI log headers.
    pub tech: String,
    /// Whether this is a network game.
    pub network_game: bool,
    /// Whether the server runs every CPU faction.
    pub server_controlled_ai: bool,
    /// This peer's role.
    pub role: NetworkRole,
}
