//! Save games: world snapshot plus every AI interface record.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ai::AiInterfaceRecord;
use crate::config::GameSettings;
use crate::error::{GameError, Result};
use crate::world::World;

/// Save file format version.
pub const SAVE_VERSION: u32 = 2;

/// A complete saved session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveGame {
    /// Save format version.
    pub version: u32,
    /// Session frame at save time.
    pub frame: u64,
    /// Session settings.
    pub settings: GameSettings,
    /// World snapshot.
    pub world: World,
    /// One record per AI interface.
    pub ai_interfaces: Vec<AiInterfaceRecord>,
}

impl SaveGame {
    /// Bundle a snapshot.
    #[must_use]
    pub fn new(
        frame: u64,
        settings: GameSettings,
        world: World,
        ai_interfaces: Vec<AiInterfaceRecord>,
    ) -> Self {
        Self {
            version: SAVE_VERSION,
            frame,
            settings,
            world,
            ai_interfaces,
        }
    }

    /// Record saved for `faction`.
    #[must_use]
    pub fn ai_record(&self, faction: usize) -> Option<&AiInterfaceRecord> {
        self.ai_interfaces.iter().find(|r| r.faction_index == faction)
    }

    fn check_version(self) -> Result<Self> {
        if self.version != SAVE_VERSION {
            return Err(GameError::SaveState(format!(
                "Save version mismatch: expected {}, got {}",
                SAVE_VERSION, self.version
            )));
        }
        Ok(self)
    }

    /// Human-readable form.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_ron(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| GameError::SaveState(format!("Failed to serialize save: {e}")))
    }

    /// Parse the human-readable form.
    ///
    /// # Errors
    /// Returns an error on malformed input or a version mismatch.
    pub fn from_ron(contents: &str) -> Result<Self> {
        let save: Self = ron::from_str(contents)
            .map_err(|e| GameError::SaveState(format!("Failed to parse save: {e}")))?;
        save.check_version()
    }

    /// Compact binary form.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::SaveState(format!("Failed to serialize save: {e}")))
    }

    /// Parse the binary form.
    ///
    /// # Errors
    /// Returns an error on malformed input or a version mismatch.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let save: Self = bincode::deserialize(bytes)
            .map_err(|e| GameError::SaveState(format!("Failed to deserialize save: {e}")))?;
        save.check_version()
    }

    /// Write to `path`; `.ron` files are written as RON, anything else as binary.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let bytes = if is_ron(path) {
            self.to_ron()?.into_bytes()
        } else {
            self.to_bytes()?
        };
        std::fs::write(path, bytes)
            .map_err(|e| GameError::SaveState(format!("Failed to write save file: {e}")))
    }

    /// Read from `path`, choosing the format like [`SaveGame::save`].
    ///
    /// # Errors
    /// Returns an error if the read or parse fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| GameError::SaveState(format!("Failed to read save file: {e}")))?;
        if is_ron(path) {
            let contents = String::from_utf8(bytes)
                .map_err(|e| GameError::SaveState(format!("Save file is not UTF-8: {e}")))?;
            Self::from_ron(&contents)
        } else {
            Self::from_bytes(&bytes)
        }
    }
}

fn is_ron(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "ron")
}
