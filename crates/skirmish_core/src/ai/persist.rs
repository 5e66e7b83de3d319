//! Saved form of an AI interface.

use serde::{Deserialize, Serialize};

use crate::components::UnitId;

/// A harvest cache entry keyed by resource name, so saves survive tech tree
/// id renumbering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestCacheRecord {
    /// Resource type name.
    pub resource: String,
    /// Cached harvester.
    pub unit: UnitId,
}

/// Persistent state of one faction's AI interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiInterfaceRecord {
    /// Ticks run so far.
    pub tick_counter: u64,
    /// Faction the record belongs to.
    pub faction_index: usize,
    /// Team at save time.
    pub team_index: usize,
    /// Console mirroring of log lines.
    pub log_redirect: bool,
    /// Log verbosity.
    pub log_level: u8,
    /// Harvest cache contents.
    #[serde(default)]
    pub harvest_cache: Vec<HarvestCacheRecord>,
    /// Serialized brain state.
    #[serde(default)]
    pub brain_state: Option<String>,
}
