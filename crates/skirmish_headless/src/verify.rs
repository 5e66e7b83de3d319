//! Determinism verification for CI.
//!
//! Runs a scenario once with AI ticks inline, several times with worker
//! threads, and once split across a save and reload, then checks every run
//! ended on the same world hash.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::runner::{run_game, GameConfig, RunError};
use crate::scenario::Scenario;

/// Outcome of [`verify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    /// Scenario name.
    pub scenario: String,
    /// Frames per run.
    pub frames: u64,
    /// Hash of the inline reference run.
    pub inline_hash: u64,
    /// Hashes of the threaded runs.
    pub threaded_hashes: Vec<u64>,
    /// Hash of the run split across a save, if one was made.
    pub resumed_hash: Option<u64>,
    /// Whether every run matched the reference.
    pub passed: bool,
}

/// Verify that threading and save/reload leave a scenario's outcome unchanged.
///
/// `save_dir` receives the intermediate save; without it the save/reload
/// check is skipped.
///
/// # Errors
/// Returns the first run's error.
pub fn verify(
    scenario: &Scenario,
    frames: u64,
    threaded_runs: usize,
    save_dir: Option<PathBuf>,
) -> Result<VerifyReport, RunError> {
    let base = GameConfig::new("verify", scenario.clone()).with_frames(frames);

    let inline_hash = run_game(&base.clone().with_worker_threads(false))?.state_hash;
    let mut threaded_hashes = Vec::with_capacity(threaded_runs);
    for run in 0..threaded_runs {
        let mut config = base.clone().with_worker_threads(true);
        config.game_id = format!("verify_threaded_{run}");
        threaded_hashes.push(run_game(&config)?.state_hash);
    }

    let resumed_hash = match save_dir {
        Some(dir) => {
            let path = dir.join(format!("{}_verify.sav", scenario.name));
            let split = frames / 2;
            let mut first = base.clone().with_frames(split);
            first.save_to = Some(path.clone());
            run_game(&first)?;
            let mut second = base.clone().with_frames(frames - split);
            second.resume_from = Some(path);
            Some(run_game(&second)?.state_hash)
        }
        None => None,
    };

    let passed = threaded_hashes.iter().all(|&h| h == inline_hash)
        && resumed_hash.map_or(true, |h| h == inline_hash);
    if passed {
        info!(scenario = %scenario.name, frames, hash = inline_hash, "Determinism verified");
    } else {
        error!(
            scenario = %scenario.name,
            inline = inline_hash,
            threaded = ?threaded_hashes,
            resumed = ?resumed_hash,
            "Determinism check failed"
        );
    }

    Ok(VerifyReport {
        scenario: scenario.name.clone(),
        frames,
        inline_hash,
        threaded_hashes,
        resumed_hash,
        passed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_scenario_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let report = verify(
            &Scenario::skirmish_1v1(),
            24,
            2,
            Some(dir.path().to_path_buf()),
        )
        .unwrap();
        assert!(report.passed, "{report:?}");
        assert_eq!(report.threaded_hashes.len(), 2);
        assert_eq!(report.resumed_hash, Some(report.inline_hash));
    }
}
