//! Determinism testing utilities.
//!
//! Threaded AI must not change the game: a session whose factions think on
//! worker threads has to end in exactly the state the same session reaches
//! with every tick run inline, and a session saved and reloaded mid-game has
//! to continue exactly like one that never stopped.
//!
//! Sources of non-determinism this catches:
//!
//! - **Command interleaving**: factions issue commands concurrently. Direct
//!   commands only touch the issuing faction's units; held network commands
//!   are applied in faction order at the tick boundary.
//! - **Stale reads**: a worker reading the world while the master updates it.
//!   The master only updates between ticks, after every worker finished.
//! - **Lost state on reload**: anything a brain depends on that the save
//!   format drops.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use skirmish_core::config::{AiConfig, GameSettings};
use skirmish_core::error::Result;
use skirmish_core::save::SaveGame;
use skirmish_core::session::Session;
use skirmish_core::world::World;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of frames simulated.
    pub frames: u64,
}

impl DeterminismResult {
    fn from_hashes(hashes: Vec<u64>, frames: u64) -> Self {
        Self {
            is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
            hashes,
            frames,
        }
    }

    /// All unique hashes (should be 1 for a deterministic session).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that every run matched, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Session is non-deterministic!\n\
                 Runs: {}\n\
                 Frames: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.frames,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run one session for `frames` frames and return the final world hash.
///
/// # Errors
/// Returns the first session error.
pub fn run_session(world: World, config: AiConfig, frames: u64) -> Result<u64> {
    let mut session = Session::new(world, GameSettings::default(), config)?;
    session.run(frames)?;
    let hash = session.state_hash();
    session.shutdown();
    Ok(hash)
}

/// Run the world from `setup` once inline and `threaded_runs` times with
/// worker threads, and compare the final hashes.
///
/// # Errors
/// Returns the first session error.
pub fn compare_inline_and_threaded<F>(
    setup: F,
    inline: &AiConfig,
    threaded: &AiConfig,
    threaded_runs: usize,
    frames: u64,
) -> Result<DeterminismResult>
where
    F: Fn() -> World,
{
    let mut hashes = Vec::with_capacity(threaded_runs + 1);
    hashes.push(run_session(setup(), inline.clone().with_worker_threads(false), frames)?);
    for _ in 0..threaded_runs {
        hashes.push(run_session(setup(), threaded.clone().with_worker_threads(true), frames)?);
    }
    Ok(DeterminismResult::from_hashes(hashes, frames))
}

/// Compare an inline and a threaded session frame by frame, returning the
/// first frame at which they diverge.
///
/// # Errors
/// Returns the first session error.
pub fn find_first_divergence<F>(setup: F, threaded: &AiConfig, frames: u64) -> Result<Option<u64>>
where
    F: Fn() -> World,
{
    let mut inline = Session::new(
        setup(),
        GameSettings::default(),
        threaded.clone().with_worker_threads(false),
    )?;
    let mut workers = Session::new(
        setup(),
        GameSettings::default(),
        threaded.clone().with_worker_threads(true),
    )?;

    if inline.state_hash() != workers.state_hash() {
        return Ok(Some(0));
    }
    for frame in 1..=frames {
        inline.tick()?;
        workers.tick()?;
        if inline.state_hash() != workers.state_hash() {
            return Ok(Some(frame));
        }
    }
    Ok(None)
}

/// Run `before` frames, save through the binary format, reload and run
/// `after` more; compare against a session that ran straight through.
///
/// # Errors
/// Returns the first session or save error.
pub fn verify_save_determinism<F>(
    setup: F,
    config: &AiConfig,
    before: u64,
    after: u64,
) -> Result<bool>
where
    F: Fn() -> World,
{
    let straight = run_session(setup(), config.clone(), before + after)?;

    let mut first = Session::new(setup(), GameSettings::default(), config.clone())?;
    first.run(before)?;
    let bytes = first.save().to_bytes()?;
    first.shutdown();
    drop(first);

    let mut resumed = Session::from_save(SaveGame::from_bytes(&bytes)?, config.clone())?;
    resumed.run(after)?;
    let hash = resumed.state_hash();
    resumed.shutdown();

    Ok(hash == straight)
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for AI interface testing.
pub mod strategies {
    use proptest::prelude::*;
    use skirmish_core::math::GridPos;

    /// A cell inside a `width` x `height` map.
    pub fn arb_grid_pos(width: i32, height: i32) -> impl Strategy<Value = GridPos> {
        (0..width, 0..height).prop_map(|(x, y)| GridPos::new(x, y))
    }

    /// A cell possibly outside the map, for bounds handling.
    pub fn arb_any_pos(width: i32, height: i32) -> impl Strategy<Value = GridPos> {
        (-width..2 * width, -height..2 * height).prop_map(|(x, y)| GridPos::new(x, y))
    }

    /// Strictly increasing tick indices, as a master loop produces them.
    pub fn arb_tick_sequence(max_len: usize) -> impl Strategy<Value = Vec<u64>> {
        prop::collection::vec(1u64..5, 1..max_len).prop_map(|steps| {
            steps
                .into_iter()
                .scan(0u64, |tick, step| {
                    *tick += step;
                    Some(*tick)
                })
                .collect()
        })
    }

    /// Gate operations: `Some(tick)` signals, `None` is a bare wake.
    pub fn arb_gate_ops(max_len: usize) -> impl Strategy<Value = Vec<Option<u64>>> {
        prop::collection::vec(prop::option::weighted(0.8, 1u64..1000), 1..max_len)
    }
}
