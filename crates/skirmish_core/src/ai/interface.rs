//! Per-faction AI interface: the lock-guarded facade an AI brain runs behind.
//!
//! # Locking
//!
//! Each interface has one facade lock around its mutable state and brain.
//! Ticks (threaded or inline), queries made through [`AiInterface::with_context`],
//! persistence and worker detach all hold it, so they never interleave.
//! The facade lock is always taken before the world lock, never after.

use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write as _};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

use super::barrier::MasterSlaveController;
use super::brain::AiBrain;
use super::context::AiContext;
use super::harvest_cache::HarvestCache;
use super::persist::{AiInterfaceRecord, HarvestCacheRecord};
use super::signal_gate::TickIndex;
use super::worker::{AiFailure, AiWorker, RunState};
use crate::commander::Commander;
use crate::config::{AiConfig, GameSettings};
use crate::console::Console;
use crate::error::{GameError, Result};
use crate::math::GridPos;
use crate::world::World;

/// Shared game services every AI interface talks to.
#[derive(Clone)]
pub struct GameContext {
    /// Authoritative world.
    pub world: Arc<RwLock<World>>,
    /// Network-aware command arbiter.
    pub commander: Arc<dyn Commander>,
    /// In-game console for redirected log lines.
    pub console: Arc<dyn Console>,
    /// Session settings.
    pub settings: Arc<GameSettings>,
    /// Master/slave barrier, when the session bounds its workers with one.
    pub controller: Option<Arc<MasterSlaveController>>,
}

/// Mutable per-faction state guarded by the facade lock.
pub(crate) struct AiState {
    pub(crate) faction_index: usize,
    pub(crate) team_index: usize,
    pub(crate) tick_counter: u64,
    pub(crate) log_level: u8,
    pub(crate) log_redirect: bool,
    pub(crate) log_file: Option<LineWriter<File>>,
    pub(crate) harvest_cache: HarvestCache,
    pub(crate) enemy_warnings: Vec<GridPos>,
}

pub(crate) struct AiSlot {
    pub(crate) state: AiState,
    pub(crate) brain: Box<dyn AiBrain>,
}

/// The part of an interface its worker may reach through a weak handle.
pub(crate) struct AiShared {
    pub(crate) context: GameContext,
    pub(crate) config: AiConfig,
    slot: Mutex<AiSlot>,
}

impl AiShared {
    pub(crate) fn lock_slot(&self) -> MutexGuard<'_, AiSlot> {
        self.slot.lock()
    }

    /// Run one tick. The caller holds the facade lock through `slot`.
    pub(crate) fn update(&self, slot: &mut AiSlot) -> Result<()> {
        let AiSlot { state, brain } = slot;
        state.tick_counter += 1;
        let mut ctx = AiContext::new(self, state);
        brain.update(&mut ctx)
    }
}

fn open_log(config: &AiConfig, faction: usize, header: &str) -> Result<LineWriter<File>> {
    let path: PathBuf = config.log_dir.join(format!("ai{faction}.log"));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| GameError::CannotOpenLog {
            path: path.clone(),
            source,
        })?;
    let mut log = LineWriter::new(file);
    writeln!(log, "{header}").map_err(|source| GameError::CannotOpenLog { path, source })?;
    Ok(log)
}

/// One faction's AI: its brain, state, log and optional worker thread.
pub struct AiInterface {
    faction: usize,
    shared: Arc<AiShared>,
    worker: Option<AiWorker>,
}

impl AiInterface {
    /// Create the interface for `faction`, initialize the brain and start the
    /// worker when the config asks for one.
    ///
    /// # Errors
    /// - `InvalidState` if the faction does not exist
    /// - `CannotOpenLog` if logging is enabled and the log file can't be opened
    /// - whatever the brain's `init` returns
    pub fn new(
        context: GameContext,
        faction: usize,
        config: AiConfig,
        brain: Box<dyn AiBrain>,
    ) -> Result<Self> {
        let (team, header) = {
            let world = context.world.read();
            let f = world.faction(faction).ok_or_else(|| {
                GameError::InvalidState(format!("No faction {faction} for AI interface"))
            })?;
            let tech = if context.settings.tech.is_empty() {
                world.tech().name.clone()
            } else {
                context.settings.tech.clone()
            };
            (
                f.team,
                format!(
                    "AI log file for Tech [{tech}] Faction [{}] #{faction}",
                    f.name
                ),
            )
        };

        let log_file = if config.log_level > 0 {
            Some(open_log(&config, faction, &header)?)
        } else {
            None
        };

        let state = AiState {
            faction_index: faction,
            team_index: team,
            tick_counter: 0,
            log_level: config.log_level,
            log_redirect: config.log_redirect,
            log_file,
            harvest_cache: HarvestCache::new(),
            enemy_warnings: Vec::new(),
        };

        let use_worker = config.worker_threads;
        let barrier_timeout = Duration::from_millis(config.barrier_timeout_ms);
        let controller = context.controller.clone();
        let shared = Arc::new(AiShared {
            context,
            config,
            slot: Mutex::new(AiSlot { state, brain }),
        });
        {
            let mut slot = shared.lock_slot();
            let AiSlot { state, brain } = &mut *slot;
            brain.init(&mut AiContext::new(&shared, state))?;
        }

        let worker = if use_worker {
            let mut worker = AiWorker::new(&shared, faction, controller, barrier_timeout);
            worker.start()?;
            Some(worker)
        } else {
            None
        };

        info!(faction, team, threaded = use_worker, "AI interface created");
        Ok(Self {
            faction,
            shared,
            worker,
        })
    }

    /// Faction this interface drives.
    #[must_use]
    pub fn faction_index(&self) -> usize {
        self.faction
    }

    /// Current team of the faction.
    #[must_use]
    pub fn team_index(&self) -> usize {
        self.shared.lock_slot().state.team_index
    }

    /// Ticks run so far.
    #[must_use]
    pub fn tick_counter(&self) -> u64 {
        self.shared.lock_slot().state.tick_counter
    }

    /// Log verbosity.
    #[must_use]
    pub fn log_level(&self) -> u8 {
        self.shared.lock_slot().state.log_level
    }

    /// Whether log lines are mirrored to the console.
    #[must_use]
    pub fn log_redirect(&self) -> bool {
        self.shared.lock_slot().state.log_redirect
    }

    /// Copy of the harvest cache.
    #[must_use]
    pub fn harvest_cache(&self) -> HarvestCache {
        self.shared.lock_slot().state.harvest_cache.clone()
    }

    /// Positions where large enemy groups were seen.
    #[must_use]
    pub fn enemy_warning_positions(&self) -> Vec<GridPos> {
        self.shared.lock_slot().state.enemy_warnings.clone()
    }

    /// Whether ticks run on a worker thread.
    #[must_use]
    pub fn has_worker(&self) -> bool {
        self.worker.is_some()
    }

    /// Worker lifecycle state, if threaded.
    #[must_use]
    pub fn worker_state(&self) -> Option<RunState> {
        self.worker.as_ref().map(AiWorker::run_state)
    }

    /// The worker, if threaded.
    #[must_use]
    pub fn worker(&self) -> Option<&AiWorker> {
        self.worker.as_ref()
    }

    /// Fatal failure reported by the worker, if any.
    #[must_use]
    pub fn failure(&self) -> Option<AiFailure> {
        self.worker.as_ref().and_then(AiWorker::failure)
    }

    /// Start tick `tick`: signal the worker, or run the tick inline.
    ///
    /// # Errors
    /// Inline ticks return the brain's error.
    pub fn advance_tick(&self, tick: TickIndex) -> Result<()> {
        match &self.worker {
            Some(worker) => {
                worker.signal(tick);
                Ok(())
            }
            None => self.update(),
        }
    }

    /// Whether `tick` is done. Always true without a worker.
    #[must_use]
    pub fn is_tick_complete(&self, tick: TickIndex) -> bool {
        self.worker
            .as_ref()
            .map_or(true, |w| w.is_signal_completed(tick))
    }

    /// Run one tick on the calling thread, under the facade lock.
    ///
    /// # Errors
    /// Returns the brain's error.
    pub fn update(&self) -> Result<()> {
        let mut slot = self.shared.lock_slot();
        self.shared.update(&mut slot)
    }

    /// Run `f` against the AI context with the facade lock held.
    pub fn with_context<R>(&self, f: impl FnOnce(&mut AiContext<'_>) -> R) -> R {
        let mut slot = self.shared.lock_slot();
        let mut ctx = AiContext::new(&self.shared, &mut slot.state);
        f(&mut ctx)
    }

    /// Write a line to this faction's AI log.
    pub fn print_log(&self, level: u8, message: &str) {
        self.with_context(|ctx| ctx.print_log(level, message));
    }

    /// Snapshot of the persistent interface state.
    #[must_use]
    pub fn persist(&self) -> AiInterfaceRecord {
        let slot = self.shared.lock_slot();
        let state = &slot.state;
        let world = self.shared.context.world.read();
        let harvest_cache = state
            .harvest_cache
            .entries()
            .filter_map(|(resource, unit)| {
                world
                    .tech()
                    .resource_type(resource)
                    .map(|rt| HarvestCacheRecord {
                        resource: rt.name.clone(),
                        unit,
                    })
            })
            .collect();
        AiInterfaceRecord {
            tick_counter: state.tick_counter,
            faction_index: state.faction_index,
            team_index: state.team_index,
            log_redirect: state.log_redirect,
            log_level: state.log_level,
            harvest_cache,
            brain_state: slot.brain.save_state(),
        }
    }

    /// Restore state from the record saved for `faction`.
    ///
    /// Returns `Ok(false)` and leaves the interface untouched when `faction`
    /// is not the faction this interface drives or no record matches it.
    ///
    /// # Errors
    /// Returns the brain's error when its saved state can't be loaded.
    pub fn restore(&self, records: &[AiInterfaceRecord], faction: usize) -> Result<bool> {
        if faction != self.faction {
            return Ok(false);
        }
        let Some(record) = records.iter().find(|r| r.faction_index == faction) else {
            return Ok(false);
        };

        let mut slot = self.shared.lock_slot();
        if let Some(brain_state) = &record.brain_state {
            slot.brain.load_state(brain_state)?;
        }

        let state = &mut slot.state;
        state.tick_counter = record.tick_counter;
        state.team_index = record.team_index;
        state.log_redirect = record.log_redirect;
        state.log_level = record.log_level;
        state.harvest_cache.clear();
        let world = self.shared.context.world.read();
        for entry in &record.harvest_cache {
            match world.tech().resource_type_by_name(&entry.resource) {
                Some(rt) => state.harvest_cache.remember(rt.id, entry.unit),
                None => warn!(
                    faction,
                    resource = %entry.resource,
                    "Dropping harvest cache entry for unknown resource"
                ),
            }
        }
        debug!(faction, tick = record.tick_counter, "AI interface restored");
        Ok(true)
    }

    /// Stop the worker, waiting a bounded time for it to exit.
    ///
    /// Returns false if the worker was still busy and had to be detached.
    pub fn shutdown(&mut self) -> bool {
        let Some(mut worker) = self.worker.take() else {
            return true;
        };
        worker.request_shutdown();
        thread::yield_now();

        // Forcing marks a busy worker for detach; the join below stays
        // bounded either way.
        let idle = worker.can_shutdown_now(true);
        let timeout = Duration::from_millis(self.shared.config.shutdown_timeout_ms);
        let exited = worker.shutdown_and_wait(timeout);
        if exited {
            debug!(faction = self.faction, idle, "AI worker joined");
        } else {
            warn!(
                faction = self.faction,
                "AI worker did not exit in time, detaching"
            );
        }
        exited
    }
}

impl Drop for AiInterface {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::brain::IdleBrain;
    use crate::commander::LockstepCommander;
    use crate::console::MessageConsole;
    use crate::factions::ControlType;
    use crate::map::Map;
    use crate::tech::TechTree;

    fn context() -> GameContext {
        let tech = TechTree {
            name: "empty".into(),
            resource_types: Vec::new(),
            unit_types: Vec::new(),
        };
        let mut world = World::new(tech, Map::new(8, 8));
        let start = world.map_mut().add_start_location(GridPos::new(1, 1));
        world.add_faction(3, "lonely", ControlType::Cpu, start);

        let world = Arc::new(RwLock::new(world));
        let settings = Arc::new(GameSettings::default());
        GameContext {
            commander: Arc::new(LockstepCommander::new(
                Arc::clone(&world),
                Arc::clone(&settings),
            )),
            console: Arc::new(MessageConsole::default()),
            world,
            settings,
            controller: None,
        }
    }

    #[test]
    fn test_second_start_is_already_running() {
        let mut ai =
            AiInterface::new(context(), 0, AiConfig::default(), Box::new(IdleBrain)).unwrap();
        assert_eq!(ai.team_index(), 3);
        let worker = ai.worker.as_mut().unwrap();
        assert!(matches!(worker.start(), Err(GameError::AlreadyRunning(0))));
        assert_eq!(worker.run_state(), RunState::Running);
        assert!(ai.shutdown());
    }

    #[test]
    fn test_inline_interface_runs_ticks_on_caller() {
        let config = AiConfig::default().with_worker_threads(false);
        let ai = AiInterface::new(context(), 0, config, Box::new(IdleBrain)).unwrap();
        assert!(!ai.has_worker());
        ai.advance_tick(1).unwrap();
        ai.advance_tick(2).unwrap();
        assert_eq!(ai.tick_counter(), 2);
        assert!(ai.is_tick_complete(2));
        assert_eq!(ai.worker_state(), None);
    }
}
