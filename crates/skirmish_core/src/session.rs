//! Master loop driving the world and every AI interface.
//!
//! One frame:
//! 1. open a barrier round for the threaded interfaces, if configured
//! 2. hand the tick to every interface (threaded ones are signalled, the
//!    rest run inline)
//! 3. wait, bounded, until every interface reports the tick complete
//! 4. surface any worker failure as [`GameError::AiFatal`]
//! 5. apply held network commands and advance the world
//!
//! The master never holds the world lock while it waits on AI ticks, and
//! never takes a facade lock while holding the world lock.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, info, trace, warn};

use crate::ai::{
    AiBrain, AiInterface, BasicAi, BasicAiSettings, GameContext, MasterSlaveController,
};
use crate::commander::{Commander, LockstepCommander};
use crate::config::{AiConfig, GameSettings};
use crate::console::{Console, MessageConsole};
use crate::error::{GameError, Result};
use crate::factions::Faction;
use crate::save::SaveGame;
use crate::world::World;

/// Spins before the completion wait starts sleeping.
const SPIN_LIMIT: u32 = 64;

/// A running game.
pub struct Session {
    world: Arc<RwLock<World>>,
    settings: Arc<GameSettings>,
    commander: Arc<LockstepCommander>,
    console: Arc<MessageConsole>,
    controller: Option<Arc<MasterSlaveController>>,
    config: AiConfig,
    ais: Vec<AiInterface>,
    frame: u64,
}

impl Session {
    /// Session with a [`BasicAi`] for every faction this peer controls.
    ///
    /// # Errors
    /// Returns an error if an AI interface can't be created.
    pub fn new(world: World, settings: GameSettings, config: AiConfig) -> Result<Self> {
        Self::with_brains(world, settings, config, |_| {
            Box::new(BasicAi::new(BasicAiSettings::default()))
        })
    }

    /// Session with brains from `make_brain` for every faction this peer
    /// controls.
    ///
    /// # Errors
    /// Returns an error if an AI interface can't be created.
    pub fn with_brains<F>(
        world: World,
        settings: GameSettings,
        config: AiConfig,
        mut make_brain: F,
    ) -> Result<Self>
    where
        F: FnMut(&Faction) -> Box<dyn AiBrain>,
    {
        let ai_factions: Vec<Faction> = world
            .factions()
            .iter()
            .filter(|f| {
                f.cpu_control(
                    settings.server_controlled_ai,
                    settings.network_game,
                    settings.role,
                )
            })
            .cloned()
            .collect();

        let world = Arc::new(RwLock::new(world));
        let settings = Arc::new(settings);
        let commander = Arc::new(LockstepCommander::new(
            Arc::clone(&world),
            Arc::clone(&settings),
        ));
        let console = Arc::new(MessageConsole::default());
        let controller = config
            .master_slave_barrier
            .then(|| Arc::new(MasterSlaveController::new()));

        let mut session = Self {
            world,
            settings,
            commander,
            console,
            controller,
            config,
            ais: Vec::with_capacity(ai_factions.len()),
            frame: 0,
        };
        for faction in &ai_factions {
            let ai = AiInterface::new(
                session.context(),
                faction.index,
                session.config.clone(),
                make_brain(faction),
            )?;
            session.ais.push(ai);
        }
        info!(
            ai_factions = session.ais.len(),
            threaded = session.config.worker_threads,
            "Session created"
        );
        Ok(session)
    }

    /// Rebuild a session from a save, with a [`BasicAi`] per AI faction.
    ///
    /// # Errors
    /// Returns an error if an interface can't be created or restored.
    pub fn from_save(save: SaveGame, config: AiConfig) -> Result<Self> {
        Self::from_save_with_brains(save, config, |_| {
            Box::new(BasicAi::new(BasicAiSettings::default()))
        })
    }

    /// Rebuild a session from a save with brains from `make_brain`.
    ///
    /// # Errors
    /// Returns an error if an interface can't be created or restored.
    pub fn from_save_with_brains<F>(save: SaveGame, config: AiConfig, make_brain: F) -> Result<Self>
    where
        F: FnMut(&Faction) -> Box<dyn AiBrain>,
    {
        let SaveGame {
            frame,
            settings,
            world,
            ai_interfaces,
            ..
        } = save;
        let mut session = Self::with_brains(world, settings, config, make_brain)?;
        session.frame = frame;
        for ai in &session.ais {
            if !ai.restore(&ai_interfaces, ai.faction_index())? {
                warn!(
                    faction = ai.faction_index(),
                    "No saved AI state for faction"
                );
            }
        }
        Ok(session)
    }

    /// Services handed to AI interfaces.
    #[must_use]
    pub fn context(&self) -> GameContext {
        GameContext {
            world: Arc::clone(&self.world),
            commander: Arc::clone(&self.commander) as Arc<dyn Commander>,
            console: Arc::clone(&self.console) as Arc<dyn Console>,
            settings: Arc::clone(&self.settings),
            controller: self.controller.clone(),
        }
    }

    /// The shared world.
    #[must_use]
    pub fn world(&self) -> &Arc<RwLock<World>> {
        &self.world
    }

    /// Session settings.
    #[must_use]
    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    /// The in-game console.
    #[must_use]
    pub fn console(&self) -> &MessageConsole {
        &self.console
    }

    /// AI interfaces in faction order.
    #[must_use]
    pub fn ais(&self) -> &[AiInterface] {
        &self.ais
    }

    /// Interface driving `faction`.
    #[must_use]
    pub fn ai(&self, faction: usize) -> Option<&AiInterface> {
        self.ais.iter().find(|ai| ai.faction_index() == faction)
    }

    /// Frames run so far.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Hash of the world state.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        self.world.read().state_hash()
    }

    /// Run one frame.
    ///
    /// # Errors
    /// - the error of an inline AI tick
    /// - `AiFatal` if a worker died
    /// - `TickTimeout` if workers did not finish in time
    pub fn tick(&mut self) -> Result<()> {
        self.frame += 1;
        let frame = self.frame;

        if let Some(controller) = &self.controller {
            let threaded = self.ais.iter().filter(|ai| ai.has_worker()).count();
            controller.signal_slaves(threaded);
        }
        for ai in &self.ais {
            ai.advance_tick(frame)?;
        }

        let timeout = Duration::from_millis(self.config.tick_timeout_ms);
        if let Some(controller) = &self.controller {
            if !controller.wait_till_slaves_trigger(timeout) {
                warn!(frame, "Barrier round did not close in time");
            }
        }
        self.wait_for_ticks(frame, timeout)?;

        let applied = self.commander.flush();
        for vote in self.commander.take_votes() {
            self.console.add_line(&format!(
                "Faction {} votes {} on faction {} joining team {}",
                vote.faction,
                if vote.allow { "yes" } else { "no" },
                vote.requesting_faction,
                vote.team
            ));
        }
        self.world.write().update();
        trace!(frame, applied, "Frame complete");
        Ok(())
    }

    /// Run `frames` frames.
    ///
    /// # Errors
    /// Stops at the first failing frame; see [`Session::tick`].
    pub fn run(&mut self, frames: u64) -> Result<()> {
        for _ in 0..frames {
            self.tick()?;
        }
        Ok(())
    }

    fn wait_for_ticks(&self, frame: u64, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut spins = 0u32;
        loop {
            // Completion first: a dead worker reports its failure before it
            // reports every tick complete.
            let busy: Vec<usize> = self
                .ais
                .iter()
                .filter(|ai| !ai.is_tick_complete(frame))
                .map(AiInterface::faction_index)
                .collect();
            if let Some(failure) = self.ais.iter().find_map(AiInterface::failure) {
                return Err(failure.into());
            }
            if busy.is_empty() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(GameError::TickTimeout {
                    tick: frame,
                    factions: busy,
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
            if spins < SPIN_LIMIT {
                spins += 1;
                thread::yield_now();
            } else {
                thread::sleep(Duration::from_micros(200));
            }
        }
    }

    /// Snapshot the world and every AI interface.
    #[must_use]
    pub fn save(&self) -> SaveGame {
        let ai_interfaces = self.ais.iter().map(AiInterface::persist).collect();
        let world = self.world.read().clone();
        SaveGame::new(
            self.frame,
            (*self.settings).clone(),
            world,
            ai_interfaces,
        )
    }

    /// Stop every AI worker. Returns false if any had to be detached.
    pub fn shutdown(&mut self) -> bool {
        let mut clean = true;
        for ai in &mut self.ais {
            clean &= ai.shutdown();
        }
        debug!(frame = self.frame, clean, "Session shut down");
        clean
    }
}
