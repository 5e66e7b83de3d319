//! Background thread running one faction's AI ticks.
//!
//! The worker owns nothing of the facade: it keeps a [`Weak`] handle that is
//! upgraded before every tick and cleared when shutdown is requested. A tick
//! already in flight keeps the facade alive until it returns; no later tick
//! can reach it.
//!
//! Errors and panics inside the loop end the thread. They are logged, kept
//! as an [`AiFailure`] for the owning layer to poll, and returned from the
//! thread as [`GameError::AiFatal`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use super::barrier::MasterSlaveController;
use super::interface::AiShared;
use super::signal_gate::{SignalGate, TickIndex};
use crate::error::{GameError, Result};

/// Lifecycle of a worker. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    /// Created, not started.
    Idle = 0,
    /// Loop running.
    Running = 1,
    /// Shutdown requested, loop may still be finishing a tick.
    ShuttingDown = 2,
    /// Loop exited.
    Stopped = 3,
}

impl RunState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::ShuttingDown,
            _ => Self::Stopped,
        }
    }
}

/// A fatal AI error reported by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiFailure {
    /// Faction whose AI failed.
    pub faction: usize,
    /// Error description.
    pub message: String,
}

impl From<AiFailure> for GameError {
    fn from(failure: AiFailure) -> Self {
        GameError::AiFatal {
            faction: failure.faction,
            message: failure.message,
        }
    }
}

struct WorkerShared {
    faction: usize,
    gate: SignalGate,
    quit: AtomicBool,
    executing: AtomicBool,
    state: AtomicU8,
    target: Mutex<Option<Weak<AiShared>>>,
    failure: Mutex<Option<AiFailure>>,
}

impl WorkerShared {
    fn run_state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn quitting(&self) -> bool {
        self.quit.load(Ordering::Acquire)
    }

    fn target(&self) -> Option<Arc<AiShared>> {
        self.target.lock().as_ref().and_then(Weak::upgrade)
    }

    /// Sever the facade handle. Never waits on the facade lock: a tick in
    /// flight holds its own strong handle and finishes against it.
    fn detach(&self) {
        *self.target.lock() = None;
    }
}

/// Marks the worker stopped however the loop exits.
struct RunningGuard<'a>(&'a WorkerShared);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.executing.store(false, Ordering::Release);
        self.0
            .state
            .store(RunState::Stopped as u8, Ordering::Release);
    }
}

struct ExecutingGuard<'a>(&'a AtomicBool);

impl<'a> ExecutingGuard<'a> {
    fn new(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for ExecutingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Per-faction AI worker thread.
pub struct AiWorker {
    shared: Arc<WorkerShared>,
    controller: Option<Arc<MasterSlaveController>>,
    barrier_timeout: Duration,
    handle: Option<JoinHandle<Result<()>>>,
    detach_on_exit: bool,
}

impl AiWorker {
    pub(crate) fn new(
        target: &Arc<AiShared>,
        faction: usize,
        controller: Option<Arc<MasterSlaveController>>,
        barrier_timeout: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(WorkerShared {
                faction,
                gate: SignalGate::new(),
                quit: AtomicBool::new(false),
                executing: AtomicBool::new(false),
                state: AtomicU8::new(RunState::Idle as u8),
                target: Mutex::new(Some(Arc::downgrade(target))),
                failure: Mutex::new(None),
            }),
            controller,
            barrier_timeout,
            handle: None,
            detach_on_exit: false,
        }
    }

    /// Spawn the execution loop.
    ///
    /// # Errors
    /// `AlreadyRunning` if the worker was started before.
    pub fn start(&mut self) -> Result<()> {
        let faction = self.shared.faction;
        self.shared
            .state
            .compare_exchange(
                RunState::Idle as u8,
                RunState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| GameError::AlreadyRunning(faction))?;

        let shared = Arc::clone(&self.shared);
        let controller = self.controller.clone();
        let barrier_timeout = self.barrier_timeout;
        let spawned = thread::Builder::new()
            .name(format!("ai-faction-{faction}"))
            .spawn(move || run(&shared, controller.as_deref(), barrier_timeout));

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared
                    .state
                    .store(RunState::Stopped as u8, Ordering::Release);
                Err(GameError::InvalidState(format!(
                    "Failed to spawn AI worker for faction {faction}: {e}"
                )))
            }
        }
    }

    /// Hand tick `tick` to the worker.
    pub fn signal(&self, tick: TickIndex) {
        self.shared.gate.signal(tick);
    }

    /// Whether `tick` has completed. Always true once the loop is gone.
    #[must_use]
    pub fn is_signal_completed(&self, tick: TickIndex) -> bool {
        if !self.is_running() {
            return true;
        }
        self.shared.gate.is_complete(tick)
    }

    /// Whether the loop is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(
            self.shared.run_state(),
            RunState::Running | RunState::ShuttingDown
        )
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn run_state(&self) -> RunState {
        self.shared.run_state()
    }

    /// Whether a tick is being executed right now.
    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.shared.executing.load(Ordering::Acquire)
    }

    /// The failure that ended the loop, if any.
    #[must_use]
    pub fn failure(&self) -> Option<AiFailure> {
        self.shared.failure.lock().clone()
    }

    /// Ask the loop to stop and detach it from the facade.
    pub fn request_shutdown(&self) {
        self.shared.quit.store(true, Ordering::Release);
        let _ = self.shared.state.compare_exchange(
            RunState::Running as u8,
            RunState::ShuttingDown as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.shared.detach();
        self.shared.gate.wake();
    }

    /// True if no tick is executing.
    ///
    /// When busy and `force_if_busy` is set, the worker is marked to be
    /// detached on drop (the thread cleans up after its in-flight tick) and
    /// shutdown is requested. Never blocks on the tick itself.
    pub fn can_shutdown_now(&mut self, force_if_busy: bool) -> bool {
        let idle = !self.is_executing();
        if !idle && force_if_busy {
            self.detach_on_exit = true;
            self.request_shutdown();
        }
        idle
    }

    /// Request shutdown and join the thread.
    ///
    /// Returns false if the thread panicked outside the loop's own recovery.
    pub fn shutdown_and_join(&mut self) -> bool {
        self.request_shutdown();
        match self.handle.take() {
            Some(handle) => handle.join().is_ok(),
            None => true,
        }
    }

    /// Request shutdown and join if the thread exits within `timeout`.
    pub fn shutdown_and_wait(&mut self, timeout: Duration) -> bool {
        self.request_shutdown();
        let deadline = Instant::now() + timeout;
        loop {
            match self.handle.as_ref() {
                None => return true,
                Some(handle) if handle.is_finished() => {
                    return self.handle.take().map_or(true, |h| h.join().is_ok());
                }
                Some(_) if Instant::now() >= deadline => return false,
                Some(_) => thread::sleep(Duration::from_millis(1)),
            }
        }
    }
}

impl Drop for AiWorker {
    fn drop(&mut self) {
        self.request_shutdown();
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.is_finished() {
            let _ = handle.join();
        } else if !self.detach_on_exit {
            warn!(
                faction = self.shared.faction,
                "AI worker still busy at teardown, detaching"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "AI update panicked".to_string()
    }
}

fn run(
    shared: &WorkerShared,
    controller: Option<&MasterSlaveController>,
    barrier_timeout: Duration,
) -> Result<()> {
    let _running = RunningGuard(shared);
    let faction = shared.faction;
    debug!(faction, "AI worker started");

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        execute(shared, controller, barrier_timeout)
    }))
    .unwrap_or_else(|payload| {
        Err(GameError::AiFatal {
            faction,
            message: panic_message(payload.as_ref()),
        })
    });

    match outcome {
        Ok(()) => {
            debug!(faction, "AI worker stopped");
            Ok(())
        }
        Err(e) => {
            error!(faction, error = %e, "AI worker failed");
            let fatal = match e {
                GameError::AiFatal { .. } => e,
                other => GameError::AiFatal {
                    faction,
                    message: other.to_string(),
                },
            };
            if let GameError::AiFatal { message, .. } = &fatal {
                *shared.failure.lock() = Some(AiFailure {
                    faction,
                    message: message.clone(),
                });
            }
            Err(fatal)
        }
    }
}

fn execute(
    shared: &WorkerShared,
    controller: Option<&MasterSlaveController>,
    barrier_timeout: Duration,
) -> Result<()> {
    loop {
        if shared.quitting() {
            break;
        }
        shared.gate.wait_for_signal();
        if shared.quitting() {
            break;
        }

        // Wake-ups without a task (shutdown, superseded signals) must not
        // count down a barrier round.
        let Some(tick) = shared.gate.take_pending() else {
            continue;
        };

        let slave = match controller {
            Some(c) => Some(c.enter(shared.faction, barrier_timeout)?),
            None => None,
        };
        if shared.quitting() {
            break;
        }

        let Some(ai) = shared.target() else {
            break;
        };
        {
            // Cleared before the facade lock is released, so anyone who
            // takes the lock after a tick never sees a stale busy flag.
            let mut slot = ai.lock_slot();
            let _executing = ExecutingGuard::new(&shared.executing);
            ai.update(&mut slot)?;
        }
        drop(ai);

        // Trigger the master before publishing completion so the next round
        // can never be counted down by this tick.
        drop(slave);
        shared.gate.mark_complete(tick);
    }
    Ok(())
}
