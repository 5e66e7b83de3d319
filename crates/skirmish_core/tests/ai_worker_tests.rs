//! Worker thread and master loop tests.
//!
//! These drive real worker threads through [`Session`] and [`AiInterface`]:
//! timeouts instead of hangs, failures surfacing as fatal errors, and
//! teardown that never blocks on a finished worker.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use skirmish_core::ai::{AiBrain, AiContext, AiInterface, FnBrain, IdleBrain, RunState};
use skirmish_core::config::{AiConfig, GameSettings};
use skirmish_core::error::{GameError, Result};
use skirmish_core::session::Session;
use skirmish_test_utils::fixtures::{
    inline_config, skirmish_world, threaded_config, TestHarness,
};

// =============================================================================
// Helpers
// =============================================================================

/// A latch brains can block on until the test opens it.
#[derive(Default)]
struct Latch {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.cond.wait(&mut open);
        }
    }

    fn release(&self) {
        *self.open.lock() = true;
        self.cond.notify_all();
    }
}

fn blocking_brain(latch: &Arc<Latch>) -> Box<dyn AiBrain> {
    let latch = Arc::clone(latch);
    Box::new(FnBrain(move |_ctx: &mut AiContext<'_>| -> Result<()> {
        latch.wait();
        Ok(())
    }))
}

fn failing_brain(fail_on: u64) -> Box<dyn AiBrain> {
    Box::new(FnBrain(move |ctx: &mut AiContext<'_>| -> Result<()> {
        if ctx.tick_counter() == fail_on {
            return Err(GameError::InvalidState("brain gave up".into()));
        }
        Ok(())
    }))
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    done()
}

fn short_timeouts() -> AiConfig {
    AiConfig {
        tick_timeout_ms: 150,
        ..threaded_config()
    }
}

// =============================================================================
// Liveness
// =============================================================================

#[test]
fn test_stuck_brain_times_out_instead_of_hanging() {
    let latch = Arc::new(Latch::default());
    let mut session = Session::with_brains(
        skirmish_world(2),
        GameSettings::default(),
        short_timeouts(),
        |_| blocking_brain(&latch),
    )
    .unwrap();

    match session.tick() {
        Err(GameError::TickTimeout { tick, factions, .. }) => {
            assert_eq!(tick, 1);
            assert_eq!(factions, vec![0, 1]);
        }
        other => panic!("expected a tick timeout, got {other:?}"),
    }

    latch.release();
    assert!(session.shutdown(), "released workers should exit cleanly");
}

#[test]
fn test_worker_reports_executing_while_busy() {
    let latch = Arc::new(Latch::default());
    let harness = TestHarness::new(skirmish_world(2), GameSettings::default());
    let mut ai =
        AiInterface::new(harness.context(), 0, threaded_config(), blocking_brain(&latch)).unwrap();

    ai.advance_tick(1).unwrap();
    let worker = ai.worker().unwrap();
    assert!(wait_until(Duration::from_secs(2), || worker.is_executing()));
    assert!(!ai.is_tick_complete(1));

    latch.release();
    assert!(wait_until(Duration::from_secs(2), || ai.is_tick_complete(1)));
    assert_eq!(ai.tick_counter(), 1);
    assert!(ai.shutdown());
}

#[test]
fn test_newer_signal_supersedes_unfinished_tick() {
    let latch = Arc::new(Latch::default());
    let harness = TestHarness::new(skirmish_world(2), GameSettings::default());
    let mut ai =
        AiInterface::new(harness.context(), 0, threaded_config(), blocking_brain(&latch)).unwrap();

    ai.advance_tick(1).unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        ai.worker().is_some_and(|w| w.is_executing())
    }));
    ai.advance_tick(2).unwrap();
    latch.release();

    // Tick 1's completion lands after tick 2 replaced it and must not count
    // for either.
    assert!(wait_until(Duration::from_secs(2), || ai.is_tick_complete(2)));
    assert!(!ai.is_tick_complete(1));
    assert_eq!(ai.tick_counter(), 2);
    assert!(ai.shutdown());
}

// =============================================================================
// Shutdown
// =============================================================================

#[test]
fn test_idle_worker_shuts_down_and_reports_complete() {
    let harness = TestHarness::new(skirmish_world(2), GameSettings::default());
    let mut ai =
        AiInterface::new(harness.context(), 1, threaded_config(), Box::new(IdleBrain)).unwrap();
    assert_eq!(ai.worker_state(), Some(RunState::Running));

    ai.advance_tick(1).unwrap();
    assert!(wait_until(Duration::from_secs(2), || ai.is_tick_complete(1)));

    assert!(ai.shutdown());
    assert!(!ai.has_worker());
    // Nothing is left to wait for once the worker is gone.
    assert!(ai.is_tick_complete(2));
    assert!(ai.shutdown(), "second shutdown is a no-op");
}

#[test]
fn test_forced_shutdown_of_busy_worker_is_bounded() {
    let latch = Arc::new(Latch::default());
    let harness = TestHarness::new(skirmish_world(2), GameSettings::default());
    let config = AiConfig {
        shutdown_timeout_ms: 100,
        ..threaded_config()
    };
    let mut ai = AiInterface::new(harness.context(), 0, config, blocking_brain(&latch)).unwrap();

    ai.advance_tick(1).unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        ai.worker().is_some_and(|w| w.is_executing())
    }));

    let start = Instant::now();
    assert!(!ai.shutdown(), "a worker stuck in a tick can't be joined");
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(!ai.has_worker());

    // The detached thread finishes its tick and exits on its own.
    latch.release();
}

#[test]
fn test_dropping_session_after_tick_timeout_does_not_block() {
    let latch = Arc::new(Latch::default());
    let config = AiConfig {
        shutdown_timeout_ms: 100,
        ..short_timeouts()
    };
    let mut session = Session::with_brains(
        skirmish_world(2),
        GameSettings::default(),
        config,
        |_| blocking_brain(&latch),
    )
    .unwrap();
    assert!(matches!(
        session.tick(),
        Err(GameError::TickTimeout { .. })
    ));

    let start = Instant::now();
    drop(session);
    assert!(start.elapsed() < Duration::from_secs(3));
    latch.release();
}

#[test]
fn test_dropping_interfaces_with_live_workers_does_not_block() {
    let start = Instant::now();
    {
        let mut session =
            Session::new(skirmish_world(4), GameSettings::default(), threaded_config()).unwrap();
        session.run(5).unwrap();
    }
    assert!(start.elapsed() < Duration::from_secs(5));
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_worker_error_is_fatal_for_the_session() {
    let mut session = Session::with_brains(
        skirmish_world(2),
        GameSettings::default(),
        threaded_config(),
        |faction| {
            if faction.index == 1 {
                failing_brain(3)
            } else {
                Box::new(IdleBrain)
            }
        },
    )
    .unwrap();

    match session.run(10) {
        Err(GameError::AiFatal { faction, message }) => {
            assert_eq!(faction, 1);
            assert!(message.contains("brain gave up"), "{message}");
        }
        other => panic!("expected AiFatal, got {other:?}"),
    }
    assert_eq!(session.frame(), 3);
    let failed = session.ai(1).unwrap();
    assert_eq!(failed.worker_state(), Some(RunState::Stopped));
    assert!(failed.failure().is_some());
    assert!(session.ai(0).unwrap().failure().is_none());
}

#[test]
fn test_worker_panic_becomes_fatal_error() {
    let mut session = Session::with_brains(
        skirmish_world(2),
        GameSettings::default(),
        threaded_config(),
        |faction| {
            let faction = faction.index;
            Box::new(FnBrain(move |ctx: &mut AiContext<'_>| -> Result<()> {
                if faction == 0 && ctx.tick_counter() == 2 {
                    panic!("kaboom");
                }
                Ok(())
            }))
        },
    )
    .unwrap();

    match session.run(5) {
        Err(GameError::AiFatal { faction, message }) => {
            assert_eq!(faction, 0);
            assert!(message.contains("kaboom"), "{message}");
        }
        other => panic!("expected AiFatal, got {other:?}"),
    }
}

#[test]
fn test_inline_error_propagates_unchanged() {
    let mut session = Session::with_brains(
        skirmish_world(2),
        GameSettings::default(),
        inline_config(),
        |_| failing_brain(2),
    )
    .unwrap();

    assert!(session.tick().is_ok());
    assert!(matches!(session.tick(), Err(GameError::InvalidState(_))));
}

// =============================================================================
// Master/slave barrier
// =============================================================================

#[test]
fn test_barrier_session_runs_every_tick() {
    let config = AiConfig {
        master_slave_barrier: true,
        ..threaded_config()
    };
    let mut session = Session::new(skirmish_world(4), GameSettings::default(), config).unwrap();
    session.run(25).unwrap();
    for ai in session.ais() {
        assert_eq!(ai.tick_counter(), 25);
    }
    assert!(session.shutdown());
}

#[test]
fn test_barrier_does_not_change_outcome() {
    let barrier = AiConfig {
        master_slave_barrier: true,
        ..threaded_config()
    };
    let mut with_barrier =
        Session::new(skirmish_world(3), GameSettings::default(), barrier).unwrap();
    let mut inline =
        Session::new(skirmish_world(3), GameSettings::default(), inline_config()).unwrap();
    with_barrier.run(40).unwrap();
    inline.run(40).unwrap();
    assert_eq!(with_barrier.state_hash(), inline.state_hash());
}
