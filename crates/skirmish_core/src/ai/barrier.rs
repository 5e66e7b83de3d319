//! Master/slave barrier bounding how AI workers run against the master loop.
//!
//! The master opens a round for N slaves, signals them, and waits until each
//! slave has triggered it. A slave may only start work inside an open round
//! and waits a bounded time for one; running past that bound means the
//! master and its workers disagree about the tick protocol, which is fatal.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{GameError, Result};

#[derive(Debug, Default)]
struct Round {
    open: bool,
    outstanding: usize,
    generation: u64,
}

/// Coordination point shared by the master loop and its AI workers.
#[derive(Debug, Default)]
pub struct MasterSlaveController {
    round: Mutex<Round>,
    changed: Condvar,
}

impl MasterSlaveController {
    /// Create a controller with no open round.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a round expecting `slaves` triggers.
    pub fn signal_slaves(&self, slaves: usize) {
        let mut round = self.round.lock();
        round.outstanding = slaves;
        round.open = slaves > 0;
        round.generation += 1;
        drop(round);
        self.changed.notify_all();
    }

    /// Wait until every slave of the current round has triggered.
    ///
    /// Returns false if `timeout` elapsed first.
    pub fn wait_till_slaves_trigger(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut round = self.round.lock();
        while round.open {
            if self.changed.wait_until(&mut round, deadline).timed_out() {
                return !round.open;
            }
        }
        true
    }

    /// Rounds opened so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.round.lock().generation
    }

    /// Join the open round as a slave, waiting at most `timeout` for one.
    ///
    /// The returned guard triggers the master when dropped.
    pub fn enter(&self, faction: usize, timeout: Duration) -> Result<SlaveGuard<'_>> {
        let timed_out = || GameError::BarrierTimeout {
            faction,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        };
        let deadline = Instant::now() + timeout;
        let mut round = self
            .round
            .try_lock_for(timeout)
            .ok_or_else(|| timed_out())?;
        while !round.open {
            if self.changed.wait_until(&mut round, deadline).timed_out() && !round.open {
                return Err(timed_out());
            }
        }
        Ok(SlaveGuard { controller: self })
    }

    fn trigger_master(&self) {
        let mut round = self.round.lock();
        round.outstanding = round.outstanding.saturating_sub(1);
        if round.outstanding == 0 {
            round.open = false;
        }
        drop(round);
        self.changed.notify_all();
    }
}

/// Slave membership in an open round.
#[derive(Debug)]
pub struct SlaveGuard<'a> {
    controller: &'a MasterSlaveController,
}

impl Drop for SlaveGuard<'_> {
    fn drop(&mut self) {
        self.controller.trigger_master();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_enter_times_out_without_round() {
        let controller = MasterSlaveController::new();
        let err = controller.enter(3, Duration::from_millis(10)).unwrap_err();
        assert!(matches!(
            err,
            GameError::BarrierTimeout {
                faction: 3,
                timeout_ms: 10
            }
        ));
    }

    #[test]
    fn test_round_closes_after_all_slaves_trigger() {
        let controller = Arc::new(MasterSlaveController::new());
        controller.signal_slaves(2);

        let slaves: Vec<_> = (0..2)
            .map(|faction| {
                let controller = Arc::clone(&controller);
                thread::spawn(move || {
                    let _guard = controller.enter(faction, Duration::from_secs(5))?;
                    Ok::<(), GameError>(())
                })
            })
            .collect();

        assert!(controller.wait_till_slaves_trigger(Duration::from_secs(5)));
        for slave in slaves {
            slave.join().unwrap().unwrap();
        }
        assert_eq!(controller.generation(), 1);
    }

    #[test]
    fn test_master_wait_times_out_on_missing_slave() {
        let controller = MasterSlaveController::new();
        controller.signal_slaves(2);
        {
            let _guard = controller.enter(0, Duration::from_millis(50)).unwrap();
        }
        assert!(!controller.wait_till_slaves_trigger(Duration::from_millis(20)));
    }

    #[test]
    fn test_empty_round_is_already_closed() {
        let controller = MasterSlaveController::new();
        controller.signal_slaves(0);
        assert!(controller.wait_till_slaves_trigger(Duration::from_millis(1)));
    }
}
