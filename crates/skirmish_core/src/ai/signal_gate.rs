//! Single-slot tick rendezvous between the master loop and one AI worker.
//!
//! The gate holds exactly one tick index. A new signal overwrites the slot
//! instead of queueing behind it, so a worker that falls behind only ever
//! sees the latest tick. Wake-ups are counted like a semaphore: every
//! `signal` or `wake` satisfies exactly one `wait_for_signal`, even when the
//! slot content did not change.
//!
//! Exactly one producer (the master loop) and one consumer (the worker) may
//! use a gate.

use parking_lot::{Condvar, Mutex};

/// Index of a simulation tick.
pub type TickIndex = u64;

#[derive(Debug, Default)]
struct Slot {
    tick: Option<TickIndex>,
    completed: bool,
    pending: bool,
    permits: usize,
}

/// Tick signal slot with counting wake-ups.
#[derive(Debug, Default)]
pub struct SignalGate {
    slot: Mutex<Slot>,
    wake: Condvar,
}

impl SignalGate {
    /// Create an empty gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `tick`, clear its completion and release one waiter.
    pub fn signal(&self, tick: TickIndex) {
        let mut slot = self.slot.lock();
        slot.tick = Some(tick);
        slot.completed = false;
        slot.pending = true;
        slot.permits += 1;
        drop(slot);
        self.wake.notify_one();
    }

    /// Release one waiter without storing a tick.
    pub fn wake(&self) {
        self.slot.lock().permits += 1;
        self.wake.notify_one();
    }

    /// Block until a permit is available, then consume it.
    pub fn wait_for_signal(&self) {
        let mut slot = self.slot.lock();
        while slot.permits == 0 {
            self.wake.wait(&mut slot);
        }
        slot.permits -= 1;
    }

    /// Read and clear the pending-task flag, returning the tick to run.
    pub fn take_pending(&self) -> Option<TickIndex> {
        let mut slot = self.slot.lock();
        if slot.pending {
            slot.pending = false;
            slot.tick
        } else {
            None
        }
    }

    /// Mark `tick` complete, unless a newer tick has replaced it.
    pub fn mark_complete(&self, tick: TickIndex) {
        let mut slot = self.slot.lock();
        if slot.tick == Some(tick) {
            slot.completed = true;
        }
    }

    /// Whether `tick` is the stored tick and has completed.
    #[must_use]
    pub fn is_complete(&self, tick: TickIndex) -> bool {
        let slot = self.slot.lock();
        slot.tick == Some(tick) && slot.completed
    }

    /// Tick currently stored.
    #[must_use]
    pub fn current_tick(&self) -> Option<TickIndex> {
        self.slot.lock().tick
    }
}
