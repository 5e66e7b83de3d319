//! Property tests for the tick signal gate.

use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use skirmish_core::ai::SignalGate;
use skirmish_test_utils::determinism::strategies::{arb_gate_ops, arb_tick_sequence};

proptest! {
    #[test]
    fn prop_only_the_latest_tick_completes(ops in arb_gate_ops(48)) {
        let gate = SignalGate::new();
        let mut latest = None;
        let mut completed = false;

        for (step, op) in ops.iter().enumerate() {
            match op {
                Some(tick) => {
                    gate.signal(*tick);
                    latest = Some(*tick);
                    completed = false;
                }
                None => gate.wake(),
            }
            let Some(tick) = latest else {
                prop_assert_eq!(gate.current_tick(), None);
                continue;
            };

            // A late completion for some other tick never aliases onto this one.
            gate.mark_complete(tick.wrapping_add(1));
            prop_assert_eq!(gate.is_complete(tick), completed);

            if step % 3 == 0 {
                gate.mark_complete(tick);
                completed = true;
            }
            prop_assert_eq!(gate.is_complete(tick), completed);
            prop_assert_eq!(gate.current_tick(), Some(tick));
        }

        // Every signal and wake left exactly one permit.
        for _ in 0..ops.len() {
            gate.wait_for_signal();
        }
    }

    #[test]
    fn prop_pending_task_is_taken_once(ticks in arb_tick_sequence(32)) {
        let gate = SignalGate::new();
        for &tick in &ticks {
            gate.signal(tick);
        }
        prop_assert_eq!(gate.take_pending(), ticks.last().copied());
        prop_assert_eq!(gate.take_pending(), None);
        gate.wake();
        prop_assert_eq!(gate.take_pending(), None);
    }
}

#[test]
fn test_consumer_sees_every_signal_in_lockstep() {
    let gate = Arc::new(SignalGate::new());
    let consumer = {
        let gate = Arc::clone(&gate);
        thread::spawn(move || {
            let mut ran = Vec::new();
            while ran.len() < 50 {
                gate.wait_for_signal();
                if let Some(tick) = gate.take_pending() {
                    ran.push(tick);
                    gate.mark_complete(tick);
                }
            }
            ran
        })
    };

    for tick in 1..=50 {
        gate.signal(tick);
        while !gate.is_complete(tick) {
            thread::yield_now();
        }
    }
    let ran = consumer.join().unwrap();
    assert_eq!(ran, (1..=50).collect::<Vec<u64>>());
}
