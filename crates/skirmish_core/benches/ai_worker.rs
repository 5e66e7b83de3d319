//! AI interface benchmarks for skirmish_core.
//!
//! Run with: `cargo bench -p skirmish_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use skirmish_core::ai::SignalGate;
use skirmish_core::config::GameSettings;
use skirmish_core::session::Session;
use skirmish_test_utils::fixtures::{inline_config, skirmish_world, threaded_config};

/// Round trip of one tick through a gate with a live consumer thread.
pub fn signal_gate_benchmark(c: &mut Criterion) {
    let gate = Arc::new(SignalGate::new());
    let consumer = {
        let gate = Arc::clone(&gate);
        thread::spawn(move || loop {
            gate.wait_for_signal();
            match gate.take_pending() {
                Some(0) => break,
                Some(tick) => gate.mark_complete(tick),
                None => {}
            }
        })
    };

    let mut tick = 0u64;
    c.bench_function("signal_gate_round_trip", |b| {
        b.iter(|| {
            tick += 1;
            gate.signal(tick);
            while !gate.is_complete(black_box(tick)) {
                thread::yield_now();
            }
        })
    });

    gate.signal(0);
    let _ = consumer.join();
}

/// One session frame with four basic AIs, inline versus threaded.
pub fn session_tick_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_tick");
    for (name, config) in [("inline", inline_config()), ("threaded", threaded_config())] {
        let mut session = Session::new(skirmish_world(4), GameSettings::default(), config)
            .expect("session");
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter(|| session.tick().expect("tick"));
        });
        session.shutdown();
    }
    group.finish();
}

criterion_group!(benches, signal_gate_benchmark, session_tick_benchmark);
criterion_main!(benches);
