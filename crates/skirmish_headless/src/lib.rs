//! Headless skirmish runner for AI soak testing and CI verification.
//!
//! This crate drives [`skirmish_core::session::Session`] without graphics:
//!
//! - **Single runs**: play a scenario for N frames, optionally saving or
//!   resuming, and report the final state as JSON
//! - **Batches**: many games in parallel, inline and threaded AI mixed
//! - **Verification**: check that worker threads and save/reload leave the
//!   outcome bit-identical
//!
//! # Example
//!
//! ```bash
//! cargo run -p skirmish_headless -- run --scenario skirmish_1v1
//! cargo run -p skirmish_headless -- verify --scenario skirmish_ffa4 --frames 600
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod batch;
pub mod runner;
pub mod scenario;
pub mod verify;

pub use batch::{run_batch, BatchConfig, BatchResults, BatchSummary, ThreadMode};
pub use runner::{run_game, FactionReport, GameConfig, GameReport, RunError};
pub use scenario::{Scenario, ScenarioError};
pub use verify::{verify, VerifyReport};
