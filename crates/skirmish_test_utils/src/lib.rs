//! # Skirmish Test Utilities
//!
//! Shared testing utilities for all crates:
//! - Fixture worlds, tech tree and AI interface wiring
//! - Determinism harness (inline versus threaded, save and resume)
//! - Property-based testing strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod determinism;
pub mod fixtures;

/// Re-export proptest for convenience.
pub use proptest;
