//! Per-faction AI interfaces and the threading that drives them.
//!
//! - [`signal_gate`] - single-slot tick rendezvous with counted wake-ups
//! - [`barrier`] - optional master/slave barrier bounding worker rounds
//! - [`worker`] - the background thread running one faction's ticks
//! - [`interface`] - the lock-guarded facade an AI brain runs behind
//! - [`context`] - queries and commands a brain uses during a tick
//! - [`brain`] / [`basic`] - the brain seam and a rule-based implementation

pub mod barrier;
pub mod basic;
pub mod brain;
pub mod context;
pub mod harvest_cache;
pub mod interface;
pub mod persist;
pub mod signal_gate;
pub mod worker;

pub use barrier::{MasterSlaveController, SlaveGuard};
pub use basic::{BasicAi, BasicAiSettings};
pub use brain::{AiBrain, FnBrain, IdleBrain};
pub use context::{AiContext, AiOrder, CommandSpec, OrderTarget, SightedEnemy, UnitRef};
pub use harvest_cache::HarvestCache;
pub use interface::{AiInterface, GameContext};
pub use persist::{AiInterfaceRecord, HarvestCacheRecord};
pub use signal_gate::{SignalGate, TickIndex};
pub use worker::{AiFailure, AiWorker, RunState};
