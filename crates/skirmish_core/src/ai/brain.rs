//! The decision-making seam plugged into an AI interface.

use super::context::AiContext;
use crate::error::Result;

/// Per-faction AI logic.
///
/// `update` runs once per tick with the facade lock held, either on the
/// faction's worker thread or inline on the master thread. Everything the
/// brain learns about the game goes through the [`AiContext`].
pub trait AiBrain: Send {
    /// Called once when the interface is created.
    fn init(&mut self, _ctx: &mut AiContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Think for one tick.
    fn update(&mut self, ctx: &mut AiContext<'_>) -> Result<()>;

    /// Serialized brain state for save games.
    fn save_state(&self) -> Option<String> {
        None
    }

    /// Restore state produced by [`AiBrain::save_state`].
    fn load_state(&mut self, _state: &str) -> Result<()> {
        Ok(())
    }
}

/// Brain built from a closure, for tests and tools.
pub struct FnBrain<F>(pub F);

impl<F> AiBrain for FnBrain<F>
where
    F: FnMut(&mut AiContext<'_>) -> Result<()> + Send,
{
    fn update(&mut self, ctx: &mut AiContext<'_>) -> Result<()> {
        (self.0)(ctx)
    }
}

/// Brain that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdleBrain;

impl AiBrain for IdleBrain {
    fn update(&mut self, _ctx: &mut AiContext<'_>) -> Result<()> {
        Ok(())
    }
}
