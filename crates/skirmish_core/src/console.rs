//! In-game message console.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// Default number of lines a [`MessageConsole`] keeps.
pub const DEFAULT_CONSOLE_LINES: usize = 256;

/// Line-oriented sink for messages shown to the player.
pub trait Console: Send + Sync {
    /// Append a line.
    fn add_line(&self, line: &str);
}

/// Console keeping the most recent lines in memory.
pub struct MessageConsole {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl MessageConsole {
    /// Console holding at most `capacity` lines.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    /// Copy of the stored lines, oldest first.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }
}

impl Default for MessageConsole {
    fn default() -> Self {
        Self::new(DEFAULT_CONSOLE_LINES)
    }
}

impl Console for MessageConsole {
    fn add_line(&self, line: &str) {
        let mut lines = self.lines.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_drops_oldest() {
        let console = MessageConsole::new(2);
        console.add_line("a");
        console.add_line("b");
        console.add_line("c");
        assert_eq!(console.lines(), vec!["b".to_string(), "c".to_string()]);
    }
}
