//! Engine configuration.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long an incoming value waits for local edits to settle before it
    /// is reconciled anyway.
    pub sync_quiescence: Duration,
    /// Debounce window for coalescing local patches into one mutation.
    pub mutation_debounce: Duration,
    pub read_only: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sync_quiescence: Duration::from_millis(1000),
            mutation_debounce: Duration::from_millis(1000),
            read_only: false,
        }
    }
}

impl EngineConfig {
    /// Short windows for tests.
    pub fn testing() -> Self {
        Self {
            sync_quiescence: Duration::from_millis(10),
            mutation_debounce: Duration::from_millis(10),
            ..Self::default()
        }
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

/// Milliseconds of a duration, saturating at `u64::MAX`.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
