//! Coalescing of local patches into debounced mutations.

use crate::config::millis;
use crate::patch::Patch;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatcherState {
    Idle,
    HasPendingPatches,
}

/// Buffers patches until no new one arrived for the debounce window.
///
/// The caller owns the clock: [`MutationBatcher::push`] and
/// [`MutationBatcher::poll`] take the current time in milliseconds.
#[derive(Debug)]
pub struct MutationBatcher {
    debounce: u64,
    buffer: Vec<Patch>,
    deadline: Option<u64>,
}

impl MutationBatcher {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce: millis(debounce),
            buffer: Vec::new(),
            deadline: None,
        }
    }

    pub fn state(&self) -> BatcherState {
        if self.buffer.is_empty() {
            BatcherState::Idle
        } else {
            BatcherState::HasPendingPatches
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Buffers `patch` and re-arms the timer.
    pub fn push(&mut self, patch: Patch, now: u64) {
        self.buffer.push(patch);
        self.deadline = Some(now + self.debounce);
    }

    /// Returns the buffered patches once the timer expired. While the tree
    /// is normalizing the batch is held back until a later poll.
    pub fn poll(&mut self, now: u64, normalizing: bool) -> Option<Vec<Patch>> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }
        if normalizing {
            debug!("mutation: tree is normalizing, deferring flush");
            return None;
        }
        Some(self.flush())
    }

    /// Takes the buffer regardless of the timer.
    pub fn flush(&mut self) -> Vec<Patch> {
        self.deadline = None;
        let patches = std::mem::take(&mut self.buffer);
        debug!(patches = patches.len(), "mutation: flushing batch");
        patches
    }
}
