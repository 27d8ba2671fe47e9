//! Synchronization of externally owned values into the internal tree.
//!
//! [`SyncMachine`] decides *when* an incoming value is reconciled: at once
//! when nothing is being edited, otherwise after a quiescence window, and
//! never while another pass runs. [`Reconciler`] does the work of one pass.

use crate::config::millis;
use crate::model::Value;
use std::time::Duration;
use tracing::debug;

mod reconcile;

pub use reconcile::Reconciler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    /// Edits are in flight; the newest value waits in the pending slot.
    Busy,
    Syncing,
}

/// A value the caller must reconcile now.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncJob {
    pub value: Option<Value>,
}

#[derive(Debug)]
pub struct SyncMachine {
    state: SyncState,
    quiescence: u64,
    pending: Option<SyncJob>,
    deadline: Option<u64>,
    baseline: Option<Value>,
}

impl SyncMachine {
    pub fn new(quiescence: Duration) -> Self {
        Self {
            state: SyncState::Idle,
            quiescence: millis(quiescence),
            pending: None,
            deadline: None,
            baseline: None,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// The last value a pass processed; an absent value is recorded as an
    /// empty one. `None` before the first pass.
    pub fn baseline(&self) -> Option<&Value> {
        self.baseline.as_ref()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Offers a new value. Returns a job when the value should be reconciled
    /// right away.
    pub fn update_value(&mut self, value: Option<Value>, now: u64, edits_in_flight: bool) -> Option<SyncJob> {
        let job = SyncJob { value };
        match self.state {
            SyncState::Idle if !edits_in_flight => {
                debug!("sync: idle -> syncing");
                self.state = SyncState::Syncing;
                Some(job)
            }
            SyncState::Idle => {
                debug!(deadline = now + self.quiescence, "sync: idle -> busy");
                self.state = SyncState::Busy;
                self.pending = Some(job);
                self.deadline = Some(now + self.quiescence);
                None
            }
            SyncState::Busy | SyncState::Syncing => {
                if self.pending.is_some() {
                    debug!("sync: superseding pending value");
                }
                self.pending = Some(job);
                None
            }
        }
    }

    /// Checks the quiescence timer. Returns the pending job once it expired
    /// with no edit in flight, otherwise re-arms the timer.
    pub fn poll(&mut self, now: u64, edits_in_flight: bool) -> Option<SyncJob> {
        if self.state != SyncState::Busy || self.deadline.is_some_and(|deadline| now < deadline) {
            return None;
        }
        if edits_in_flight {
            debug!("sync: edits still in flight, re-arming");
            self.deadline = Some(now + self.quiescence);
            return None;
        }
        debug!("sync: busy -> syncing");
        self.state = SyncState::Syncing;
        self.deadline = None;
        self.pending.take()
    }

    /// Completes a pass over `processed`. A value deferred during the pass
    /// is offered again against the new baseline.
    pub fn finish(&mut self, processed: Option<Value>, now: u64, edits_in_flight: bool) -> Option<SyncJob> {
        debug!("sync: syncing -> idle");
        self.baseline = Some(processed.unwrap_or_default());
        self.state = SyncState::Idle;
        let deferred = self.pending.take()?;
        self.update_value(deferred.value, now, edits_in_flight)
    }
}
