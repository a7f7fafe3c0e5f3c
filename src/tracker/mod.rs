//! Failure tracker: sliding-window failure ledger plus restart backoff.
//!
//! Owned by the healing dispatcher; nothing here is global. All time reads go
//! through the injected [`Clock`](crate::clock::Clock).

pub mod backoff;
pub mod ledger;

pub use backoff::{BackoffState, BASE_WAIT_SECS, MAX_MULTIPLIER, MAX_WAIT_SECS};
pub use ledger::{FailureEvent, FailureKind, FailureLedger};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::clock::SharedClock;

/// Rolling window over which failures are counted.
pub const FAILURE_WINDOW: Duration = Duration::hours(1);

/// Point-in-time view of one entity's tracker state.
#[derive(Debug, Clone, Serialize)]
pub struct TrackerSnapshot {
    pub restart_count: u32,
    pub multiplier: u32,
    pub last_restart: Option<DateTime<Utc>>,
    pub backoff_remaining_secs: i64,
    pub failures_last_hour: Vec<(FailureKind, usize)>,
}

/// Records failures and gates restarts for every supervised entity.
pub struct FailureTracker {
    clock: SharedClock,
    ledger: FailureLedger,
    backoff: HashMap<String, BackoffState>,
}

impl FailureTracker {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            ledger: FailureLedger::new(FAILURE_WINDOW),
            backoff: HashMap::new(),
        }
    }

    /// Record a failure at the current time.
    pub fn record_failure(&mut self, entity: &str, kind: FailureKind) {
        let at = self.clock.now();
        self.ledger.append(FailureEvent {
            entity: entity.to_string(),
            kind,
            at,
        });
        debug!(entity, kind = %kind, "Failure recorded");
    }

    /// Failures of `kind` for `entity` in the trailing window.
    pub fn failure_count(&mut self, entity: &str, kind: FailureKind) -> usize {
        let now = self.clock.now();
        self.ledger.count(entity, kind, now)
    }

    /// Admission gate: true when no restart has been recorded yet or the
    /// backoff wait since the last one has elapsed.
    pub fn should_restart(&self, entity: &str) -> bool {
        self.backoff
            .get(entity)
            .map_or(true, |state| state.admits(self.clock.now()))
    }

    pub fn record_restart(&mut self, entity: &str) {
        let now = self.clock.now();
        let state = self.backoff.entry(entity.to_string()).or_default();
        state.record_restart(now);
        debug!(
            entity,
            restarts = state.restart_count,
            multiplier = state.multiplier,
            "Restart recorded"
        );
    }

    pub fn restart_count(&self, entity: &str) -> u32 {
        self.backoff.get(entity).map_or(0, |s| s.restart_count)
    }

    pub fn multiplier(&self, entity: &str) -> u32 {
        self.backoff.get(entity).map_or(1, |s| s.multiplier)
    }

    /// Time until the next restart is admitted.
    pub fn remaining_backoff(&self, entity: &str) -> Duration {
        self.backoff
            .get(entity)
            .map_or_else(Duration::zero, |s| s.remaining(self.clock.now()))
    }

    pub fn snapshot(&mut self, entity: &str) -> TrackerSnapshot {
        let now = self.clock.now();
        let state = self.backoff.get(entity).cloned().unwrap_or_default();
        TrackerSnapshot {
            restart_count: state.restart_count,
            multiplier: state.multiplier,
            last_restart: state.last_restart,
            backoff_remaining_secs: state.remaining(now).num_seconds(),
            failures_last_hour: self.ledger.counts_for(entity, now),
        }
    }
}
