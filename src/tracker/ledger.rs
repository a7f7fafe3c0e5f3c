//! Sliding-window failure ledger.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

/// Kinds of failure the supervisor records against an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Runtime reports repeated restarts (status restarting/exited, count above threshold)
    RestartLoop,
    /// Runtime health check reports unhealthy
    Unhealthy,
    /// Entity stopped without entering a restart loop
    Exited,
    /// Entity-specific healing strategy could not complete
    HealFailed,
    /// Restart command failed or the entity did not come back up
    RestartFailed,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::RestartLoop => write!(f, "restart_loop"),
            FailureKind::Unhealthy => write!(f, "unhealthy"),
            FailureKind::Exited => write!(f, "exited"),
            FailureKind::HealFailed => write!(f, "heal_failed"),
            FailureKind::RestartFailed => write!(f, "restart_failed"),
        }
    }
}

/// A single recorded failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureEvent {
    pub entity: String,
    pub kind: FailureKind,
    pub at: DateTime<Utc>,
}

/// Per-(entity, kind) timestamps, oldest first, bounded to a rolling window.
#[derive(Debug)]
pub struct FailureLedger {
    window: Duration,
    events: HashMap<(String, FailureKind), VecDeque<DateTime<Utc>>>,
}

impl FailureLedger {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            events: HashMap::new(),
        }
    }

    /// Append an event and drop anything that fell out of the window for its key.
    pub fn append(&mut self, event: FailureEvent) {
        let cutoff = event.at - self.window;
        let entry = self.events.entry((event.entity, event.kind)).or_default();
        entry.push_back(event.at);
        prune(entry, cutoff);
    }

    /// Number of events for the key inside the window ending at `now`.
    pub fn count(&mut self, entity: &str, kind: FailureKind, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window;
        let key = (entity.to_string(), kind);
        let Some(entry) = self.events.get_mut(&key) else {
            return 0;
        };
        prune(entry, cutoff);
        let n = entry.len();
        if n == 0 {
            self.events.remove(&key);
        }
        n
    }

    /// Totals per kind for one entity, pruned at `now`.
    pub fn counts_for(&mut self, entity: &str, now: DateTime<Utc>) -> Vec<(FailureKind, usize)> {
        let kinds: Vec<FailureKind> = self
            .events
            .keys()
            .filter(|(e, _)| e == entity)
            .map(|(_, k)| *k)
            .collect();
        let mut out: Vec<(FailureKind, usize)> = kinds
            .into_iter()
            .map(|k| (k, self.count(entity, k, now)))
            .filter(|(_, n)| *n > 0)
            .collect();
        out.sort_by_key(|(k, _)| k.to_string());
        out
    }
}

/// Events strictly older than the cutoff are dropped; an event exactly at the
/// window edge still counts.
fn prune(entry: &mut VecDeque<DateTime<Utc>>, cutoff: DateTime<Utc>) {
    while entry.front().is_some_and(|t| *t < cutoff) {
        entry.pop_front();
    }
}
