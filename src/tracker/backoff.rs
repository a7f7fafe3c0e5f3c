//! Exponential restart backoff.
//!
//! The first restart of an entity is admitted immediately. Each recorded
//! restart doubles the multiplier (capped at [`MAX_MULTIPLIER`]) and the next
//! restart must wait `min(MAX_WAIT_SECS, multiplier * BASE_WAIT_SECS)`.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Seconds of wait per unit of multiplier.
pub const BASE_WAIT_SECS: i64 = 30;

/// Ceiling on the wait between restarts (5 minutes).
pub const MAX_WAIT_SECS: i64 = 300;

/// Ceiling on the multiplier.
pub const MAX_MULTIPLIER: u32 = 8;

/// Restart bookkeeping for one entity. Lives for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackoffState {
    pub last_restart: Option<DateTime<Utc>>,
    pub restart_count: u32,
    pub multiplier: u32,
}

impl Default for BackoffState {
    fn default() -> Self {
        Self {
            last_restart: None,
            restart_count: 0,
            multiplier: 1,
        }
    }
}

impl BackoffState {
    /// Minimum wait enforced after the last restart.
    pub fn min_wait(&self) -> Duration {
        Duration::seconds((i64::from(self.multiplier) * BASE_WAIT_SECS).min(MAX_WAIT_SECS))
    }

    /// Whether a restart may be issued at `now`.
    pub fn admits(&self, now: DateTime<Utc>) -> bool {
        match self.last_restart {
            None => true,
            Some(last) => now - last >= self.min_wait(),
        }
    }

    /// Time left before [`admits`](Self::admits) turns true; zero when admitted.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        match self.last_restart {
            None => Duration::zero(),
            Some(last) => (self.min_wait() - (now - last)).max(Duration::zero()),
        }
    }

    pub fn record_restart(&mut self, now: DateTime<Utc>) {
        self.last_restart = Some(now);
        self.restart_count = self.restart_count.saturating_add(1);
        self.multiplier = self.multiplier.saturating_mul(2).min(MAX_MULTIPLIER);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_admits_immediately() {
        let state = BackoffState::default();
        assert!(state.admits(Utc::now()));
        assert_eq!(state.remaining(Utc::now()), Duration::zero());
    }

    #[test]
    fn wait_is_capped_at_five_minutes() {
        let mut state = BackoffState::default();
        let now = Utc::now();
        for _ in 0..10 {
            state.record_restart(now);
        }
        assert_eq!(state.multiplier, MAX_MULTIPLIER);
        // 8 * 30 = 240 stays under the 300 cap
        assert_eq!(state.min_wait(), Duration::seconds(240));
        assert_eq!(state.restart_count, 10);
    }

    #[test]
    fn remaining_counts_down() {
        let mut state = BackoffState::default();
        let t0 = Utc::now();
        state.record_restart(t0);
        // multiplier is now 2 -> 60s
        assert_eq!(state.remaining(t0 + Duration::seconds(45)), Duration::seconds(15));
        assert_eq!(state.remaining(t0 + Duration::seconds(90)), Duration::zero());
    }
}
