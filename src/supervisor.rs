//! Supervision loop
//!
//! One control loop drives four independent timers:
//! - monitoring (30 s): observe every entity and heal through the dispatcher
//! - configuration re-validation (30 min): validate, repair, write reports
//! - log cleanup (1 h)
//! - configuration backup (6 h)
//!
//! The HTTP listener reads [`SupervisorState`] through a shared handle and
//! never blocks the loop. Cancelling the token stops new ticks; a tick that is
//! already running finishes first.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::SharedClock;
use crate::config::HealerConfig;
use crate::healing::{DispatchOutcome, Dispatcher, EntityStatus};
use crate::maintenance;
use crate::repair::{AutoRepair, RepairCycle, RepairStatus};
use crate::report;
use crate::runtime::ContainerRuntime;
use crate::validation::{ConfigValidator, ValidationSummary};

/// Process-wide observable state, as served on `GET /health`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealerStatus {
    pub status: String,
    pub healing_actions_count: u64,
    pub last_check_timestamp: DateTime<Utc>,
    pub uptime_seconds: i64,
}

/// Counts from the most recent validation pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationCounts {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub auto_fixable: usize,
    pub overall_status: &'static str,
    pub checked_at: DateTime<Utc>,
    /// Set when the pass was followed by a repair cycle
    pub repair_success: Option<bool>,
}

impl ValidationCounts {
    fn from_summary(summary: &ValidationSummary, checked_at: DateTime<Utc>) -> Self {
        Self {
            total: summary.total_checks,
            passed: summary.passed_checks,
            failed: summary.failed_checks,
            auto_fixable: summary.auto_fixable_failures,
            overall_status: summary.overall_status(),
            checked_at,
            repair_success: None,
        }
    }
}

/// `GET /api/v1/status` body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    #[serde(flatten)]
    pub health: HealerStatus,
    pub entities: Vec<EntityStatus>,
    pub validation: Option<ValidationCounts>,
}

/// State shared between the control loop and the HTTP listener.
#[derive(Debug, Clone)]
pub struct SupervisorState {
    pub running: bool,
    pub started_at: DateTime<Utc>,
    pub last_check: DateTime<Utc>,
    pub healing_actions: u64,
    pub entities: Vec<EntityStatus>,
    pub validation: Option<ValidationCounts>,
}

impl SupervisorState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            running: true,
            started_at: now,
            last_check: now,
            healing_actions: 0,
            entities: Vec::new(),
            validation: None,
        }
    }

    pub fn health(&self, now: DateTime<Utc>) -> HealerStatus {
        HealerStatus {
            status: if self.running { "running" } else { "stopped" }.to_string(),
            healing_actions_count: self.healing_actions,
            last_check_timestamp: self.last_check,
            uptime_seconds: (now - self.started_at).num_seconds().max(0),
        }
    }

    pub fn report(&self, now: DateTime<Utc>) -> StatusReport {
        StatusReport {
            health: self.health(now),
            entities: self.entities.clone(),
            validation: self.validation.clone(),
        }
    }
}

pub type SharedState = Arc<RwLock<SupervisorState>>;

pub struct Supervisor {
    config: Arc<HealerConfig>,
    dispatcher: Dispatcher,
    repair: Arc<AutoRepair>,
    clock: SharedClock,
    state: SharedState,
}

impl Supervisor {
    pub fn new(config: Arc<HealerConfig>, runtime: Arc<dyn ContainerRuntime>, clock: SharedClock) -> Self {
        let validator = ConfigValidator::from_config(&config);
        let repair = Arc::new(AutoRepair::new(validator, clock.clone()));
        let dispatcher = Dispatcher::from_config(&config, runtime, Arc::clone(&repair), clock.clone());
        let state = Arc::new(RwLock::new(SupervisorState::new(clock.now())));
        Self {
            config,
            dispatcher,
            repair,
            clock,
            state,
        }
    }

    /// Shared state handle for the HTTP listener.
    pub fn state_handle(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Observe every entity once and publish the result.
    pub async fn monitor_tick(&mut self) -> Vec<(String, DispatchOutcome)> {
        let outcomes = self.dispatcher.monitor().await;
        let healed = outcomes
            .iter()
            .filter(|(_, o)| *o == DispatchOutcome::Healed)
            .count();
        debug!(entities = outcomes.len(), healed, "Monitoring pass complete");
        self.publish().await;
        outcomes
    }

    /// Validate every profile, repair what can be repaired and write reports.
    pub async fn validation_tick(&mut self) -> RepairCycle {
        info!("Starting configuration validation");
        let cycle = self.repair.repair_cycle().await;
        let now = self.clock.now();
        let report_dir = &self.config.paths.report_dir;

        if let Err(e) = report::write_validation_report(report_dir, &cycle.initial, now) {
            warn!(dir = %report_dir.display(), error = %e, "Could not write validation report");
        }

        let mut counts = ValidationCounts::from_summary(&cycle.post_repair, now);
        if let Some(ref repairs) = cycle.repairs {
            counts.repair_success = Some(cycle.success);
            if let Err(e) = report::write_repair_report(report_dir, &cycle, now) {
                warn!(dir = %report_dir.display(), error = %e, "Could not write repair report");
            }
            if cycle.success {
                info!(repaired = repairs.successful_repairs, "Configuration issues resolved");
                self.dispatcher
                    .add_healing_actions(repairs.successful_repairs as u64);
            } else {
                error!("Some configuration issues could not be repaired automatically");
                for outcome in repairs.outcomes.iter().filter(|o| o.status != RepairStatus::Success) {
                    error!(action = %outcome.action, detail = %outcome.detail, "Unresolved: {}", outcome.message);
                }
            }
        }

        self.state.write().await.validation = Some(counts);
        self.publish().await;
        cycle
    }

    pub fn log_cleanup_tick(&self) {
        maintenance::run_log_cleanup(&self.config.paths);
    }

    pub fn backup_tick(&self) {
        maintenance::run_backup(&self.config.paths, self.clock.now());
    }

    async fn publish(&mut self) {
        let entities = self.dispatcher.statuses();
        let mut state = self.state.write().await;
        state.entities = entities;
        state.healing_actions = self.dispatcher.healing_actions();
        state.last_check = self.clock.now();
    }

    /// Run until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        let schedule = self.config.schedule.clone();
        info!(
            monitor_secs = schedule.monitor_interval_secs,
            validation_secs = schedule.validation_interval_secs,
            log_cleanup_secs = schedule.log_cleanup_interval_secs,
            backup_secs = schedule.backup_interval_secs,
            "Supervision loop started"
        );

        // monitoring and validation fire at startup; housekeeping waits one period
        let mut monitor = timer(schedule.monitor_interval_secs, true);
        let mut validation = timer(schedule.validation_interval_secs, true);
        let mut cleanup = timer(schedule.log_cleanup_interval_secs, false);
        let mut backup = timer(schedule.backup_interval_secs, false);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Supervision loop received shutdown signal");
                    break;
                }
                _ = monitor.tick() => {
                    self.monitor_tick().await;
                }
                _ = validation.tick() => {
                    self.validation_tick().await;
                }
                _ = cleanup.tick() => {
                    self.log_cleanup_tick();
                }
                _ = backup.tick() => {
                    self.backup_tick();
                }
            }
        }

        self.state.write().await.running = false;
        info!(healing_actions = self.dispatcher.healing_actions(), "Supervision loop stopped");
    }
}

fn timer(period_secs: u64, immediate: bool) -> Interval {
    let period = Duration::from_secs(period_secs.max(1));
    let start = if immediate {
        Instant::now()
    } else {
        Instant::now() + period
    };
    let mut interval = interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn health_reports_uptime_and_status() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut state = SupervisorState::new(start);
        state.healing_actions = 3;

        let health = state.health(start + chrono::Duration::seconds(90));
        assert_eq!(health.status, "running");
        assert_eq!(health.healing_actions_count, 3);
        assert_eq!(health.uptime_seconds, 90);

        state.running = false;
        assert_eq!(state.health(start).status, "stopped");
    }

    #[test]
    fn health_serializes_camel_case() {
        let state = SupervisorState::new(Utc::now());
        let json = serde_json::to_value(state.health(Utc::now())).unwrap();
        for key in ["status", "healingActionsCount", "lastCheckTimestamp", "uptimeSeconds"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }
}
