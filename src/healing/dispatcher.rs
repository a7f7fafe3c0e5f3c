//! Per-entity healing state machine.
//!
//! ```text
//! Healthy ──failure──▶ Degraded ──backoff open──▶ Remediating ──running──▶ Healthy
//!                         │  ▲                        │
//!                  gate closed│                       │ strategy / pre-start / restart failed
//!                         ▼  │                        ▼
//!                     BackoffWait                  Degraded
//! ```
//!
//! The dispatcher owns the failure tracker. Entities are handled one at a
//! time and only touch their own ledger and backoff entries.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::strategy::{self, HealingStrategy, RestartOnly};
use crate::clock::SharedClock;
use crate::config::{defaults, HealerConfig};
use crate::repair::AutoRepair;
use crate::runtime::{ContainerInspect, ContainerRuntime};
use crate::tracker::{FailureKind, FailureTracker, TrackerSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    Healthy,
    Degraded,
    Remediating,
    BackoffWait,
}

impl std::fmt::Display for EntityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityState::Healthy => write!(f, "healthy"),
            EntityState::Degraded => write!(f, "degraded"),
            EntityState::Remediating => write!(f, "remediating"),
            EntityState::BackoffWait => write!(f, "backoff_wait"),
        }
    }
}

/// What one dispatcher pass did for an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The supervisor's own container
    Skipped,
    /// Inspect failed; nothing was decided
    Unobserved,
    Healthy,
    /// Failure recorded but the backoff gate is closed
    Backoff,
    Healed,
    /// Strategy reported failure
    HealFailed,
    /// Error-severity configuration failures survived repair
    PrestartAborted,
    RestartFailed,
}

/// Knobs taken from `[runtime]` and `[schedule]`.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub self_name: String,
    pub restart_loop_threshold: u32,
    pub settle_delay: Duration,
    pub discover_prefix: Option<String>,
    pub log_tail: u32,
}

impl DispatcherSettings {
    pub fn from_config(config: &HealerConfig) -> Self {
        Self {
            self_name: config.runtime.self_name.clone(),
            restart_loop_threshold: config.runtime.restart_loop_threshold,
            settle_delay: Duration::from_secs(config.schedule.settle_delay_secs),
            discover_prefix: config.runtime.discover_prefix.clone(),
            log_tail: defaults::LOG_TAIL_LINES,
        }
    }
}

/// Reportable view of one entity.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityStatus {
    pub name: String,
    pub state: EntityState,
    pub strategy: &'static str,
    pub profile: Option<String>,
    pub last_inspect: Option<ContainerInspect>,
    pub last_failure: Option<FailureKind>,
    pub since: DateTime<Utc>,
    pub tracker: TrackerSnapshot,
}

struct EntityRecord {
    state: EntityState,
    since: DateTime<Utc>,
    last_inspect: Option<ContainerInspect>,
    last_failure: Option<FailureKind>,
}

/// Map an inspect result to the failure it signals, if any.
///
/// An unhealthy health check wins over the status. `restarting`/`exited`
/// above the threshold is a restart loop; a plain `exited` is its own kind.
pub fn classify(inspect: &ContainerInspect, restart_loop_threshold: u32) -> Option<FailureKind> {
    if inspect.is_unhealthy() {
        return Some(FailureKind::Unhealthy);
    }
    match inspect.status.as_str() {
        "restarting" | "exited" if inspect.restart_count > restart_loop_threshold => {
            Some(FailureKind::RestartLoop)
        }
        "exited" => Some(FailureKind::Exited),
        _ => None,
    }
}

pub struct Dispatcher {
    runtime: Arc<dyn ContainerRuntime>,
    repair: Arc<AutoRepair>,
    clock: SharedClock,
    tracker: FailureTracker,
    settings: DispatcherSettings,
    strategies: HashMap<String, Box<dyn HealingStrategy>>,
    profiles: HashMap<String, String>,
    records: BTreeMap<String, EntityRecord>,
    fallback: RestartOnly,
    healing_actions: u64,
}

impl Dispatcher {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        repair: Arc<AutoRepair>,
        clock: SharedClock,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            runtime,
            repair,
            tracker: FailureTracker::new(clock.clone()),
            clock,
            settings,
            strategies: HashMap::new(),
            profiles: HashMap::new(),
            records: BTreeMap::new(),
            fallback: RestartOnly,
            healing_actions: 0,
        }
    }

    /// Dispatcher with every `[[entities]]` entry registered.
    pub fn from_config(
        config: &HealerConfig,
        runtime: Arc<dyn ContainerRuntime>,
        repair: Arc<AutoRepair>,
        clock: SharedClock,
    ) -> Self {
        let mut dispatcher = Self::new(runtime, repair, clock, DispatcherSettings::from_config(config));
        let probe_timeout = Duration::from_secs(config.probes.timeout_secs);
        for entity in &config.entities {
            dispatcher.register(
                &entity.name,
                strategy::from_config(&entity.strategy, probe_timeout),
                entity.profile.clone(),
            );
        }
        dispatcher
    }

    pub fn register(
        &mut self,
        entity: &str,
        strategy: Box<dyn HealingStrategy>,
        profile: Option<String>,
    ) {
        debug!(entity, strategy = strategy.name(), profile = ?profile, "Entity registered");
        self.strategies.insert(entity.to_string(), strategy);
        match profile {
            Some(profile) => {
                self.profiles.insert(entity.to_string(), profile);
            }
            None => {
                self.profiles.remove(entity);
            }
        }
        self.record_mut(entity);
    }

    pub fn healing_actions(&self) -> u64 {
        self.healing_actions
    }

    /// Count healing work done outside the dispatcher (periodic repairs).
    pub fn add_healing_actions(&mut self, n: u64) {
        self.healing_actions += n;
    }

    pub fn state(&self, entity: &str) -> Option<EntityState> {
        self.records.get(entity).map(|r| r.state)
    }

    pub fn tracker(&self) -> &FailureTracker {
        &self.tracker
    }

    pub fn statuses(&mut self) -> Vec<EntityStatus> {
        let names: Vec<String> = self.records.keys().cloned().collect();
        names
            .into_iter()
            .filter_map(|name| {
                let tracker = self.tracker.snapshot(&name);
                let record = self.records.get(&name)?;
                Some(EntityStatus {
                    strategy: self
                        .strategies
                        .get(&name)
                        .map(|s| s.name())
                        .unwrap_or(self.fallback.name()),
                    profile: self.profiles.get(&name).cloned(),
                    state: record.state,
                    last_inspect: record.last_inspect.clone(),
                    last_failure: record.last_failure,
                    since: record.since,
                    tracker,
                    name,
                })
            })
            .collect()
    }

    /// Registered entities plus anything the runtime lists under the discovery prefix.
    pub async fn targets(&self) -> Vec<String> {
        let mut names: Vec<String> = self.strategies.keys().cloned().collect();
        if let Some(ref prefix) = self.settings.discover_prefix {
            match self.runtime.list(true).await {
                Ok(listed) => names.extend(listed.into_iter().filter(|n| n.starts_with(prefix.as_str()))),
                Err(e) => warn!(error = %e, "Could not list containers"),
            }
        }
        names.retain(|n| n != &self.settings.self_name);
        names.sort();
        names.dedup();
        names
    }

    /// One monitoring pass over every target, sequentially.
    pub async fn monitor(&mut self) -> Vec<(String, DispatchOutcome)> {
        let targets = self.targets().await;
        let mut outcomes = Vec::with_capacity(targets.len());
        for entity in targets {
            let outcome = self.tick(&entity).await;
            outcomes.push((entity, outcome));
        }
        outcomes
    }

    /// Observe one entity and remediate if needed.
    pub async fn tick(&mut self, entity: &str) -> DispatchOutcome {
        if entity == self.settings.self_name {
            return DispatchOutcome::Skipped;
        }

        let inspect = match self.runtime.inspect(entity).await {
            Ok(inspect) => inspect,
            Err(e) => {
                warn!(entity, error = %e, "Could not inspect entity");
                return DispatchOutcome::Unobserved;
            }
        };
        let failure = classify(&inspect, self.settings.restart_loop_threshold);
        {
            let record = self.record_mut(entity);
            record.last_inspect = Some(inspect.clone());
        }

        let Some(kind) = failure else {
            self.transition(entity, EntityState::Healthy);
            return DispatchOutcome::Healthy;
        };

        warn!(
            entity,
            kind = %kind,
            status = %inspect.status,
            restart_count = inspect.restart_count,
            "Entity failure observed"
        );
        self.tracker.record_failure(entity, kind);
        self.record_mut(entity).last_failure = Some(kind);
        let was_failing = self.state(entity).is_some_and(|s| s != EntityState::Healthy);
        self.transition(entity, EntityState::Degraded);
        if !was_failing {
            self.tail_logs(entity).await;
        }

        if !self.tracker.should_restart(entity) {
            info!(
                entity,
                remaining_secs = self.tracker.remaining_backoff(entity).num_seconds(),
                multiplier = self.tracker.multiplier(entity),
                "Restart deferred by backoff"
            );
            self.transition(entity, EntityState::BackoffWait);
            return DispatchOutcome::Backoff;
        }

        self.remediate(entity).await
    }

    async fn remediate(&mut self, entity: &str) -> DispatchOutcome {
        self.transition(entity, EntityState::Remediating);

        let strategy: &dyn HealingStrategy = match self.strategies.get(entity) {
            Some(s) => s.as_ref(),
            None => &self.fallback,
        };
        let strategy_name = strategy.name();
        if !strategy.heal(entity).await {
            error!(entity, strategy = strategy_name, "Healing strategy failed");
            self.tracker.record_failure(entity, FailureKind::HealFailed);
            self.transition(entity, EntityState::Degraded);
            return DispatchOutcome::HealFailed;
        }

        if let Some(profile) = self.profiles.get(entity).cloned() {
            info!(entity, profile = %profile, "Pre-start configuration check");
            let cycle = self.repair.repair_service(&profile).await;
            let blocking = cycle.blocking_failures();
            if !blocking.is_empty() {
                for r in &blocking {
                    error!(entity, check = %r.check, message = %r.message, "Blocking configuration failure");
                }
                error!(entity, remaining = blocking.len(), "Pre-start check failed, restart aborted");
                self.transition(entity, EntityState::Degraded);
                return DispatchOutcome::PrestartAborted;
            }
        }

        info!(entity, strategy = strategy_name, "Restarting entity");
        if let Err(e) = self.runtime.restart(entity).await {
            error!(entity, error = %e, "Restart failed");
            self.tracker.record_failure(entity, FailureKind::RestartFailed);
            self.tracker.record_restart(entity);
            self.transition(entity, EntityState::Degraded);
            return DispatchOutcome::RestartFailed;
        }
        self.tracker.record_restart(entity);

        if !self.settings.settle_delay.is_zero() {
            tokio::time::sleep(self.settings.settle_delay).await;
        }

        match self.runtime.inspect(entity).await {
            Ok(after) if after.is_running() => {
                self.healing_actions += 1;
                self.record_mut(entity).last_inspect = Some(after);
                info!(entity, healing_actions = self.healing_actions, "Entity restarted successfully");
                self.transition(entity, EntityState::Healthy);
                DispatchOutcome::Healed
            }
            Ok(after) => {
                error!(entity, status = %after.status, "Entity did not come back up");
                self.record_mut(entity).last_inspect = Some(after);
                self.tracker.record_failure(entity, FailureKind::RestartFailed);
                self.transition(entity, EntityState::Degraded);
                DispatchOutcome::RestartFailed
            }
            Err(e) => {
                error!(entity, error = %e, "Could not verify restart");
                self.tracker.record_failure(entity, FailureKind::RestartFailed);
                self.transition(entity, EntityState::Degraded);
                DispatchOutcome::RestartFailed
            }
        }
    }

    async fn tail_logs(&self, entity: &str) {
        match self.runtime.logs(entity, self.settings.log_tail).await {
            Ok(logs) => warn!(entity, lines = self.settings.log_tail, logs = %logs.trim_end(), "Recent entity logs"),
            Err(e) => debug!(entity, error = %e, "Could not fetch entity logs"),
        }
    }

    fn record_mut(&mut self, entity: &str) -> &mut EntityRecord {
        let now = self.clock.now();
        self.records
            .entry(entity.to_string())
            .or_insert_with(|| EntityRecord {
                state: EntityState::Healthy,
                since: now,
                last_inspect: None,
                last_failure: None,
            })
    }

    fn transition(&mut self, entity: &str, to: EntityState) {
        let now = self.clock.now();
        let record = self.record_mut(entity);
        if record.state == to {
            return;
        }
        let from = record.state;
        record.state = to;
        record.since = now;
        match to {
            EntityState::Healthy | EntityState::Remediating => info!(entity, %from, %to, "Entity state changed"),
            EntityState::Degraded | EntityState::BackoffWait => warn!(entity, %from, %to, "Entity state changed"),
        }
    }
}
