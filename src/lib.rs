//! fleet-healer: self-healing supervisor for service containers
//!
//! Watches a fleet of long-running containers, records their failures,
//! gates restarts behind exponential backoff, and validates and repairs the
//! configuration files they depend on before bringing them back.
//!
//! ## Architecture
//!
//! - **Failure Tracker**: sliding one-hour failure ledger plus restart backoff
//! - **Config Validator**: per-service checks producing typed, fixable results
//! - **Auto-Repair**: fix-tag driven, idempotent repair actions with backups
//! - **Dispatcher**: per-entity healing state machine
//! - **Supervisor**: timers for monitoring, validation, log cleanup and backups

pub mod api;
pub mod clock;
pub mod config;
pub mod healing;
pub mod maintenance;
pub mod repair;
pub mod report;
pub mod runtime;
pub mod store;
pub mod supervisor;
pub mod tracker;
pub mod validation;

pub use config::HealerConfig;
pub use healing::{Dispatcher, EntityState};
pub use repair::{AutoRepair, RepairCycle, RepairSummary};
pub use runtime::{ContainerRuntime, DockerCli};
pub use supervisor::Supervisor;
pub use tracker::{FailureKind, FailureTracker};
pub use validation::{ConfigValidator, ValidationResult, ValidationSummary};
