//! Healing dispatcher and entity strategies
//!
//! The dispatcher turns runtime observations into failure records, gates
//! restarts through the tracker's backoff, runs the entity's strategy and a
//! pre-start configuration repair, then restarts and verifies.

pub mod dispatcher;
pub mod strategy;

pub use dispatcher::{
    classify, DispatchOutcome, Dispatcher, DispatcherSettings, EntityState, EntityStatus,
};
pub use strategy::{DependencyStrategy, DirectoryStrategy, HealingStrategy, RestartOnly};
