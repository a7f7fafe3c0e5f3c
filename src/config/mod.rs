//! Healer Configuration Module
//!
//! Supervisor settings and service profiles loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `HEALER_CONFIG` environment variable (path to TOML file)
//! 2. `healer.toml` in the current working directory
//! 3. Built-in defaults
//!
//! The loaded config is wrapped in an `Arc` and handed to the components
//! that need it; there is no global instance.

mod healer_config;
pub mod defaults;
pub mod validation;

pub use healer_config::*;
