//! Configuration Validator
//!
//! Checks service configuration files and produces [`ValidationResult`]s
//! carrying a severity, a fix tag and a typed [`FixTarget`] for the repair
//! engine. No check ever returns an error; problems become results.

pub mod checks;
pub mod probes;
mod result;
mod validator;

pub use result::{
    DocumentFormat, FixAction, FixTarget, Ownership, Severity, ValidationResult,
    ValidationSummary,
};
pub use validator::ConfigValidator;
