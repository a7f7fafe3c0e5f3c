//! On-disk configuration store: env files, structured documents, ownership
//! and backups.

pub mod backup;
pub mod document;
pub mod env_file;
pub mod permissions;

pub use document::DocumentError;
pub use env_file::{is_blank_value, EnvFile};
