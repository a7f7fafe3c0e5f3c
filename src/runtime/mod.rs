//! Container runtime seam.
//!
//! The supervisor only needs inspect/start/stop/restart/list/logs. The
//! production implementation shells out to the `docker` CLI; tests provide
//! their own.

mod command;
mod docker;

pub use command::{CommandError, CommandOutput, CommandRunner};
pub use docker::DockerCli;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("{op} {entity} failed: {output}")]
    Failed {
        op: &'static str,
        entity: String,
        output: String,
    },
    #[error("cannot parse runtime output for {entity}: {reason}")]
    Parse { entity: String, reason: String },
}

/// Runtime state of one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerInspect {
    /// `running`, `restarting`, `exited`, ...
    pub status: String,
    /// Health check status when the container defines one
    pub health: Option<String>,
    pub restart_count: u32,
    pub exit_code: i64,
}

impl ContainerInspect {
    pub fn is_running(&self) -> bool {
        self.status == "running"
    }

    pub fn is_unhealthy(&self) -> bool {
        self.health.as_deref() == Some("unhealthy")
    }
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn inspect(&self, entity: &str) -> Result<ContainerInspect, RuntimeError>;
    async fn start(&self, entity: &str) -> Result<(), RuntimeError>;
    async fn stop(&self, entity: &str) -> Result<(), RuntimeError>;
    async fn restart(&self, entity: &str) -> Result<(), RuntimeError>;
    /// Container names; `all` includes stopped ones.
    async fn list(&self, all: bool) -> Result<Vec<String>, RuntimeError>;
    async fn logs(&self, entity: &str, tail: u32) -> Result<String, RuntimeError>;
}
