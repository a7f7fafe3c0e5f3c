//! Bounded external command execution.
//!
//! Commands either finish inside their timeout or count as failed. A timed
//! out child is killed when dropped; there is no retry here.

use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} timed out after {}s", .limit.as_secs())]
    Timeout { program: String, limit: Duration },
}

/// Exit status and combined stdout/stderr of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub output: String,
}

#[derive(Debug, Clone)]
pub struct CommandRunner {
    limit: Duration,
}

impl CommandRunner {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }

    pub async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        debug!(program, ?args, "Running command");
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let output = match timeout(self.limit, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(CommandError::Spawn {
                    program: program.to_string(),
                    source,
                })
            }
            Err(_) => {
                warn!(program, ?args, limit_secs = self.limit.as_secs(), "Command timed out");
                return Err(CommandError::Timeout {
                    program: program.to_string(),
                    limit: self.limit,
                });
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }

        Ok(CommandOutput {
            success: output.status.success(),
            output: text,
        })
    }
}
