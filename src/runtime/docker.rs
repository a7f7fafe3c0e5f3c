//! `docker` CLI implementation of [`ContainerRuntime`].

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::{CommandRunner, ContainerInspect, ContainerRuntime, RuntimeError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectDoc {
    state: InspectState,
    #[serde(default)]
    restart_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    status: String,
    #[serde(default)]
    exit_code: i64,
    #[serde(default)]
    health: Option<InspectHealth>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectHealth {
    status: String,
}

/// Parse the JSON array printed by `docker inspect <name>`.
fn parse_inspect(entity: &str, raw: &str) -> Result<ContainerInspect, RuntimeError> {
    let parse_err = |reason: String| RuntimeError::Parse {
        entity: entity.to_string(),
        reason,
    };
    let docs: Vec<InspectDoc> = serde_json::from_str(raw).map_err(|e| parse_err(e.to_string()))?;
    let doc = docs
        .into_iter()
        .next()
        .ok_or_else(|| parse_err("empty inspect output".to_string()))?;
    Ok(ContainerInspect {
        status: doc.state.status,
        health: doc.state.health.map(|h| h.status),
        restart_count: doc.restart_count,
        exit_code: doc.state.exit_code,
    })
}

pub struct DockerCli {
    bin: String,
    runner: CommandRunner,
}

impl DockerCli {
    pub fn new(bin: impl Into<String>, runner: CommandRunner) -> Self {
        Self {
            bin: bin.into(),
            runner,
        }
    }

    async fn checked(&self, op: &'static str, entity: &str, args: &[&str]) -> Result<String, RuntimeError> {
        let out = self.runner.run(&self.bin, args).await?;
        if out.success {
            Ok(out.output)
        } else {
            Err(RuntimeError::Failed {
                op,
                entity: entity.to_string(),
                output: out.output.trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn inspect(&self, entity: &str) -> Result<ContainerInspect, RuntimeError> {
        let raw = self.checked("inspect", entity, &["inspect", entity]).await?;
        parse_inspect(entity, &raw)
    }

    async fn start(&self, entity: &str) -> Result<(), RuntimeError> {
        self.checked("start", entity, &["start", entity]).await?;
        info!(entity, "Container started");
        Ok(())
    }

    async fn stop(&self, entity: &str) -> Result<(), RuntimeError> {
        self.checked("stop", entity, &["stop", entity]).await?;
        info!(entity, "Container stopped");
        Ok(())
    }

    async fn restart(&self, entity: &str) -> Result<(), RuntimeError> {
        self.checked("restart", entity, &["restart", entity]).await?;
        info!(entity, "Container restarted");
        Ok(())
    }

    async fn list(&self, all: bool) -> Result<Vec<String>, RuntimeError> {
        let mut args = vec!["ps", "--format", "{{.Names}}"];
        if all {
            args.push("-a");
        }
        let raw = self.checked("list", "containers", &args).await?;
        Ok(raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn logs(&self, entity: &str, tail: u32) -> Result<String, RuntimeError> {
        let tail = tail.to_string();
        self.checked("logs", entity, &["logs", "--tail", &tail, entity]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn parses_inspect_with_health() {
        let raw = r#"[{"Id":"abc","RestartCount":4,"State":{"Status":"restarting","ExitCode":1,
            "Health":{"Status":"unhealthy","FailingStreak":3}}}]"#;
        let inspect = parse_inspect("api", raw).unwrap();
        assert_eq!(inspect.status, "restarting");
        assert_eq!(inspect.restart_count, 4);
        assert_eq!(inspect.exit_code, 1);
        assert!(inspect.is_unhealthy());
        assert!(!inspect.is_running());
    }

    #[test]
    fn parses_inspect_without_health() {
        let raw = r#"[{"RestartCount":0,"State":{"Status":"running","ExitCode":0}}]"#;
        let inspect = parse_inspect("api", raw).unwrap();
        assert!(inspect.is_running());
        assert_eq!(inspect.health, None);
    }

    #[test]
    fn empty_inspect_is_a_parse_error() {
        assert!(matches!(
            parse_inspect("api", "[]"),
            Err(RuntimeError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn failing_cli_maps_to_runtime_error() {
        // `false` ignores its arguments and exits 1
        let docker = DockerCli::new("false", CommandRunner::new(Duration::from_secs(5)));
        let err = docker.restart("api").await.unwrap_err();
        assert!(matches!(err, RuntimeError::Failed { op: "restart", .. }));
    }
}
