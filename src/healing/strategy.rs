//! Entity-specific healing strategies.
//!
//! A strategy prepares the ground for a restart (directories, dependencies)
//! but never restarts the entity itself; the dispatcher owns that.

use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::{PathSpec, StrategyConfig};
use crate::store::permissions;

#[async_trait]
pub trait HealingStrategy: Send + Sync {
    /// Short name used in logs and the status API
    fn name(&self) -> &'static str;

    /// Prepare `entity` for a restart. `false` means the restart should not go ahead.
    async fn heal(&self, entity: &str) -> bool;
}

/// Fallback when nothing entity-specific is registered.
#[derive(Debug, Default)]
pub struct RestartOnly;

#[async_trait]
impl HealingStrategy for RestartOnly {
    fn name(&self) -> &'static str {
        "restart_only"
    }

    async fn heal(&self, _entity: &str) -> bool {
        true
    }
}

/// Makes sure the entity's directories exist with the declared owner and mode.
#[derive(Debug)]
pub struct DirectoryStrategy {
    paths: Vec<PathSpec>,
}

impl DirectoryStrategy {
    pub fn new(paths: Vec<PathSpec>) -> Self {
        Self { paths }
    }

    fn ensure(spec: &PathSpec) -> Result<bool, String> {
        let expected = spec.expected()?;
        let mut changed = false;
        if !spec.path.is_dir() {
            std::fs::create_dir_all(&spec.path).map_err(|e| e.to_string())?;
            changed = true;
        }
        changed |= permissions::apply(&spec.path, expected).map_err(|e| e.to_string())?;
        Ok(changed)
    }
}

#[async_trait]
impl HealingStrategy for DirectoryStrategy {
    fn name(&self) -> &'static str {
        "directories"
    }

    async fn heal(&self, entity: &str) -> bool {
        let mut ok = true;
        for spec in &self.paths {
            match Self::ensure(spec) {
                Ok(true) => info!(entity, path = %spec.path.display(), "Directory prepared"),
                Ok(false) => {}
                Err(e) => {
                    warn!(entity, path = %spec.path.display(), error = %e, "Could not prepare directory");
                    ok = false;
                }
            }
        }
        ok
    }
}

/// Verifies a TCP dependency accepts connections before the entity restarts.
#[derive(Debug)]
pub struct DependencyStrategy {
    host: String,
    port: u16,
    limit: Duration,
}

impl DependencyStrategy {
    pub fn new(host: impl Into<String>, port: u16, limit: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            limit,
        }
    }
}

#[async_trait]
impl HealingStrategy for DependencyStrategy {
    fn name(&self) -> &'static str {
        "dependency"
    }

    async fn heal(&self, entity: &str) -> bool {
        let target = (self.host.as_str(), self.port);
        match timeout(self.limit, TcpStream::connect(target)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                warn!(entity, host = %self.host, port = self.port, error = %e, "Dependency unreachable");
                false
            }
            Err(_) => {
                warn!(entity, host = %self.host, port = self.port, "Dependency probe timed out");
                false
            }
        }
    }
}

/// Build the strategy an entity declares.
pub fn from_config(config: &StrategyConfig, probe_timeout: Duration) -> Box<dyn HealingStrategy> {
    match config {
        StrategyConfig::RestartOnly => Box::new(RestartOnly),
        StrategyConfig::Directories { paths } => Box::new(DirectoryStrategy::new(paths.clone())),
        StrategyConfig::Dependency { host, port } => {
            Box::new(DependencyStrategy::new(host.clone(), *port, probe_timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathKind;
    use std::os::unix::fs::PermissionsExt;

    #[tokio::test]
    async fn directories_are_created_with_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("data").join("uploads");
        let strategy = DirectoryStrategy::new(vec![PathSpec {
            path: target.clone(),
            owner: None,
            mode: Some("0750".into()),
            kind: PathKind::Directory,
        }]);

        assert!(strategy.heal("web").await);
        let mode = std::fs::metadata(&target).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o750);
        // second run is a no-op
        assert!(strategy.heal("web").await);
    }

    #[tokio::test]
    async fn bad_mode_fails_the_strategy() {
        let tmp = tempfile::tempdir().unwrap();
        let strategy = DirectoryStrategy::new(vec![PathSpec {
            path: tmp.path().join("x"),
            owner: None,
            mode: Some("rwx".into()),
            kind: PathKind::Directory,
        }]);
        assert!(!strategy.heal("web").await);
    }

    #[tokio::test]
    async fn dependency_probe_follows_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let strategy = DependencyStrategy::new("127.0.0.1", port, Duration::from_secs(1));
        assert!(strategy.heal("web").await);

        drop(listener);
        assert!(!strategy.heal("web").await);
    }

    #[test]
    fn config_selects_strategy() {
        let s = from_config(&StrategyConfig::RestartOnly, Duration::from_secs(1));
        assert_eq!(s.name(), "restart_only");
        let s = from_config(
            &StrategyConfig::Dependency { host: "db".into(), port: 5432 },
            Duration::from_secs(1),
        );
        assert_eq!(s.name(), "dependency");
    }
}
