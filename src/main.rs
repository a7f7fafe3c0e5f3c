//! fleet-healer - self-healing supervisor for service containers
//!
//! # Usage
//!
//! ```bash
//! # Supervise containers and serve the health API (default)
//! fleet-healer run --config /etc/fleet-healer/healer.toml
//!
//! # One-off configuration validation (exit 0 iff every check passes)
//! fleet-healer validate
//!
//! # Validate, repair and re-validate (exit 0 iff the cycle succeeded)
//! fleet-healer repair --service reporting
//! ```
//!
//! # Environment Variables
//!
//! - `HEALER_CONFIG`: Path to the TOML configuration file
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use fleet_healer::api::{create_app, ApiState};
use fleet_healer::clock::{SharedClock, SystemClock};
use fleet_healer::config::HealerConfig;
use fleet_healer::report;
use fleet_healer::repair::AutoRepair;
use fleet_healer::runtime::{CommandRunner, ContainerRuntime, DockerCli};
use fleet_healer::supervisor::Supervisor;
use fleet_healer::validation::{ConfigValidator, ValidationSummary};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "fleet-healer")]
#[command(about = "Self-healing supervisor for service containers")]
#[command(version)]
struct CliArgs {
    /// Path to healer.toml (overrides HEALER_CONFIG and ./healer.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the health API address (default: "0.0.0.0:8090")
    #[arg(short, long)]
    addr: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Supervise containers and serve the health API
    Run,
    /// Validate service configuration and write a report
    Validate {
        /// Only validate this service profile
        #[arg(long)]
        service: Option<String>,
    },
    /// Validate, repair and re-validate service configuration
    Repair {
        /// Only repair this service profile
        #[arg(long)]
        service: Option<String>,
    },
}

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    Supervisor,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::Supervisor => write!(f, "Supervisor"),
        }
    }
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<HealerConfig> {
    match path {
        Some(path) => HealerConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(HealerConfig::load()),
    }
}

fn build_runtime(config: &HealerConfig) -> Arc<dyn ContainerRuntime> {
    let runner = CommandRunner::new(Duration::from_secs(config.runtime.command_timeout_secs));
    Arc::new(DockerCli::new(config.runtime.docker_bin.clone(), runner))
}

// ============================================================================
// One-shot commands
// ============================================================================

async fn run_validate(config: &HealerConfig, service: Option<&str>) -> Result<ExitCode> {
    let validator = ConfigValidator::from_config(config);
    let summary = match service {
        Some(name) => {
            let results = validator.validate_service(name).await;
            for r in &results {
                r.log();
            }
            ValidationSummary::from_results(results)
        }
        None => validator.validate_all().await,
    };

    let path = report::write_validation_report(&config.paths.report_dir, &summary, chrono::Utc::now())
        .context("Failed to write validation report")?;
    println!("{}", report::render_validation(&summary, chrono::Utc::now()));
    println!("Report saved to: {}", path.display());

    Ok(if summary.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run_repair(config: &HealerConfig, service: Option<&str>) -> Result<ExitCode> {
    let clock: SharedClock = Arc::new(SystemClock);
    let repair = AutoRepair::new(ConfigValidator::from_config(config), clock.clone());
    let cycle = match service {
        Some(name) => repair.repair_service(name).await,
        None => repair.repair_cycle().await,
    };

    let path = report::write_repair_report(&config.paths.report_dir, &cycle, clock.now())
        .context("Failed to write repair report")?;

    println!("Initial failures:     {}", cycle.initial.failed_checks);
    if let Some(ref repairs) = cycle.repairs {
        println!(
            "Repairs:              {} attempted, {} successful, {} failed",
            repairs.attempted_repairs, repairs.successful_repairs, repairs.failed_repairs
        );
    }
    println!("Post-repair failures: {}", cycle.post_repair.failed_checks);
    println!("Overall:              {}", if cycle.success { "SUCCESS" } else { "FAILED" });
    println!("Report saved to: {}", path.display());

    Ok(if cycle.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

// ============================================================================
// Supervisor mode
// ============================================================================

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: axum::Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await
            .context("HTTP server error")?;

        info!("[HttpServer] Graceful shutdown complete");
        Ok(TaskName::HttpServer)
    });
}

async fn run_supervisor(config: HealerConfig, cancel_token: CancellationToken) -> Result<ExitCode> {
    let config = Arc::new(config);
    let clock: SharedClock = Arc::new(SystemClock);
    let supervisor = Supervisor::new(Arc::clone(&config), build_runtime(&config), clock.clone());

    let listener = tokio::net::TcpListener::bind(&config.server.addr)
        .await
        .with_context(|| format!("Failed to bind health API to {}", config.server.addr))?;
    info!(addr = %config.server.addr, "Health API listening");

    let app = create_app(ApiState {
        supervisor: supervisor.state_handle(),
        clock,
    });

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
    spawn_http_server(&mut task_set, listener, app, cancel_token.clone());

    let loop_token = cancel_token.clone();
    task_set.spawn(async move {
        supervisor.run(loop_token).await;
        Ok(TaskName::Supervisor)
    });

    let mut exit = ExitCode::SUCCESS;
    while let Some(result) = task_set.join_next().await {
        match result {
            Ok(Ok(task)) => info!(task = %task, "Task completed"),
            Ok(Err(e)) => {
                error!(error = %e, "Task failed, shutting down");
                cancel_token.cancel();
                exit = ExitCode::FAILURE;
            }
            Err(e) => {
                error!(error = %e, "Task panicked, shutting down");
                cancel_token.cancel();
                exit = ExitCode::FAILURE;
            }
        }
        if !cancel_token.is_cancelled() {
            // either task ending on its own means the other should stop too
            warn!("Task ended before shutdown was requested");
            cancel_token.cancel();
        }
    }

    Ok(exit)
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = CliArgs::parse();
    init_logging(args.json);

    let mut config = load_config(args.config.as_ref())?;
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }

    match args.command.unwrap_or(SubCommand::Run) {
        SubCommand::Validate { service } => run_validate(&config, service.as_deref()).await,
        SubCommand::Repair { service } => run_repair(&config, service.as_deref()).await,
        SubCommand::Run => {
            info!(
                services = config.services.len(),
                entities = config.entities.len(),
                "Starting fleet-healer"
            );

            // Graceful shutdown via Ctrl+C
            let cancel_token = CancellationToken::new();
            let shutdown_token = cancel_token.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Received Ctrl+C, initiating shutdown...");
                shutdown_token.cancel();
            });

            let exit = run_supervisor(config, cancel_token).await?;
            info!("fleet-healer shutdown complete");
            Ok(exit)
        }
    }
}
