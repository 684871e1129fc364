//! Muster worker agent binary.
//!
//! Wires the pieces together: parses the CLI, initializes tracing, installs
//! the host signal handlers, and hands control to the supervisor. Exits 0
//! when the master orders a kill or the host asks for termination, non-zero
//! on an unrecoverable fault.

use std::error::Error;
use std::process::ExitCode;

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use muster_worker_agent::config::{AgentConfig, Cli};
use muster_worker_agent::handlers::HandlerRegistry;
use muster_worker_agent::{RunOutcome, Supervisor};

/// Worker agent version (semver).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = AgentConfig::from_cli(Cli::parse());
    info!(
        version = VERSION,
        master_url = %config.master_url,
        "starting worker agent"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_termination().await;
        let _ = shutdown_tx.send(true);
    });

    let supervisor = Supervisor::new(config, HandlerRegistry::standard(), shutdown_rx);
    match supervisor.run().await {
        Ok(RunOutcome::KillOrdered) => {
            info!("worker agent decommissioned by master");
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::Terminated) => {
            info!("worker agent stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "worker agent failed");
            let mut source = e.source();
            while let Some(cause) = source {
                error!(cause = %cause, "caused by");
                source = cause.source();
            }
            ExitCode::from(1)
        }
    }
}

/// Resolve when the host asks the agent to stop.
async fn wait_for_termination() {
    let sigterm = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = sigterm => info!("received SIGTERM"),
        _ = tokio::signal::ctrl_c() => info!("received interrupt"),
    }
}
