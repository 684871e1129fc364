//! Connection supervision and the agent lifecycle.
//!
//! The supervisor owns everything that must outlive a single connection:
//! the node identity, the failure counter, and the pending job set. Each
//! iteration dials the master, runs the registration handshake, then splits
//! the stream so the health reporter can send while the dispatch loop
//! receives. Dropped connections are retried with a fixed backoff; a kill
//! order or a host shutdown is the only way out with a clean teardown.

use futures_util::StreamExt;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::AgentConfig;
use crate::connection::dial;
use crate::dispatch::{run_dispatch_loop, SessionEnd};
use crate::error::AgentError;
use crate::handlers::HandlerRegistry;
use crate::health::run_health_reporter;
use crate::job::{terminate_all, PendingJobSet};
use crate::registration::{run_registration, NodeIdentity};

/// How a supervised run ended, when it ended cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The master ordered this node to shut down.
    KillOrdered,
    /// The host asked the agent to terminate.
    Terminated,
}

/// Drives connect, register, serve, reconnect until told to stop.
pub struct Supervisor {
    config: AgentConfig,
    identity: NodeIdentity,
    failed_attempts: u32,
    jobs: PendingJobSet,
    registry: HandlerRegistry,
    shutdown: watch::Receiver<bool>,
}

impl Supervisor {
    pub fn new(
        config: AgentConfig,
        registry: HandlerRegistry,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let identity = NodeIdentity::new(config.credential.clone(), config.hostname.clone());
        Self {
            config,
            identity,
            failed_attempts: 0,
            jobs: PendingJobSet::new(),
            registry,
            shutdown,
        }
    }

    /// Run until a kill order, a host shutdown, or an unrecoverable fault.
    ///
    /// Connection-level failures never propagate out of here; they bump the
    /// failure counter and feed the reconnect loop. Anything else is a
    /// programming fault and returns the error with no job teardown, so the
    /// exit is loud and the jobs are left to the host to collect.
    pub async fn run(mut self) -> Result<RunOutcome, AgentError> {
        loop {
            if *self.shutdown.borrow_and_update() {
                return self.shut_down(RunOutcome::Terminated).await;
            }

            match self.connect_and_serve().await {
                Ok(SessionEnd::Closed) => {
                    self.failed_attempts += 1;
                    info!(
                        failed_attempts = self.failed_attempts,
                        "connection lost, will reconnect"
                    );
                }
                Ok(SessionEnd::Kill) => return self.shut_down(RunOutcome::KillOrdered).await,
                Ok(SessionEnd::ShutdownRequested) => {
                    return self.shut_down(RunOutcome::Terminated).await;
                }
                Err(e) if e.is_connection_level() => {
                    self.failed_attempts += 1;
                    warn!(
                        error = %e,
                        failed_attempts = self.failed_attempts,
                        "connection attempt failed, will reconnect"
                    );
                }
                Err(e) => {
                    error!(error = %e, "unrecoverable agent fault");
                    return Err(e);
                }
            }

            if let Some(outcome) = self.backoff().await {
                return self.shut_down(outcome).await;
            }
        }
    }

    /// One full session: dial, register, serve until the session ends.
    async fn connect_and_serve(&mut self) -> Result<SessionEnd, AgentError> {
        let mut stream = tokio::select! {
            biased;
            _ = self.shutdown.changed() => return Ok(SessionEnd::ShutdownRequested),
            dialed = dial(&self.config.master_url) => dialed?,
        };

        let node_id =
            run_registration(&mut stream, &mut self.identity, &mut self.failed_attempts).await?;

        let (send_half, mut recv_half) = stream.split();
        let reporter = tokio::spawn(run_health_reporter(
            send_half,
            node_id.clone(),
            self.config.health_interval,
        ));

        let end = run_dispatch_loop(
            &mut recv_half,
            &mut self.jobs,
            &self.registry,
            &self.config.credential,
            &node_id,
            &mut self.shutdown,
        )
        .await;

        // The reporter holds the session's send half; it must not outlive
        // the session.
        reporter.abort();
        end
    }

    /// Wait out the reconnect backoff, or cut it short on shutdown.
    async fn backoff(&mut self) -> Option<RunOutcome> {
        info!(
            backoff_secs = self.config.reconnect_backoff.as_secs(),
            "waiting before reconnecting"
        );
        tokio::select! {
            biased;
            _ = self.shutdown.changed() => Some(RunOutcome::Terminated),
            _ = tokio::time::sleep(self.config.reconnect_backoff) => None,
        }
    }

    async fn shut_down(mut self, outcome: RunOutcome) -> Result<RunOutcome, AgentError> {
        info!("stopping agent");
        terminate_all(&mut self.jobs, self.config.stop_grace).await;
        Ok(outcome)
    }
}
