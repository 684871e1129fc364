//! The per-connection dispatch loop.
//!
//! Between commands the loop sweeps exited jobs, so the pending set stays
//! honest without any background reaper. Unknown frames and frames with no
//! installed handler are logged and skipped; a kill order and a host
//! shutdown end the session deliberately, and a handler error is fatal to
//! the whole agent rather than retried.

use futures_util::Stream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use muster_protocol::{Decoded, Envelope};

use crate::connection::next_decoded;
use crate::error::AgentError;
use crate::handlers::{HandlerContext, HandlerRegistry};
use crate::job::PendingJobSet;

/// Why a dispatch session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The connection dropped or the master closed it.
    Closed,
    /// The master ordered this node to shut down.
    Kill,
    /// The host asked the agent to terminate.
    ShutdownRequested,
}

/// Receive and route commands until the session ends.
pub async fn run_dispatch_loop<S>(
    stream: &mut S,
    jobs: &mut PendingJobSet,
    registry: &HandlerRegistry,
    credential: &str,
    node_id: &str,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<SessionEnd, AgentError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        jobs.sweep_exited();

        let decoded = tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("host shutdown requested, leaving the session");
                    return Ok(SessionEnd::ShutdownRequested);
                }
                continue;
            }
            decoded = next_decoded(stream) => decoded,
        };

        let envelope = match decoded {
            Some(Decoded::Known(envelope)) => envelope,
            Some(Decoded::Unrecognized(snippet)) => {
                warn!(frame = %snippet, "ignoring unrecognized frame");
                continue;
            }
            None => {
                info!("session with master ended");
                return Ok(SessionEnd::Closed);
            }
        };

        // Kill is session control, not a job command; it never goes
        // through the registry.
        if matches!(envelope, Envelope::Kill) {
            info!("kill ordered by master");
            return Ok(SessionEnd::Kill);
        }

        let kind = envelope.kind();
        let Some(handler) = registry.lookup(kind) else {
            warn!(kind = %kind, "no handler installed for frame");
            continue;
        };

        debug!(kind = %kind, "dispatching command");
        let spawned = handler
            .handle(
                &envelope,
                HandlerContext {
                    credential,
                    node_id,
                    jobs,
                },
            )
            .await?;
        if let Some(job) = spawned {
            jobs.push(job);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use anyhow::anyhow;
    use async_trait::async_trait;

    use crate::handlers::CommandHandler;
    use crate::job::JobHandle;
    use crate::testutil::ScriptedLink;
    use muster_protocol::CommandKind;

    async fn dispatch(
        link: &mut ScriptedLink,
        jobs: &mut PendingJobSet,
        registry: &HandlerRegistry,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SessionEnd, AgentError> {
        run_dispatch_loop(link, jobs, registry, "tok", "node-1", shutdown).await
    }

    #[tokio::test]
    async fn test_spawns_then_ends_on_kill() {
        let mut link = ScriptedLink::new(vec![
            "plain garbage",
            r#"{"type":"connected"}"#,
            r#"{"type":"spawn","script":"sleep 30"}"#,
            r#"{"type":"kill"}"#,
        ]);
        let mut jobs = PendingJobSet::new();
        let registry = HandlerRegistry::standard();
        let (_tx, mut shutdown) = watch::channel(false);

        let end = dispatch(&mut link, &mut jobs, &registry, &mut shutdown)
            .await
            .unwrap();

        assert_eq!(end, SessionEnd::Kill);
        assert_eq!(jobs.len(), 1);

        for job in jobs.iter_mut() {
            job.force_kill();
        }
    }

    #[tokio::test]
    async fn test_closed_stream_ends_the_session() {
        let mut link = ScriptedLink::new(vec![]);
        let mut jobs = PendingJobSet::new();
        let registry = HandlerRegistry::standard();
        let (_tx, mut shutdown) = watch::channel(false);

        let end = dispatch(&mut link, &mut jobs, &registry, &mut shutdown)
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::Closed);
    }

    #[tokio::test]
    async fn test_shutdown_signal_preempts_receiving() {
        let mut link = ScriptedLink::new(vec![]).hold_open();
        let mut jobs = PendingJobSet::new();
        let registry = HandlerRegistry::standard();
        let (tx, mut shutdown) = watch::channel(false);
        tx.send(true).unwrap();

        let end = dispatch(&mut link, &mut jobs, &registry, &mut shutdown)
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::ShutdownRequested);
    }

    #[tokio::test]
    async fn test_exited_jobs_are_swept_between_commands() {
        let mut jobs = PendingJobSet::new();
        jobs.push(JobHandle::spawn("exit 0", &[]).unwrap());
        tokio::time::sleep(Duration::from_millis(300)).await;

        let mut link = ScriptedLink::new(vec![r#"{"type":"kill"}"#]);
        let registry = HandlerRegistry::standard();
        let (_tx, mut shutdown) = watch::channel(false);

        let end = dispatch(&mut link, &mut jobs, &registry, &mut shutdown)
            .await
            .unwrap();

        assert_eq!(end, SessionEnd::Kill);
        assert!(jobs.is_empty());
    }

    struct FaultyHandler;

    #[async_trait]
    impl CommandHandler for FaultyHandler {
        async fn handle(
            &self,
            _command: &Envelope,
            _ctx: HandlerContext<'_>,
        ) -> Result<Option<JobHandle>, AgentError> {
            Err(AgentError::Handler {
                kind: "connected",
                source: anyhow!("boom"),
            })
        }
    }

    #[tokio::test]
    async fn test_handler_error_is_fatal() {
        let mut link = ScriptedLink::new(vec![r#"{"type":"connected"}"#]);
        let mut jobs = PendingJobSet::new();
        let mut registry = HandlerRegistry::new();
        registry.register(CommandKind::Connected, Box::new(FaultyHandler));
        let (_tx, mut shutdown) = watch::channel(false);

        let err = dispatch(&mut link, &mut jobs, &registry, &mut shutdown)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Handler { .. }));
    }
}
