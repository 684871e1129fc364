//! Command handlers and their registry.
//!
//! The dispatch loop routes each known frame by [`CommandKind`] to a
//! handler registered here. Handlers observe session state read-only and
//! return a [`JobHandle`] when the command started a process; long work
//! belongs in the spawned process, never in the handler itself.

use std::collections::HashMap;

use anyhow::anyhow;
use async_trait::async_trait;
use tracing::info;

use muster_protocol::{CommandKind, Envelope};

use crate::error::AgentError;
use crate::job::{JobHandle, PendingJobSet};

/// Read-only view of the session a command arrived on.
pub struct HandlerContext<'a> {
    pub credential: &'a str,
    pub node_id: &'a str,
    pub jobs: &'a PendingJobSet,
}

/// One installable command behavior.
///
/// A handler must return promptly; the dispatch loop is single-threaded
/// and nothing else is received while it runs. Errors out of a handler are
/// programming faults and take the agent down.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(
        &self,
        command: &Envelope,
        ctx: HandlerContext<'_>,
    ) -> Result<Option<JobHandle>, AgentError>;
}

/// Maps command kinds to their handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<CommandKind, Box<dyn CommandHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The production handler set.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(CommandKind::Spawn, Box::new(SpawnHandler));
        registry
    }

    /// Install `handler` for `kind`, replacing any previous one.
    pub fn register(&mut self, kind: CommandKind, handler: Box<dyn CommandHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub fn lookup(&self, kind: CommandKind) -> Option<&dyn CommandHandler> {
        self.handlers.get(&kind).map(|handler| handler.as_ref())
    }
}

/// Launches a shell job for a spawn command.
pub struct SpawnHandler;

#[async_trait]
impl CommandHandler for SpawnHandler {
    async fn handle(
        &self,
        command: &Envelope,
        _ctx: HandlerContext<'_>,
    ) -> Result<Option<JobHandle>, AgentError> {
        let Envelope::Spawn { script, args } = command else {
            return Err(AgentError::Handler {
                kind: "spawn",
                source: anyhow!("routed a non-spawn frame"),
            });
        };

        let job = JobHandle::spawn(script, args).map_err(|e| AgentError::Handler {
            kind: "spawn",
            source: anyhow::Error::new(e).context(format!("spawning `{script}`")),
        })?;

        info!(pid = ?job.pid(), script = %script, "spawned job");
        Ok(Some(job))
    }
}
