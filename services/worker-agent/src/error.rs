//! Agent error taxonomy.

use thiserror::Error;

/// Errors surfaced by the agent's connection machinery.
///
/// Retryability is decided where an error is caught, not where it is made:
/// the supervisor retries connection-level failures on its backoff path and
/// treats everything else as fatal to the process.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The handshake broke sequence: wrong frame, rejected credential, or a
    /// connection that closed mid-exchange.
    #[error("handshake violation: {0}")]
    Handshake(String),

    /// The control connection could not be established.
    #[error("failed to reach master at {url}: {source}")]
    Dial {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    /// A send on the control connection failed.
    #[error("control connection send failed: {0}")]
    Send(#[from] tokio_tungstenite::tungstenite::Error),

    /// A command handler failed. Kept fatal so a broken handler is loud.
    #[error("'{kind}' handler failed: {source}")]
    Handler {
        kind: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// An outbound frame could not be serialized.
    #[error(transparent)]
    Encode(#[from] muster_protocol::EncodeError),
}

impl AgentError {
    /// Whether the supervisor should retry this error with backoff instead
    /// of aborting the process.
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            AgentError::Handshake(_) | AgentError::Dial { .. } | AgentError::Send(_)
        )
    }
}
