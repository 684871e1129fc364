//! Registration handshake and node identity.
//!
//! Every connection starts with a strict three-step exchange: the master
//! announces itself, the agent presents its credential (plus the stored
//! node id when resuming), and the master acks with acceptance and an
//! assigned id. Nothing else may flow until that finishes, so the handshake
//! runs on the unsplit stream before the send and receive halves part ways.

use futures_util::{Sink, Stream};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{info, warn};

use muster_protocol::{Decoded, Envelope};

use crate::connection::{next_decoded, send_envelope};
use crate::error::AgentError;

/// Consecutive failed connections after which a stored node id is
/// abandoned and the agent registers as a brand-new node.
pub const MAX_RECONNECT_TRIES: u32 = 10;

/// What this agent knows about itself across connections.
///
/// The node id is assigned by the master on first registration and kept
/// here so later connections can resume it instead of creating a new node
/// record on every blip.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    credential: String,
    hostname: Option<String>,
    node_id: Option<String>,
}

impl NodeIdentity {
    pub fn new(credential: String, hostname: Option<String>) -> Self {
        Self {
            credential,
            hostname,
            node_id: None,
        }
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    pub fn node_id(&self) -> Option<&str> {
        self.node_id.as_deref()
    }
}

/// How the agent identifies itself on the next handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityMode {
    /// No usable node id; register as a new node.
    Fresh,
    /// Present the stored node id and resume it.
    Resume(String),
}

/// Pick the identity mode for the next connection attempt.
///
/// A stored id is only worth presenting while the failure streak is under
/// [`MAX_RECONNECT_TRIES`]; past that the master has likely forgotten the
/// node and resuming would just fail again.
pub fn choose_identity_mode(identity: &NodeIdentity, failed_attempts: u32) -> IdentityMode {
    match &identity.node_id {
        Some(node_id) if failed_attempts < MAX_RECONNECT_TRIES => {
            IdentityMode::Resume(node_id.clone())
        }
        _ => IdentityMode::Fresh,
    }
}

/// Run the registration handshake on a fresh connection.
///
/// On success the assigned node id is stored on `identity` and the failure
/// counter is reset. Any deviation from the expected sequence is a
/// handshake error; the caller tears the connection down and retries.
pub async fn run_registration<S>(
    stream: &mut S,
    identity: &mut NodeIdentity,
    failed_attempts: &mut u32,
) -> Result<String, AgentError>
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    match next_decoded(stream).await {
        Some(Decoded::Known(Envelope::Connected)) => {}
        other => return Err(handshake_error("connected", other)),
    }

    let request = match choose_identity_mode(identity, *failed_attempts) {
        IdentityMode::Resume(node_id) => {
            info!(node_id = %node_id, attempt = *failed_attempts + 1, "resuming stored node id");
            Envelope::Reconnect {
                key: identity.credential.clone(),
                node_id,
            }
        }
        IdentityMode::Fresh => {
            if identity.node_id.take().is_some() {
                warn!(
                    attempts = *failed_attempts,
                    "abandoning stored node id, registering fresh"
                );
            } else {
                info!("requesting registration");
            }
            Envelope::Register {
                key: identity.credential.clone(),
                address: identity.hostname.clone(),
            }
        }
    };
    send_envelope(stream, &request).await?;

    match next_decoded(stream).await {
        Some(Decoded::Known(Envelope::Accepted { success: true })) => {}
        Some(Decoded::Known(Envelope::Accepted { success: false })) => {
            return Err(AgentError::Handshake(
                "master rejected the credential".to_string(),
            ));
        }
        other => return Err(handshake_error("accepted", other)),
    }

    let node_id = match next_decoded(stream).await {
        Some(Decoded::Known(Envelope::Registered { node_id })) => node_id,
        other => return Err(handshake_error("registered", other)),
    };

    info!(node_id = %node_id, "registered with master");
    identity.node_id = Some(node_id.clone());
    *failed_attempts = 0;
    Ok(node_id)
}

fn handshake_error(expected: &str, got: Option<Decoded>) -> AgentError {
    let got = match got {
        Some(Decoded::Known(envelope)) => format!("{} frame", envelope.kind()),
        Some(Decoded::Unrecognized(_)) => "unrecognized frame".to_string(),
        None => "closed connection".to_string(),
    };
    AgentError::Handshake(format!("expected {expected} frame, got {got}"))
}
