//! Control-channel frames and the codec for them.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::health::HealthSample;

/// Longest slice of an unclassifiable frame kept for logging.
const UNRECOGNIZED_SNIPPET_MAX: usize = 256;

/// Every frame either side of the control channel may send.
///
/// Worker-to-master frames are `register`, `reconnect`, and
/// `health_report`; the rest flow master-to-worker. Keeping both directions
/// in one enum lets the master-side tooling and the worker share a codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// First frame the master sends after the socket opens.
    Connected,

    /// Fresh registration: present the credential and request a node id.
    ///
    /// Legacy installs also carry the operator-chosen hostname as
    /// `address`; the master keys the node record on it.
    Register {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        address: Option<String>,
    },

    /// Re-identification under a node id assigned on an earlier connection.
    Reconnect { key: String, node_id: String },

    /// Master's verdict on a `register`/`reconnect` request.
    Accepted { success: bool },

    /// Identity assignment that closes the handshake.
    Registered { node_id: String },

    /// Periodic host telemetry, tagged with the reporting node.
    HealthReport {
        node_id: String,
        #[serde(flatten)]
        sample: HealthSample,
    },

    /// Launch a job process on the worker host.
    Spawn {
        script: String,
        #[serde(default)]
        args: Vec<String>,
    },

    /// Tear down tracked jobs and exit.
    Kill,
}

impl Envelope {
    pub fn kind(&self) -> CommandKind {
        match self {
            Envelope::Connected => CommandKind::Connected,
            Envelope::Register { .. } => CommandKind::Register,
            Envelope::Reconnect { .. } => CommandKind::Reconnect,
            Envelope::Accepted { .. } => CommandKind::Accepted,
            Envelope::Registered { .. } => CommandKind::Registered,
            Envelope::HealthReport { .. } => CommandKind::HealthReport,
            Envelope::Spawn { .. } => CommandKind::Spawn,
            Envelope::Kill => CommandKind::Kill,
        }
    }
}

/// Payload-free tag of an [`Envelope`] variant, used as a routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Connected,
    Register,
    Reconnect,
    Accepted,
    Registered,
    HealthReport,
    Spawn,
    Kill,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Connected => "connected",
            CommandKind::Register => "register",
            CommandKind::Reconnect => "reconnect",
            CommandKind::Accepted => "accepted",
            CommandKind::Registered => "registered",
            CommandKind::HealthReport => "health_report",
            CommandKind::Spawn => "spawn",
            CommandKind::Kill => "kill",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of decoding one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Known(Envelope),
    /// Anything the codec cannot classify. Carries a bounded copy of the
    /// offending payload for logging.
    Unrecognized(String),
}

/// Decode one frame. Total: malformed input becomes `Unrecognized`.
pub fn decode(raw: &str) -> Decoded {
    match serde_json::from_str::<Envelope>(raw) {
        Ok(envelope) => Decoded::Known(envelope),
        Err(_) => Decoded::Unrecognized(snippet(raw)),
    }
}

/// Serialize one frame for the wire.
pub fn encode(envelope: &Envelope) -> Result<String, EncodeError> {
    Ok(serde_json::to_string(envelope)?)
}

/// A frame that could not be serialized. Envelope fields are all plain
/// strings and numbers, so hitting this means a codec bug, not bad input.
#[derive(Debug, Error)]
#[error("frame could not be serialized: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

fn snippet(raw: &str) -> String {
    if raw.chars().count() <= UNRECOGNIZED_SNIPPET_MAX {
        raw.to_string()
    } else {
        let mut clipped: String = raw.chars().take(UNRECOGNIZED_SNIPPET_MAX).collect();
        clipped.push_str("...");
        clipped
    }
}
