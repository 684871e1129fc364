//! Periodic health reporting.
//!
//! Once a session is registered, the reporter owns the send half of the
//! connection and pushes one sampled [`HealthReport`] per interval until
//! sending fails or the supervisor cancels it at session end.
//!
//! [`HealthReport`]: muster_protocol::Envelope::HealthReport

use std::time::Duration;

use futures_util::{Sink, SinkExt};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use muster_protocol::{encode, Envelope};

use crate::telemetry;

/// Sample and send health reports forever, starting immediately.
///
/// Returns nothing: encode problems skip one report, send problems stop the
/// reporter. The dispatch loop notices dropped connections on its own, so
/// there is nobody useful to hand an error to.
pub async fn run_health_reporter<S>(mut sink: S, node_id: String, interval: Duration)
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    info!(interval_secs = interval.as_secs(), "health reporter started");
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;

        let report = Envelope::HealthReport {
            node_id: node_id.clone(),
            sample: telemetry::sample(),
        };
        let frame = match encode(&report) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "health report failed to encode, skipping");
                continue;
            }
        };
        if let Err(e) = sink.send(Message::text(frame)).await {
            debug!(error = %e, "health send failed, reporter stopping");
            break;
        }
        debug!("health report sent");
    }
}
