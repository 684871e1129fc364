//! WebSocket transport to the master.
//!
//! Everything above this module works in terms of [`Envelope`] values; the
//! helpers here are the only place raw frames are touched. They are generic
//! over the stream/sink so session logic can be driven by an in-memory
//! double in tests.

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use muster_protocol::{decode, encode, Decoded, Envelope};

use crate::error::AgentError;

/// The production connection type; tests substitute scripted doubles.
pub type MasterStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open a WebSocket connection to the master.
pub async fn dial(master_url: &str) -> Result<MasterStream, AgentError> {
    debug!(url = %master_url, "dialing master");
    let (stream, _response) = connect_async(master_url)
        .await
        .map_err(|source| AgentError::Dial {
            url: master_url.to_string(),
            source,
        })?;
    debug!(url = %master_url, "connected");
    Ok(stream)
}

/// Pull the next decodable frame off the stream.
///
/// Control frames are skipped. Returns `None` once the connection is over,
/// whether by close frame, end of stream, or transport error; the caller
/// treats all three as a dropped connection.
pub async fn next_decoded<S>(stream: &mut S) -> Option<Decoded>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => return Some(decode(text.as_str())),
            Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                Ok(text) => return Some(decode(text)),
                Err(_) => {
                    return Some(Decoded::Unrecognized(format!(
                        "<{} bytes of non-utf8 data>",
                        bytes.len()
                    )))
                }
            },
            Some(Ok(Message::Close(frame))) => {
                debug!(frame = ?frame, "master closed the connection");
                return None;
            }
            Some(Ok(_)) => continue, // ping/pong keepalive
            Some(Err(e)) => {
                warn!(error = %e, "connection error while receiving");
                return None;
            }
            None => return None,
        }
    }
}

/// Encode `envelope` and send it as one text frame.
pub async fn send_envelope<S>(sink: &mut S, envelope: &Envelope) -> Result<(), AgentError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let frame = encode(envelope)?;
    sink.send(Message::text(frame)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedLink;
    use muster_protocol::CommandKind;
    use tokio_tungstenite::tungstenite::Bytes;

    #[tokio::test]
    async fn test_text_frames_are_decoded() {
        let mut link = ScriptedLink::new(vec![r#"{"type":"kill"}"#]);
        match next_decoded(&mut link).await {
            Some(Decoded::Known(env)) => assert_eq!(env.kind(), CommandKind::Kill),
            other => panic!("expected kill, got {other:?}"),
        }
        assert!(next_decoded(&mut link).await.is_none());
    }

    #[tokio::test]
    async fn test_utf8_binary_frames_are_decoded_like_text() {
        let mut link = ScriptedLink::new(vec![]);
        link.push_incoming(Ok(Message::binary(br#"{"type":"connected"}"#.to_vec())));
        match next_decoded(&mut link).await {
            Some(Decoded::Known(Envelope::Connected)) => {}
            other => panic!("expected connected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_utf8_binary_frames_are_unrecognized() {
        let mut link = ScriptedLink::new(vec![]);
        link.push_incoming(Ok(Message::binary(vec![0xff, 0xfe, 0x00])));
        match next_decoded(&mut link).await {
            Some(Decoded::Unrecognized(snippet)) => assert!(snippet.contains("non-utf8")),
            other => panic!("expected unrecognized, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_control_frames_are_skipped() {
        let mut link = ScriptedLink::new(vec![]);
        link.push_incoming(Ok(Message::Ping(Bytes::new())));
        link.push_incoming(Ok(Message::text(r#"{"type":"kill"}"#)));
        match next_decoded(&mut link).await {
            Some(Decoded::Known(Envelope::Kill)) => {}
            other => panic!("expected kill after ping, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_error_ends_the_stream() {
        let mut link = ScriptedLink::new(vec![]);
        link.push_incoming(Err(WsError::ConnectionClosed));
        assert!(next_decoded(&mut link).await.is_none());
    }

    #[tokio::test]
    async fn test_send_envelope_writes_one_text_frame() {
        let mut link = ScriptedLink::new(vec![]);
        send_envelope(&mut link, &Envelope::Kill).await.unwrap();

        let sent = link.sent_texts();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], r#"{"type":"kill"}"#);
    }
}
