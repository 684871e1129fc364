//! In-memory stand-in for a master connection, used by unit tests.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures_util::{Sink, Stream};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// Plays back a scripted sequence of incoming frames and records everything
/// sent through it.
///
/// The stream ends after the script unless [`hold_open`] was set, in which
/// case it pends forever; a pending read never wakes, so pair it with a
/// select arm that resolves on its own.
///
/// [`hold_open`]: ScriptedLink::hold_open
pub(crate) struct ScriptedLink {
    incoming: VecDeque<Result<Message, WsError>>,
    sent: Arc<Mutex<Vec<Message>>>,
    hold_open: bool,
}

impl ScriptedLink {
    pub fn new(frames: Vec<&str>) -> Self {
        let incoming = frames
            .into_iter()
            .map(|frame| Ok(Message::text(frame)))
            .collect();
        Self {
            incoming,
            sent: Arc::new(Mutex::new(Vec::new())),
            hold_open: false,
        }
    }

    pub fn with_incoming_text(mut self, frame: &str) -> Self {
        self.incoming.push_back(Ok(Message::text(frame)));
        self
    }

    pub fn push_incoming(&mut self, frame: Result<Message, WsError>) {
        self.incoming.push_back(frame);
    }

    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Shared handle to the sent frames, usable after the link is moved.
    pub fn sent_log(&self) -> Arc<Mutex<Vec<Message>>> {
        Arc::clone(&self.sent)
    }

    /// Payloads of the text frames sent so far.
    pub fn sent_texts(&self) -> Vec<String> {
        texts_of(&self.sent)
    }
}

pub(crate) fn texts_of(log: &Arc<Mutex<Vec<Message>>>) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|message| match message {
            Message::Text(text) => Some(text.as_str().to_string()),
            _ => None,
        })
        .collect()
}

impl Stream for ScriptedLink {
    type Item = Result<Message, WsError>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.incoming.pop_front() {
            Some(item) => Poll::Ready(Some(item)),
            None if this.hold_open => Poll::Pending,
            None => Poll::Ready(None),
        }
    }
}

impl Sink<Message> for ScriptedLink {
    type Error = WsError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
        self.get_mut().sent.lock().unwrap().push(item);
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}
