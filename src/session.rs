//! One client connection.
//!
//! A [`Session`] drives a single WebSocket through
//! `Connecting → Handshaking → Serving → Closed`. On start it sends one
//! `metadata` envelope with the store's frame count, then answers
//! `request-frame` messages strictly one at a time, in arrival order. A
//! malformed message or an out-of-range index never closes the connection;
//! a failed read or write does.
//!
//! Sessions work over any stream of WebSocket messages, so they can be
//! driven by a TCP upgrade in [`FrameServer`](crate::FrameServer) or by an
//! in-memory duplex pipe in tests.

use std::{io::ErrorKind, sync::Arc};

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::{Error as WebSocketError, Message, error::ProtocolError};

use crate::{
    error::{ErrorCategory, ScrubError},
    progress::CancellationToken,
    protocol::{ClientMessage, ServerMessage},
    store::FrameStore,
};

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Accepted, handshake not sent yet.
    Connecting,
    /// Sending the metadata announcement.
    Handshaking,
    /// Answering frame requests.
    Serving,
    /// Terminal; no further I/O.
    Closed,
}

/// Why a session stopped reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent a close frame or the stream ended.
    ClientClosed,
    /// The session's cancellation token fired.
    Cancelled,
    /// Reading the next message failed.
    ReadFailed(String),
}

/// Counters reported when a session ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// `frame` responses written.
    pub frames_sent: u64,
    /// `error` responses written.
    pub errors_sent: u64,
    /// Client messages dropped as malformed or unknown.
    pub messages_dropped: u64,
    /// What ended the session.
    pub close_reason: CloseReason,
}

/// Serves frames from a shared store over one connection.
///
/// [`run`](Session::run) consumes the session, so its lifecycle is observed
/// through [`subscribe`](Session::subscribe).
#[derive(Debug)]
pub struct Session {
    store: Arc<FrameStore>,
    cancellation: CancellationToken,
    peer: String,
    state: watch::Sender<SessionState>,
    frames_sent: u64,
    errors_sent: u64,
    messages_dropped: u64,
}

impl Session {
    /// Create a session over `store`, stopped by `cancellation`.
    pub fn new(store: Arc<FrameStore>, cancellation: CancellationToken) -> Self {
        Self {
            store,
            cancellation,
            peer: "client".to_string(),
            state: watch::Sender::new(SessionState::Connecting),
            frames_sent: 0,
            errors_sent: 0,
            messages_dropped: 0,
        }
    }

    /// Label used in log lines, usually the peer address.
    #[must_use]
    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = peer.into();
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state transitions, including those made while [`run`](Session::run)
    /// drives the connection. The receiver sees `Closed` last.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn transition(&self, state: SessionState) {
        log::debug!("[{}] {:?} -> {state:?}", self.peer, self.state());
        self.state.send_replace(state);
    }

    /// Run the connection to completion.
    ///
    /// Returns the session counters once the client goes away, a read
    /// fails, or the cancellation token fires.
    ///
    /// # Errors
    ///
    /// Returns [`ScrubError::Transport`] if writing the handshake or a
    /// response fails.
    pub async fn run<S>(mut self, mut socket: S) -> Result<SessionSummary, ScrubError>
    where
        S: Stream<Item = Result<Message, WebSocketError>>
            + Sink<Message, Error = WebSocketError>
            + Unpin,
    {
        self.transition(SessionState::Handshaking);
        let frame_count = self.store.count();
        if let Err(error) = send(&mut socket, &ServerMessage::metadata(frame_count)).await {
            self.transition(SessionState::Closed);
            return Err(error);
        }
        log::debug!("[{}] handshake sent ({frame_count} frames)", self.peer);

        self.transition(SessionState::Serving);
        let close_reason = loop {
            if self.cancellation.is_cancelled() {
                break CloseReason::Cancelled;
            }

            let next = tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => break CloseReason::Cancelled,
                next = socket.next() => next,
            };

            let text = match next {
                None | Some(Ok(Message::Close(_))) => break CloseReason::ClientClosed,
                Some(Err(error)) if is_disconnect(&error) => break CloseReason::ClientClosed,
                Some(Err(error)) => break CloseReason::ReadFailed(error.to_string()),
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Binary(data))) => {
                    log::warn!(
                        "[{}] dropping {}-byte binary message",
                        self.peer,
                        data.len()
                    );
                    self.messages_dropped += 1;
                    continue;
                }
                Some(Ok(_)) => continue,
            };

            if let Err(error) = self.handle_text(&mut socket, text.as_str()).await {
                self.transition(SessionState::Closed);
                return Err(error);
            }
        };

        self.transition(SessionState::Closed);
        log::debug!("[{}] session closed: {close_reason:?}", self.peer);

        Ok(SessionSummary {
            frames_sent: self.frames_sent,
            errors_sent: self.errors_sent,
            messages_dropped: self.messages_dropped,
            close_reason,
        })
    }

    async fn handle_text<S>(&mut self, socket: &mut S, text: &str) -> Result<(), ScrubError>
    where
        S: Sink<Message, Error = WebSocketError> + Unpin,
    {
        let index = match ClientMessage::parse(text) {
            Ok(ClientMessage::RequestFrame(index)) => index,
            Ok(ClientMessage::Unknown(kind)) => {
                log::warn!("[{}] ignoring message of unknown type {kind:?}", self.peer);
                self.messages_dropped += 1;
                return Ok(());
            }
            Err(error) => {
                log::warn!("[{}] {error}", self.peer);
                self.messages_dropped += 1;
                return Ok(());
            }
        };

        match self.send_frame(socket, index).await {
            Ok(()) => {
                self.frames_sent += 1;
                Ok(())
            }
            Err(error) if error.category() == ErrorCategory::Range => {
                log::warn!("[{}] {error}", self.peer);
                let reply = ServerMessage::error(&error, Some(index), self.store.count());
                send(socket, &reply).await?;
                self.errors_sent += 1;
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    /// Write the frame at `index` as one `frame` envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ScrubError::FrameOutOfRange`] without writing anything if
    /// `index` is outside the store, or [`ScrubError::Transport`] if the
    /// write fails.
    pub async fn send_frame<S>(&self, socket: &mut S, index: i64) -> Result<(), ScrubError>
    where
        S: Sink<Message, Error = WebSocketError> + Unpin,
    {
        let frame = self.store.get(index)?;
        log::debug!("[{}] sending frame {index}", self.peer);
        send(socket, &ServerMessage::frame(frame, self.store.count())).await
    }
}

async fn send<S>(socket: &mut S, message: &ServerMessage) -> Result<(), ScrubError>
where
    S: Sink<Message, Error = WebSocketError> + Unpin,
{
    socket.send(Message::text(message.to_json()?)).await?;
    Ok(())
}

fn is_disconnect(error: &WebSocketError) -> bool {
    match error {
        WebSocketError::ConnectionClosed | WebSocketError::AlreadyClosed => true,
        WebSocketError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => true,
        WebSocketError::Io(io) => matches!(
            io.kind(),
            ErrorKind::ConnectionReset | ErrorKind::BrokenPipe | ErrorKind::UnexpectedEof
        ),
        _ => false,
    }
}
