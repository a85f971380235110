//! Per-connection session tests.
//!
//! Each test wires a [`Session`] to a client over an in-memory duplex pipe,
//! so the full WebSocket framing is exercised without opening a socket.

use std::{io::Write, sync::Arc, time::Duration};

use framescrub::{
    CancellationToken, ClientMessage, CloseReason, ExtractionConfig, FrameExtractor, FrameStore,
    FrameStoreBuilder, PassthroughDecoder, PixelFormat, ScrubError, ServerMessage, Session,
    SessionState, SessionSummary, StreamDescriptor,
};
use futures_util::{SinkExt, StreamExt};
use tokio::{io::DuplexStream, task::JoinHandle, time::timeout};
use tokio_tungstenite::{
    WebSocketStream,
    tungstenite::{Message, protocol::Role},
};

type Client = WebSocketStream<DuplexStream>;

const WAIT: Duration = Duration::from_secs(5);

/// Three 4x2 yuv422p frames; every byte of frame `i` equals `i`.
fn three_frames() -> FrameStore {
    let mut builder = FrameStoreBuilder::new(4, 2, PixelFormat::Yuv422p).unwrap();
    for value in 0..3u8 {
        builder.push(&[value; 16]).unwrap();
    }
    builder.freeze()
}

async fn connect(
    store: FrameStore,
) -> (
    Client,
    JoinHandle<Result<SessionSummary, ScrubError>>,
    CancellationToken,
) {
    let (server_io, client_io) = tokio::io::duplex(1 << 16);
    let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
    let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;

    let token = CancellationToken::new();
    let session = Session::new(Arc::new(store), token.clone()).with_peer("test");
    let handle = tokio::spawn(session.run(server));
    (client, handle, token)
}

async fn receive(client: &mut Client) -> ServerMessage {
    loop {
        let message = timeout(WAIT, client.next())
            .await
            .expect("Timed out waiting for the server")
            .expect("Connection ended")
            .expect("Failed to read message");
        if let Message::Text(text) = message {
            return ServerMessage::from_json(text.as_str()).expect("Server sent invalid JSON");
        }
    }
}

async fn send_text(client: &mut Client, text: &str) {
    client
        .send(Message::text(text.to_string()))
        .await
        .expect("Failed to send");
}

async fn request(client: &mut Client, frame: i64) {
    let json = ClientMessage::RequestFrame(frame).to_json().unwrap();
    send_text(client, &json).await;
}

async fn finish(
    mut client: Client,
    handle: JoinHandle<Result<SessionSummary, ScrubError>>,
) -> SessionSummary {
    client.close(None).await.expect("Failed to close");
    timeout(WAIT, handle)
        .await
        .expect("Session did not stop")
        .expect("Session task panicked")
        .expect("Session failed")
}

fn expect_frame(message: ServerMessage) -> framescrub::protocol::FramePayload {
    match message {
        ServerMessage::Frame(payload) => payload,
        other => panic!("Expected a frame, got {other:?}"),
    }
}

// ── Handshake ──────────────────────────────────────────────────────

#[tokio::test]
async fn metadata_is_sent_first() {
    let (mut client, handle, _token) = connect(three_frames()).await;

    assert_eq!(receive(&mut client).await, ServerMessage::metadata(3));

    let summary = finish(client, handle).await;
    assert_eq!(summary.close_reason, CloseReason::ClientClosed);
    assert_eq!(summary.frames_sent, 0);
}

#[tokio::test]
async fn empty_store_announces_zero_frames() {
    let store = FrameStoreBuilder::new(2, 2, PixelFormat::Gray8)
        .unwrap()
        .freeze();
    let (mut client, handle, _token) = connect(store).await;

    assert_eq!(receive(&mut client).await, ServerMessage::metadata(0));
    request(&mut client, 0).await;
    assert!(matches!(receive(&mut client).await, ServerMessage::Error(_)));

    finish(client, handle).await;
}

#[test]
fn new_session_is_connecting() {
    let session = Session::new(Arc::new(three_frames()), CancellationToken::new());
    assert_eq!(session.state(), SessionState::Connecting);
    assert_eq!(*session.subscribe().borrow(), SessionState::Connecting);
}

#[tokio::test]
async fn state_moves_through_lifecycle() {
    let (server_io, client_io) = tokio::io::duplex(1 << 16);
    let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
    let mut client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;

    let session = Session::new(Arc::new(three_frames()), CancellationToken::new());
    let mut state = session.subscribe();
    let handle = tokio::spawn(session.run(server));

    assert_eq!(receive(&mut client).await, ServerMessage::metadata(3));
    timeout(WAIT, state.wait_for(|state| *state == SessionState::Serving))
        .await
        .expect("Session never reached Serving")
        .expect("Session state dropped");

    finish(client, handle).await;
    assert_eq!(*state.borrow(), SessionState::Closed);
}

// ── Serving ────────────────────────────────────────────────────────

#[tokio::test]
async fn request_returns_matching_frame() {
    let (mut client, handle, _token) = connect(three_frames()).await;
    receive(&mut client).await;

    request(&mut client, 1).await;
    let payload = expect_frame(receive(&mut client).await);
    assert_eq!(payload.frame_number, 1);
    assert_eq!(payload.total_frames, 3);
    assert_eq!((payload.width, payload.height), (4, 2));
    assert_eq!(payload.pixel_data().unwrap(), vec![1; 16]);

    let summary = finish(client, handle).await;
    assert_eq!(summary.frames_sent, 1);
}

#[tokio::test]
async fn out_of_range_reports_error_and_keeps_serving() {
    let (mut client, handle, _token) = connect(three_frames()).await;
    receive(&mut client).await;

    request(&mut client, 5).await;
    match receive(&mut client).await {
        ServerMessage::Error(payload) => {
            assert_eq!(payload.frame, Some(5));
            assert_eq!(payload.total_frames, 3);
            assert!(payload.message.contains("out of range"), "{}", payload.message);
        }
        other => panic!("Expected an error, got {other:?}"),
    }

    request(&mut client, -1).await;
    assert!(matches!(receive(&mut client).await, ServerMessage::Error(_)));

    request(&mut client, 0).await;
    assert_eq!(expect_frame(receive(&mut client).await).frame_number, 0);

    let summary = finish(client, handle).await;
    assert_eq!(summary.frames_sent, 1);
    assert_eq!(summary.errors_sent, 2);
}

#[tokio::test]
async fn malformed_messages_are_dropped_silently() {
    let (mut client, handle, _token) = connect(three_frames()).await;
    receive(&mut client).await;

    send_text(&mut client, "not json").await;
    send_text(&mut client, r#"{"type":"request-frame","payload":{"frame":"x"}}"#).await;
    send_text(&mut client, r#"{"type":"play","payload":{}}"#).await;
    client
        .send(Message::binary(vec![1u8, 2, 3]))
        .await
        .expect("Failed to send");
    request(&mut client, 2).await;

    // Nothing was answered before the valid request.
    assert_eq!(expect_frame(receive(&mut client).await).frame_number, 2);

    let summary = finish(client, handle).await;
    assert_eq!(summary.messages_dropped, 4);
    assert_eq!(summary.frames_sent, 1);
    assert_eq!(summary.errors_sent, 0);
}

#[tokio::test]
async fn responses_follow_request_order() {
    let (mut client, handle, _token) = connect(three_frames()).await;
    receive(&mut client).await;

    for frame in [2, 0, 1, 1] {
        request(&mut client, frame).await;
    }
    let mut order = Vec::new();
    for _ in 0..4 {
        order.push(expect_frame(receive(&mut client).await).frame_number);
    }
    assert_eq!(order, vec![2, 0, 1, 1]);

    finish(client, handle).await;
}

// ── Termination ────────────────────────────────────────────────────

#[tokio::test]
async fn dropped_client_ends_session() {
    let (mut client, handle, _token) = connect(three_frames()).await;
    receive(&mut client).await;
    drop(client);

    let summary = timeout(WAIT, handle)
        .await
        .expect("Session did not stop")
        .expect("Session task panicked")
        .expect("Session failed");
    assert_eq!(summary.close_reason, CloseReason::ClientClosed);
}

#[tokio::test]
async fn cancellation_stops_idle_session() {
    let (mut client, handle, token) = connect(three_frames()).await;
    receive(&mut client).await;

    token.cancel();
    let summary = timeout(WAIT, handle)
        .await
        .expect("Session did not observe cancellation")
        .expect("Session task panicked")
        .expect("Session failed");
    assert_eq!(summary.close_reason, CloseReason::Cancelled);
}

#[tokio::test]
async fn cancelled_before_start_still_handshakes() {
    let (mut client, handle, token) = connect(three_frames()).await;
    token.cancel();

    // The handshake is written unconditionally; serving then stops at once.
    assert_eq!(receive(&mut client).await, ServerMessage::metadata(3));
    let summary = timeout(WAIT, handle).await.unwrap().unwrap().unwrap();
    assert_eq!(summary.close_reason, CloseReason::Cancelled);
}

// ── Extraction to delivery ─────────────────────────────────────────

#[tokio::test]
async fn extracted_frames_are_served() {
    // Three 4x2 gray frames back to back; every byte of frame `i` is `i + 1`.
    let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    for value in 1..=3u8 {
        file.write_all(&[value; 8]).unwrap();
    }

    let store = FrameExtractor::new(PassthroughDecoder)
        .with_config(ExtractionConfig::new().with_pixel_format(PixelFormat::Gray8))
        .extract(file.path(), &StreamDescriptor::new(4, 2))
        .expect("Failed to extract frames");
    assert_eq!(store.count(), 3);

    let (mut client, handle, _token) = connect(store).await;
    assert_eq!(receive(&mut client).await, ServerMessage::metadata(3));

    request(&mut client, 1).await;
    let frame = expect_frame(receive(&mut client).await);
    assert_eq!(frame.frame_number, 1);
    assert_eq!(frame.total_frames, 3);
    assert_eq!(frame.pixel_data().unwrap(), vec![2u8; 8]);

    request(&mut client, 5).await;
    match receive(&mut client).await {
        ServerMessage::Error(error) => {
            assert_eq!(error.frame, Some(5));
            assert_eq!(error.total_frames, 3);
        }
        other => panic!("Expected an error, got {other:?}"),
    }

    request(&mut client, 0).await;
    let frame = expect_frame(receive(&mut client).await);
    assert_eq!(frame.frame_number, 0);
    assert_eq!(frame.pixel_data().unwrap(), vec![1u8; 8]);

    let summary = finish(client, handle).await;
    assert_eq!(summary.frames_sent, 2);
    assert_eq!(summary.errors_sent, 1);
}
