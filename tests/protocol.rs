//! Wire protocol integration tests.

use base64::{Engine, engine::general_purpose::STANDARD};
use framescrub::{
    ClientMessage, FrameStoreBuilder, MessageKind, PixelFormat, ScrubError, ServerMessage,
};
use serde_json::{Value, json};

fn to_value(message: &ServerMessage) -> Value {
    serde_json::from_str(&message.to_json().unwrap()).unwrap()
}

// ── Client messages ────────────────────────────────────────────────

#[test]
fn parses_request_frame() {
    let message = ClientMessage::parse(r#"{"type":"request-frame","payload":{"frame":42}}"#);
    assert_eq!(message.unwrap(), ClientMessage::RequestFrame(42));
}

#[test]
fn request_frame_tolerates_extra_fields() {
    let message = ClientMessage::parse(
        r#"{"type":"request-frame","payload":{"frame":1,"hint":"scrub"},"id":7}"#,
    );
    assert_eq!(message.unwrap(), ClientMessage::RequestFrame(1));
}

#[test]
fn negative_index_is_parsed() {
    let message = ClientMessage::parse(r#"{"type":"request-frame","payload":{"frame":-3}}"#);
    assert_eq!(message.unwrap(), ClientMessage::RequestFrame(-3));
}

#[test]
fn request_frame_without_payload_is_malformed() {
    let error = ClientMessage::parse(r#"{"type":"request-frame"}"#).unwrap_err();
    assert!(matches!(error, ScrubError::Protocol(_)));
}

#[test]
fn request_frame_with_non_integer_frame_is_malformed() {
    for body in [
        r#"{"type":"request-frame","payload":{"frame":"1"}}"#,
        r#"{"type":"request-frame","payload":{"frame":1.5}}"#,
        r#"{"type":"request-frame","payload":{}}"#,
    ] {
        let error = ClientMessage::parse(body).unwrap_err();
        assert!(matches!(error, ScrubError::Protocol(_)), "{body}: {error:?}");
    }
}

#[test]
fn non_envelope_is_malformed() {
    for body in ["", "not json", "[1,2,3]", r#"{"payload":{"frame":1}}"#] {
        let error = ClientMessage::parse(body).unwrap_err();
        assert!(matches!(error, ScrubError::Protocol(_)), "{body}: {error:?}");
    }
}

#[test]
fn unknown_kind_is_reported_not_rejected() {
    let message = ClientMessage::parse(r#"{"type":"seek","payload":{"to":3}}"#).unwrap();
    assert_eq!(message, ClientMessage::Unknown("seek".to_string()));

    // Server-to-client kinds sent by a client are just as unknown.
    let message = ClientMessage::parse(r#"{"type":"metadata","payload":{}}"#).unwrap();
    assert_eq!(message, ClientMessage::Unknown("metadata".to_string()));
}

#[test]
fn client_request_serializes_as_envelope() {
    let json = ClientMessage::RequestFrame(5).to_json().unwrap();
    let value: Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value, json!({"type": "request-frame", "payload": {"frame": 5}}));
}

// ── Server messages ────────────────────────────────────────────────

#[test]
fn metadata_envelope_shape() {
    let value = to_value(&ServerMessage::metadata(3));
    assert_eq!(value, json!({"type": "metadata", "payload": {"frameCount": 3}}));
}

#[test]
fn frame_envelope_shape() {
    let mut builder = FrameStoreBuilder::new(2, 1, PixelFormat::Yuv422p).unwrap();
    builder.push(&[0, 1, 2, 3]).unwrap();
    builder.push(&[250, 251, 252, 253]).unwrap();
    let store = builder.freeze();

    let message = ServerMessage::frame(store.get(1).unwrap(), store.count());
    assert_eq!(message.kind(), MessageKind::Frame);

    let value = to_value(&message);
    assert_eq!(value["type"], "frame");
    let payload = &value["payload"];
    assert_eq!(payload["width"], 2);
    assert_eq!(payload["height"], 1);
    assert_eq!(payload["frameNumber"], 1);
    assert_eq!(payload["totalFrames"], 2);

    let encoded = payload["yuvData"].as_str().expect("yuvData must be a string");
    assert_eq!(STANDARD.decode(encoded).unwrap(), vec![250, 251, 252, 253]);
}

#[test]
fn frame_payload_decodes_pixels() {
    let mut builder = FrameStoreBuilder::new(1, 1, PixelFormat::Rgb24).unwrap();
    builder.push(&[9, 8, 7]).unwrap();
    let store = builder.freeze();

    let json = ServerMessage::frame(store.get(0).unwrap(), 1).to_json().unwrap();
    match ServerMessage::from_json(&json).unwrap() {
        ServerMessage::Frame(payload) => assert_eq!(payload.pixel_data().unwrap(), vec![9, 8, 7]),
        other => panic!("Expected a frame message, got {other:?}"),
    }
}

#[test]
fn error_envelope_shape() {
    let error = ScrubError::FrameOutOfRange {
        frame_number: 5,
        total_frames: 3,
    };
    let value = to_value(&ServerMessage::error(&error, Some(5), 3));
    assert_eq!(
        value,
        json!({
            "type": "error",
            "payload": {
                "message": "Frame 5 is out of range (video has 3 frames)",
                "frame": 5,
                "totalFrames": 3
            }
        })
    );
}

#[test]
fn error_envelope_omits_missing_index() {
    let error = ScrubError::Protocol("bad".to_string());
    let value = to_value(&ServerMessage::error(&error, None, 0));
    assert!(value["payload"].get("frame").is_none());
}

#[test]
fn message_kind_wire_names() {
    for kind in [
        MessageKind::Metadata,
        MessageKind::RequestFrame,
        MessageKind::Frame,
        MessageKind::Error,
    ] {
        assert_eq!(MessageKind::from_wire(kind.as_str()), Some(kind));
    }
    assert_eq!(MessageKind::RequestFrame.as_str(), "request-frame");
    assert_eq!(MessageKind::from_wire("Request-Frame"), None);
}
