//! Wire protocol between the delivery server and its clients.
//!
//! Every WebSocket text message is a JSON envelope
//! `{"type": <kind>, "payload": <kind-specific body>}`.
//!
//! | Direction | `type` | `payload` |
//! |---|---|---|
//! | server → client, once at start | `metadata` | `{"frameCount": int}` |
//! | client → server | `request-frame` | `{"frame": int}` |
//! | server → client | `frame` | `{"yuvData": base64, "width": int, "height": int, "frameNumber": int, "totalFrames": int}` |
//! | server → client | `error` | `{"message": string, "frame": int?, "totalFrames": int}` |
//!
//! Unknown client kinds are ignored by the server.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::ScrubError, store::Frame};

/// The closed set of envelope kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Server handshake announcing the frame count.
    Metadata,
    /// Client request for one frame.
    RequestFrame,
    /// Server response carrying one frame.
    Frame,
    /// Server report of a request that could not be served.
    Error,
}

impl MessageKind {
    /// The `type` string used on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            MessageKind::Metadata => "metadata",
            MessageKind::RequestFrame => "request-frame",
            MessageKind::Frame => "frame",
            MessageKind::Error => "error",
        }
    }

    /// Look a kind up by its wire name.
    pub fn from_wire(kind: &str) -> Option<Self> {
        match kind {
            "metadata" => Some(MessageKind::Metadata),
            "request-frame" => Some(MessageKind::RequestFrame),
            "frame" => Some(MessageKind::Frame),
            "error" => Some(MessageKind::Error),
            _ => None,
        }
    }
}

/// An envelope whose payload has not been interpreted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Wire name of the kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Kind-specific body.
    #[serde(default)]
    pub payload: Value,
}

/// Body of a `metadata` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPayload {
    /// Number of frames available.
    pub frame_count: u64,
}

/// Body of a `request-frame` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFramePayload {
    /// Zero-based index of the requested frame.
    pub frame: i64,
}

/// Body of a `frame` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FramePayload {
    /// Raw pixel bytes, base64 encoded.
    pub yuv_data: String,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Zero-based index of this frame.
    pub frame_number: u64,
    /// Number of frames in the store.
    pub total_frames: u64,
}

impl FramePayload {
    /// Build the payload for `frame`.
    pub fn new(frame: &Frame, total_frames: u64) -> Self {
        Self {
            yuv_data: STANDARD.encode(frame.pixel_data()),
            width: frame.width(),
            height: frame.height(),
            frame_number: frame.index(),
            total_frames,
        }
    }

    /// Decode `yuv_data` back into raw bytes.
    pub fn pixel_data(&self) -> Result<Vec<u8>, ScrubError> {
        STANDARD
            .decode(&self.yuv_data)
            .map_err(|error| ScrubError::Protocol(format!("invalid yuvData: {error}")))
    }
}

/// Body of an `error` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// Human-readable description.
    pub message: String,
    /// The frame index the failed request asked for, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<i64>,
    /// Number of frames in the store.
    pub total_frames: u64,
}

/// Messages sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    /// Handshake.
    #[serde(rename = "metadata")]
    Metadata(MetadataPayload),
    /// One frame.
    #[serde(rename = "frame")]
    Frame(FramePayload),
    /// A request that could not be served.
    #[serde(rename = "error")]
    Error(ErrorPayload),
}

impl ServerMessage {
    /// The handshake announcing `frame_count`.
    pub fn metadata(frame_count: u64) -> Self {
        ServerMessage::Metadata(MetadataPayload { frame_count })
    }

    /// A response carrying `frame`.
    pub fn frame(frame: &Frame, total_frames: u64) -> Self {
        ServerMessage::Frame(FramePayload::new(frame, total_frames))
    }

    /// Report `error`, raised while serving a request for `frame`.
    pub fn error(error: &ScrubError, frame: Option<i64>, total_frames: u64) -> Self {
        ServerMessage::Error(ErrorPayload {
            message: error.to_string(),
            frame,
            total_frames,
        })
    }

    /// The envelope kind of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            ServerMessage::Metadata(_) => MessageKind::Metadata,
            ServerMessage::Frame(_) => MessageKind::Frame,
            ServerMessage::Error(_) => MessageKind::Error,
        }
    }

    /// Serialize to envelope JSON.
    pub fn to_json(&self) -> Result<String, ScrubError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse envelope JSON sent by a server.
    pub fn from_json(text: &str) -> Result<Self, ScrubError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Messages sent by a client, as understood by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Request for the frame at this index.
    RequestFrame(i64),
    /// A well-formed envelope of a kind the server does not handle.
    Unknown(String),
}

impl ClientMessage {
    /// Parse one client text message.
    ///
    /// # Errors
    ///
    /// Returns [`ScrubError::Protocol`] if the text is not an envelope, or if
    /// a `request-frame` body lacks an integer `frame`.
    pub fn parse(text: &str) -> Result<Self, ScrubError> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|error| ScrubError::Protocol(format!("invalid envelope: {error}")))?;

        match MessageKind::from_wire(&envelope.kind) {
            Some(MessageKind::RequestFrame) => {
                let body: RequestFramePayload = serde_json::from_value(envelope.payload)
                    .map_err(|error| {
                        ScrubError::Protocol(format!("invalid request-frame payload: {error}"))
                    })?;
                Ok(ClientMessage::RequestFrame(body.frame))
            }
            _ => Ok(ClientMessage::Unknown(envelope.kind)),
        }
    }

    /// Serialize to envelope JSON.
    pub fn to_json(&self) -> Result<String, ScrubError> {
        let envelope = match self {
            ClientMessage::RequestFrame(frame) => Envelope {
                kind: MessageKind::RequestFrame.as_str().to_string(),
                payload: serde_json::to_value(RequestFramePayload { frame: *frame })?,
            },
            ClientMessage::Unknown(kind) => Envelope {
                kind: kind.clone(),
                payload: Value::Null,
            },
        };
        Ok(serde_json::to_string(&envelope)?)
    }
}
