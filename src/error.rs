//! Error types for the `framescrub` crate.
//!
//! This module defines [`ScrubError`], the unified error type returned by all
//! fallible operations in the crate, and [`ErrorCategory`], which groups the
//! variants by how far a failure is allowed to propagate. Extraction errors
//! abort the whole load; protocol and range errors are scoped to one request;
//! transport errors are scoped to one connection.

use std::{io::Error as IoError, path::PathBuf};

use image::ImageError;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WebSocketError;

use crate::config::PixelFormat;

/// The unified error type for all `framescrub` operations.
///
/// Every public method that can fail returns `Result<T, ScrubError>`.
/// Variants carry enough context to diagnose the problem without needing
/// additional logging at the call site.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScrubError {
    /// The media file could not be opened.
    #[error("Failed to open media file at {path}: {reason}")]
    FileOpen {
        /// Path that was passed to the extractor or resolver.
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The resolver returned no video stream descriptors.
    #[error("No video stream found in file")]
    NoVideoStream,

    /// The computed raw frame size is zero.
    #[error("Frame size is zero for {width}x{height} {pixel_format}")]
    ZeroFrameSize {
        /// Output width in pixels.
        width: u32,
        /// Output height in pixels.
        height: u32,
        /// Output pixel format.
        pixel_format: PixelFormat,
    },

    /// A configuration value is unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The stream descriptor resolver failed.
    #[error("Failed to probe media: {0}")]
    Probe(String),

    /// The decoder process could not be started.
    #[error("Failed to spawn decoder {program:?}: {reason}")]
    DecoderSpawn {
        /// Program that was executed.
        program: String,
        /// Underlying reason the spawn failed.
        reason: String,
    },

    /// A standard stream of the decoder process was not captured.
    #[error("Decoder {0} pipe is not available")]
    MissingPipe(&'static str),

    /// The raw stream ended in the middle of a frame.
    #[error(
        "Raw stream ended mid-frame at frame {frame_number}: got {received} of {expected} bytes"
    )]
    TruncatedFrame {
        /// Index the incomplete frame would have received.
        frame_number: u64,
        /// Bytes required for one frame.
        expected: usize,
        /// Bytes actually read before the stream ended.
        received: usize,
    },

    /// The decoder process exited unsuccessfully.
    #[error("Decoder exited unsuccessfully: {status}")]
    DecoderExit {
        /// Exit status as reported by the operating system.
        status: String,
    },

    /// A client message could not be understood.
    #[error("Malformed client message: {0}")]
    Protocol(String),

    /// The requested frame index is outside the store.
    #[error("Frame {frame_number} is out of range (video has {total_frames} frames)")]
    FrameOutOfRange {
        /// The frame index that was requested.
        frame_number: i64,
        /// The number of frames in the store.
        total_frames: u64,
    },

    /// The WebSocket connection failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// An I/O error occurred while reading or writing files or pipes.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate during frame export.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,
}

/// Coarse classification of a [`ScrubError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Missing or invalid input, detected before any decode work starts.
    Config,
    /// File, pipe, or process I/O failure.
    Io,
    /// The decoder produced an incomplete stream or failed.
    Decode,
    /// A client message was malformed. The connection stays open.
    Protocol,
    /// A frame index outside the store was requested. The connection stays open.
    Range,
    /// The connection itself failed. Only that connection is affected.
    Transport,
    /// The operation was cancelled.
    Cancelled,
}

impl ScrubError {
    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ScrubError::NoVideoStream
            | ScrubError::ZeroFrameSize { .. }
            | ScrubError::InvalidConfig(_)
            | ScrubError::Probe(_) => ErrorCategory::Config,
            ScrubError::FileOpen { .. }
            | ScrubError::DecoderSpawn { .. }
            | ScrubError::MissingPipe(_)
            | ScrubError::IoError(_)
            | ScrubError::ImageError(_) => ErrorCategory::Io,
            ScrubError::TruncatedFrame { .. } | ScrubError::DecoderExit { .. } => {
                ErrorCategory::Decode
            }
            ScrubError::Protocol(_) => ErrorCategory::Protocol,
            ScrubError::FrameOutOfRange { .. } => ErrorCategory::Range,
            ScrubError::Transport(_) => ErrorCategory::Transport,
            ScrubError::Cancelled => ErrorCategory::Cancelled,
        }
    }

    /// Returns `true` if a connection may keep serving after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Protocol | ErrorCategory::Range
        )
    }
}

impl From<WebSocketError> for ScrubError {
    fn from(error: WebSocketError) -> Self {
        ScrubError::Transport(error.to_string())
    }
}

impl From<serde_json::Error> for ScrubError {
    fn from(error: serde_json::Error) -> Self {
        ScrubError::Protocol(error.to_string())
    }
}
