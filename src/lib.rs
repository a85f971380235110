//! # framescrub
//!
//! Decode a video once, keep every frame in memory, and serve individual
//! frames by index to WebSocket clients.
//!
//! `framescrub` runs a single decode pass through an `ffmpeg` subprocess that
//! writes headerless raw video to its stdout, slices that stream into
//! fixed-size [`Frame`]s, and freezes them into a [`FrameStore`]. A
//! [`FrameServer`] then shares the store with any number of clients, each of
//! which receives the frame count on connect and requests frames one at a
//! time.
//!
//! ## Quick Start
//!
//! ### Extract Frames
//!
//! ```no_run
//! use framescrub::{FfprobeResolver, FrameExtractor};
//!
//! let store = FrameExtractor::default().load("input.mp4", &FfprobeResolver::new())?;
//! let first = store.get(0)?;
//! println!("frame 0: {}x{}, {} bytes", first.width(), first.height(), first.pixel_data().len());
//! # Ok::<(), framescrub::ScrubError>(())
//! ```
//!
//! ### Serve Frames
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framescrub::{FfprobeResolver, FrameExtractor, FrameServer, ServerConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), framescrub::ScrubError> {
//! let store = FrameExtractor::default().load("input.mp4", &FfprobeResolver::new())?;
//! let server = FrameServer::new(Arc::new(store), ServerConfig::new()).bind().await?;
//! server.run().await;
//! # Ok(())
//! # }
//! ```
//!
//! ### Configure Extraction
//!
//! ```no_run
//! use framescrub::{
//!     ExtractionConfig, FfmpegDecoder, FixedResolver, FrameExtractor, OutputResolution,
//!     PixelFormat, StreamDescriptor,
//! };
//!
//! let config = ExtractionConfig::new()
//!     .with_pixel_format(PixelFormat::Gray8)
//!     .with_resolution(OutputResolution::Fixed { width: 640, height: 360 });
//! let extractor = FrameExtractor::new(FfmpegDecoder::new()).with_config(config);
//!
//! // Skip probing when the dimensions are already known.
//! let resolver = FixedResolver::from(StreamDescriptor::new(1920, 1080));
//! let store = extractor.load("input.mp4", &resolver)?;
//! # Ok::<(), framescrub::ScrubError>(())
//! ```
//!
//! ## Features
//!
//! - **Single-pass extraction**: one decoder process, one blocking read loop
//! - **Pluggable decoders**: anything implementing [`RawVideoDecoder`]
//! - **Probing**: `ffprobe` JSON or, with `libav`, the FFmpeg libraries
//! - **Progress & cancellation**: callbacks and a [`CancellationToken`]
//! - **Multi-client delivery**: a frozen store shared without locks
//! - **PNG export**: planar YUV to RGB for inspecting a single frame
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `libav` | `LibavResolver` probes in-process through `ffmpeg-next` |
//!
//! ## Requirements
//!
//! `ffmpeg` and `ffprobe` must be on `PATH`, or configured explicitly with
//! [`FfmpegDecoder::with_program`] and [`FfprobeResolver::with_program`].

pub mod config;
pub mod decoder;
pub mod error;
pub mod export;
pub mod extract;
pub mod metadata;
pub mod probe;
pub mod progress;
pub mod protocol;
pub mod server;
pub mod session;
pub mod store;

pub use config::{
    ExtractionConfig, OriginPolicy, OutputResolution, PixelFormat, RawFrameLayout, ServerConfig,
};
pub use decoder::{DecodeRequest, DecodeSession, FfmpegDecoder, PassthroughDecoder, RawVideoDecoder};
pub use error::{ErrorCategory, ScrubError};
pub use extract::FrameExtractor;
pub use metadata::{FrameRate, StreamDescriptor};
#[cfg(feature = "libav")]
pub use probe::LibavResolver;
pub use probe::{FfprobeResolver, FixedResolver, StreamResolver};
pub use progress::{CancellationToken, ProgressCallback, ProgressInfo};
pub use protocol::{ClientMessage, Envelope, MessageKind, ServerMessage};
pub use server::{BoundServer, FrameServer, ServerSummary};
pub use session::{CloseReason, Session, SessionState, SessionSummary};
pub use store::{Frame, FrameStore, FrameStoreBuilder};
