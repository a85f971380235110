//! Extraction and server configuration.
//!
//! [`ExtractionConfig`] is a builder that selects the raw output format and
//! threads progress callbacks and cancellation tokens through extraction
//! without polluting every function signature. [`ServerConfig`] carries the
//! accept-side settings of the delivery server.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framescrub::{
//!     CancellationToken, ExtractionConfig, OutputResolution, PixelFormat,
//!     ProgressCallback, ProgressInfo,
//! };
//!
//! struct LogProgress;
//! impl ProgressCallback for LogProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("{} frames decoded", info.current);
//!     }
//! }
//!
//! let token = CancellationToken::new();
//! let config = ExtractionConfig::new()
//!     .with_pixel_format(PixelFormat::Yuv422p)
//!     .with_resolution(OutputResolution::Fixed { width: 1280, height: 720 })
//!     .with_progress(Arc::new(LogProgress))
//!     .with_cancellation(token.clone())
//!     .with_batch_size(30);
//! ```

use std::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    net::SocketAddr,
    sync::Arc,
};

use crate::{
    error::ScrubError,
    metadata::StreamDescriptor,
    progress::{CancellationToken, NoOpProgress, ProgressCallback},
};

/// Raw pixel layout requested from the decoder.
///
/// Every format has a whole number of bytes per pixel, so the size of one
/// raw frame is always `width * height * bytes_per_pixel`. For `Yuv422p`
/// this holds only at even widths; see [`PixelFormat::supports_width`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// Planar Y'CbCr 4:2:2, 8 bits per sample (2 bytes per pixel). This is the default.
    #[default]
    Yuv422p,
    /// Planar Y'CbCr 4:4:4, 8 bits per sample (3 bytes per pixel).
    Yuv444p,
    /// Packed 8-bit RGB (3 bytes per pixel).
    Rgb24,
    /// 8-bit luma only (1 byte per pixel).
    Gray8,
}

impl PixelFormat {
    /// Bytes occupied by one pixel in the raw stream.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Yuv422p => 2,
            PixelFormat::Yuv444p | PixelFormat::Rgb24 => 3,
            PixelFormat::Gray8 => 1,
        }
    }

    /// The name ffmpeg uses for this format (`-pix_fmt`).
    pub const fn ffmpeg_name(self) -> &'static str {
        match self {
            PixelFormat::Yuv422p => "yuv422p",
            PixelFormat::Yuv444p => "yuv444p",
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Gray8 => "gray",
        }
    }

    /// Look a format up by its ffmpeg name or a common alias.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "yuv422p" | "yuv422" => Some(PixelFormat::Yuv422p),
            "yuv444p" | "yuv444" => Some(PixelFormat::Yuv444p),
            "rgb24" | "rgb" => Some(PixelFormat::Rgb24),
            "gray" | "gray8" | "grey" => Some(PixelFormat::Gray8),
            _ => None,
        }
    }

    /// Whether frames `width` pixels wide are exactly `bytes_per_pixel` per
    /// pixel. ffmpeg rounds 4:2:2 chroma planes up to `ceil(width / 2)`.
    pub const fn supports_width(self, width: u32) -> bool {
        !matches!(self, PixelFormat::Yuv422p) || width % 2 == 0
    }

    /// Size in bytes of one raw frame, or `None` on overflow.
    pub fn frame_size(self, width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(self.bytes_per_pixel())
    }
}

impl Display for PixelFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.ffmpeg_name())
    }
}

/// Output resolution of the raw stream.
///
/// Selected once per extractor; every frame of a store shares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputResolution {
    /// Keep the source stream's dimensions. This is the default.
    #[default]
    Source,
    /// Have the decoder scale every frame to a fixed size.
    Fixed {
        /// Output width in pixels.
        width: u32,
        /// Output height in pixels.
        height: u32,
    },
}

impl OutputResolution {
    /// Resolve the final output dimensions for a source stream.
    ///
    /// Returns `(width, height)`.
    pub fn resolve(&self, descriptor: &StreamDescriptor) -> (u32, u32) {
        match *self {
            OutputResolution::Source => (descriptor.width, descriptor.height),
            OutputResolution::Fixed { width, height } => (width, height),
        }
    }

    /// Returns the scale target if the decoder has to resize.
    pub fn scale_target(&self) -> Option<(u32, u32)> {
        match *self {
            OutputResolution::Source => None,
            OutputResolution::Fixed { width, height } => Some((width, height)),
        }
    }
}

/// Raw output layout computed for one extraction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrameLayout {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Pixel format of the raw stream.
    pub pixel_format: PixelFormat,
    /// Bytes per frame.
    pub frame_size: usize,
}

/// Configuration for extraction runs.
///
/// Carries the output format plus optional progress and cancellation
/// settings. A default-constructed config decodes to `yuv422p` at the source
/// resolution and never reports progress.
#[derive(Clone)]
pub struct ExtractionConfig {
    pub(crate) pixel_format: PixelFormat,
    pub(crate) resolution: OutputResolution,
    /// Progress callback. Defaults to a no-op.
    pub(crate) progress: Arc<dyn ProgressCallback>,
    /// Cancellation token. `None` means never cancelled.
    pub(crate) cancellation: Option<CancellationToken>,
    /// How often to fire the progress callback (every N frames).
    pub(crate) batch_size: u64,
}

impl Debug for ExtractionConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ExtractionConfig")
            .field("pixel_format", &self.pixel_format)
            .field("resolution", &self.resolution)
            .field("has_cancellation", &self.cancellation.is_some())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionConfig {
    /// Create a new configuration with default settings.
    pub fn new() -> Self {
        Self {
            pixel_format: PixelFormat::default(),
            resolution: OutputResolution::default(),
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            batch_size: 1,
        }
    }

    /// Set the raw pixel format requested from the decoder.
    #[must_use]
    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = format;
        self
    }

    /// Set the output resolution.
    #[must_use]
    pub fn with_resolution(mut self, resolution: OutputResolution) -> Self {
        self.resolution = resolution;
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    ///
    /// When the token is cancelled, the read loop stops at the next frame
    /// boundary and returns [`ScrubError::Cancelled`].
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Set how often the progress callback fires. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// The configured pixel format.
    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// The configured output resolution.
    pub fn resolution(&self) -> OutputResolution {
        self.resolution
    }

    /// Compute the raw frame layout for a source stream.
    ///
    /// # Errors
    ///
    /// Returns [`ScrubError::ZeroFrameSize`] when either output dimension is
    /// zero, or [`ScrubError::InvalidConfig`] when the size overflows or the
    /// width is odd for `Yuv422p`.
    pub fn layout(&self, descriptor: &StreamDescriptor) -> Result<RawFrameLayout, ScrubError> {
        let (width, height) = self.resolution.resolve(descriptor);
        if width != 0 && !self.pixel_format.supports_width(width) {
            return Err(ScrubError::InvalidConfig(format!(
                "{width}x{height} {} needs an even width; pick another size or pixel format",
                self.pixel_format
            )));
        }
        let frame_size = self.pixel_format.frame_size(width, height).ok_or_else(|| {
            ScrubError::InvalidConfig(format!("frame size of {width}x{height} overflows"))
        })?;

        if frame_size == 0 {
            return Err(ScrubError::ZeroFrameSize {
                width,
                height,
                pixel_format: self.pixel_format,
            });
        }

        Ok(RawFrameLayout {
            width,
            height,
            pixel_format: self.pixel_format,
            frame_size,
        })
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}

/// Which WebSocket upgrade requests are accepted, by `Origin` header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OriginPolicy {
    /// Accept every origin, including requests without an `Origin` header.
    #[default]
    Any,
    /// Accept only the listed origins (exact, case-insensitive match).
    /// Requests without an `Origin` header are accepted.
    AllowList(Vec<String>),
}

impl OriginPolicy {
    /// Returns `true` if a request carrying `origin` may be upgraded.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        match (self, origin) {
            (OriginPolicy::Any, _) | (OriginPolicy::AllowList(_), None) => true,
            (OriginPolicy::AllowList(allowed), Some(origin)) => allowed
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(origin)),
        }
    }
}

/// Accept-side configuration of the [`FrameServer`](crate::FrameServer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub(crate) bind_address: SocketAddr,
    pub(crate) path: String,
    pub(crate) origin_policy: OriginPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerConfig {
    /// Defaults: `127.0.0.1:8080`, path `/websocket`, any origin.
    pub fn new() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            path: "/websocket".to_string(),
            origin_policy: OriginPolicy::Any,
        }
    }

    /// Set the TCP address to listen on.
    #[must_use]
    pub fn with_bind_address(mut self, address: SocketAddr) -> Self {
        self.bind_address = address;
        self
    }

    /// Set the request path that is upgraded to a WebSocket.
    ///
    /// A missing leading slash is added.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        self
    }

    /// Set the origin policy applied during the upgrade.
    #[must_use]
    pub fn with_origin_policy(mut self, policy: OriginPolicy) -> Self {
        self.origin_policy = policy;
        self
    }

    /// The TCP address to listen on.
    pub fn bind_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// The WebSocket request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The origin policy.
    pub fn origin_policy(&self) -> &OriginPolicy {
        &self.origin_policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_uses_bytes_per_pixel() {
        assert_eq!(PixelFormat::Yuv422p.frame_size(4, 2), Some(16));
        assert_eq!(PixelFormat::Rgb24.frame_size(4, 2), Some(24));
        assert_eq!(PixelFormat::Gray8.frame_size(4, 2), Some(8));
    }

    #[test]
    fn yuv422p_requires_even_width() {
        assert!(PixelFormat::Yuv422p.supports_width(640));
        assert!(!PixelFormat::Yuv422p.supports_width(641));
        assert!(PixelFormat::Yuv444p.supports_width(641));
        assert!(PixelFormat::Gray8.supports_width(3));
    }

    #[test]
    fn frame_size_overflow_is_none() {
        assert_eq!(PixelFormat::Rgb24.frame_size(u32::MAX, u32::MAX), None);
    }

    #[test]
    fn fixed_resolution_ignores_source() {
        let descriptor = StreamDescriptor::new(1920, 1080);
        let resolution = OutputResolution::Fixed {
            width: 640,
            height: 360,
        };
        assert_eq!(resolution.resolve(&descriptor), (640, 360));
        assert_eq!(OutputResolution::Source.resolve(&descriptor), (1920, 1080));
    }

    #[test]
    fn zero_dimension_is_rejected() {
        let config = ExtractionConfig::new();
        let err = config.layout(&StreamDescriptor::new(0, 1080)).unwrap_err();
        assert!(matches!(err, ScrubError::ZeroFrameSize { width: 0, .. }));
    }

    #[test]
    fn origin_allow_list() {
        let policy = OriginPolicy::AllowList(vec!["http://localhost:3000".into()]);
        assert!(policy.allows(Some("http://LOCALHOST:3000")));
        assert!(policy.allows(None));
        assert!(!policy.allows(Some("http://evil.example")));
        assert!(OriginPolicy::Any.allows(Some("http://evil.example")));
    }

    #[test]
    fn path_gets_leading_slash() {
        assert_eq!(ServerConfig::new().with_path("frames").path(), "/frames");
    }
}
