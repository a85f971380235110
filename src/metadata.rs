//! Video stream descriptors.
//!
//! A [`StreamDescriptor`] holds the per-stream facts a resolver reports for a
//! media file. The extractor consumes only the dimensions; codec name and
//! frame rate are informational.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use crate::error::ScrubError;

/// A frame rate expressed as an exact rational, e.g. `30000/1001`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRate {
    /// Numerator (frames).
    pub numerator: u32,
    /// Denominator (seconds).
    pub denominator: u32,
}

impl FrameRate {
    /// Create a new rational frame rate.
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Approximate frames per second, or `0.0` when the denominator is zero.
    pub fn as_f64(&self) -> f64 {
        if self.denominator == 0 {
            0.0
        } else {
            self.numerator as f64 / self.denominator as f64
        }
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::new(0, 1)
    }
}

impl Display for FrameRate {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl FromStr for FrameRate {
    type Err = ScrubError;

    /// Parse `"num/den"` or a bare integer such as `"25"`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let invalid = || ScrubError::Probe(format!("invalid frame rate: {trimmed:?}"));

        match trimmed.split_once('/') {
            Some((numerator, denominator)) => Ok(Self::new(
                numerator.trim().parse().map_err(|_| invalid())?,
                denominator.trim().parse().map_err(|_| invalid())?,
            )),
            None => Ok(Self::new(trimmed.parse().map_err(|_| invalid())?, 1)),
        }
    }
}

/// Facts about one video stream, as reported by a
/// [`StreamResolver`](crate::StreamResolver).
///
/// Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct StreamDescriptor {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Codec name (e.g. `"h264"`, `"vp9"`).
    pub codec: String,
    /// Nominal frame rate.
    pub frame_rate: FrameRate,
}

impl StreamDescriptor {
    /// Describe a stream by its dimensions alone.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            codec: String::new(),
            frame_rate: FrameRate::default(),
        }
    }

    /// Set the codec name.
    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = codec.into();
        self
    }

    /// Set the frame rate.
    pub fn with_frame_rate(mut self, frame_rate: FrameRate) -> Self {
        self.frame_rate = frame_rate;
        self
    }
}
