//! Video stream probing.
//!
//! A [`StreamResolver`] reports the video streams of a media file as
//! [`StreamDescriptor`]s. [`FfprobeResolver`] shells out to `ffprobe` and
//! parses its JSON report. With the `libav` feature, [`LibavResolver`] reads
//! the same facts in-process through `ffmpeg-next`. [`FixedResolver`] returns
//! descriptors supplied up front, for raw inputs that cannot be probed.
//!
//! # Example
//!
//! ```no_run
//! use framescrub::{FfprobeResolver, StreamResolver};
//!
//! let streams = FfprobeResolver::new().resolve("input.mp4".as_ref())?;
//! for stream in &streams {
//!     println!("{}x{} [{}] @ {}", stream.width, stream.height, stream.codec, stream.frame_rate);
//! }
//! # Ok::<(), framescrub::ScrubError>(())
//! ```

use std::{
    ffi::OsString,
    fs,
    path::Path,
    process::{Command, Stdio},
};

use serde::Deserialize;

use crate::{error::ScrubError, metadata::StreamDescriptor};

/// Reports the video streams of a media file.
pub trait StreamResolver: Send + Sync {
    /// Return every video stream in `path`, in container order.
    ///
    /// An empty vector is not an error here; callers that need a stream
    /// reject it.
    fn resolve(&self, path: &Path) -> Result<Vec<StreamDescriptor>, ScrubError>;
}

/// Probes through an `ffprobe` subprocess.
#[derive(Debug, Clone)]
pub struct FfprobeResolver {
    program: OsString,
}

impl Default for FfprobeResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct ProbeReport {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    codec_name: String,
    r_frame_rate: Option<String>,
}

impl FfprobeResolver {
    /// Use `ffprobe` from `PATH`.
    pub fn new() -> Self {
        Self {
            program: OsString::from("ffprobe"),
        }
    }

    /// Set the ffprobe executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    /// Parse the JSON printed by `ffprobe -show_streams -print_format json`.
    ///
    /// Streams without dimensions are skipped. An unparsable frame rate is
    /// recorded as `0/1`, since it is informational only.
    pub fn parse_report(json: &[u8]) -> Result<Vec<StreamDescriptor>, ScrubError> {
        let report: ProbeReport = serde_json::from_slice(json)
            .map_err(|error| ScrubError::Probe(format!("unreadable ffprobe report: {error}")))?;

        Ok(report
            .streams
            .into_iter()
            .filter_map(|stream| {
                let (Some(width), Some(height)) = (stream.width, stream.height) else {
                    return None;
                };
                let frame_rate = stream
                    .r_frame_rate
                    .as_deref()
                    .and_then(|rate| rate.parse().ok())
                    .unwrap_or_default();
                Some(
                    StreamDescriptor::new(width, height)
                        .with_codec(stream.codec_name)
                        .with_frame_rate(frame_rate),
                )
            })
            .collect())
    }
}

impl StreamResolver for FfprobeResolver {
    fn resolve(&self, path: &Path) -> Result<Vec<StreamDescriptor>, ScrubError> {
        fs::metadata(path).map_err(|error| ScrubError::FileOpen {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;

        let mut cmd = Command::new(&self.program);
        cmd.arg("-v")
            .arg("quiet")
            .arg("-show_streams")
            .arg("-select_streams")
            .arg("v")
            .arg("-show_format")
            .arg("-print_format")
            .arg("json")
            .arg(path)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit());

        log::debug!("Probing {}: {cmd:?}", path.display());

        let output = cmd.output().map_err(|error| {
            ScrubError::Probe(format!(
                "failed to run {}: {error}",
                self.program.to_string_lossy()
            ))
        })?;

        if !output.status.success() {
            return Err(ScrubError::Probe(format!(
                "{} exited with {}",
                self.program.to_string_lossy(),
                output.status
            )));
        }

        Self::parse_report(&output.stdout)
    }
}

/// Returns the same descriptors for every path.
#[derive(Debug, Clone, Default)]
pub struct FixedResolver {
    descriptors: Vec<StreamDescriptor>,
}

impl FixedResolver {
    /// Resolve every path to `descriptors`.
    pub fn new(descriptors: Vec<StreamDescriptor>) -> Self {
        Self { descriptors }
    }
}

impl From<StreamDescriptor> for FixedResolver {
    fn from(descriptor: StreamDescriptor) -> Self {
        Self::new(vec![descriptor])
    }
}

impl StreamResolver for FixedResolver {
    fn resolve(&self, _path: &Path) -> Result<Vec<StreamDescriptor>, ScrubError> {
        Ok(self.descriptors.clone())
    }
}

/// Probes in-process through the FFmpeg libraries.
#[cfg(feature = "libav")]
#[derive(Debug, Clone, Copy, Default)]
pub struct LibavResolver;

#[cfg(feature = "libav")]
impl StreamResolver for LibavResolver {
    fn resolve(&self, path: &Path) -> Result<Vec<StreamDescriptor>, ScrubError> {
        use ffmpeg_next::{codec::context::Context as CodecContext, media::Type};

        use crate::metadata::FrameRate;

        let file_open = |reason: String| ScrubError::FileOpen {
            path: path.to_path_buf(),
            reason,
        };

        ffmpeg_next::init()
            .map_err(|error| file_open(format!("FFmpeg initialisation failed: {error}")))?;
        let input_context =
            ffmpeg_next::format::input(&path).map_err(|error| file_open(error.to_string()))?;

        let mut descriptors = Vec::new();
        for stream in input_context.streams() {
            if stream.parameters().medium() != Type::Video {
                continue;
            }

            let index = stream.index();
            let video_decoder = CodecContext::from_parameters(stream.parameters())
                .and_then(|context| context.decoder().video())
                .map_err(|error| {
                    ScrubError::Probe(format!("stream {index} has no usable decoder: {error}"))
                })?;

            let codec = video_decoder
                .codec()
                .map(|codec| codec.name().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let rate = stream.rate();
            let frame_rate = FrameRate::new(
                u32::try_from(rate.numerator()).unwrap_or(0),
                u32::try_from(rate.denominator()).unwrap_or(1),
            );

            descriptors.push(
                StreamDescriptor::new(video_decoder.width(), video_decoder.height())
                    .with_codec(codec)
                    .with_frame_rate(frame_rate),
            );
        }

        Ok(descriptors)
    }
}
