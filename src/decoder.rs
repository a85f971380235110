//! Raw video decoders.
//!
//! The extractor never talks to ffmpeg directly. It asks a
//! [`RawVideoDecoder`] to turn the media file's bytes into a headerless raw
//! pixel stream and reads that stream through a [`DecodeSession`]. The
//! default implementation, [`FfmpegDecoder`], runs the `ffmpeg` binary with
//! the file on standard input and raw frames on standard output.
//! [`PassthroughDecoder`] hands the input bytes through untouched, for files
//! that already contain raw frames.
//!
//! # Example
//!
//! ```no_run
//! use framescrub::{FfmpegDecoder, FrameExtractor, StreamDescriptor};
//!
//! let decoder = FfmpegDecoder::new().with_program("/opt/ffmpeg/bin/ffmpeg");
//! let extractor = FrameExtractor::new(decoder);
//! let store = extractor.extract("input.mp4", &StreamDescriptor::new(1920, 1080))?;
//! # Ok::<(), framescrub::ScrubError>(())
//! ```

use std::{
    ffi::OsString,
    fs::File,
    io::{BufReader, Read},
    process::{Child, ChildStdout, Command, Stdio},
};

use crate::{config::PixelFormat, error::ScrubError};

/// What the extractor asks of the decoder for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeRequest {
    /// Pixel format of the raw output stream.
    pub pixel_format: PixelFormat,
    /// Scale every frame to `(width, height)`; `None` keeps the source size.
    pub scale: Option<(u32, u32)>,
}

/// A running decode whose raw output can be read.
pub trait DecodeSession: Send {
    /// The raw pixel stream: frames back-to-back, no headers, no delimiters.
    fn output(&mut self) -> &mut dyn Read;

    /// Wait for the decoder to terminate.
    ///
    /// Called only after the output reached end-of-stream. A decoder that
    /// reports failure here fails the extraction even though every frame was
    /// read.
    fn finish(self: Box<Self>) -> Result<(), ScrubError>;
}

/// Capability interface to something that decodes a media byte stream into
/// raw frames.
pub trait RawVideoDecoder: Send + Sync {
    /// Start decoding `input` according to `request`.
    fn spawn(
        &self,
        input: File,
        request: &DecodeRequest,
    ) -> Result<Box<dyn DecodeSession>, ScrubError>;
}

impl<D: RawVideoDecoder + ?Sized> RawVideoDecoder for Box<D> {
    fn spawn(
        &self,
        input: File,
        request: &DecodeRequest,
    ) -> Result<Box<dyn DecodeSession>, ScrubError> {
        (**self).spawn(input, request)
    }
}

/// Decodes through an `ffmpeg` subprocess.
///
/// Runs, in effect:
///
/// ```text
/// ffmpeg -hide_banner -loglevel error -i pipe:0 -an -sn [-vf scale=W:H] -f rawvideo -pix_fmt yuv422p pipe:1
/// ```
///
/// The decoder's stderr is inherited so its diagnostics reach the operator.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    program: OsString,
    log_level: String,
    input_args: Vec<String>,
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegDecoder {
    /// Use `ffmpeg` from `PATH` with log level `error`.
    pub fn new() -> Self {
        Self {
            program: OsString::from("ffmpeg"),
            log_level: "error".to_string(),
            input_args: Vec::new(),
        }
    }

    /// Set the ffmpeg executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    /// Set the value passed to `-loglevel`.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Add arguments placed before `-i pipe:0` (e.g. `-f`, `matroska`).
    #[must_use]
    pub fn with_input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Build the command line for `request`, without standard streams.
    pub fn command(&self, request: &DecodeRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg(&self.log_level)
            .args(&self.input_args)
            .arg("-i")
            .arg("pipe:0")
            .arg("-an")
            .arg("-sn");

        if let Some((width, height)) = request.scale {
            cmd.arg("-vf").arg(format!("scale={width}:{height}"));
        }

        cmd.arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg(request.pixel_format.ffmpeg_name())
            .arg("pipe:1");
        cmd
    }
}

impl RawVideoDecoder for FfmpegDecoder {
    fn spawn(
        &self,
        input: File,
        request: &DecodeRequest,
    ) -> Result<Box<dyn DecodeSession>, ScrubError> {
        let program = self.program.to_string_lossy().into_owned();
        let mut cmd = self.command(request);
        cmd.stdin(Stdio::from(input))
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        log::debug!("Spawning decoder: {cmd:?}");

        let mut child = cmd.spawn().map_err(|error| ScrubError::DecoderSpawn {
            program: program.clone(),
            reason: error.to_string(),
        })?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ScrubError::MissingPipe("stdout"));
        };

        Ok(Box::new(FfmpegSession {
            child: Some(child),
            stdout,
            program,
        }))
    }
}

struct FfmpegSession {
    child: Option<Child>,
    stdout: ChildStdout,
    program: String,
}

impl DecodeSession for FfmpegSession {
    fn output(&mut self) -> &mut dyn Read {
        &mut self.stdout
    }

    fn finish(mut self: Box<Self>) -> Result<(), ScrubError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let status = child.wait()?;
        log::debug!("Decoder {} exited with {status}", self.program);

        if status.success() {
            Ok(())
        } else {
            Err(ScrubError::DecoderExit {
                status: status.to_string(),
            })
        }
    }
}

impl Drop for FfmpegSession {
    fn drop(&mut self) {
        // Reached only when extraction stopped before `finish`.
        if let Some(mut child) = self.child.take() {
            log::debug!("Killing unfinished decoder {}", self.program);
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Treats the input file as an already-decoded raw stream.
///
/// The caller is responsible for the file matching the requested pixel
/// format and dimensions; scaling is not supported.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughDecoder;

impl RawVideoDecoder for PassthroughDecoder {
    fn spawn(
        &self,
        input: File,
        request: &DecodeRequest,
    ) -> Result<Box<dyn DecodeSession>, ScrubError> {
        if request.scale.is_some() {
            return Err(ScrubError::InvalidConfig(
                "passthrough decoding cannot scale frames".to_string(),
            ));
        }
        Ok(Box::new(PassthroughSession {
            reader: BufReader::new(input),
        }))
    }
}

struct PassthroughSession {
    reader: BufReader<File>,
}

impl DecodeSession for PassthroughSession {
    fn output(&mut self) -> &mut dyn Read {
        &mut self.reader
    }

    fn finish(self: Box<Self>) -> Result<(), ScrubError> {
        Ok(())
    }
}
