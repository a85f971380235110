//! Frame extraction.
//!
//! [`FrameExtractor`] runs one full decode pass over a media file and turns
//! the decoder's raw output into a [`FrameStore`]. The raw stream carries no
//! headers or frame boundaries, so the extractor slices it purely by byte
//! count: every `frame_size` bytes is one frame, end-of-stream exactly on a
//! boundary ends the run, and end-of-stream anywhere else is an error.
//!
//! Extraction is all-or-nothing. Any failure, including a decoder that exits
//! unsuccessfully after all frames were read, discards the frames decoded so
//! far.
//!
//! # Example
//!
//! ```no_run
//! use framescrub::{FfmpegDecoder, FfprobeResolver, FrameExtractor};
//!
//! let extractor = FrameExtractor::new(FfmpegDecoder::new());
//! let store = extractor.load("input.mp4", &FfprobeResolver::new())?;
//! println!("{} frames of {}x{}", store.count(), store.width(), store.height());
//! # Ok::<(), framescrub::ScrubError>(())
//! ```

use std::{
    fs::File,
    io::{ErrorKind, Read},
    path::Path,
};

use crate::{
    config::{ExtractionConfig, RawFrameLayout},
    decoder::{DecodeRequest, FfmpegDecoder, RawVideoDecoder},
    error::ScrubError,
    metadata::StreamDescriptor,
    probe::StreamResolver,
    progress::ProgressTracker,
    store::{FrameStore, FrameStoreBuilder},
};

/// Decodes a media file once and collects every frame.
#[derive(Debug, Clone)]
pub struct FrameExtractor<D = FfmpegDecoder> {
    decoder: D,
    config: ExtractionConfig,
}

impl Default for FrameExtractor<FfmpegDecoder> {
    fn default() -> Self {
        Self::new(FfmpegDecoder::new())
    }
}

impl<D: RawVideoDecoder> FrameExtractor<D> {
    /// Create an extractor with the default [`ExtractionConfig`].
    pub fn new(decoder: D) -> Self {
        Self {
            decoder,
            config: ExtractionConfig::new(),
        }
    }

    /// Replace the extraction configuration.
    #[must_use]
    pub fn with_config(mut self, config: ExtractionConfig) -> Self {
        self.config = config;
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Resolve the file's video streams and extract frames from the first.
    ///
    /// # Errors
    ///
    /// Returns [`ScrubError::NoVideoStream`] if the resolver reports no
    /// stream, plus every error of [`extract`](FrameExtractor::extract).
    pub fn load<P, R>(&self, path: P, resolver: &R) -> Result<FrameStore, ScrubError>
    where
        P: AsRef<Path>,
        R: StreamResolver + ?Sized,
    {
        let path = path.as_ref();
        let descriptors = resolver.resolve(path)?;
        let descriptor = descriptors.first().ok_or(ScrubError::NoVideoStream)?;

        log::info!(
            "Resolved {} video stream(s) in {}; using {}x{} [{}] @ {}",
            descriptors.len(),
            path.display(),
            descriptor.width,
            descriptor.height,
            descriptor.codec,
            descriptor.frame_rate,
        );

        self.extract(path, descriptor)
    }

    /// Decode `path` and collect its frames.
    ///
    /// The frame size is computed from `descriptor` and the configured
    /// output resolution before anything is opened or spawned.
    ///
    /// # Errors
    ///
    /// - [`ScrubError::ZeroFrameSize`] if the output layout has no pixels.
    /// - [`ScrubError::FileOpen`] if the file cannot be opened.
    /// - [`ScrubError::DecoderSpawn`] if the decoder cannot be started.
    /// - [`ScrubError::TruncatedFrame`] if the stream ends mid-frame.
    /// - [`ScrubError::DecoderExit`] if the decoder reports failure.
    /// - [`ScrubError::Cancelled`] if the configured token is cancelled.
    pub fn extract<P: AsRef<Path>>(
        &self,
        path: P,
        descriptor: &StreamDescriptor,
    ) -> Result<FrameStore, ScrubError> {
        let path = path.as_ref();
        let layout = self.config.layout(descriptor)?;

        let input = File::open(path).map_err(|error| ScrubError::FileOpen {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;

        let request = DecodeRequest {
            pixel_format: layout.pixel_format,
            scale: self.config.resolution.scale_target(),
        };

        log::info!(
            "Extracting {} as {}x{} {} ({} bytes per frame)",
            path.display(),
            layout.width,
            layout.height,
            layout.pixel_format,
            layout.frame_size,
        );

        let mut session = self.decoder.spawn(input, &request)?;
        // On error the session is dropped here, which stops the decoder.
        let store = read_frames(session.output(), layout, &self.config)?;
        session.finish()?;

        log::info!("Extracted {} frame(s) from {}", store.count(), path.display());
        Ok(store)
    }
}

/// Slice a raw pixel stream into frames of `layout.frame_size` bytes.
///
/// Reads until end-of-stream. A stream whose length is an exact multiple of
/// the frame size (including zero) yields that many frames; any other length
/// fails with [`ScrubError::TruncatedFrame`].
///
/// # Example
///
/// ```
/// use framescrub::{ExtractionConfig, PixelFormat, StreamDescriptor, extract::read_frames};
///
/// let config = ExtractionConfig::new().with_pixel_format(PixelFormat::Gray8);
/// let layout = config.layout(&StreamDescriptor::new(2, 2))?;
///
/// let raw = vec![7u8; 3 * 4];
/// let store = read_frames(&mut raw.as_slice(), layout, &config)?;
/// assert_eq!(store.count(), 3);
/// # Ok::<(), framescrub::ScrubError>(())
/// ```
pub fn read_frames<R: Read + ?Sized>(
    reader: &mut R,
    layout: RawFrameLayout,
    config: &ExtractionConfig,
) -> Result<FrameStore, ScrubError> {
    let mut builder = FrameStoreBuilder::new(layout.width, layout.height, layout.pixel_format)?;
    let mut buffer = vec![0u8; builder.frame_size()];
    let mut tracker = ProgressTracker::new(config.progress.clone(), config.batch_size);

    loop {
        if config.is_cancelled() {
            return Err(ScrubError::Cancelled);
        }

        let filled = fill_buffer(reader, &mut buffer)?;
        if filled == 0 {
            break;
        }
        if filled < buffer.len() {
            return Err(ScrubError::TruncatedFrame {
                frame_number: builder.len() as u64,
                expected: buffer.len(),
                received: filled,
            });
        }

        builder.push(&buffer)?;
        tracker.advance(buffer.len());
    }

    tracker.finish();
    Ok(builder.freeze())
}

/// Read until `buffer` is full or the stream ends; returns the bytes read.
fn fill_buffer<R: Read + ?Sized>(reader: &mut R, buffer: &mut [u8]) -> Result<usize, ScrubError> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(error) if error.kind() == ErrorKind::Interrupted => continue,
            Err(error) => return Err(error.into()),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use super::fill_buffer;

    /// Yields at most `chunk` bytes per read call.
    struct Trickle {
        inner: Cursor<Vec<u8>>,
        chunk: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let limit = buf.len().min(self.chunk);
            self.inner.read(&mut buf[..limit])
        }
    }

    #[test]
    fn fill_buffer_spans_short_reads() {
        let mut reader = Trickle {
            inner: Cursor::new((0..10).collect()),
            chunk: 3,
        };
        let mut buffer = [0u8; 8];
        assert_eq!(fill_buffer(&mut reader, &mut buffer).unwrap(), 8);
        assert_eq!(buffer, [0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(fill_buffer(&mut reader, &mut buffer).unwrap(), 2);
        assert_eq!(fill_buffer(&mut reader, &mut buffer).unwrap(), 0);
    }
}
