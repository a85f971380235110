//! In-memory frame storage.
//!
//! A [`FrameStore`] is the ordered, gap-free collection of every [`Frame`]
//! decoded from one media file. It is assembled by a [`FrameStoreBuilder`]
//! during extraction and frozen when the decoder finishes; afterwards it
//! exposes no mutation at all, so it can be shared behind an
//! [`Arc`](std::sync::Arc) by any number of connections without locking.
//!
//! Frames are held for the lifetime of the store. There is no eviction.

use std::slice::Iter;

use crate::{config::PixelFormat, error::ScrubError};

/// One decoded picture.
///
/// `pixel_data` holds exactly `width * height * bytes_per_pixel` bytes in the
/// decoder's native layout, which the store never interprets.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    index: u64,
    width: u32,
    height: u32,
    pixel_data: Box<[u8]>,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("index", &self.index)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixel_data.len())
            .finish()
    }
}

impl Frame {
    /// Zero-based position of this frame in decode order.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw pixel bytes.
    pub fn pixel_data(&self) -> &[u8] {
        &self.pixel_data
    }
}

/// Append-only assembly of a [`FrameStore`].
///
/// Indices are assigned by append order starting at zero.
#[derive(Debug)]
pub struct FrameStoreBuilder {
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    frame_size: usize,
    frames: Vec<Frame>,
}

impl FrameStoreBuilder {
    /// Start an empty store for frames of the given layout.
    ///
    /// # Errors
    ///
    /// Returns [`ScrubError::ZeroFrameSize`] if the layout yields zero-byte
    /// frames.
    pub fn new(width: u32, height: u32, pixel_format: PixelFormat) -> Result<Self, ScrubError> {
        let frame_size = pixel_format
            .frame_size(width, height)
            .ok_or_else(|| {
                ScrubError::InvalidConfig(format!("frame size of {width}x{height} overflows"))
            })?;
        if frame_size == 0 {
            return Err(ScrubError::ZeroFrameSize {
                width,
                height,
                pixel_format,
            });
        }

        Ok(Self {
            width,
            height,
            pixel_format,
            frame_size,
            frames: Vec::new(),
        })
    }

    /// Copy one frame's bytes into the store and return its index.
    ///
    /// # Errors
    ///
    /// Returns [`ScrubError::TruncatedFrame`] if `pixel_data` is not exactly
    /// one frame long.
    pub fn push(&mut self, pixel_data: &[u8]) -> Result<u64, ScrubError> {
        let index = self.frames.len() as u64;
        if pixel_data.len() != self.frame_size {
            return Err(ScrubError::TruncatedFrame {
                frame_number: index,
                expected: self.frame_size,
                received: pixel_data.len(),
            });
        }

        self.frames.push(Frame {
            index,
            width: self.width,
            height: self.height,
            pixel_data: pixel_data.into(),
        });
        Ok(index)
    }

    /// Number of frames appended so far.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` if nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Bytes per frame.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Finish assembly.
    pub fn freeze(mut self) -> FrameStore {
        self.frames.shrink_to_fit();
        FrameStore {
            width: self.width,
            height: self.height,
            pixel_format: self.pixel_format,
            frame_size: self.frame_size,
            frames: self.frames,
        }
    }
}

/// The frozen, indexed collection of decoded frames.
///
/// # Example
///
/// ```
/// use framescrub::{FrameStoreBuilder, PixelFormat};
///
/// let mut builder = FrameStoreBuilder::new(2, 2, PixelFormat::Gray8)?;
/// builder.push(&[0, 1, 2, 3])?;
/// let store = builder.freeze();
///
/// assert_eq!(store.count(), 1);
/// assert_eq!(store.get(0)?.pixel_data(), &[0, 1, 2, 3]);
/// assert!(store.get(1).is_err());
/// # Ok::<(), framescrub::ScrubError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FrameStore {
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    frame_size: usize,
    frames: Vec<Frame>,
}

impl FrameStore {
    /// Number of frames in the store.
    pub fn count(&self) -> u64 {
        self.frames.len() as u64
    }

    /// Returns `true` if the store holds no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Fetch the frame at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ScrubError::FrameOutOfRange`] if `index < 0` or
    /// `index >= count()`.
    pub fn get(&self, index: i64) -> Result<&Frame, ScrubError> {
        usize::try_from(index)
            .ok()
            .and_then(|position| self.frames.get(position))
            .ok_or(ScrubError::FrameOutOfRange {
                frame_number: index,
                total_frames: self.count(),
            })
    }

    /// Iterate over frames in index order.
    pub fn iter(&self) -> Iter<'_, Frame> {
        self.frames.iter()
    }

    /// Width shared by every frame.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height shared by every frame.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel format of every frame.
    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Bytes per frame.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }
}

impl<'a> IntoIterator for &'a FrameStore {
    type Item = &'a Frame;
    type IntoIter = Iter<'a, Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
