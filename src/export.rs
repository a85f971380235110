//! Offline frame export.
//!
//! Converts a stored [`Frame`] into an [`RgbImage`] and writes it as PNG.
//! This is a debugging aid; the delivery server never calls it.
//!
//! Planar YUV frames are laid out as the full luma plane followed by the two
//! chroma planes, and are converted with the full-range JFIF matrix.

use std::path::Path;

use image::{ImageFormat, RgbImage};

use crate::{config::PixelFormat, error::ScrubError, store::Frame};

/// Convert `frame`, whose bytes are in `pixel_format`, to RGB.
///
/// # Errors
///
/// Returns [`ScrubError::InvalidConfig`] if the frame is too short for its
/// dimensions in `pixel_format`.
pub fn frame_to_rgb(frame: &Frame, pixel_format: PixelFormat) -> Result<RgbImage, ScrubError> {
    let width = frame.width();
    let height = frame.height();
    let data = frame.pixel_data();
    let luma_size = width as usize * height as usize;

    let chroma_width = match pixel_format {
        PixelFormat::Yuv422p => width.div_ceil(2),
        PixelFormat::Yuv444p => width,
        PixelFormat::Rgb24 | PixelFormat::Gray8 => 0,
    };
    let chroma_size = chroma_width as usize * height as usize;

    let required = match pixel_format {
        PixelFormat::Rgb24 => luma_size * 3,
        _ => luma_size + 2 * chroma_size,
    };
    if data.len() < required {
        return Err(ScrubError::InvalidConfig(format!(
            "frame {} has {} bytes, {width}x{height} {pixel_format} needs {required}",
            frame.index(),
            data.len(),
        )));
    }

    let image = match pixel_format {
        PixelFormat::Rgb24 => RgbImage::from_raw(width, height, data[..required].to_vec())
            .ok_or_else(|| ScrubError::InvalidConfig("RGB buffer size mismatch".to_string()))?,
        PixelFormat::Gray8 => RgbImage::from_fn(width, height, |x, y| {
            let luma = data[plane_index(x, y, width)];
            image::Rgb([luma, luma, luma])
        }),
        PixelFormat::Yuv422p | PixelFormat::Yuv444p => {
            let (luma, chroma) = data.split_at(luma_size);
            let (cb_plane, cr_plane) = chroma.split_at(chroma_size);
            let shift = u32::from(pixel_format == PixelFormat::Yuv422p);

            RgbImage::from_fn(width, height, |x, y| {
                let chroma_index = plane_index(x >> shift, y, chroma_width);
                image::Rgb(ycbcr_to_rgb(
                    luma[plane_index(x, y, width)],
                    cb_plane[chroma_index],
                    cr_plane[chroma_index],
                ))
            })
        }
    };

    Ok(image)
}

fn plane_index(x: u32, y: u32, row_width: u32) -> usize {
    y as usize * row_width as usize + x as usize
}

/// Convert `frame` to RGB and write it to `path` as PNG.
///
/// # Errors
///
/// Returns the conversion errors of [`frame_to_rgb`], or
/// [`ScrubError::ImageError`] if encoding or writing fails.
pub fn save_png<P: AsRef<Path>>(
    frame: &Frame,
    pixel_format: PixelFormat,
    path: P,
) -> Result<(), ScrubError> {
    let path = path.as_ref();
    frame_to_rgb(frame, pixel_format)?.save_with_format(path, ImageFormat::Png)?;
    log::info!("Wrote frame {} to {}", frame.index(), path.display());
    Ok(())
}

/// Full-range JFIF conversion.
fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let y = f32::from(y);
    let cb = f32::from(cb) - 128.0;
    let cr = f32::from(cr) - 128.0;

    let clamp = |value: f32| value.round().clamp(0.0, 255.0) as u8;
    [
        clamp(y + 1.402 * cr),
        clamp(y - 0.344_136 * cb - 0.714_136 * cr),
        clamp(y + 1.772 * cb),
    ]
}
