//! Frame image loading
//!
//! JPEG frames are decoded with **mozjpeg** (SIMD-optimized libjpeg-turbo
//! fork); PNG and anything else go through the `image` crate.

use image::{ImageBuffer, Rgb, RgbImage};
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use task_dataset_common::ProcessingError;
use thiserror::Error;

/// Errors that can occur while loading a frame
#[derive(Error, Debug)]
pub enum ImageLoadError {
    #[error("Failed to read image file {path}: {reason}")]
    ReadError { path: String, reason: String },

    #[error("Failed to decode image: {0}")]
    DecodeError(String),
}

impl From<ImageLoadError> for ProcessingError {
    fn from(err: ImageLoadError) -> Self {
        ProcessingError::ImageError(err.to_string())
    }
}

/// Load an image from a file path, picking the decoder from the extension
///
/// # Example
/// ```no_run
/// use task_dataset_core::image_io::load_image;
/// let img = load_image("frames/demo/frame_000001.jpg")?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<RgbImage, ImageLoadError> {
    let path = path.as_ref();

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => load_jpeg_mozjpeg(path),
        _ => {
            let img = image::open(path)
                .map_err(|e| ImageLoadError::DecodeError(format!("{}: {e}", path.display())))?;
            Ok(img.to_rgb8())
        }
    }
}

fn load_jpeg_mozjpeg(path: &Path) -> Result<RgbImage, ImageLoadError> {
    let data = fs::read(path).map_err(|e| ImageLoadError::ReadError {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    // mozjpeg reports corrupt data by unwinding out of libjpeg's error handler
    catch_unwind(AssertUnwindSafe(|| decode_jpeg(&data))).unwrap_or_else(|_| {
        Err(ImageLoadError::DecodeError(format!(
            "Corrupt JPEG data in {}",
            path.display()
        )))
    })
}

fn decode_jpeg(data: &[u8]) -> Result<RgbImage, ImageLoadError> {
    let d = mozjpeg::Decompress::new_mem(data)
        .map_err(|e| ImageLoadError::DecodeError(format!("Failed to create decompressor: {e}")))?;

    let (width, height) = (d.width(), d.height());

    let mut rgb = d
        .rgb()
        .map_err(|e| ImageLoadError::DecodeError(format!("Failed to decode RGB: {e}")))?;

    let image_data: Vec<u8> = rgb
        .read_scanlines()
        .map_err(|e| ImageLoadError::DecodeError(format!("Failed to read scanlines: {e}")))?;

    ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(width as u32, height as u32, image_data).ok_or_else(
        || {
            ImageLoadError::DecodeError(format!(
                "Failed to create image buffer from mozjpeg output ({width}x{height})"
            ))
        },
    )
}
