// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    error::{Error, Result},
    format::rgb24_size,
};
use turbojpeg::OwnedBuf;

/// Encodes a packed RGB24 frame to JPEG.
///
/// # Errors
///
/// Returns [`Error::Encode`] when `rgb` is smaller than `width * height * 3`
/// or the compressor fails.
///
/// # Example
///
/// ```no_run
/// use edgefirst_preview::snapshot::encode_jpeg;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let rgb = vec![128u8; 640 * 480 * 3];
/// let jpeg = encode_jpeg(&rgb, 640, 480, 90)?;
/// println!("Compressed to {} bytes", jpeg.len());
/// # Ok(())
/// # }
/// ```
pub fn encode_jpeg(rgb: &[u8], width: u32, height: u32, quality: i32) -> Result<OwnedBuf> {
    let size = rgb24_size(width, height);
    if width == 0 || height == 0 || rgb.len() < size {
        return Err(Error::Encode(format!(
            "{} bytes is not a {}x{} RGB24 image",
            rgb.len(),
            width,
            height
        )));
    }
    let image = turbojpeg::Image {
        width: width as usize,
        height: height as usize,
        format: turbojpeg::PixelFormat::RGB,
        pixels: &rgb[..size],
        pitch: width as usize * 3,
    };
    turbojpeg::compress(image, quality.clamp(1, 100), turbojpeg::Subsamp::Sub2x2)
        .map_err(|e| Error::Encode(e.to_string()))
}
