// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use core::fmt;
use std::str::FromStr;
use v4l2_sys::VIDEO_MAX_PLANES;

/// Maximum number of planes a negotiated format can carry.
pub const MAX_PLANES: usize = VIDEO_MAX_PLANES;

/// Four character code identifying a pixel format.
///
/// Stored in memory order, so `FourCC(*b"YUYV")` is the V4L2
/// `V4L2_PIX_FMT_YUYV` code.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const fn from_u32(code: u32) -> Self {
        FourCC(code.to_le_bytes())
    }

    pub const fn to_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    /// Number of memory planes the format uses when the driver delivers each
    /// plane in its own buffer.
    pub const fn plane_count(self) -> u8 {
        match self {
            NM12 | NM21 => 2,
            YM12 | YM21 => 3,
            _ => 1,
        }
    }

    /// True for the 4:2:2 and 4:2:0 YUV formats, which need even dimensions.
    pub const fn is_subsampled(self) -> bool {
        matches!(
            self,
            YUYV | YVYU | UYVY | NV12 | NV21 | NM12 | NM21 | YU12 | YV12 | YM12 | YM21
        )
    }
}

impl From<u32> for FourCC {
    fn from(code: u32) -> Self {
        FourCC::from_u32(code)
    }
}

impl From<FourCC> for u32 {
    fn from(fourcc: FourCC) -> Self {
        fourcc.to_u32()
    }
}

impl FromStr for FourCC {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        match bytes.len() {
            1..=4 if s.is_ascii() => {
                // short codes such as "RGB" are space padded like the kernel does
                let mut code = [b' '; 4];
                code[..bytes.len()].copy_from_slice(bytes);
                Ok(FourCC(code))
            }
            _ => Err(format!("invalid fourcc {s:?}: expected 1 to 4 ASCII characters")),
        }
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for b in self.0 {
            let c = if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FourCC({self})")
    }
}

/// YUYV 4:2:2 packed (Y0 U Y1 V)
pub const YUYV: FourCC = FourCC(*b"YUYV");

/// YVYU 4:2:2 packed (Y0 V Y1 U)
pub const YVYU: FourCC = FourCC(*b"YVYU");

/// UYVY 4:2:2 packed (U Y0 V Y1)
pub const UYVY: FourCC = FourCC(*b"UYVY");

/// NV12 4:2:0 semi-planar, interleaved UV plane after the luma plane
pub const NV12: FourCC = FourCC(*b"NV12");

/// NV21 4:2:0 semi-planar, interleaved VU plane after the luma plane
pub const NV21: FourCC = FourCC(*b"NV21");

/// NV12 with luma and chroma in separate buffers
pub const NM12: FourCC = FourCC(*b"NM12");

/// NV21 with luma and chroma in separate buffers
pub const NM21: FourCC = FourCC(*b"NM21");

/// YUV 4:2:0 planar (I420), U plane before V
pub const YU12: FourCC = FourCC(*b"YU12");

/// YVU 4:2:0 planar, V plane before U
pub const YV12: FourCC = FourCC(*b"YV12");

/// YU12 with each plane in its own buffer
pub const YM12: FourCC = FourCC(*b"YM12");

/// YV12 with each plane in its own buffer
pub const YM21: FourCC = FourCC(*b"YM21");

/// 32-bit RGB with a leading pad/alpha byte (X R G B in memory)
pub const RGB4: FourCC = FourCC(*b"RGB4");

/// RGB 24-bit pixel format (8 bits per channel, no alpha)
pub const RGB3: FourCC = FourCC(*b"RGB3");

/// Bytes per row of the first plane for a tightly packed frame.
pub const fn format_row_stride(format: FourCC, width: u32) -> Option<usize> {
    let width = width as usize;
    match format {
        RGB4 => Some(4 * width),
        RGB3 => Some(3 * width),
        YUYV | YVYU | UYVY => Some(2 * width),
        NV12 | NV21 | NM12 | NM21 | YU12 | YV12 | YM12 | YM21 => Some(width),
        _ => None,
    }
}

/// Total bytes of a tightly packed frame across all planes.
pub const fn image_size(width: u32, height: u32, format: FourCC) -> Option<usize> {
    let pixels = width as usize * height as usize;
    match format {
        RGB4 => Some(pixels * 4),
        RGB3 => Some(pixels * 3),
        YUYV | YVYU | UYVY => Some(pixels * 2),
        NV12 | NV21 | NM12 | NM21 | YU12 | YV12 | YM12 | YM21 => Some(pixels + pixels / 2),
        _ => None,
    }
}

/// Size of the RGB24 frame a conversion writes.
pub const fn rgb24_size(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

/// Layout of one plane as reported by the driver.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaneFormat {
    pub bytes_per_line: u32,
    pub size_image: u32,
}

/// Negotiated pixel format.
///
/// Only meaningful once read back from the driver, which is free to adjust
/// the requested width, height and plane count.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PixelFormat {
    pub fourcc: FourCC,
    pub width: u32,
    pub height: u32,
    pub num_planes: u8,
    pub planes: [PlaneFormat; MAX_PLANES],
}

impl PixelFormat {
    /// Builds a format request. Plane layouts are left for the driver to fill.
    pub fn new(fourcc: FourCC, width: u32, height: u32) -> Self {
        Self {
            fourcc,
            width,
            height,
            num_planes: fourcc.plane_count(),
            planes: [PlaneFormat::default(); MAX_PLANES],
        }
    }

    pub fn planes(&self) -> &[PlaneFormat] {
        &self.planes[..(self.num_planes as usize).min(MAX_PLANES)]
    }

    pub fn rgb24_size(&self) -> usize {
        rgb24_size(self.width, self.height)
    }

    /// True when the driver kept the requested fourcc and geometry.
    pub fn matches(&self, request: &PixelFormat) -> bool {
        self.fourcc == request.fourcc
            && self.width == request.width
            && self.height == request.height
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}x{} {} planes:{}",
            self.width, self.height, self.fourcc, self.num_planes
        )
    }
}
