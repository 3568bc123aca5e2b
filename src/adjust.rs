// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Brightness, contrast and saturation applied as a post-conversion stage.
//!
//! Each parameter is folded into a lookup table once at construction, so the
//! per-pixel cost is three table reads for brightness/contrast and a luma
//! estimate plus three reads for saturation. Stages run in that order:
//! brightness, then contrast, then saturation.

use crate::{
    convert::{clamp, PixelStore},
    error::{Error, Result},
};

/// Requested adjustment factors. `1.0` leaves a channel unchanged.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ColorAdjustment {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
}

impl Default for ColorAdjustment {
    fn default() -> Self {
        Self {
            brightness: 1.0,
            contrast: 1.0,
            saturation: 1.0,
        }
    }
}

impl ColorAdjustment {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }
}

/// Precomputed adjustment tables.
///
/// Built once and then only read, so a single adjuster can be shared across
/// threads. Conversions take it as their [`PixelStore`] to apply the tables
/// while the RGB values are still in registers.
#[derive(Clone)]
pub struct ColorAdjuster {
    params: ColorAdjustment,
    brightness: [u8; 256],
    contrast: [u8; 256],
    // indexed by chroma offset + 255
    saturation: [i16; 511],
}

impl ColorAdjuster {
    /// Builds the tables for `params`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when a factor is negative or not
    /// finite.
    pub fn new(params: ColorAdjustment) -> Result<Self> {
        for (name, value) in [
            ("brightness", params.brightness),
            ("contrast", params.contrast),
            ("saturation", params.saturation),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "{name} factor must be a finite non-negative number, got {value}"
                )));
            }
        }

        let mut brightness = [0u8; 256];
        let mut contrast = [0u8; 256];
        for i in 0..256 {
            let x = i as f32;
            brightness[i] = clamp((x * params.brightness).round() as i32);
            contrast[i] = clamp(((x - 128.0) * params.contrast + 128.0).round() as i32);
        }

        let mut saturation = [0i16; 511];
        for (i, entry) in saturation.iter_mut().enumerate() {
            let d = i as f32 - 255.0;
            *entry = (d * params.saturation)
                .round()
                .clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        }

        Ok(Self {
            params,
            brightness,
            contrast,
            saturation,
        })
    }

    pub fn params(&self) -> ColorAdjustment {
        self.params
    }

    pub fn is_identity(&self) -> bool {
        self.params.is_identity()
    }

    #[inline(always)]
    fn pixel(&self, r: u8, g: u8, b: u8) -> [u8; 3] {
        let r = self.contrast[self.brightness[r as usize] as usize] as i32;
        let g = self.contrast[self.brightness[g as usize] as usize] as i32;
        let b = self.contrast[self.brightness[b as usize] as usize] as i32;
        let luma = (306 * r + 601 * g + 117 * b) >> 10;
        let sat = |c: i32| clamp(luma + self.saturation[(c - luma + 255) as usize] as i32);
        [sat(r), sat(g), sat(b)]
    }

    /// Adjusts a packed RGB24 buffer in place. A trailing partial pixel is
    /// left untouched.
    pub fn apply(&self, rgb: &mut [u8]) {
        if self.is_identity() {
            return;
        }
        for px in rgb.chunks_exact_mut(3) {
            px.copy_from_slice(&self.pixel(px[0], px[1], px[2]));
        }
    }
}

impl PixelStore for ColorAdjuster {
    #[inline(always)]
    fn store(&self, out: &mut [u8], r: i32, g: i32, b: i32) {
        out.copy_from_slice(&self.pixel(clamp(r), clamp(g), clamp(b)));
    }
}

impl std::fmt::Debug for ColorAdjuster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColorAdjuster")
            .field("params", &self.params)
            .finish()
    }
}
