// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Software conversion of camera formats to packed RGB24.
//!
//! All YUV routines share one fixed-point BT.601 full-range approximation:
//!
//! ```text
//! v = V - 128; u = U - 128
//! R = clamp(Y + v + (103 * v >> 8))
//! G = clamp(Y - (88 * u >> 8) - (183 * v >> 8))
//! B = clamp(Y + u + (197 * u >> 8))
//! ```
//!
//! The chroma terms are computed once per shared UV sample (2 pixels for
//! 4:2:2, a 2x2 block for 4:2:0) and the luma term is added inline for each
//! pixel. A precomputed `[Y][U][V]` table was measured as well and loses to
//! this arithmetic: the 16 MiB table misses cache on nearly every lookup.
//! Per-channel 1-D tables (`R += rv[V]`, `G -= gu[U] + gv[V]`, `B += bu[U]`)
//! are not provided either. They fit in cache but save only the three
//! multiplies that the shift form already makes cheap, and they need a
//! one-time initialisation step before the first frame.
//!
//! The routines never fail on geometry. Each one converts only the complete
//! pixel groups that fit in both the source and destination slices, so short
//! buffers leave the tail of the output untouched instead of panicking. Width
//! and height must be even for the subsampled formats and rows must be tightly
//! packed; both are caller preconditions.

use crate::{
    error::{Error, Result},
    format::{
        FourCC, NM12, NM21, NV12, NV21, RGB3, RGB4, UYVY, YM12, YM21, YU12, YUYV, YV12, YVYU,
    },
};

/// Final stage of every conversion: turns unclamped RGB into output bytes.
///
/// Conversions are generic over the store so the per-pixel call is
/// monomorphised and inlined. Plain conversion uses [`Clamp`]; colour
/// adjustment uses [`ColorAdjuster`](crate::adjust::ColorAdjuster).
pub trait PixelStore {
    /// True when the store writes the clamped value unchanged, letting pure
    /// repacking formats skip the per-pixel call.
    const PASSTHROUGH: bool = false;

    /// Writes one pixel. `out` is exactly three bytes.
    fn store(&self, out: &mut [u8], r: i32, g: i32, b: i32);
}

/// Saturating store with no adjustment.
#[derive(Copy, Clone, Debug, Default)]
pub struct Clamp;

impl PixelStore for Clamp {
    const PASSTHROUGH: bool = true;

    #[inline(always)]
    fn store(&self, out: &mut [u8], r: i32, g: i32, b: i32) {
        out[0] = clamp(r);
        out[1] = clamp(g);
        out[2] = clamp(b);
    }
}

#[inline(always)]
pub(crate) fn clamp(x: i32) -> u8 {
    x.clamp(0, 255) as u8
}

/// Chroma contribution shared by every pixel of a UV sample: the R, G and B
/// offsets to add to (or, for G, subtract from) the luma value.
#[inline(always)]
fn chroma(u: u8, v: u8) -> (i32, i32, i32) {
    let u = u as i32 - 128;
    let v = v as i32 - 128;
    (
        v + ((103 * v) >> 8),
        ((88 * u) >> 8) + ((183 * v) >> 8),
        u + ((197 * u) >> 8),
    )
}

#[inline(always)]
fn put<S: PixelStore>(store: &S, out: &mut [u8], y: u8, (r_uv, g_uv, b_uv): (i32, i32, i32)) {
    let y = y as i32;
    store.store(out, y + r_uv, y - g_uv, y + b_uv);
}

/// Converts one YUV sample to RGB with the fixed-point transform.
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let mut out = [0u8; 3];
    put(&Clamp, &mut out, y, chroma(u, v));
    out
}

/// Packed 4:2:2. `order` gives the byte offsets of Y0, U, Y1 and V inside each
/// four byte group.
#[inline(always)]
fn packed_422<S: PixelStore>(
    src: &[u8],
    rgb: &mut [u8],
    width: usize,
    height: usize,
    order: [usize; 4],
    store: &S,
) {
    let groups = width * height / 2;
    for (px, out) in src
        .chunks_exact(4)
        .zip(rgb.chunks_exact_mut(6))
        .take(groups)
    {
        let uv = chroma(px[order[1]], px[order[3]]);
        let (first, second) = out.split_at_mut(3);
        put(store, first, px[order[0]], uv);
        put(store, second, px[order[2]], uv);
    }
}

pub fn yuyv_to_rgb24_with<S: PixelStore>(
    yuyv: &[u8],
    rgb: &mut [u8],
    width: usize,
    height: usize,
    store: &S,
) {
    packed_422(yuyv, rgb, width, height, [0, 1, 2, 3], store)
}

/// Converts packed YUYV (Y0 U Y1 V) to RGB24.
pub fn yuyv_to_rgb24(yuyv: &[u8], rgb: &mut [u8], width: usize, height: usize) {
    yuyv_to_rgb24_with(yuyv, rgb, width, height, &Clamp)
}

pub fn yvyu_to_rgb24_with<S: PixelStore>(
    yvyu: &[u8],
    rgb: &mut [u8],
    width: usize,
    height: usize,
    store: &S,
) {
    packed_422(yvyu, rgb, width, height, [0, 3, 2, 1], store)
}

/// Converts packed YVYU (Y0 V Y1 U) to RGB24.
pub fn yvyu_to_rgb24(yvyu: &[u8], rgb: &mut [u8], width: usize, height: usize) {
    yvyu_to_rgb24_with(yvyu, rgb, width, height, &Clamp)
}

pub fn uyvy_to_rgb24_with<S: PixelStore>(
    uyvy: &[u8],
    rgb: &mut [u8],
    width: usize,
    height: usize,
    store: &S,
) {
    packed_422(uyvy, rgb, width, height, [1, 0, 3, 2], store)
}

/// Converts packed UYVY (U Y0 V Y1) to RGB24.
pub fn uyvy_to_rgb24(uyvy: &[u8], rgb: &mut [u8], width: usize, height: usize) {
    uyvy_to_rgb24_with(uyvy, rgb, width, height, &Clamp)
}

/// 4:2:0 with an interleaved chroma plane. Two luma rows are walked together
/// so one chroma sample feeds the four pixels of its 2x2 block.
#[inline(always)]
fn semi_planar<S: PixelStore, const VU: bool>(
    y: &[u8],
    uv: &[u8],
    rgb: &mut [u8],
    width: usize,
    height: usize,
    store: &S,
) {
    if width < 2 {
        return;
    }
    let rows = y
        .chunks_exact(2 * width)
        .zip(uv.chunks_exact(width))
        .zip(rgb.chunks_exact_mut(6 * width))
        .take(height / 2);
    for ((luma, chroma_row), out) in rows {
        let (luma_top, luma_bottom) = luma.split_at(width);
        let (out_top, out_bottom) = out.split_at_mut(3 * width);
        let blocks = luma_top
            .chunks_exact(2)
            .zip(luma_bottom.chunks_exact(2))
            .zip(chroma_row.chunks_exact(2))
            .zip(out_top.chunks_exact_mut(6))
            .zip(out_bottom.chunks_exact_mut(6));
        for ((((top, bottom), c), o_top), o_bottom) in blocks {
            let uv = if VU {
                chroma(c[1], c[0])
            } else {
                chroma(c[0], c[1])
            };
            let (o0, o1) = o_top.split_at_mut(3);
            let (o2, o3) = o_bottom.split_at_mut(3);
            put(store, o0, top[0], uv);
            put(store, o1, top[1], uv);
            put(store, o2, bottom[0], uv);
            put(store, o3, bottom[1], uv);
        }
    }
}

pub fn nv12_to_rgb24_with<S: PixelStore>(
    y: &[u8],
    uv: &[u8],
    rgb: &mut [u8],
    width: usize,
    height: usize,
    store: &S,
) {
    semi_planar::<S, false>(y, uv, rgb, width, height, store)
}

/// Converts NV12 to RGB24. `y` is the `width * height` luma plane and `uv` the
/// interleaved U/V plane that follows it.
pub fn nv12_to_rgb24(y: &[u8], uv: &[u8], rgb: &mut [u8], width: usize, height: usize) {
    nv12_to_rgb24_with(y, uv, rgb, width, height, &Clamp)
}

pub fn nv21_to_rgb24_with<S: PixelStore>(
    y: &[u8],
    vu: &[u8],
    rgb: &mut [u8],
    width: usize,
    height: usize,
    store: &S,
) {
    semi_planar::<S, true>(y, vu, rgb, width, height, store)
}

/// Converts NV21 (V before U in the chroma plane) to RGB24.
pub fn nv21_to_rgb24(y: &[u8], vu: &[u8], rgb: &mut [u8], width: usize, height: usize) {
    nv21_to_rgb24_with(y, vu, rgb, width, height, &Clamp)
}

/// Fully planar 4:2:0 with separate U and V planes of `width/2 * height/2`.
pub fn yuv420_to_rgb24_with<S: PixelStore>(
    y: &[u8],
    u: &[u8],
    v: &[u8],
    rgb: &mut [u8],
    width: usize,
    height: usize,
    store: &S,
) {
    let chroma_width = width / 2;
    if chroma_width == 0 {
        return;
    }
    let rows = y
        .chunks_exact(2 * width)
        .zip(u.chunks_exact(chroma_width))
        .zip(v.chunks_exact(chroma_width))
        .zip(rgb.chunks_exact_mut(6 * width))
        .take(height / 2);
    for (((luma, u_row), v_row), out) in rows {
        let (luma_top, luma_bottom) = luma.split_at(width);
        let (out_top, out_bottom) = out.split_at_mut(3 * width);
        let blocks = luma_top
            .chunks_exact(2)
            .zip(luma_bottom.chunks_exact(2))
            .zip(u_row.iter().zip(v_row))
            .zip(out_top.chunks_exact_mut(6))
            .zip(out_bottom.chunks_exact_mut(6));
        for ((((top, bottom), (&u, &v)), o_top), o_bottom) in blocks {
            let uv = chroma(u, v);
            let (o0, o1) = o_top.split_at_mut(3);
            let (o2, o3) = o_bottom.split_at_mut(3);
            put(store, o0, top[0], uv);
            put(store, o1, top[1], uv);
            put(store, o2, bottom[0], uv);
            put(store, o3, bottom[1], uv);
        }
    }
}

/// Converts I420 (YU12) planes to RGB24. Pass the planes swapped for YV12.
pub fn yuv420_to_rgb24(
    y: &[u8],
    u: &[u8],
    v: &[u8],
    rgb: &mut [u8],
    width: usize,
    height: usize,
) {
    yuv420_to_rgb24_with(y, u, v, rgb, width, height, &Clamp)
}

/// Drops the leading pad/alpha byte of every 32-bit pixel. No arithmetic.
pub fn rgb32_to_rgb24(rgb32: &[u8], rgb24: &mut [u8], width: usize, height: usize) {
    for (src, dst) in rgb32
        .chunks_exact(4)
        .zip(rgb24.chunks_exact_mut(3))
        .take(width * height)
    {
        dst.copy_from_slice(&src[1..4]);
    }
}

pub fn rgb32_to_rgb24_with<S: PixelStore>(
    rgb32: &[u8],
    rgb24: &mut [u8],
    width: usize,
    height: usize,
    store: &S,
) {
    if S::PASSTHROUGH {
        return rgb32_to_rgb24(rgb32, rgb24, width, height);
    }
    for (src, dst) in rgb32
        .chunks_exact(4)
        .zip(rgb24.chunks_exact_mut(3))
        .take(width * height)
    {
        store.store(dst, src[1] as i32, src[2] as i32, src[3] as i32);
    }
}

fn rgb24_copy_with<S: PixelStore>(
    src: &[u8],
    rgb24: &mut [u8],
    width: usize,
    height: usize,
    store: &S,
) {
    let len = (width * height * 3).min(src.len()).min(rgb24.len()) / 3 * 3;
    if S::PASSTHROUGH {
        rgb24[..len].copy_from_slice(&src[..len]);
        return;
    }
    for (px, dst) in src[..len].chunks_exact(3).zip(rgb24.chunks_exact_mut(3)) {
        store.store(dst, px[0] as i32, px[1] as i32, px[2] as i32);
    }
}

/// Splits a contiguous 4:2:0 buffer at the end of the luma plane unless the
/// driver already delivered the chroma in its own plane.
fn split_luma<'a>(planes: &[&'a [u8]], luma_len: usize) -> (&'a [u8], &'a [u8]) {
    match planes {
        [] => (&[], &[]),
        [single] => single.split_at(luma_len.min(single.len())),
        [y, chroma, ..] => (y, chroma),
    }
}

/// Locates the Y, first chroma and second chroma planes of a planar 4:2:0
/// frame, whether contiguous or split across buffers.
fn split_planar<'a>(planes: &[&'a [u8]], luma_len: usize) -> (&'a [u8], &'a [u8], &'a [u8]) {
    match planes {
        [] => (&[], &[], &[]),
        [single] => {
            let (y, rest) = single.split_at(luma_len.min(single.len()));
            let (c1, c2) = rest.split_at((luma_len / 4).min(rest.len()));
            (y, c1, c2)
        }
        [y, rest] => {
            let (c1, c2) = rest.split_at((luma_len / 4).min(rest.len()));
            (y, c1, c2)
        }
        [y, c1, c2, ..] => (y, c1, c2),
    }
}

/// Converts one frame of any supported format to RGB24.
///
/// `planes` holds one slice per memory plane as delivered by the driver; a
/// single slice is split at the plane boundaries for the contiguous 4:2:0
/// layouts.
///
/// # Errors
///
/// Returns [`Error::UnsupportedFormat`] for formats without a software path.
pub fn convert_to_rgb24<S: PixelStore>(
    fourcc: FourCC,
    planes: &[&[u8]],
    width: u32,
    height: u32,
    rgb: &mut [u8],
    store: &S,
) -> Result<()> {
    let (w, h) = (width as usize, height as usize);
    let first = planes.first().copied().unwrap_or(&[]);
    match fourcc {
        YUYV => yuyv_to_rgb24_with(first, rgb, w, h, store),
        YVYU => yvyu_to_rgb24_with(first, rgb, w, h, store),
        UYVY => uyvy_to_rgb24_with(first, rgb, w, h, store),
        NV12 | NM12 => {
            let (y, uv) = split_luma(planes, w * h);
            nv12_to_rgb24_with(y, uv, rgb, w, h, store)
        }
        NV21 | NM21 => {
            let (y, vu) = split_luma(planes, w * h);
            nv21_to_rgb24_with(y, vu, rgb, w, h, store)
        }
        YU12 | YM12 => {
            let (y, u, v) = split_planar(planes, w * h);
            yuv420_to_rgb24_with(y, u, v, rgb, w, h, store)
        }
        YV12 | YM21 => {
            let (y, v, u) = split_planar(planes, w * h);
            yuv420_to_rgb24_with(y, u, v, rgb, w, h, store)
        }
        RGB4 => rgb32_to_rgb24_with(first, rgb, w, h, store),
        RGB3 => rgb24_copy_with(first, rgb, w, h, store),
        other => return Err(Error::UnsupportedFormat(other)),
    }
    Ok(())
}

/// True when [`convert_to_rgb24`] has a software path for `fourcc`.
pub fn is_supported(fourcc: FourCC) -> bool {
    matches!(
        fourcc,
        YUYV | YVYU | UYVY | NV12 | NM12 | NV21 | NM21 | YU12 | YM12 | YV12 | YM21 | RGB4 | RGB3
    )
}
