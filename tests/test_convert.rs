// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_preview::{
    adjust::{ColorAdjuster, ColorAdjustment},
    convert::{
        convert_to_rgb24, is_supported, nv12_to_rgb24, nv21_to_rgb24, rgb32_to_rgb24,
        uyvy_to_rgb24, yuv420_to_rgb24, yuv_to_rgb, yuyv_to_rgb24, yuyv_to_rgb24_with, Clamp,
    },
    format::{FourCC, NM12, NV12, RGB3, RGB4, UYVY, YM12, YU12, YUYV, YV12, YVYU},
    Error,
};
use std::error::Error as StdError;

/// Deterministic pseudo-random bytes.
fn pattern(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2654435761).max(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect()
}

fn reference(y: u8, u: u8, v: u8) -> [i32; 3] {
    let (y, u, v) = (y as f64, u as f64 - 128.0, v as f64 - 128.0);
    [
        (y + 1.403 * v).round().clamp(0.0, 255.0) as i32,
        (y - 0.343 * u - 0.714 * v).round().clamp(0.0, 255.0) as i32,
        (y + 1.770 * u).round().clamp(0.0, 255.0) as i32,
    ]
}

#[test]
fn test_fixed_point_matches_reference() {
    let mut worst = 0;
    for y in 0..=255u8 {
        for u in 0..=255u8 {
            for v in 0..=255u8 {
                let rgb = yuv_to_rgb(y, u, v);
                let expected = reference(y, u, v);
                for c in 0..3 {
                    let diff = (rgb[c] as i32 - expected[c]).abs();
                    assert!(
                        diff <= 2,
                        "yuv ({y},{u},{v}) channel {c}: got {} expected {}",
                        rgb[c],
                        expected[c]
                    );
                    worst = worst.max(diff);
                }
            }
        }
    }
    println!("worst channel difference: {worst}");
}

#[test]
fn test_extremes_clamp() {
    assert_eq!(yuv_to_rgb(255, 255, 0), [75, 255, 255]);
    assert_eq!(yuv_to_rgb(0, 0, 255), [178, 0, 0]);
    assert_eq!(yuv_to_rgb(255, 255, 255), [255, 122, 255]);
    assert_eq!(yuv_to_rgb(0, 0, 0), [0, 136, 0]);
}

#[test]
fn test_yuyv_mid_gray() {
    let yuyv = [128u8; 4 * 2 * 2];
    let mut rgb = [0u8; 4 * 2 * 3];
    yuyv_to_rgb24(&yuyv, &mut rgb, 4, 2);
    for px in rgb.chunks_exact(3) {
        for &c in px {
            assert!((127..=129).contains(&c), "pixel {px:?}");
        }
    }
}

#[test]
fn test_yuyv_is_pure() {
    let (w, h) = (64, 16);
    let yuyv = pattern(w * h * 2, 7);
    let mut first = vec![0u8; w * h * 3];
    let mut second = vec![0xAAu8; w * h * 3];
    yuyv_to_rgb24(&yuyv, &mut first, w, h);
    yuyv_to_rgb24(&yuyv, &mut second, w, h);
    assert_eq!(first, second);
}

#[test]
fn test_rgb32_drops_leading_byte() {
    let src = [0xFF, 10, 20, 30, 0xFF, 40, 50, 60];
    let mut dst = [0u8; 6];
    rgb32_to_rgb24(&src, &mut dst, 2, 1);
    assert_eq!(dst, [10, 20, 30, 40, 50, 60]);

    let mut via_dispatch = [0u8; 6];
    convert_to_rgb24(RGB4, &[&src[..]], 2, 1, &mut via_dispatch, &Clamp).unwrap();
    assert_eq!(via_dispatch, dst);
}

#[test]
fn test_nv12_nv21_equivalent() {
    let (w, h) = (32, 8);
    let y = pattern(w * h, 1);
    let uv = pattern(w * h / 2, 2);
    let vu: Vec<u8> = uv.chunks_exact(2).flat_map(|c| [c[1], c[0]]).collect();

    let mut from_nv12 = vec![0u8; w * h * 3];
    let mut from_nv21 = vec![0u8; w * h * 3];
    nv12_to_rgb24(&y, &uv, &mut from_nv12, w, h);
    nv21_to_rgb24(&y, &vu, &mut from_nv21, w, h);
    assert_eq!(from_nv12, from_nv21);
}

#[test]
fn test_nv12_shares_chroma_per_block() {
    // 2x2 image: one chroma sample for all four pixels
    let y = [16, 80, 160, 235];
    let uv = [90, 200];
    let mut rgb = [0u8; 12];
    nv12_to_rgb24(&y, &uv, &mut rgb, 2, 2);
    for (i, px) in rgb.chunks_exact(3).enumerate() {
        assert_eq!(px, yuv_to_rgb(y[i], 90, 200));
    }
}

#[test]
fn test_packed_orders_equivalent() {
    let (w, h) = (16, 4);
    let yuyv = pattern(w * h * 2, 3);
    let yvyu: Vec<u8> = yuyv
        .chunks_exact(4)
        .flat_map(|p| [p[0], p[3], p[2], p[1]])
        .collect();
    let uyvy: Vec<u8> = yuyv
        .chunks_exact(4)
        .flat_map(|p| [p[1], p[0], p[3], p[2]])
        .collect();

    let mut expected = vec![0u8; w * h * 3];
    yuyv_to_rgb24(&yuyv, &mut expected, w, h);

    let mut rgb = vec![0u8; w * h * 3];
    uyvy_to_rgb24(&uyvy, &mut rgb, w, h);
    assert_eq!(rgb, expected);

    let mut rgb = vec![0u8; w * h * 3];
    convert_to_rgb24(YVYU, &[&yvyu[..]], w as u32, h as u32, &mut rgb, &Clamp).unwrap();
    assert_eq!(rgb, expected);

    let mut rgb = vec![0u8; w * h * 3];
    convert_to_rgb24(UYVY, &[&uyvy[..]], w as u32, h as u32, &mut rgb, &Clamp).unwrap();
    assert_eq!(rgb, expected);
}

#[test]
fn test_planar_layouts_equivalent() -> Result<(), Box<dyn StdError>> {
    let (w, h) = (16, 8);
    let luma = pattern(w * h, 4);
    let u = pattern(w * h / 4, 5);
    let v = pattern(w * h / 4, 6);
    let uv: Vec<u8> = u.iter().zip(&v).flat_map(|(&u, &v)| [u, v]).collect();

    let mut expected = vec![0u8; w * h * 3];
    yuv420_to_rgb24(&luma, &u, &v, &mut expected, w, h);

    let mut nv12 = vec![0u8; w * h * 3];
    nv12_to_rgb24(&luma, &uv, &mut nv12, w, h);
    assert_eq!(nv12, expected);

    let (w32, h32) = (w as u32, h as u32);
    let i420 = [&luma[..], &u[..], &v[..]].concat();
    let yv12 = [&luma[..], &v[..], &u[..]].concat();
    let contiguous_nv12 = [&luma[..], &uv[..]].concat();
    let cases: [(FourCC, Vec<&[u8]>); 5] = [
        (YU12, vec![&i420[..]]),
        (YV12, vec![&yv12[..]]),
        (NV12, vec![&contiguous_nv12[..]]),
        (NM12, vec![&luma[..], &uv[..]]),
        (YM12, vec![&luma[..], &u[..], &v[..]]),
    ];
    for (fourcc, planes) in cases {
        let mut rgb = vec![0u8; w * h * 3];
        convert_to_rgb24(fourcc, &planes, w32, h32, &mut rgb, &Clamp)?;
        assert_eq!(rgb, expected, "{fourcc}");
    }
    Ok(())
}

#[test]
fn test_rgb24_passthrough() {
    let src = pattern(8 * 4 * 3, 9);
    let mut rgb = vec![0u8; src.len()];
    convert_to_rgb24(RGB3, &[&src[..]], 8, 4, &mut rgb, &Clamp).unwrap();
    assert_eq!(rgb, src);
}

#[test]
fn test_short_buffers_do_not_panic() {
    let mut rgb = vec![0u8; 640 * 480 * 3];
    let short = pattern(1000, 11);
    for fourcc in [YUYV, YVYU, UYVY, NV12, NM12, YU12, YV12, YM12, RGB4, RGB3] {
        convert_to_rgb24(fourcc, &[&short[..]], 640, 480, &mut rgb, &Clamp).unwrap();
        convert_to_rgb24(fourcc, &[], 640, 480, &mut rgb, &Clamp).unwrap();
    }

    // output smaller than the frame: only whole pixels that fit are written
    let yuyv = pattern(640 * 480 * 2, 12);
    let mut small = vec![0u8; 10];
    yuyv_to_rgb24(&yuyv, &mut small, 640, 480);
    assert_eq!(&small[6..], &[0, 0, 0, 0]);
}

#[test]
fn test_unsupported_format() {
    let mut rgb = vec![0u8; 12];
    let mjpg: FourCC = "MJPG".parse().unwrap();
    assert!(!is_supported(mjpg));
    assert!(is_supported(YUYV));
    let data = [0u8; 16];
    match convert_to_rgb24(mjpg, &[&data[..]], 2, 2, &mut rgb, &Clamp) {
        Err(Error::UnsupportedFormat(fourcc)) => assert_eq!(fourcc, mjpg),
        other => panic!("expected UnsupportedFormat, got {other:?}"),
    }
}

#[test]
fn test_fourcc_parse() -> Result<(), Box<dyn StdError>> {
    let fourcc: FourCC = "NV12".parse()?;
    assert_eq!(fourcc, NV12);
    assert_eq!(fourcc.to_u32(), u32::from_le_bytes(*b"NV12"));
    assert_eq!(FourCC::from_u32(fourcc.to_u32()), NV12);
    assert_eq!("RGB".parse::<FourCC>()?.to_string(), "RGB ");
    assert!("TOOLONG".parse::<FourCC>().is_err());
    assert!("".parse::<FourCC>().is_err());
    Ok(())
}

#[test]
fn test_adjuster_identity() -> Result<(), Box<dyn StdError>> {
    let adjuster = ColorAdjuster::new(ColorAdjustment::default())?;
    assert!(adjuster.is_identity());

    let mut rgb = pattern(300, 13);
    let original = rgb.clone();
    adjuster.apply(&mut rgb);
    assert_eq!(rgb, original);
    Ok(())
}

#[test]
fn test_adjuster_zero_saturation_is_gray() -> Result<(), Box<dyn StdError>> {
    let adjuster = ColorAdjuster::new(ColorAdjustment {
        saturation: 0.0,
        ..Default::default()
    })?;
    let mut rgb = pattern(3 * 200, 14);
    adjuster.apply(&mut rgb);
    for px in rgb.chunks_exact(3) {
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }
    Ok(())
}

#[test]
fn test_adjuster_brightness_and_contrast() -> Result<(), Box<dyn StdError>> {
    let dark = ColorAdjuster::new(ColorAdjustment {
        brightness: 0.0,
        ..Default::default()
    })?;
    let mut rgb = pattern(3 * 50, 15);
    dark.apply(&mut rgb);
    assert!(rgb.iter().all(|&c| c == 0));

    let flat = ColorAdjuster::new(ColorAdjustment {
        contrast: 0.0,
        ..Default::default()
    })?;
    let mut rgb = pattern(3 * 50, 16);
    flat.apply(&mut rgb);
    assert!(rgb.iter().all(|&c| c == 128));

    let bright = ColorAdjuster::new(ColorAdjustment {
        brightness: 4.0,
        ..Default::default()
    })?;
    let mut rgb = vec![100u8, 200, 255];
    bright.apply(&mut rgb);
    assert_eq!(rgb, [255, 255, 255]);
    Ok(())
}

#[test]
fn test_adjuster_during_conversion_matches_post_pass() -> Result<(), Box<dyn StdError>> {
    let adjuster = ColorAdjuster::new(ColorAdjustment {
        brightness: 1.2,
        contrast: 0.8,
        saturation: 1.5,
    })?;
    let (w, h) = (32, 8);
    let yuyv = pattern(w * h * 2, 17);

    let mut fused = vec![0u8; w * h * 3];
    yuyv_to_rgb24_with(&yuyv, &mut fused, w, h, &adjuster);

    let mut two_pass = vec![0u8; w * h * 3];
    yuyv_to_rgb24(&yuyv, &mut two_pass, w, h);
    adjuster.apply(&mut two_pass);

    assert_eq!(fused, two_pass);
    Ok(())
}

#[test]
fn test_adjuster_rejects_invalid_factors() {
    for params in [
        ColorAdjustment {
            brightness: -0.5,
            ..Default::default()
        },
        ColorAdjustment {
            contrast: f32::NAN,
            ..Default::default()
        },
        ColorAdjustment {
            saturation: f32::INFINITY,
            ..Default::default()
        },
    ] {
        match ColorAdjuster::new(params) {
            Err(Error::InvalidConfig(msg)) => println!("rejected: {msg}"),
            other => panic!("expected InvalidConfig for {params:?}, got {other:?}"),
        }
    }
}
