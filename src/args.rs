// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_preview::{
    adjust::ColorAdjustment,
    config::{CaptureConfig, DEFAULT_BUFFER_COUNT},
    format::FourCC,
};
use std::{path::PathBuf, time::Duration};

/// How frames are pulled from the device.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum CaptureModel {
    /// The main thread dequeues frames itself
    Pull,
    /// A capture thread publishes frames to an async consumer
    Push,
}

/// Command-line arguments for EdgeFirst V4L2 Capture Preview.
///
/// Every option can also be given through the environment variable named
/// next to it.
///
/// # Example
///
/// ```bash
/// # Via command line
/// edgefirst-preview --camera /dev/video0 --format NV12 --fps 30 --model push
///
/// # Via environment variables
/// export CAMERA=/dev/video0
/// export FORMAT=YUYV
/// edgefirst-preview --list
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Camera capture device path (e.g., /dev/video0)
    #[arg(short, long, env = "CAMERA", default_value = "/dev/video0")]
    pub camera: PathBuf,

    /// Camera capture resolution in pixels (width height)
    #[arg(
        long,
        env = "CAMERA_SIZE",
        default_value = "640 480",
        value_delimiter = ' ',
        num_args = 2
    )]
    pub camera_size: Vec<u32>,

    /// Pixel format fourcc (YUYV, YVYU, UYVY, NV12, NV21, YU12, YV12, RGB4,
    /// RGB3, or the NM12/NM21/YM12/YM21 multi-planar variants)
    #[arg(short, long, env = "FORMAT", default_value = "YUYV")]
    pub format: FourCC,

    /// Requested frame rate, the driver applies the nearest it supports
    #[arg(long, env = "FPS")]
    pub fps: Option<u32>,

    /// Driver specific capture mode set with the frame rate
    #[arg(long, env = "CAPTURE_MODE", default_value = "0")]
    pub capture_mode: u32,

    /// Number of kernel buffers to map (minimum 2)
    #[arg(long, env = "BUFFERS", default_value_t = DEFAULT_BUFFER_COUNT)]
    pub buffers: u32,

    /// Video input to select before negotiating
    #[arg(long, env = "INPUT")]
    pub input: Option<u32>,

    /// Open the device in non-blocking mode
    #[arg(long, env = "NONBLOCK")]
    pub nonblock: bool,

    /// Frame delivery model
    #[arg(long, env = "MODEL", default_value = "push", value_enum)]
    pub model: CaptureModel,

    /// Skip the RGB24 conversion and only report raw frames
    #[arg(long, env = "NO_CONVERT")]
    pub no_convert: bool,

    /// Brightness factor applied after conversion (1.0 = unchanged)
    #[arg(long, env = "BRIGHTNESS", default_value = "1.0")]
    pub brightness: f32,

    /// Contrast factor around mid-gray (1.0 = unchanged)
    #[arg(long, env = "CONTRAST", default_value = "1.0")]
    pub contrast: f32,

    /// Saturation factor, 0.0 gives grayscale (1.0 = unchanged)
    #[arg(long, env = "SATURATION", default_value = "1.0")]
    pub saturation: f32,

    /// Fail if the driver adjusts the requested format
    #[arg(long, env = "STRICT")]
    pub strict: bool,

    /// Fully reset the device when streaming restarts, for drivers that
    /// corrupt frames after a stop/start cycle
    #[arg(long, env = "RESET_ON_RESTART")]
    pub reset_on_restart: bool,

    /// Readiness wait timeout in milliseconds
    #[arg(long, env = "POLL_TIMEOUT_MS", default_value = "1000")]
    pub poll_timeout_ms: u64,

    /// Stop after this many frames (0 runs until interrupted)
    #[arg(short = 'n', long, env = "FRAMES", default_value = "0")]
    pub frames: u64,

    /// Write the first converted frame to this path as JPEG
    #[arg(long, env = "SNAPSHOT")]
    pub snapshot: Option<PathBuf>,

    /// JPEG quality for the snapshot
    #[arg(long, env = "SNAPSHOT_QUALITY", default_value = "90")]
    pub snapshot_quality: i32,

    /// List device inputs, formats and frame sizes, then exit
    #[arg(long)]
    pub list: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable Tokio async runtime console for debugging
    #[arg(long, env = "TOKIO_CONSOLE")]
    pub tokio_console: bool,

    /// Enable Tracy profiler for performance analysis
    #[arg(long, env = "TRACY")]
    pub tracy: bool,
}

impl From<&Args> for CaptureConfig {
    fn from(args: &Args) -> Self {
        let adjust = ColorAdjustment {
            brightness: args.brightness,
            contrast: args.contrast,
            saturation: args.saturation,
        };
        CaptureConfig {
            device: args.camera.clone(),
            nonblocking: args.nonblock,
            fourcc: args.format,
            width: args.camera_size[0],
            height: args.camera_size[1],
            fps: args.fps,
            capture_mode: args.capture_mode,
            buffer_count: args.buffers,
            input: args.input,
            convert: !args.no_convert,
            adjust: (!adjust.is_identity()).then_some(adjust),
            strict: args.strict,
            reset_on_restart: args.reset_on_restart,
            poll_timeout: Duration::from_millis(args.poll_timeout_ms),
        }
    }
}
