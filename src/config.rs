// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    adjust::ColorAdjustment,
    error::{Error, Result},
    format::{FourCC, YUYV},
};
use std::{path::PathBuf, time::Duration};

pub const DEFAULT_BUFFER_COUNT: u32 = 3;
pub const MIN_BUFFER_COUNT: u32 = 2;
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Everything a capture session needs to open, negotiate and stream.
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    pub device: PathBuf,
    /// Open the node with `O_NONBLOCK`, making dequeue return
    /// [`Error::WouldBlock`] instead of sleeping.
    pub nonblocking: bool,
    pub fourcc: FourCC,
    pub width: u32,
    pub height: u32,
    /// Target frame rate. `None` keeps the driver's current interval.
    pub fps: Option<u32>,
    /// Driver specific capture mode written with the stream parameters.
    pub capture_mode: u32,
    pub buffer_count: u32,
    /// Video input to select before negotiating.
    pub input: Option<u32>,
    /// Produce RGB24 for every frame.
    pub convert: bool,
    pub adjust: Option<ColorAdjustment>,
    /// Fail instead of accepting a format the driver adjusted.
    pub strict: bool,
    /// Release and re-request buffers every time streaming restarts.
    pub reset_on_restart: bool,
    pub poll_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/video0"),
            nonblocking: false,
            fourcc: YUYV,
            width: 640,
            height: 480,
            fps: None,
            capture_mode: 0,
            buffer_count: DEFAULT_BUFFER_COUNT,
            input: None,
            convert: true,
            adjust: None,
            strict: false,
            reset_on_restart: false,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

impl CaptureConfig {
    pub fn new(device: impl Into<PathBuf>, fourcc: FourCC, width: u32, height: u32) -> Self {
        Self {
            device: device.into(),
            fourcc,
            width,
            height,
            ..Default::default()
        }
    }

    /// Rejects settings no driver could satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidConfig(format!(
                "frame size {}x{} is empty",
                self.width, self.height
            )));
        }
        if self.fourcc.is_subsampled() && (self.width % 2 != 0 || self.height % 2 != 0) {
            return Err(Error::InvalidConfig(format!(
                "{} needs even dimensions, got {}x{}",
                self.fourcc, self.width, self.height
            )));
        }
        if self.buffer_count < MIN_BUFFER_COUNT {
            return Err(Error::InvalidConfig(format!(
                "at least {MIN_BUFFER_COUNT} buffers are required, got {}",
                self.buffer_count
            )));
        }
        if self.fps == Some(0) {
            return Err(Error::InvalidConfig("frame rate must be positive".into()));
        }
        Ok(())
    }
}
