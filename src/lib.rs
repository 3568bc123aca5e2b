// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! # EdgeFirst V4L2 Capture Library
//!
//! This library captures frames from Linux V4L2 camera devices using
//! memory-mapped kernel buffers and converts them to RGB24 for display in
//! embedded preview applications.
//!
//! ## Features
//!
//! - **Capture Sessions**: Open a device, negotiate format and frame rate,
//!   map a fixed pool of kernel buffers and drive the queue/dequeue cycle
//!   with [`session::CaptureSession`].
//! - **Push Model**: Move a session onto a dedicated thread with
//!   [`worker::CaptureWorker`] and receive frames over a channel, with two
//!   alternating RGB24 scratch buffers.
//! - **Software Conversion**: Fixed-point BT.601 conversion of YUYV, YVYU,
//!   UYVY, NV12, NV21, I420, YV12 and RGB32 to RGB24 in [`convert`].
//! - **Colour Adjustment**: Lookup-table brightness, contrast and saturation
//!   with [`adjust::ColorAdjuster`].
//! - **Snapshots**: JPEG encoding of converted frames using turbojpeg.
//!
//! ## Example
//!
//! ```no_run
//! use edgefirst_preview::{
//!     config::CaptureConfig,
//!     format::NV12,
//!     session::CaptureSession,
//!     worker::{CaptureWorker, WorkerOptions},
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CaptureConfig::new("/dev/video0", NV12, 1920, 1080);
//! let mut session = CaptureSession::new(config)?;
//! session.configure()?;
//!
//! // Hand the session to a capture thread and consume converted frames
//! let worker = CaptureWorker::spawn(session, WorkerOptions::default())?;
//! worker.start()?;
//! let mut count = 0;
//! while let Ok(event) = worker.frames().recv() {
//!     if let Some(rgb) = &event.rgb {
//!         println!("{} -> {} bytes", event.info, rgb.len());
//!     }
//!     count += 1;
//!     if count == 30 {
//!         break;
//!     }
//! }
//! worker.stop();
//! let _session = worker.shutdown()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Platform Requirements
//!
//! - **Linux**: a V4L2 capture driver supporting streaming I/O with
//!   memory-mapped buffers (single or multi-planar).
//!
//! ## Safety
//!
//! This library uses `unsafe` code for the V4L2 ioctls and for mapping kernel
//! buffers. All unsafe operations are isolated in the `v4l2-sys` crate,
//! [`device`] and [`buffer`] and wrapped with safe APIs.

pub mod adjust;
pub mod buffer;
pub mod capture;
pub mod config;
pub mod convert;
pub mod device;
pub mod error;
pub mod format;
pub mod session;
pub mod snapshot;
pub mod worker;

pub use error::{Error, Result};
