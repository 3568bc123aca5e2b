// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Queue/dequeue protocol over a mapped [`BufferPool`].
//!
//! Every buffer slot is owned either by the kernel (queued, waiting to be
//! filled) or by userspace (dequeued, being read). A dequeued slot is handed
//! to the caller for the duration of a closure and re-queued before
//! [`CaptureEngine::dequeue`] returns, so a slot can never be filled while
//! someone still reads it.

use crate::{
    adjust::ColorAdjuster,
    buffer::BufferPool,
    convert::{convert_to_rgb24, Clamp},
    device::Device,
    error::{Error, Result},
    format::{FourCC, PixelFormat, MAX_PLANES},
    session::SessionState,
};
use std::{fmt, time::Duration};
use tracing::{debug, trace_span, warn};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Streaming,
}

/// Who currently holds a buffer slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Owner {
    Kernel,
    User,
}

/// Metadata of a captured frame. Cheap to copy and valid after the frame's
/// buffer has gone back to the driver.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameInfo {
    pub index: u32,
    pub sequence: u32,
    /// Driver timestamp, usually `CLOCK_MONOTONIC`.
    pub timestamp: Duration,
    pub fourcc: FourCC,
    pub width: u32,
    pub height: u32,
    pub bytes_used: usize,
    /// The driver flagged the data as possibly corrupted.
    pub corrupted: bool,
}

impl fmt::Display for FrameInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "#{} buf:{} {}x{} {} {} bytes @ {:?}",
            self.sequence,
            self.index,
            self.width,
            self.height,
            self.fourcc,
            self.bytes_used,
            self.timestamp
        )
    }
}

/// Zero-copy view of a dequeued buffer.
///
/// The plane slices point into kernel memory and are only valid while the
/// buffer is dequeued, which the borrow on the engine enforces.
pub struct Frame<'a> {
    info: FrameInfo,
    format: &'a PixelFormat,
    planes: &'a [&'a [u8]],
    adjuster: Option<&'a ColorAdjuster>,
}

impl Frame<'_> {
    pub fn info(&self) -> FrameInfo {
        self.info
    }

    pub fn format(&self) -> &PixelFormat {
        self.format
    }

    /// Filled bytes of every plane.
    pub fn planes(&self) -> &[&[u8]] {
        self.planes
    }

    /// Converts the frame to packed RGB24, applying the session's colour
    /// adjustment if one is configured.
    pub fn to_rgb24(&self, rgb: &mut [u8]) -> Result<()> {
        let _span = trace_span!("convert", fourcc = %self.info.fourcc).entered();
        let (fourcc, width, height) = (self.format.fourcc, self.format.width, self.format.height);
        match self.adjuster {
            Some(adjuster) if !adjuster.is_identity() => {
                convert_to_rgb24(fourcc, self.planes, width, height, rgb, adjuster)
            }
            _ => convert_to_rgb24(fourcc, self.planes, width, height, rgb, &Clamp),
        }
    }
}

/// Streaming state machine over a buffer pool.
#[derive(Debug)]
pub struct CaptureEngine {
    state: EngineState,
    owners: Vec<Owner>,
}

impl Default for CaptureEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureEngine {
    pub fn new() -> Self {
        Self {
            state: EngineState::Idle,
            owners: Vec::new(),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.state == EngineState::Streaming
    }

    pub fn owner(&self, index: u32) -> Option<Owner> {
        self.owners.get(index as usize).copied()
    }

    /// Number of slots currently held by the kernel.
    pub fn queued(&self) -> usize {
        self.owners.iter().filter(|o| **o == Owner::Kernel).count()
    }

    /// Queues every buffer in index order and turns streaming on.
    ///
    /// On failure the engine stays idle and any buffers already queued are
    /// returned to userspace.
    pub fn start<D: Device>(&mut self, dev: &D, pool: &BufferPool) -> Result<()> {
        if self.is_streaming() {
            return Ok(());
        }
        self.owners = vec![Owner::User; pool.len()];

        let buf_type = pool.buf_type();
        for buffer in pool.buffers() {
            if let Err(err) = dev.queue_buffer(buf_type, buffer.index, pool.num_planes()) {
                self.abort(dev, pool);
                return Err(Error::ioctl("VIDIOC_QBUF")(err));
            }
            self.set_owner(buffer.index, Owner::Kernel);
        }
        if let Err(err) = dev.stream_on(buf_type) {
            self.abort(dev, pool);
            return Err(Error::ioctl("VIDIOC_STREAMON")(err));
        }

        self.state = EngineState::Streaming;
        debug!("streaming with {} buffers", pool.len());
        Ok(())
    }

    fn set_owner(&mut self, index: u32, owner: Owner) {
        if let Some(slot) = self.owners.get_mut(index as usize) {
            *slot = owner;
        }
    }

    fn abort<D: Device>(&mut self, dev: &D, pool: &BufferPool) {
        if self.queued() > 0 {
            if let Err(err) = dev.stream_off(pool.buf_type()) {
                warn!("stream off after failed start: {}", err);
            }
        }
        self.owners.fill(Owner::User);
        self.state = EngineState::Idle;
    }

    /// Turns streaming off, which returns every buffer to userspace. Does
    /// nothing when already idle.
    pub fn stop<D: Device>(&mut self, dev: &D, pool: &BufferPool) -> Result<()> {
        if !self.is_streaming() {
            return Ok(());
        }
        dev.stream_off(pool.buf_type())
            .map_err(Error::ioctl("VIDIOC_STREAMOFF"))?;
        self.owners.fill(Owner::User);
        self.state = EngineState::Idle;
        debug!("streaming stopped");
        Ok(())
    }

    /// Forgets the streaming state without talking to the driver. Used when
    /// the handle is being dropped, which stops streaming in the kernel.
    pub(crate) fn abandon(&mut self) {
        self.owners.clear();
        self.state = EngineState::Idle;
    }

    /// Dequeues one filled buffer, hands it to `f` and re-queues it.
    ///
    /// Blocks in blocking mode. A non-blocking handle returns
    /// [`Error::WouldBlock`] when no buffer is ready. If re-queueing fails the
    /// error is returned and `f`'s result is discarded.
    pub fn dequeue<D, F, R>(
        &mut self,
        dev: &D,
        pool: &BufferPool,
        format: &PixelFormat,
        adjuster: Option<&ColorAdjuster>,
        f: F,
    ) -> Result<R>
    where
        D: Device,
        F: FnOnce(&Frame) -> R,
    {
        if !self.is_streaming() {
            return Err(Error::InvalidState {
                operation: "dequeue",
                state: SessionState::Configured,
            });
        }
        let buf_type = pool.buf_type();
        let num_planes = pool.num_planes();
        let done = dev
            .dequeue_buffer(buf_type, num_planes)
            .map_err(Error::ioctl("VIDIOC_DQBUF"))?;
        let Some(buffer) = pool.get(done.index) else {
            return Err(Error::UnknownBuffer(done.index));
        };
        self.set_owner(done.index, Owner::User);
        if done.is_error() {
            warn!("buffer {} flagged as corrupted by the driver", done.index);
        }

        let mut planes: [&[u8]; MAX_PLANES] = [&[]; MAX_PLANES];
        let mut bytes_used = 0;
        for ((slot, plane), &used) in planes
            .iter_mut()
            .zip(&buffer.planes)
            .zip(&done.bytes_used)
        {
            let data = plane.as_slice();
            let used = match used as usize {
                0 => data.len(),
                n => n.min(data.len()),
            };
            *slot = &data[..used];
            bytes_used += used;
        }

        let frame = Frame {
            info: FrameInfo {
                index: done.index,
                sequence: done.sequence,
                timestamp: done.timestamp,
                fourcc: format.fourcc,
                width: format.width,
                height: format.height,
                bytes_used,
                corrupted: done.is_error(),
            },
            format,
            planes: &planes[..buffer.planes.len().min(MAX_PLANES)],
            adjuster,
        };
        let out = f(&frame);

        dev.queue_buffer(buf_type, done.index, num_planes)
            .map_err(Error::ioctl("VIDIOC_QBUF"))?;
        self.set_owner(done.index, Owner::Kernel);
        Ok(out)
    }
}
