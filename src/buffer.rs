// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    device::{BufType, Device},
    error::{Error, Result},
};
use std::{ffi::c_void, ptr::NonNull, slice::from_raw_parts};
use tracing::{debug, warn};

/// Memory-mapped view of one plane of a kernel capture buffer.
///
/// The mapping is unmapped when dropped. The kernel writes into it only while
/// the owning buffer is queued, so reading it is sound while the buffer is
/// dequeued.
pub struct MappedPlane {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the mapping is plain shared memory with no thread affinity.
unsafe impl Send for MappedPlane {}

impl MappedPlane {
    /// Takes ownership of a mapping. Returns `None` for a null pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `mmap` with length `len` and must not be unmapped
    /// by anyone else.
    pub unsafe fn from_raw(ptr: *mut u8, len: usize) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { ptr, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: valid mapping of `len` bytes for the lifetime of `self`.
        unsafe { from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for MappedPlane {
    fn drop(&mut self) {
        // SAFETY: we own this mapping and never hand it out past our lifetime.
        if unsafe { libc::munmap(self.ptr.as_ptr().cast::<c_void>(), self.len) } != 0 {
            warn!(
                "munmap of {} bytes failed: {}",
                self.len,
                std::io::Error::last_os_error()
            );
        }
    }
}

impl std::fmt::Debug for MappedPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MappedPlane({:p}, {})", self.ptr, self.len)
    }
}

#[derive(Debug)]
pub struct MappedBuffer {
    pub index: u32,
    pub planes: Vec<MappedPlane>,
}

/// The set of kernel buffers mapped into this process.
///
/// Either every granted buffer is mapped or none is: a mapping failure drops
/// the mappings already made and releases the kernel buffers before the error
/// is returned.
#[derive(Debug)]
pub struct BufferPool {
    buf_type: BufType,
    num_planes: u8,
    buffers: Vec<MappedBuffer>,
}

impl BufferPool {
    /// Requests `count` buffers from the driver and maps each of them.
    ///
    /// # Errors
    ///
    /// [`Error::InsufficientBuffers`] when fewer than two are granted and
    /// [`Error::Map`] when a plane cannot be mapped.
    pub fn request_and_map<D: Device>(
        dev: &D,
        buf_type: BufType,
        count: u32,
        num_planes: u8,
    ) -> Result<Self> {
        let granted = dev
            .request_buffers(buf_type, count)
            .map_err(Error::ioctl("VIDIOC_REQBUFS"))?;
        if granted < 2 {
            release(dev, buf_type);
            return Err(Error::InsufficientBuffers {
                requested: count,
                granted,
            });
        }
        if granted != count {
            debug!("driver granted {} buffers, {} requested", granted, count);
        }

        let mut pool = BufferPool {
            buf_type,
            num_planes,
            buffers: Vec::with_capacity(granted as usize),
        };
        for index in 0..granted {
            match map_buffer(dev, buf_type, index, num_planes) {
                Ok(buffer) => pool.buffers.push(buffer),
                Err(err) => {
                    pool.buffers.clear();
                    release(dev, buf_type);
                    return Err(err);
                }
            }
        }
        debug!("mapped {} buffers of {} planes", granted, num_planes);
        Ok(pool)
    }

    /// Unmaps every buffer. Calling it again does nothing.
    pub fn unmap_all(&mut self) {
        if !self.buffers.is_empty() {
            debug!("unmapping {} buffers", self.buffers.len());
            self.buffers.clear();
        }
    }

    /// Unmaps every buffer and hands the kernel buffers back to the driver.
    pub fn release<D: Device>(&mut self, dev: &D) {
        let had_buffers = !self.buffers.is_empty();
        self.unmap_all();
        if had_buffers {
            release(dev, self.buf_type);
        }
    }

    pub fn buf_type(&self) -> BufType {
        self.buf_type
    }

    pub fn num_planes(&self) -> u8 {
        self.num_planes
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<&MappedBuffer> {
        self.buffers.get(index as usize)
    }

    pub fn buffers(&self) -> &[MappedBuffer] {
        &self.buffers
    }
}

fn map_buffer<D: Device>(
    dev: &D,
    buf_type: BufType,
    index: u32,
    num_planes: u8,
) -> Result<MappedBuffer> {
    let info = dev
        .query_buffer(buf_type, index, num_planes)
        .map_err(Error::ioctl("VIDIOC_QUERYBUF"))?;
    let mut planes = Vec::with_capacity(info.planes.len());
    for (plane, desc) in info.planes.iter().enumerate() {
        let mapped = dev.map_plane(desc).map_err(|source| Error::Map {
            index,
            plane,
            source,
        })?;
        planes.push(mapped);
    }
    Ok(MappedBuffer { index, planes })
}

fn release<D: Device>(dev: &D, buf_type: BufType) {
    if let Err(err) = dev.request_buffers(buf_type, 0) {
        warn!("failed to release kernel buffers: {}", err);
    }
}
