// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Scripted in-memory capture device.
//!
//! Buffers are backed by anonymous mappings so the real pool and engine code
//! paths run unchanged. Every driver call is recorded and most can be made to
//! fail.

#![allow(dead_code)]

use edgefirst_preview::{
    buffer::MappedPlane,
    config::CaptureConfig,
    device::{
        BufType, BufferInfo, Capability, Dequeued, Device, FormatDesc, Fraction, FrameSize,
        InputDesc, PlaneInfo, StreamParams,
    },
    format::{
        format_row_stride, image_size, FourCC, PixelFormat, PlaneFormat, MAX_PLANES, NV12, YUYV,
    },
    session::CaptureSession,
};
use std::{
    collections::VecDeque,
    io,
    ptr::null_mut,
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::Duration,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn errno(code: i32) -> io::Error {
    io::Error::from_raw_os_error(code)
}

pub struct MockState {
    pub caps: u32,
    pub formats: Vec<FourCC>,
    pub calls: Vec<&'static str>,
    pub reqbufs: Vec<u32>,
    pub opens: usize,
    pub open_error: Option<i32>,
    pub input: u32,
    pub format: PixelFormat,
    /// Size the driver forces regardless of the request.
    pub size_override: Option<(u32, u32)>,
    pub params: StreamParams,
    pub max_fps: Option<u32>,
    pub grant_limit: Option<u32>,
    pub requested: u32,
    /// Fail the n-th map call (0 based, counted across the device lifetime).
    pub fail_map_at: Option<usize>,
    pub map_calls: usize,
    pub fail_stream_on: bool,
    pub streaming: bool,
    pub queue: VecDeque<u32>,
    /// Mapped address and length per (index, plane).
    pub mappings: Vec<((u32, usize), usize, usize)>,
    /// Bytes written into each plane when a buffer is dequeued.
    pub frame: Vec<Vec<u8>>,
    pub sequence: u32,
    pub poll_script: VecDeque<io::Result<bool>>,
    pub dequeue_errors: VecDeque<io::Error>,
    /// Every call fails with ENODEV.
    pub lost: bool,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            caps: Capability::VIDEO_CAPTURE | Capability::STREAMING,
            formats: vec![YUYV, NV12],
            calls: Vec::new(),
            reqbufs: Vec::new(),
            opens: 0,
            open_error: None,
            input: 0,
            format: PixelFormat::new(YUYV, 640, 480),
            size_override: None,
            params: StreamParams {
                capture_mode: 0,
                time_per_frame: Fraction::new(1, 30),
                frame_interval_supported: true,
            },
            max_fps: None,
            grant_limit: None,
            requested: 0,
            fail_map_at: None,
            map_calls: 0,
            fail_stream_on: false,
            streaming: false,
            queue: VecDeque::new(),
            mappings: Vec::new(),
            frame: Vec::new(),
            sequence: 0,
            poll_script: VecDeque::new(),
            dequeue_errors: VecDeque::new(),
            lost: false,
        }
    }
}

impl MockState {
    pub fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls.iter().position(|c| *c == call)
    }
}

#[derive(Clone, Default)]
pub struct MockDevice {
    pub state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    fn enter(&self, call: &'static str) -> io::Result<MutexGuard<'_, MockState>> {
        let mut state = self.state();
        state.calls.push(call);
        if state.lost {
            return Err(errno(libc::ENODEV));
        }
        Ok(state)
    }
}

fn plane_sizes(fourcc: FourCC, width: u32, height: u32, num_planes: u8) -> Vec<PlaneFormat> {
    let luma = width * height;
    let stride = format_row_stride(fourcc, width).unwrap_or(width as usize * 2) as u32;
    let total = image_size(width, height, fourcc).unwrap_or(luma as usize * 2) as u32;
    match num_planes {
        2 => vec![
            PlaneFormat {
                bytes_per_line: stride,
                size_image: luma,
            },
            PlaneFormat {
                bytes_per_line: stride,
                size_image: luma / 2,
            },
        ],
        3 => vec![
            PlaneFormat {
                bytes_per_line: stride,
                size_image: luma,
            },
            PlaneFormat {
                bytes_per_line: stride / 2,
                size_image: luma / 4,
            },
            PlaneFormat {
                bytes_per_line: stride / 2,
                size_image: luma / 4,
            },
        ],
        _ => vec![PlaneFormat {
            bytes_per_line: stride,
            size_image: total,
        }],
    }
}

impl Device for MockDevice {
    fn query_capability(&self) -> io::Result<Capability> {
        let state = self.enter("QUERYCAP")?;
        Ok(Capability {
            driver: "mock".into(),
            card: "Mock Camera".into(),
            bus_info: "platform:mock".into(),
            version: 0x060100,
            capabilities: state.caps | Capability::DEVICE_CAPS,
            device_caps: state.caps,
        })
    }

    fn query_std(&self) -> io::Result<u64> {
        drop(self.enter("QUERYSTD")?);
        Err(errno(libc::ENOTTY))
    }

    fn enum_inputs(&self) -> io::Result<Vec<InputDesc>> {
        drop(self.enter("ENUMINPUT")?);
        Ok(vec![InputDesc {
            index: 0,
            name: "Camera 0".into(),
            kind: 2,
            std: 0,
            status: 0,
        }])
    }

    fn enum_formats(&self, _buf_type: BufType) -> io::Result<Vec<FormatDesc>> {
        let state = self.enter("ENUM_FMT")?;
        Ok(state
            .formats
            .iter()
            .enumerate()
            .map(|(i, fourcc)| FormatDesc {
                index: i as u32,
                fourcc: *fourcc,
                description: fourcc.to_string(),
                flags: 0,
            })
            .collect())
    }

    fn enum_frame_sizes(&self, _fourcc: FourCC) -> io::Result<Vec<FrameSize>> {
        drop(self.enter("ENUM_FRAMESIZES")?);
        Ok(vec![
            FrameSize::Discrete {
                width: 640,
                height: 480,
            },
            FrameSize::Discrete {
                width: 1280,
                height: 720,
            },
        ])
    }

    fn input(&self) -> io::Result<u32> {
        Ok(self.enter("G_INPUT")?.input)
    }

    fn set_input(&self, index: u32) -> io::Result<u32> {
        let mut state = self.enter("S_INPUT")?;
        if index > 0 {
            return Err(errno(libc::EINVAL));
        }
        state.input = index;
        Ok(index)
    }

    fn set_format(&self, buf_type: BufType, request: &PixelFormat) -> io::Result<PixelFormat> {
        let mut state = self.enter("S_FMT")?;
        if state.streaming || state.requested > 0 {
            return Err(errno(libc::EBUSY));
        }
        let (width, height) = state.size_override.unwrap_or((request.width, request.height));
        let num_planes = if buf_type.is_multiplanar() {
            request.fourcc.plane_count()
        } else {
            1
        };
        let mut planes = [PlaneFormat::default(); MAX_PLANES];
        for (dst, src) in planes
            .iter_mut()
            .zip(plane_sizes(request.fourcc, width, height, num_planes))
        {
            *dst = src;
        }
        state.format = PixelFormat {
            fourcc: request.fourcc,
            width,
            height,
            num_planes,
            planes,
        };
        Ok(state.format)
    }

    fn format(&self, _buf_type: BufType) -> io::Result<PixelFormat> {
        Ok(self.enter("G_FMT")?.format)
    }

    fn set_stream_params(&self, _buf_type: BufType, params: &StreamParams) -> io::Result<()> {
        let mut state = self.enter("S_PARM")?;
        let requested = params.time_per_frame.fps().unwrap_or(30.0).round() as u32;
        let fps = state.max_fps.map_or(requested, |max| requested.min(max));
        state.params = StreamParams {
            capture_mode: params.capture_mode,
            time_per_frame: Fraction::new(1, fps),
            frame_interval_supported: true,
        };
        Ok(())
    }

    fn stream_params(&self, _buf_type: BufType) -> io::Result<StreamParams> {
        Ok(self.enter("G_PARM")?.params)
    }

    fn request_buffers(&self, _buf_type: BufType, count: u32) -> io::Result<u32> {
        let mut state = self.enter("REQBUFS")?;
        if state.streaming {
            return Err(errno(libc::EBUSY));
        }
        let granted = state.grant_limit.map_or(count, |limit| count.min(limit));
        state.reqbufs.push(count);
        state.requested = granted;
        state.queue.clear();
        Ok(granted)
    }

    fn query_buffer(
        &self,
        buf_type: BufType,
        index: u32,
        num_planes: u8,
    ) -> io::Result<BufferInfo> {
        let state = self.enter("QUERYBUF")?;
        if index >= state.requested {
            return Err(errno(libc::EINVAL));
        }
        let planes = if buf_type.is_multiplanar() { num_planes } else { 1 };
        Ok(BufferInfo {
            index,
            planes: (0..planes as usize)
                .map(|p| PlaneInfo {
                    length: state.format.planes[p].size_image,
                    offset: index << 4 | p as u32,
                })
                .collect(),
        })
    }

    fn map_plane(&self, plane: &PlaneInfo) -> io::Result<MappedPlane> {
        let mut state = self.enter("MMAP")?;
        let call = state.map_calls;
        state.map_calls += 1;
        if state.fail_map_at == Some(call) {
            return Err(errno(libc::ENOMEM));
        }
        let len = plane.length as usize;
        let ptr = unsafe {
            libc::mmap(
                null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let key = (plane.offset >> 4, (plane.offset & 0xf) as usize);
        state.mappings.retain(|(k, _, _)| *k != key);
        state.mappings.push((key, ptr as usize, len));
        unsafe { MappedPlane::from_raw(ptr.cast(), len) }.ok_or_else(|| errno(libc::ENOMEM))
    }

    fn queue_buffer(&self, _buf_type: BufType, index: u32, _num_planes: u8) -> io::Result<()> {
        let mut state = self.enter("QBUF")?;
        if index >= state.requested || state.queue.contains(&index) {
            return Err(errno(libc::EINVAL));
        }
        state.queue.push_back(index);
        Ok(())
    }

    fn dequeue_buffer(&self, _buf_type: BufType, num_planes: u8) -> io::Result<Dequeued> {
        let mut state = self.enter("DQBUF")?;
        if let Some(err) = state.dequeue_errors.pop_front() {
            return Err(err);
        }
        if !state.streaming {
            return Err(errno(libc::EINVAL));
        }
        let Some(index) = state.queue.pop_front() else {
            return Err(errno(libc::EAGAIN));
        };
        state.sequence += 1;

        let mut bytes_used = [0u32; MAX_PLANES];
        for plane in 0..num_planes.max(1) as usize {
            let Some(&(_, addr, len)) = state.mappings.iter().find(|(k, _, _)| *k == (index, plane))
            else {
                continue;
            };
            bytes_used[plane] = len as u32;
            if let Some(data) = state.frame.get(plane) {
                let n = data.len().min(len);
                // the pool keeps the mapping alive while streaming
                unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), addr as *mut u8, n) };
            }
        }
        Ok(Dequeued {
            index,
            sequence: state.sequence,
            timestamp: Duration::from_millis(state.sequence as u64 * 33),
            flags: 0,
            bytes_used,
        })
    }

    fn stream_on(&self, _buf_type: BufType) -> io::Result<()> {
        let mut state = self.enter("STREAMON")?;
        if state.fail_stream_on {
            return Err(errno(libc::EIO));
        }
        if state.queue.is_empty() {
            return Err(errno(libc::EINVAL));
        }
        state.streaming = true;
        Ok(())
    }

    fn stream_off(&self, _buf_type: BufType) -> io::Result<()> {
        let mut state = self.enter("STREAMOFF")?;
        state.streaming = false;
        state.queue.clear();
        Ok(())
    }

    fn poll_readable(&self, timeout: Duration) -> io::Result<bool> {
        let ready = {
            let mut state = self.enter("POLL")?;
            if let Some(scripted) = state.poll_script.pop_front() {
                return scripted;
            }
            state.streaming && !state.queue.is_empty()
        };
        // pace the producer like a real sensor
        thread::sleep(if ready {
            Duration::from_millis(1)
        } else {
            timeout.min(Duration::from_millis(5))
        });
        Ok(ready)
    }
}

/// A closed session over `dev`, counting opens in the mock state.
pub fn session(dev: &MockDevice, config: CaptureConfig) -> CaptureSession<MockDevice> {
    let dev = dev.clone();
    CaptureSession::with_opener(config, move |_path, _nonblocking| {
        let mut state = dev.state();
        if let Some(code) = state.open_error {
            return Err(errno(code));
        }
        state.opens += 1;
        drop(state);
        Ok(dev.clone())
    })
    .unwrap()
}

pub fn config(fourcc: FourCC, width: u32, height: u32) -> CaptureConfig {
    CaptureConfig::new("/dev/video-mock", fourcc, width, height)
}

/// A configured session capturing YUYV 640x480 with three buffers.
pub fn configured() -> (MockDevice, CaptureSession<MockDevice>) {
    let dev = MockDevice::new();
    let mut session = session(&dev, config(YUYV, 640, 480));
    session.configure().unwrap();
    (dev, session)
}
