// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Device access layer.
//!
//! [`Device`] is the narrow set of driver calls the capture pipeline makes.
//! [`V4l2Device`] implements it over a V4L2 node with the raw ioctls from
//! `v4l2-sys`; anything else implementing the trait (a recorded stream, a
//! test double) can drive the same session and worker code.

use crate::{
    buffer::MappedPlane,
    format::{FourCC, PixelFormat, PlaneFormat, MAX_PLANES},
};
use nix::errno::Errno;
use std::{
    fmt,
    fs::OpenOptions,
    io,
    os::{
        fd::{AsRawFd, OwnedFd},
        unix::fs::OpenOptionsExt,
    },
    path::{Path, PathBuf},
    ptr::null_mut,
    time::Duration,
};
use tracing::trace;
use v4l2_sys::*;

/// Buffer queue a session streams from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BufType {
    VideoCapture,
    VideoCaptureMplane,
}

impl BufType {
    pub fn raw(self) -> u32 {
        match self {
            BufType::VideoCapture => V4L2_BUF_TYPE_VIDEO_CAPTURE,
            BufType::VideoCaptureMplane => V4L2_BUF_TYPE_VIDEO_CAPTURE_MPLANE,
        }
    }

    pub fn is_multiplanar(self) -> bool {
        self == BufType::VideoCaptureMplane
    }
}

/// Identity and capability flags reported by the driver.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Capability {
    pub driver: String,
    pub card: String,
    pub bus_info: String,
    pub version: u32,
    pub capabilities: u32,
    pub device_caps: u32,
}

impl Capability {
    pub const VIDEO_CAPTURE: u32 = V4L2_CAP_VIDEO_CAPTURE;
    pub const VIDEO_CAPTURE_MPLANE: u32 = V4L2_CAP_VIDEO_CAPTURE_MPLANE;
    pub const READWRITE: u32 = V4L2_CAP_READWRITE;
    pub const STREAMING: u32 = V4L2_CAP_STREAMING;
    pub const DEVICE_CAPS: u32 = V4L2_CAP_DEVICE_CAPS;

    /// Capabilities of this node. Drivers that fill `device_caps` report the
    /// whole physical device in `capabilities`.
    pub fn effective(&self) -> u32 {
        if self.capabilities & Self::DEVICE_CAPS != 0 {
            self.device_caps
        } else {
            self.capabilities
        }
    }

    /// Capture queue to use. Single-plane wins when both are offered.
    pub fn buf_type(&self) -> Option<BufType> {
        let caps = self.effective();
        if caps & Self::VIDEO_CAPTURE != 0 {
            Some(BufType::VideoCapture)
        } else if caps & Self::VIDEO_CAPTURE_MPLANE != 0 {
            Some(BufType::VideoCaptureMplane)
        } else {
            None
        }
    }

    pub fn supports_streaming(&self) -> bool {
        self.effective() & Self::STREAMING != 0
    }

    pub fn supports_read(&self) -> bool {
        self.effective() & Self::READWRITE != 0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} ({}) on {} version {}.{}.{} caps:{:#010x}",
            self.card,
            self.driver,
            self.bus_info,
            (self.version >> 16) & 0xff,
            (self.version >> 8) & 0xff,
            self.version & 0xff,
            self.effective()
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormatDesc {
    pub index: u32,
    pub fourcc: FourCC,
    pub description: String,
    pub flags: u32,
}

impl FormatDesc {
    pub fn is_compressed(&self) -> bool {
        self.flags & V4L2_FMT_FLAG_COMPRESSED != 0
    }

    pub fn is_emulated(&self) -> bool {
        self.flags & V4L2_FMT_FLAG_EMULATED != 0
    }

    /// Annotation for listings, e.g. `" (compressed)"`.
    pub fn flag_suffix(&self) -> &'static str {
        match (self.is_compressed(), self.is_emulated()) {
            (true, true) => " (compressed, emulated)",
            (true, false) => " (compressed)",
            (false, true) => " (emulated)",
            (false, false) => "",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameSize {
    Discrete {
        width: u32,
        height: u32,
    },
    Stepwise {
        min_width: u32,
        max_width: u32,
        step_width: u32,
        min_height: u32,
        max_height: u32,
        step_height: u32,
    },
    Continuous {
        min_width: u32,
        max_width: u32,
        min_height: u32,
        max_height: u32,
    },
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FrameSize::Discrete { width, height } => write!(f, "{width}x{height}"),
            FrameSize::Stepwise {
                min_width,
                max_width,
                step_width,
                min_height,
                max_height,
                step_height,
            } => write!(
                f,
                "{min_width}x{min_height} - {max_width}x{max_height} step {step_width}x{step_height}"
            ),
            FrameSize::Continuous {
                min_width,
                max_width,
                min_height,
                max_height,
            } => write!(f, "{min_width}x{min_height} - {max_width}x{max_height}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputDesc {
    pub index: u32,
    pub name: String,
    pub kind: u32,
    pub std: u64,
    pub status: u32,
}

impl InputDesc {
    pub fn is_camera(&self) -> bool {
        self.kind == V4L2_INPUT_TYPE_CAMERA
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Fraction {
    pub numerator: u32,
    pub denominator: u32,
}

impl Fraction {
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Frames per second for a time-per-frame interval.
    pub fn fps(&self) -> Option<f64> {
        if self.numerator == 0 || self.denominator == 0 {
            None
        } else {
            Some(self.denominator as f64 / self.numerator as f64)
        }
    }
}

/// Capture stream parameters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamParams {
    pub capture_mode: u32,
    pub time_per_frame: Fraction,
    /// Driver honours `time_per_frame`.
    pub frame_interval_supported: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaneInfo {
    pub length: u32,
    pub offset: u32,
}

/// Location of one kernel buffer's planes for mapping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferInfo {
    pub index: u32,
    pub planes: Vec<PlaneInfo>,
}

/// A filled buffer handed back by the driver.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Dequeued {
    pub index: u32,
    pub sequence: u32,
    pub timestamp: Duration,
    pub flags: u32,
    pub bytes_used: [u32; MAX_PLANES],
}

impl Dequeued {
    /// The driver flagged the data as possibly corrupted.
    pub fn is_error(&self) -> bool {
        self.flags & V4L2_BUF_FLAG_ERROR != 0
    }
}

/// Driver calls made by the capture pipeline.
///
/// Failures are returned as [`io::Error`] carrying the driver errno, so
/// `WouldBlock` and `Interrupted` keep their meaning across the seam.
pub trait Device: Send + 'static {
    fn query_capability(&self) -> io::Result<Capability>;

    /// Analog video standard the current input detected.
    fn query_std(&self) -> io::Result<u64>;

    fn enum_inputs(&self) -> io::Result<Vec<InputDesc>>;

    fn enum_formats(&self, buf_type: BufType) -> io::Result<Vec<FormatDesc>>;

    fn enum_frame_sizes(&self, fourcc: FourCC) -> io::Result<Vec<FrameSize>>;

    fn input(&self) -> io::Result<u32>;

    /// Selects a video input and returns the index the driver applied.
    fn set_input(&self, index: u32) -> io::Result<u32>;

    /// Requests a format and returns what the driver negotiated.
    fn set_format(&self, buf_type: BufType, request: &PixelFormat) -> io::Result<PixelFormat>;

    fn format(&self, buf_type: BufType) -> io::Result<PixelFormat>;

    fn set_stream_params(&self, buf_type: BufType, params: &StreamParams) -> io::Result<()>;

    fn stream_params(&self, buf_type: BufType) -> io::Result<StreamParams>;

    /// Requests `count` memory-mapped buffers and returns the number granted.
    /// A count of zero releases them.
    fn request_buffers(&self, buf_type: BufType, count: u32) -> io::Result<u32>;

    fn query_buffer(&self, buf_type: BufType, index: u32, num_planes: u8)
        -> io::Result<BufferInfo>;

    fn map_plane(&self, plane: &PlaneInfo) -> io::Result<MappedPlane>;

    fn queue_buffer(&self, buf_type: BufType, index: u32, num_planes: u8) -> io::Result<()>;

    fn dequeue_buffer(&self, buf_type: BufType, num_planes: u8) -> io::Result<Dequeued>;

    fn stream_on(&self, buf_type: BufType) -> io::Result<()>;

    fn stream_off(&self, buf_type: BufType) -> io::Result<()>;

    /// Waits until a filled buffer can be dequeued. `Ok(false)` on timeout.
    fn poll_readable(&self, timeout: Duration) -> io::Result<bool>;
}

/// A V4L2 video node.
#[derive(Debug)]
pub struct V4l2Device {
    fd: OwnedFd,
    path: PathBuf,
}

fn cstr(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn pixel_format(fmt: &v4l2_format) -> PixelFormat {
    if fmt.type_ == V4L2_BUF_TYPE_VIDEO_CAPTURE_MPLANE {
        // SAFETY: the driver filled the multi-planar member for this type.
        let pix_mp = unsafe { fmt.fmt.pix_mp };
        let num_planes = pix_mp.num_planes.min(MAX_PLANES as u8);
        let mut planes = [PlaneFormat::default(); MAX_PLANES];
        for (dst, src) in planes
            .iter_mut()
            .zip(pix_mp.plane_fmt.iter())
            .take(num_planes as usize)
        {
            dst.bytes_per_line = src.bytesperline;
            dst.size_image = src.sizeimage;
        }
        PixelFormat {
            fourcc: FourCC::from_u32(pix_mp.pixelformat),
            width: pix_mp.width,
            height: pix_mp.height,
            num_planes,
            planes,
        }
    } else {
        // SAFETY: single-planar member for every other capture type.
        let pix = unsafe { fmt.fmt.pix };
        let mut planes = [PlaneFormat::default(); MAX_PLANES];
        planes[0] = PlaneFormat {
            bytes_per_line: pix.bytesperline,
            size_image: pix.sizeimage,
        };
        PixelFormat {
            fourcc: FourCC::from_u32(pix.pixelformat),
            width: pix.width,
            height: pix.height,
            num_planes: 1,
            planes,
        }
    }
}

fn buffer(buf_type: BufType, planes: &mut [v4l2_plane; MAX_PLANES], num_planes: u8) -> v4l2_buffer {
    let mut buf = v4l2_buffer {
        type_: buf_type.raw(),
        memory: V4L2_MEMORY_MMAP,
        ..Default::default()
    };
    if buf_type.is_multiplanar() {
        buf.m.planes = planes.as_mut_ptr();
        buf.length = (num_planes as usize).min(MAX_PLANES) as u32;
    }
    buf
}

impl V4l2Device {
    /// Opens a video node for reading and writing.
    pub fn open(path: impl AsRef<Path>, nonblocking: bool) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(if nonblocking { libc::O_NONBLOCK } else { 0 })
            .open(path)?;
        trace!("opened {} nonblocking:{}", path.display(), nonblocking);
        Ok(Self {
            fd: OwnedFd::from(file),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn raw(&self) -> i32 {
        self.fd.as_raw_fd()
    }
}

impl Device for V4l2Device {
    fn query_capability(&self) -> io::Result<Capability> {
        let mut cap = v4l2_capability::default();
        // SAFETY: valid fd and a properly sized output struct.
        unsafe { vidioc_querycap(self.raw(), &mut cap) }?;
        Ok(Capability {
            driver: cstr(&cap.driver),
            card: cstr(&cap.card),
            bus_info: cstr(&cap.bus_info),
            version: cap.version,
            capabilities: cap.capabilities,
            device_caps: cap.device_caps,
        })
    }

    fn query_std(&self) -> io::Result<u64> {
        let mut std: v4l2_std_id = 0;
        // SAFETY: valid fd and output pointer.
        unsafe { vidioc_querystd(self.raw(), &mut std) }?;
        Ok(std)
    }

    fn enum_inputs(&self) -> io::Result<Vec<InputDesc>> {
        let mut inputs = Vec::new();
        for index in 0.. {
            let mut input = v4l2_input {
                index,
                ..Default::default()
            };
            // SAFETY: valid fd and in/out struct.
            match unsafe { vidioc_enuminput(self.raw(), &mut input) } {
                Ok(_) => inputs.push(InputDesc {
                    index,
                    name: cstr(&input.name),
                    kind: input.type_,
                    std: input.std,
                    status: input.status,
                }),
                Err(Errno::EINVAL) => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(inputs)
    }

    fn enum_formats(&self, buf_type: BufType) -> io::Result<Vec<FormatDesc>> {
        let mut formats = Vec::new();
        for index in 0.. {
            let mut desc = v4l2_fmtdesc {
                index,
                type_: buf_type.raw(),
                ..Default::default()
            };
            // SAFETY: valid fd and in/out struct.
            match unsafe { vidioc_enum_fmt(self.raw(), &mut desc) } {
                Ok(_) => formats.push(FormatDesc {
                    index,
                    fourcc: FourCC::from_u32(desc.pixelformat),
                    description: cstr(&desc.description),
                    flags: desc.flags,
                }),
                Err(Errno::EINVAL) => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(formats)
    }

    fn enum_frame_sizes(&self, fourcc: FourCC) -> io::Result<Vec<FrameSize>> {
        let mut sizes = Vec::new();
        for index in 0.. {
            let mut size = v4l2_frmsizeenum {
                index,
                pixel_format: fourcc.to_u32(),
                ..Default::default()
            };
            // SAFETY: valid fd and in/out struct.
            match unsafe { vidioc_enum_framesizes(self.raw(), &mut size) } {
                Ok(_) => {}
                Err(Errno::EINVAL) => break,
                Err(e) => return Err(e.into()),
            }
            // SAFETY: the union member is selected by `type_`.
            let frame_size = unsafe {
                match size.type_ {
                    V4L2_FRMSIZE_TYPE_DISCRETE => FrameSize::Discrete {
                        width: size.frmsize.discrete.width,
                        height: size.frmsize.discrete.height,
                    },
                    V4L2_FRMSIZE_TYPE_CONTINUOUS => FrameSize::Continuous {
                        min_width: size.frmsize.stepwise.min_width,
                        max_width: size.frmsize.stepwise.max_width,
                        min_height: size.frmsize.stepwise.min_height,
                        max_height: size.frmsize.stepwise.max_height,
                    },
                    _ => {
                        let s = size.frmsize.stepwise;
                        FrameSize::Stepwise {
                            min_width: s.min_width,
                            max_width: s.max_width,
                            step_width: s.step_width,
                            min_height: s.min_height,
                            max_height: s.max_height,
                            step_height: s.step_height,
                        }
                    }
                }
            };
            sizes.push(frame_size);
            // a stepwise or continuous range is reported once at index 0
            if !matches!(frame_size, FrameSize::Discrete { .. }) {
                break;
            }
        }
        Ok(sizes)
    }

    fn input(&self) -> io::Result<u32> {
        let mut index = 0;
        // SAFETY: valid fd and output pointer.
        unsafe { vidioc_g_input(self.raw(), &mut index) }?;
        Ok(index as u32)
    }

    fn set_input(&self, index: u32) -> io::Result<u32> {
        let mut index = index as libc::c_int;
        // SAFETY: valid fd and in/out pointer.
        unsafe { vidioc_s_input(self.raw(), &mut index) }?;
        Ok(index as u32)
    }

    fn set_format(&self, buf_type: BufType, request: &PixelFormat) -> io::Result<PixelFormat> {
        let mut fmt = v4l2_format {
            type_: buf_type.raw(),
            ..Default::default()
        };
        if buf_type.is_multiplanar() {
            fmt.fmt.pix_mp = v4l2_pix_format_mplane {
                width: request.width,
                height: request.height,
                pixelformat: request.fourcc.to_u32(),
                field: V4L2_FIELD_ANY,
                num_planes: request.num_planes,
                ..Default::default()
            };
        } else {
            fmt.fmt.pix = v4l2_pix_format {
                width: request.width,
                height: request.height,
                pixelformat: request.fourcc.to_u32(),
                field: V4L2_FIELD_ANY,
                ..Default::default()
            };
        }
        // SAFETY: valid fd and in/out struct; the driver writes back the
        // adjusted format.
        unsafe { vidioc_s_fmt(self.raw(), &mut fmt) }?;
        Ok(pixel_format(&fmt))
    }

    fn format(&self, buf_type: BufType) -> io::Result<PixelFormat> {
        let mut fmt = v4l2_format {
            type_: buf_type.raw(),
            ..Default::default()
        };
        // SAFETY: valid fd and in/out struct.
        unsafe { vidioc_g_fmt(self.raw(), &mut fmt) }?;
        Ok(pixel_format(&fmt))
    }

    fn set_stream_params(&self, buf_type: BufType, params: &StreamParams) -> io::Result<()> {
        let mut parm = v4l2_streamparm {
            type_: buf_type.raw(),
            ..Default::default()
        };
        parm.parm.capture = v4l2_captureparm {
            capturemode: params.capture_mode,
            timeperframe: v4l2_fract {
                numerator: params.time_per_frame.numerator,
                denominator: params.time_per_frame.denominator,
            },
            ..Default::default()
        };
        // SAFETY: valid fd and in/out struct.
        unsafe { vidioc_s_parm(self.raw(), &mut parm) }?;
        Ok(())
    }

    fn stream_params(&self, buf_type: BufType) -> io::Result<StreamParams> {
        let mut parm = v4l2_streamparm {
            type_: buf_type.raw(),
            ..Default::default()
        };
        // SAFETY: valid fd and in/out struct.
        unsafe { vidioc_g_parm(self.raw(), &mut parm) }?;
        // SAFETY: capture member for capture buffer types.
        let capture = unsafe { parm.parm.capture };
        Ok(StreamParams {
            capture_mode: capture.capturemode,
            time_per_frame: Fraction::new(
                capture.timeperframe.numerator,
                capture.timeperframe.denominator,
            ),
            frame_interval_supported: capture.capability & V4L2_CAP_TIMEPERFRAME != 0,
        })
    }

    fn request_buffers(&self, buf_type: BufType, count: u32) -> io::Result<u32> {
        let mut req = v4l2_requestbuffers {
            count,
            type_: buf_type.raw(),
            memory: V4L2_MEMORY_MMAP,
            ..Default::default()
        };
        // SAFETY: valid fd and in/out struct.
        unsafe { vidioc_reqbufs(self.raw(), &mut req) }?;
        Ok(req.count)
    }

    fn query_buffer(
        &self,
        buf_type: BufType,
        index: u32,
        num_planes: u8,
    ) -> io::Result<BufferInfo> {
        let mut planes = [v4l2_plane::default(); MAX_PLANES];
        let mut buf = buffer(buf_type, &mut planes, num_planes);
        buf.index = index;
        // SAFETY: valid fd; for multi-planar buffers `m.planes` points at a
        // live array of `length` planes.
        unsafe { vidioc_querybuf(self.raw(), &mut buf) }?;
        let planes = if buf_type.is_multiplanar() {
            planes[..(buf.length as usize).min(MAX_PLANES)]
                .iter()
                .map(|p| PlaneInfo {
                    length: p.length,
                    // SAFETY: MMAP planes report their offset in `mem_offset`.
                    offset: unsafe { p.m.mem_offset },
                })
                .collect()
        } else {
            vec![PlaneInfo {
                length: buf.length,
                // SAFETY: MMAP buffers report their offset in `offset`.
                offset: unsafe { buf.m.offset },
            }]
        };
        Ok(BufferInfo { index, planes })
    }

    fn map_plane(&self, plane: &PlaneInfo) -> io::Result<MappedPlane> {
        let len = plane.length as usize;
        // SAFETY: mapping a driver provided offset of our own fd; the result
        // is checked before use.
        let ptr = unsafe {
            libc::mmap(
                null_mut(),
                len,
                libc::PROT_READ,
                libc::MAP_SHARED,
                self.raw(),
                plane.offset as libc::off_t,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `ptr` is a fresh mapping of `len` bytes owned by nobody else.
        unsafe { MappedPlane::from_raw(ptr.cast(), len) }
            .ok_or_else(|| io::Error::other("mmap returned a null mapping"))
    }

    fn queue_buffer(&self, buf_type: BufType, index: u32, num_planes: u8) -> io::Result<()> {
        let mut planes = [v4l2_plane::default(); MAX_PLANES];
        let mut buf = buffer(buf_type, &mut planes, num_planes);
        buf.index = index;
        // SAFETY: valid fd; plane array outlives the call.
        unsafe { vidioc_qbuf(self.raw(), &mut buf) }?;
        Ok(())
    }

    fn dequeue_buffer(&self, buf_type: BufType, num_planes: u8) -> io::Result<Dequeued> {
        let mut planes = [v4l2_plane::default(); MAX_PLANES];
        let mut buf = buffer(buf_type, &mut planes, num_planes);
        // SAFETY: valid fd; plane array outlives the call.
        unsafe { vidioc_dqbuf(self.raw(), &mut buf) }?;
        let mut bytes_used = [0u32; MAX_PLANES];
        if buf_type.is_multiplanar() {
            let n = (buf.length as usize).min(MAX_PLANES);
            for (dst, src) in bytes_used.iter_mut().zip(&planes[..n]) {
                *dst = src.bytesused;
            }
        } else {
            bytes_used[0] = buf.bytesused;
        }
        Ok(Dequeued {
            index: buf.index,
            sequence: buf.sequence,
            timestamp: Duration::new(
                buf.timestamp.tv_sec.max(0) as u64,
                (buf.timestamp.tv_usec.max(0) as u32).saturating_mul(1000),
            ),
            flags: buf.flags,
            bytes_used,
        })
    }

    fn stream_on(&self, buf_type: BufType) -> io::Result<()> {
        let kind = buf_type.raw() as libc::c_int;
        // SAFETY: valid fd and input pointer.
        unsafe { vidioc_streamon(self.raw(), &kind) }?;
        Ok(())
    }

    fn stream_off(&self, buf_type: BufType) -> io::Result<()> {
        let kind = buf_type.raw() as libc::c_int;
        // SAFETY: valid fd and input pointer.
        unsafe { vidioc_streamoff(self.raw(), &kind) }?;
        Ok(())
    }

    fn poll_readable(&self, timeout: Duration) -> io::Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.raw(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
        // SAFETY: one valid pollfd.
        let ret = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        if ret == 0 {
            return Ok(false);
        }
        if pfd.revents & libc::POLLNVAL != 0 {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }
        if pfd.revents & (libc::POLLERR | libc::POLLHUP) != 0 {
            return Err(io::Error::from_raw_os_error(libc::EIO));
        }
        Ok(pfd.revents & libc::POLLIN != 0)
    }
}
