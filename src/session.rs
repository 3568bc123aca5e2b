// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    adjust::ColorAdjuster,
    buffer::BufferPool,
    capture::{CaptureEngine, Frame, FrameInfo},
    config::{CaptureConfig, MIN_BUFFER_COUNT},
    device::{
        BufType, Capability, Device, FormatDesc, Fraction, FrameSize, InputDesc, StreamParams,
        V4l2Device,
    },
    error::{Error, Result},
    format::{FourCC, PixelFormat},
};
use std::{io, mem, path::Path, time::Duration};
use tracing::{debug, info, instrument, warn};

/// Lifecycle of a capture session.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No device handle.
    Closed,
    /// Handle open and capability checked, no buffers.
    Opened,
    /// Format negotiated and buffers mapped.
    Configured,
    Streaming,
}

/// Factory used to (re)open the device node.
pub type Opener<D> = Box<dyn Fn(&Path, bool) -> io::Result<D> + Send>;

/// A V4L2 capture device together with its negotiated format, mapped buffer
/// pool and streaming state.
///
/// The session is the pull model: the owning thread calls one of the
/// `dequeue` methods whenever it wants a frame. Moving the session into a
/// [`CaptureWorker`](crate::worker::CaptureWorker) switches it to the push
/// model; the worker hands it back on shutdown, so both models can never
/// touch the device at the same time.
///
/// # Example
///
/// ```no_run
/// use edgefirst_preview::{config::CaptureConfig, format::YUYV, session::CaptureSession};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = CaptureConfig::new("/dev/video0", YUYV, 1280, 720);
/// let mut session = CaptureSession::new(config)?;
/// session.configure()?;
/// session.start()?;
/// let (info, rgb) = session.dequeue_converted()?;
/// println!("{} -> {} RGB bytes", info, rgb.len());
/// session.stop()?;
/// # Ok(())
/// # }
/// ```
pub struct CaptureSession<D: Device = V4l2Device> {
    config: CaptureConfig,
    opener: Opener<D>,
    dev: Option<D>,
    capability: Option<Capability>,
    buf_type: BufType,
    requested: Option<PixelFormat>,
    format: Option<PixelFormat>,
    frame_rate: Option<(u32, u32)>,
    pool: Option<BufferPool>,
    engine: CaptureEngine,
    adjuster: Option<ColorAdjuster>,
    scratch: Vec<u8>,
    stopped: bool,
}

impl CaptureSession<V4l2Device> {
    /// Creates a closed session for a V4L2 device node.
    pub fn new(config: CaptureConfig) -> Result<Self> {
        Self::with_opener(config, |path, nonblocking| V4l2Device::open(path, nonblocking))
    }
}

impl<D: Device> CaptureSession<D> {
    /// Creates a closed session that opens its device through `opener`.
    pub fn with_opener<F>(config: CaptureConfig, opener: F) -> Result<Self>
    where
        F: Fn(&Path, bool) -> io::Result<D> + Send + 'static,
    {
        config.validate()?;
        let adjuster = adjuster_for(&config)?;
        Ok(Self {
            config,
            opener: Box::new(opener),
            dev: None,
            capability: None,
            buf_type: BufType::VideoCapture,
            requested: None,
            format: None,
            frame_rate: None,
            pool: None,
            engine: CaptureEngine::new(),
            adjuster,
            scratch: Vec::new(),
            stopped: false,
        })
    }

    pub fn state(&self) -> SessionState {
        if self.dev.is_none() {
            SessionState::Closed
        } else if self.engine.is_streaming() {
            SessionState::Streaming
        } else if self.pool.is_some() {
            SessionState::Configured
        } else {
            SessionState::Opened
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.state() == SessionState::Streaming
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn capability(&self) -> Option<&Capability> {
        self.capability.as_ref()
    }

    pub fn buf_type(&self) -> BufType {
        self.buf_type
    }

    /// Format read back from the driver after negotiation.
    pub fn format(&self) -> Option<&PixelFormat> {
        self.format.as_ref()
    }

    pub fn pool(&self) -> Option<&BufferPool> {
        self.pool.as_ref()
    }

    pub fn engine(&self) -> &CaptureEngine {
        &self.engine
    }

    pub fn adjuster(&self) -> Option<&ColorAdjuster> {
        self.adjuster.as_ref()
    }

    pub fn device(&self) -> Option<&D> {
        self.dev.as_ref()
    }

    fn device_in(&self, operation: &'static str, allowed: &[SessionState]) -> Result<&D> {
        let state = self.state();
        match self.dev.as_ref() {
            Some(dev) if allowed.contains(&state) => Ok(dev),
            _ => Err(Error::InvalidState { operation, state }),
        }
    }

    /// Opens the device node and checks it can stream video capture.
    ///
    /// Does nothing if the session is already open.
    #[instrument(skip(self), fields(device = %self.config.device.display()))]
    pub fn open(&mut self) -> Result<()> {
        if self.dev.is_some() {
            return Ok(());
        }
        let path = self.config.device.as_path();
        let dev = (self.opener)(path, self.config.nonblocking).map_err(|source| {
            Error::DeviceUnavailable {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let capability = dev
            .query_capability()
            .map_err(Error::ioctl("VIDIOC_QUERYCAP"))?;
        let buf_type = capability.buf_type().ok_or_else(|| {
            Error::Unsupported(format!("{} is not a video capture device", capability.card))
        })?;
        if !capability.supports_streaming() {
            let io = if capability.supports_read() {
                "read() I/O only"
            } else {
                "no streaming I/O"
            };
            return Err(Error::Unsupported(format!("{} supports {}", capability.card, io)));
        }
        if let Some(index) = self.config.input {
            let applied = dev
                .set_input(index)
                .map_err(Error::ioctl("VIDIOC_S_INPUT"))?;
            debug!("selected input {}", applied);
        }

        info!("opened {} using {:?}", capability, buf_type);
        self.buf_type = buf_type;
        self.capability = Some(capability);
        self.dev = Some(dev);
        Ok(())
    }

    /// Stops streaming, unmaps and releases the buffers and closes the
    /// handle. Safe to call in any state.
    pub fn close(&mut self) {
        let Some(dev) = self.dev.take() else {
            return;
        };
        if let Some(pool) = self.pool.as_mut() {
            if let Err(err) = self.engine.stop(&dev, pool) {
                warn!("stream off during close: {}", err);
            }
            pool.release(&dev);
        }
        self.engine.abandon();
        self.pool = None;
        self.capability = None;
        drop(dev);
        debug!("closed {}", self.config.device.display());
    }

    pub fn query_std(&self) -> Result<u64> {
        self.device_in("query standard", &OPEN_STATES)?
            .query_std()
            .map_err(Error::ioctl("VIDIOC_QUERYSTD"))
    }

    pub fn inputs(&self) -> Result<Vec<InputDesc>> {
        self.device_in("enumerate inputs", &OPEN_STATES)?
            .enum_inputs()
            .map_err(Error::ioctl("VIDIOC_ENUMINPUT"))
    }

    pub fn formats(&self) -> Result<Vec<FormatDesc>> {
        self.device_in("enumerate formats", &OPEN_STATES)?
            .enum_formats(self.buf_type)
            .map_err(Error::ioctl("VIDIOC_ENUM_FMT"))
    }

    pub fn frame_sizes(&self, fourcc: FourCC) -> Result<Vec<FrameSize>> {
        self.device_in("enumerate frame sizes", &OPEN_STATES)?
            .enum_frame_sizes(fourcc)
            .map_err(Error::ioctl("VIDIOC_ENUM_FRAMESIZES"))
    }

    /// Logs everything the driver reports about the device. Failures are
    /// logged and skipped; nothing is changed.
    pub fn log_diagnostics(&self) {
        let Some(dev) = self.dev.as_ref() else {
            return;
        };
        if let Some(cap) = &self.capability {
            debug!("capability: {}", cap);
        }
        match dev.query_std() {
            Ok(std) => debug!("video standard: {:#x}", std),
            Err(err) => debug!("no video standard: {}", err),
        }
        match dev.enum_inputs() {
            Ok(inputs) => {
                for input in inputs {
                    debug!(
                        "input {}: {} type:{} status:{:#x}",
                        input.index, input.name, input.kind, input.status
                    );
                }
            }
            Err(err) => debug!("input enumeration failed: {}", err),
        }
        match dev.input() {
            Ok(index) => debug!("current input: {}", index),
            Err(err) => debug!("no current input: {}", err),
        }
        match dev.enum_formats(self.buf_type) {
            Ok(formats) => {
                for desc in formats {
                    debug!(
                        "format {}: {} {}{}",
                        desc.index,
                        desc.fourcc,
                        desc.description,
                        desc.flag_suffix()
                    );
                    if let Ok(sizes) = dev.enum_frame_sizes(desc.fourcc) {
                        for size in sizes {
                            debug!("  {}", size);
                        }
                    }
                }
            }
            Err(err) => debug!("format enumeration failed: {}", err),
        }
        match dev.format(self.buf_type) {
            Ok(format) => debug!("current format: {}", format),
            Err(err) => debug!("no current format: {}", err),
        }
        match dev.stream_params(self.buf_type) {
            Ok(params) => debug!(
                "capture mode:{} interval:{}/{}",
                params.capture_mode,
                params.time_per_frame.numerator,
                params.time_per_frame.denominator
            ),
            Err(err) => debug!("no stream parameters: {}", err),
        }
    }

    /// Selects a video input and returns the index the driver applied.
    pub fn set_input(&mut self, index: u32) -> Result<u32> {
        let applied = self
            .device_in("set input", &IDLE_STATES)?
            .set_input(index)
            .map_err(Error::ioctl("VIDIOC_S_INPUT"))?;
        self.config.input = Some(index);
        Ok(applied)
    }

    /// Sets the pixel format and reads back what the driver negotiated.
    ///
    /// Any mapped buffers are released first. The returned format is the one
    /// buffers are sized from; it may differ from the request unless the
    /// session is strict, in which case a difference is an error.
    #[instrument(skip(self))]
    pub fn negotiate_format(
        &mut self,
        fourcc: FourCC,
        width: u32,
        height: u32,
    ) -> Result<PixelFormat> {
        self.device_in("negotiate format", &IDLE_STATES)?;
        if fourcc.is_subsampled() && (width % 2 != 0 || height % 2 != 0) {
            return Err(Error::InvalidConfig(format!(
                "{fourcc} needs even dimensions, got {width}x{height}"
            )));
        }
        self.release_pool();

        let Some(dev) = self.dev.as_ref() else {
            return Err(Error::InvalidState {
                operation: "negotiate format",
                state: SessionState::Closed,
            });
        };
        let request = PixelFormat::new(fourcc, width, height);
        dev.set_format(self.buf_type, &request)
            .map_err(Error::ioctl("VIDIOC_S_FMT"))?;
        let negotiated = dev
            .format(self.buf_type)
            .map_err(Error::ioctl("VIDIOC_G_FMT"))?;
        self.requested = Some(request);

        if !negotiated.matches(&request) {
            if self.config.strict {
                self.format = None;
                return Err(Error::NegotiationMismatch {
                    requested: request.to_string(),
                    negotiated: negotiated.to_string(),
                });
            }
            warn!("requested {} but driver negotiated {}", request, negotiated);
        }
        info!("negotiated format {}", negotiated);
        self.format = Some(negotiated);
        Ok(negotiated)
    }

    /// Requests a capture mode and frame rate, returning the rate the driver
    /// actually applied. Drivers round to the nearest interval they support,
    /// so a different rate is not an error.
    #[instrument(skip(self))]
    pub fn negotiate_frame_rate(&mut self, capture_mode: u32, fps: u32) -> Result<Option<f64>> {
        if fps == 0 {
            return Err(Error::InvalidConfig("frame rate must be positive".into()));
        }
        let buf_type = self.buf_type;
        let dev = self.device_in("negotiate frame rate", &IDLE_STATES)?;
        let params = StreamParams {
            capture_mode,
            time_per_frame: Fraction::new(1, fps),
            ..Default::default()
        };
        dev.set_stream_params(buf_type, &params)
            .map_err(Error::ioctl("VIDIOC_S_PARM"))?;
        let applied = dev
            .stream_params(buf_type)
            .map_err(Error::ioctl("VIDIOC_G_PARM"))?;
        let achieved = applied.time_per_frame.fps();
        match achieved {
            Some(rate) if (rate - fps as f64).abs() > 0.01 => {
                info!("requested {} fps, driver applied {:.2} fps", fps, rate)
            }
            Some(rate) => debug!("frame rate {:.2} fps", rate),
            None => debug!("driver did not report a frame interval"),
        }
        self.frame_rate = Some((capture_mode, fps));
        Ok(achieved)
    }

    /// Requests and maps `count` buffers sized by the negotiated format.
    /// Returns the number of buffers granted.
    #[instrument(skip(self))]
    pub fn request_buffers(&mut self, count: u32) -> Result<usize> {
        self.device_in("request buffers", &IDLE_STATES)?;
        if count < MIN_BUFFER_COUNT {
            return Err(Error::InvalidConfig(format!(
                "at least {MIN_BUFFER_COUNT} buffers are required, got {count}"
            )));
        }
        let Some(format) = self.format else {
            return Err(Error::InvalidState {
                operation: "request buffers before negotiating a format",
                state: self.state(),
            });
        };
        self.release_pool();

        let Some(dev) = self.dev.as_ref() else {
            return Err(Error::InvalidState {
                operation: "request buffers",
                state: SessionState::Closed,
            });
        };
        let pool =
            BufferPool::request_and_map(dev, self.buf_type, count, format.num_planes.max(1))?;
        let granted = pool.len();
        self.pool = Some(pool);
        if self.config.convert {
            self.scratch.resize(format.rgb24_size(), 0);
        }
        Ok(granted)
    }

    fn release_pool(&mut self) {
        if let (Some(dev), Some(mut pool)) = (self.dev.as_ref(), self.pool.take()) {
            pool.release(dev);
        }
    }

    /// Runs the full initialisation from the configuration: open, report
    /// diagnostics, stream parameters, format and buffers.
    pub fn configure(&mut self) -> Result<()> {
        self.open()?;
        self.log_diagnostics();
        if let Some(fps) = self.config.fps {
            if let Err(err) = self.negotiate_frame_rate(self.config.capture_mode, fps) {
                warn!("frame rate not applied: {}", err);
            }
        }
        self.negotiate_format(self.config.fourcc, self.config.width, self.config.height)?;
        self.request_buffers(self.config.buffer_count)?;
        Ok(())
    }

    /// Replaces the configuration and re-runs [`configure`](Self::configure).
    /// The session is left Configured, not streaming.
    pub fn reconfigure(&mut self, config: CaptureConfig) -> Result<()> {
        config.validate()?;
        let adjuster = adjuster_for(&config)?;
        self.close();
        self.config = config;
        self.adjuster = adjuster;
        self.requested = None;
        self.format = None;
        self.frame_rate = None;
        self.stopped = false;
        self.configure()
    }

    /// Queues every buffer and turns streaming on.
    ///
    /// Fails without side effects unless the session is Configured. With
    /// `reset_on_restart`, a start following an earlier stop rebuilds the
    /// session first.
    pub fn start(&mut self) -> Result<()> {
        match self.state() {
            SessionState::Streaming => return Ok(()),
            SessionState::Configured => {}
            state => {
                return Err(Error::InvalidState {
                    operation: "start",
                    state,
                })
            }
        }
        if self.stopped && self.config.reset_on_restart {
            debug!("resetting device before restart");
            self.reset()?;
        }
        let (Some(dev), Some(pool)) = (self.dev.as_ref(), self.pool.as_ref()) else {
            return Err(Error::InvalidState {
                operation: "start",
                state: self.state(),
            });
        };
        self.engine.start(dev, pool)?;
        info!("streaming started");
        Ok(())
    }

    /// Turns streaming off. Does nothing when not streaming.
    pub fn stop(&mut self) -> Result<()> {
        let (Some(dev), Some(pool)) = (self.dev.as_ref(), self.pool.as_ref()) else {
            return Ok(());
        };
        if !self.engine.is_streaming() {
            return Ok(());
        }
        self.engine.stop(dev, pool)?;
        self.stopped = true;
        info!("streaming stopped");
        Ok(())
    }

    /// Closes and reopens the device, reapplies the last frame rate and
    /// format and maps the same number of buffers again.
    ///
    /// Some drivers deliver corrupted frames after a stop/start cycle; a full
    /// reset is the only reliable recovery.
    #[instrument(skip(self))]
    pub fn reset(&mut self) -> Result<()> {
        let Some(request) = self.requested else {
            return Err(Error::InvalidState {
                operation: "reset before negotiating a format",
                state: self.state(),
            });
        };
        let count = match self.pool.as_ref() {
            Some(pool) if !pool.is_empty() => pool.len() as u32,
            _ => self.config.buffer_count,
        };
        self.close();
        self.open()?;
        if let Some((capture_mode, fps)) = self.frame_rate {
            if let Err(err) = self.negotiate_frame_rate(capture_mode, fps) {
                warn!("frame rate not reapplied: {}", err);
            }
        }
        self.negotiate_format(request.fourcc, request.width, request.height)?;
        self.request_buffers(count)?;
        self.stopped = false;
        info!("device reset");
        Ok(())
    }

    /// Dequeues one frame and gives `f` zero-copy access to it. The buffer is
    /// re-queued before this returns.
    pub fn dequeue_with<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&Frame) -> R,
    {
        let state = self.state();
        let (Some(dev), Some(pool), Some(format), SessionState::Streaming) =
            (self.dev.as_ref(), self.pool.as_ref(), self.format.as_ref(), state)
        else {
            return Err(Error::InvalidState {
                operation: "dequeue",
                state,
            });
        };
        self.engine
            .dequeue(dev, pool, format, self.adjuster.as_ref(), f)
    }

    /// Dequeues one frame and converts it into `rgb`.
    pub fn dequeue_rgb(&mut self, rgb: &mut [u8]) -> Result<FrameInfo> {
        self.dequeue_with(|frame| frame.to_rgb24(rgb).map(|_| frame.info()))?
    }

    /// Dequeues one frame and converts it into the session's own RGB24
    /// buffer. The slice is valid until the next call.
    pub fn dequeue_converted(&mut self) -> Result<(FrameInfo, &[u8])> {
        let size = self.format.map(|f| f.rgb24_size()).unwrap_or_default();
        let mut scratch = mem::take(&mut self.scratch);
        scratch.resize(size, 0);
        let res = self.dequeue_with(|frame| frame.to_rgb24(&mut scratch).map(|_| frame.info()));
        self.scratch = scratch;
        let info = res??;
        Ok((info, self.scratch.as_slice()))
    }

    /// Dequeues and re-queues one frame without reading it.
    pub fn dequeue(&mut self) -> Result<FrameInfo> {
        self.dequeue_with(|frame| frame.info())
    }

    /// Waits up to `timeout` for a filled buffer, failing with
    /// [`Error::Timeout`] if none arrives.
    pub fn wait_readable(&self, timeout: Duration) -> Result<()> {
        let ready = self
            .device_in("wait for a frame", &[SessionState::Streaming])?
            .poll_readable(timeout)
            .map_err(Error::ioctl("poll"))?;
        if ready {
            Ok(())
        } else {
            Err(Error::Timeout(timeout))
        }
    }
}

impl<D: Device> Drop for CaptureSession<D> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<D: Device> std::fmt::Debug for CaptureSession<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("device", &self.config.device)
            .field("state", &self.state())
            .field("format", &self.format)
            .finish()
    }
}

const OPEN_STATES: [SessionState; 3] = [
    SessionState::Opened,
    SessionState::Configured,
    SessionState::Streaming,
];

const IDLE_STATES: [SessionState; 2] = [SessionState::Opened, SessionState::Configured];

fn adjuster_for(config: &CaptureConfig) -> Result<Option<ColorAdjuster>> {
    match config.adjust {
        Some(params) if !params.is_identity() => Ok(Some(ColorAdjuster::new(params)?)),
        _ => Ok(None),
    }
}
