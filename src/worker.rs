// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Push model: a dedicated thread owns the session and publishes frames.
//!
//! The worker waits for the device with a bounded poll, dequeues one frame
//! per wake-up and sends a [`FrameEvent`] over a bounded channel. Converted
//! frames are written into one of two scratch buffers that strictly
//! alternate, so a consumer has one full frame interval to read a frame
//! before its buffer comes around again. When the queue is full the oldest
//! event is evicted, so a consumer that falls behind resumes with the most
//! recent frames. A consumer that still holds a buffer when it is due for
//! reuse loses the new frame instead of having its data overwritten.
//!
//! Stopping is two-phase. [`CaptureWorker::stop`] clears the streaming flag,
//! which the worker checks at the top of every iteration before turning
//! streaming off; it takes effect within one poll timeout.
//! [`CaptureWorker::shutdown`] then asks the thread to exit and joins it with
//! a bounded wait, returning the session.

use crate::{
    capture::{Frame, FrameInfo},
    config::CaptureConfig,
    device::{Device, V4l2Device},
    error::{Error, Result},
    session::CaptureSession,
};
use kanal::{Receiver, Sender};
use std::{
    ops::Deref,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tracing::{debug, error, info, info_span, trace, warn};

/// Converted RGB24 frame shared with the consumer.
///
/// Holding it keeps the scratch buffer out of rotation; drop it within a
/// frame interval.
#[derive(Clone)]
pub struct RgbFrame(Arc<Vec<u8>>);

impl RgbFrame {
    pub fn as_ptr(&self) -> *const u8 {
        self.0.as_ptr()
    }
}

impl Deref for RgbFrame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for RgbFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for RgbFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RgbFrame({:p}, {})", self.0.as_ptr(), self.0.len())
    }
}

/// One captured frame as published by the worker.
#[derive(Clone, Debug)]
pub struct FrameEvent {
    pub info: FrameInfo,
    /// Present when the session converts frames.
    pub rgb: Option<RgbFrame>,
}

#[derive(Clone, Debug)]
pub struct WorkerOptions {
    /// Bound on each readiness wait. Also the latency of `stop`.
    pub poll_timeout: Duration,
    /// Bound on the join in `shutdown`.
    pub join_timeout: Duration,
    /// Bound on waiting for the reply to start and reconfigure.
    pub command_timeout: Duration,
    pub queue_depth: usize,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(1),
            join_timeout: Duration::from_secs(3),
            command_timeout: Duration::from_secs(10),
            queue_depth: 2,
        }
    }
}

impl WorkerOptions {
    /// Options using the session's readiness timeout.
    pub fn for_config(config: &CaptureConfig) -> Self {
        Self {
            poll_timeout: config.poll_timeout,
            ..Default::default()
        }
    }
}

/// Callback given zero-copy access to each raw frame on the worker thread.
pub type RawCallback = Box<dyn FnMut(&Frame) + Send>;

enum Command {
    Start(Sender<Result<()>>),
    Stop,
    Reconfigure(Box<CaptureConfig>, Sender<Result<()>>),
    Shutdown,
}

/// Handle to a capture thread that owns a [`CaptureSession`].
pub struct CaptureWorker<D: Device = V4l2Device> {
    commands: Sender<Command>,
    frames: Receiver<FrameEvent>,
    streaming: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<String>>>,
    handle: Option<JoinHandle<CaptureSession<D>>>,
    options: WorkerOptions,
}

impl<D: Device> CaptureWorker<D> {
    /// Moves `session` onto a new capture thread. The session should be
    /// configured; it keeps streaming if it already is.
    pub fn spawn(session: CaptureSession<D>, options: WorkerOptions) -> Result<Self> {
        Self::spawn_inner(session, options, None)
    }

    /// Like [`spawn`](Self::spawn), also calling `on_raw` for every frame
    /// while its buffer is dequeued.
    pub fn spawn_with_raw<F>(
        session: CaptureSession<D>,
        options: WorkerOptions,
        on_raw: F,
    ) -> Result<Self>
    where
        F: FnMut(&Frame) + Send + 'static,
    {
        Self::spawn_inner(session, options, Some(Box::new(on_raw)))
    }

    fn spawn_inner(
        session: CaptureSession<D>,
        options: WorkerOptions,
        raw: Option<RawCallback>,
    ) -> Result<Self> {
        let (commands, command_rx) = kanal::bounded(8);
        let (frame_tx, frames) = kanal::bounded(options.queue_depth.max(1));
        let streaming = Arc::new(AtomicBool::new(session.is_streaming()));
        let last_error = Arc::new(Mutex::new(None));

        let mut worker = Worker {
            session,
            commands: command_rx,
            frames: frame_tx,
            stale: frames.clone(),
            streaming: streaming.clone(),
            last_error: last_error.clone(),
            poll_timeout: options.poll_timeout,
            raw,
            scratch: [Arc::new(Vec::new()), Arc::new(Vec::new())],
            next: 0,
        };
        let handle = thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || {
                let _span = info_span!("capture_worker").entered();
                worker.run();
                worker.session
            })
            .map_err(|e| Error::Worker(format!("failed to spawn capture thread: {e}")))?;

        Ok(Self {
            commands,
            frames,
            streaming,
            last_error,
            handle: Some(handle),
            options,
        })
    }

    /// Starts streaming and waits for the worker to confirm.
    pub fn start(&self) -> Result<()> {
        let (tx, rx) = kanal::bounded(1);
        self.send(Command::Start(tx))?;
        self.reply(rx)
    }

    /// Phase one of stopping: clears the streaming flag. The worker turns
    /// streaming off at its next iteration, within one poll timeout.
    pub fn stop(&self) {
        self.streaming.store(false, Ordering::SeqCst);
        match self.commands.try_send(Command::Stop) {
            Ok(true) => {}
            Ok(false) => debug!("command queue full, worker stops on its flag"),
            Err(err) => debug!("stop not delivered to capture worker: {:?}", err),
        }
    }

    /// Applies a new configuration on the worker. Streaming resumes if it was
    /// running before.
    pub fn reconfigure(&self, config: CaptureConfig) -> Result<()> {
        let (tx, rx) = kanal::bounded(1);
        self.send(Command::Reconfigure(Box::new(config), tx))?;
        self.reply(rx)
    }

    /// Published frames. Use `frames().as_async()` from async code.
    pub fn frames(&self) -> &Receiver<FrameEvent> {
        &self.frames
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    /// Failure that last stopped the capture loop.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }

    /// Phase two of stopping: tells the worker to exit, joins it and returns
    /// the session for pull-model use or reconfiguration.
    ///
    /// If the thread does not finish within the join timeout it is detached
    /// and an error is returned. Threads cannot be killed safely, so the
    /// detached thread exits on its own once its current ioctl returns.
    pub fn shutdown(mut self) -> Result<CaptureSession<D>> {
        self.join()
    }

    fn join(&mut self) -> Result<CaptureSession<D>> {
        let Some(handle) = self.handle.take() else {
            return Err(Error::Worker("capture worker already joined".into()));
        };
        self.streaming.store(false, Ordering::SeqCst);
        match self.commands.try_send(Command::Shutdown) {
            Ok(true) => {}
            Ok(false) => warn!("command queue full, shutdown not delivered"),
            Err(_) => debug!("capture worker already gone"),
        }

        let deadline = Instant::now() + self.options.join_timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                error!(
                    "capture worker did not exit within {:?}, detaching",
                    self.options.join_timeout
                );
                drop(handle);
                return Err(Error::Worker(format!(
                    "worker did not exit within {:?}",
                    self.options.join_timeout
                )));
            }
            thread::sleep(Duration::from_millis(5));
        }
        handle
            .join()
            .map_err(|_| Error::Worker("capture worker panicked".into()))
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::Worker("capture worker has exited".into()))
    }

    fn reply(&self, rx: Receiver<Result<()>>) -> Result<()> {
        rx.recv_timeout(self.options.command_timeout)
            .map_err(|e| Error::Worker(format!("no reply from capture worker: {e:?}")))?
    }
}

impl<D: Device> Drop for CaptureWorker<D> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(err) = self.join() {
                warn!("capture worker shutdown: {}", err);
            }
        }
    }
}

struct Worker<D: Device> {
    session: CaptureSession<D>,
    commands: Receiver<Command>,
    frames: Sender<FrameEvent>,
    /// Worker side of the frame queue, used to evict the oldest event.
    stale: Receiver<FrameEvent>,
    streaming: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<String>>>,
    poll_timeout: Duration,
    raw: Option<RawCallback>,
    scratch: [Arc<Vec<u8>>; 2],
    next: usize,
}

enum Flow {
    Continue,
    Exit,
}

impl<D: Device> Worker<D> {
    fn run(&mut self) {
        debug!("capture worker running");
        loop {
            if !self.streaming.load(Ordering::SeqCst) {
                if self.session.is_streaming() {
                    self.stop_session();
                }
                // idle until told otherwise
                let Ok(command) = self.commands.recv() else {
                    break;
                };
                match self.handle(command) {
                    Flow::Continue => continue,
                    Flow::Exit => break,
                }
            }

            match self.commands.try_recv() {
                Ok(Some(command)) => {
                    if let Flow::Exit = self.handle(command) {
                        break;
                    }
                    continue;
                }
                Ok(None) => {}
                Err(_) => break,
            }

            match self.session.wait_readable(self.poll_timeout) {
                Ok(()) => self.capture_one(),
                Err(Error::Timeout(t)) => debug!("no frame within {:?}", t),
                Err(err) if err.is_transient() => trace!("readiness wait: {}", err),
                Err(err) => self.fail(err),
            }
        }
        if self.session.is_streaming() {
            self.stop_session();
        }
        debug!("capture worker exiting");
    }

    fn handle(&mut self, command: Command) -> Flow {
        match command {
            Command::Start(reply) => {
                let res = self.session.start();
                if res.is_ok() {
                    self.streaming.store(true, Ordering::SeqCst);
                    if let Ok(mut last) = self.last_error.lock() {
                        *last = None;
                    }
                }
                let _ = reply.send(res);
            }
            Command::Stop => {
                self.streaming.store(false, Ordering::SeqCst);
                self.stop_session();
            }
            Command::Reconfigure(config, reply) => {
                let resume = self.session.is_streaming();
                self.streaming.store(false, Ordering::SeqCst);
                self.stop_session();
                let mut res = self.session.reconfigure(*config);
                if res.is_ok() && resume {
                    res = self.session.start();
                    self.streaming.store(res.is_ok(), Ordering::SeqCst);
                }
                let _ = reply.send(res);
            }
            Command::Shutdown => return Flow::Exit,
        }
        Flow::Continue
    }

    fn stop_session(&mut self) {
        if let Err(err) = self.session.stop() {
            warn!("stream off failed: {}", err);
        }
    }

    /// Ends capture after a non-transient failure, leaving the worker idle
    /// and the error readable through `last_error`.
    fn fail(&mut self, err: Error) {
        error!("capture stopped: {}", err);
        self.streaming.store(false, Ordering::SeqCst);
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some(err.to_string());
        }
        if let Err(stop_err) = self.session.stop() {
            debug!("stream off after failure: {}", stop_err);
            self.session.close();
        }
    }

    fn capture_one(&mut self) {
        let convert = self.session.config().convert;
        let size = self
            .session
            .format()
            .map(|f| f.rgb24_size())
            .unwrap_or_default();
        if convert {
            // Queued events alternate scratch buffers, so with two or more
            // waiting the oldest one holds the buffer due next.
            while Arc::strong_count(&self.scratch[self.next]) > 1 && self.stale.len() >= 2 {
                if !self.evict_oldest() {
                    break;
                }
            }
        }
        let raw = &mut self.raw;
        let slot = Arc::get_mut(&mut self.scratch[self.next]);

        let res = match (convert, slot) {
            (true, Some(rgb)) => {
                rgb.resize(size, 0);
                self.session
                    .dequeue_with(|frame| {
                        if let Some(cb) = raw.as_mut() {
                            cb(frame);
                        }
                        frame.to_rgb24(rgb).map(|_| (frame.info(), true))
                    })
                    .and_then(|r| r)
            }
            (convert, _) => self.session.dequeue_with(|frame| {
                if let Some(cb) = raw.as_mut() {
                    cb(frame);
                }
                if convert {
                    trace!("consumer still holds scratch {}", self.next);
                }
                (frame.info(), false)
            }),
        };

        let (info, converted) = match res {
            Ok(v) => v,
            Err(err) if err.is_transient() => {
                trace!("dequeue: {}", err);
                return;
            }
            Err(err) => return self.fail(err),
        };

        let rgb = if converted {
            let rgb = RgbFrame(self.scratch[self.next].clone());
            self.next ^= 1;
            Some(rgb)
        } else if convert {
            debug!("dropped frame {}: consumer is behind", info.sequence);
            return;
        } else {
            None
        };

        if self.frames.is_full() {
            self.evict_oldest();
        }
        match self.frames.try_send(FrameEvent { info, rgb }) {
            Ok(true) => {}
            Ok(false) => trace!("frame queue full, dropped frame {}", info.sequence),
            Err(_) => {
                info!("frame receiver closed");
                self.streaming.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Drops the oldest queued event so the consumer sees recent frames.
    fn evict_oldest(&self) -> bool {
        match self.stale.try_recv() {
            Ok(Some(event)) => {
                trace!("evicted stale frame {}", event.info.sequence);
                true
            }
            _ => false,
        }
    }
}
