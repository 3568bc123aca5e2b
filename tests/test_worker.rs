// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod common;

use common::{config, errno, init_tracing, session, MockDevice};
use edgefirst_preview::{
    format::{NV12, YUYV},
    session::{CaptureSession, SessionState},
    worker::{CaptureWorker, FrameEvent, WorkerOptions},
    Error,
};
use serial_test::serial;
use std::{
    error::Error as StdError,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

const WAIT: Duration = Duration::from_secs(5);

fn options() -> WorkerOptions {
    WorkerOptions {
        poll_timeout: Duration::from_millis(20),
        ..Default::default()
    }
}

fn small_session(dev: &MockDevice) -> Result<CaptureSession<MockDevice>, Box<dyn StdError>> {
    let mut session = session(dev, config(YUYV, 64, 32));
    session.configure()?;
    Ok(session)
}

fn next_event(worker: &CaptureWorker<MockDevice>) -> Result<FrameEvent, Box<dyn StdError>> {
    worker
        .frames()
        .recv_timeout(WAIT)
        .map_err(|e| format!("no frame from worker: {e:?}").into())
}

fn wait_until(what: &str, mut done: impl FnMut() -> bool) -> Result<(), Box<dyn StdError>> {
    let deadline = Instant::now() + WAIT;
    while !done() {
        if Instant::now() > deadline {
            return Err(format!("timed out waiting for {what}").into());
        }
        thread::sleep(Duration::from_millis(5));
    }
    Ok(())
}

#[test]
#[serial]
fn test_scratch_buffers_alternate() -> Result<(), Box<dyn StdError>> {
    init_tracing();
    let dev = MockDevice::new();
    let worker = CaptureWorker::spawn(small_session(&dev)?, options())?;
    worker.start()?;
    assert!(worker.is_streaming());

    let mut seen = Vec::new();
    for _ in 0..8 {
        let event = next_event(&worker)?;
        let rgb = event.rgb.as_ref().ok_or("frame was not converted")?;
        assert_eq!(rgb.len(), 64 * 32 * 3);
        seen.push((event.info.sequence, rgb.as_ptr()));
        // release the scratch buffer before asking for more
        drop(event);
    }
    let mut addresses: Vec<_> = seen.iter().map(|(_, at)| *at).collect();
    addresses.sort();
    addresses.dedup();
    assert_eq!(addresses.len(), 2);
    for pair in seen.windows(2) {
        if pair[1].0 == pair[0].0 + 1 {
            assert_ne!(pair[0].1, pair[1].1, "back to back frames share a buffer");
        }
    }

    worker.stop();
    let session = worker.shutdown()?;
    assert_eq!(session.state(), SessionState::Configured);
    assert!(dev.state().count("STREAMOFF") >= 1);
    Ok(())
}

#[test]
#[serial]
fn test_held_frame_is_not_overwritten() -> Result<(), Box<dyn StdError>> {
    init_tracing();
    let dev = MockDevice::new();
    dev.state().frame = vec![vec![128; 64 * 32 * 2]];
    let worker = CaptureWorker::spawn(small_session(&dev)?, options())?;
    worker.start()?;

    let held = next_event(&worker)?;
    let held_rgb = held.rgb.clone().ok_or("frame was not converted")?;
    let held_at = held_rgb.as_ptr() as usize;
    dev.state().frame = vec![vec![0; 64 * 32 * 2]];

    let other = next_event(&worker)?;
    let other_at = other.rgb.as_ref().ok_or("frame was not converted")?.as_ptr() as usize;
    assert_ne!(other_at, held_at);
    drop(other);

    // the worker keeps dequeuing while the first buffer is held
    thread::sleep(Duration::from_millis(50));
    assert!(held_rgb.iter().all(|&c| c == 128));

    drop(held);
    drop(held_rgb);
    let reused = next_event(&worker)?;
    let reused_at = reused.rgb.as_ref().ok_or("frame was not converted")?.as_ptr() as usize;
    assert_eq!(reused_at, held_at);

    worker.stop();
    worker.shutdown()?;
    Ok(())
}

#[test]
#[serial]
fn test_slow_consumer_gets_recent_frames() -> Result<(), Box<dyn StdError>> {
    init_tracing();
    let dev = MockDevice::new();
    let worker = CaptureWorker::spawn(small_session(&dev)?, options())?;
    worker.start()?;

    thread::sleep(Duration::from_millis(500));
    let latest = dev.state().sequence;
    assert!(latest > 50, "only {latest} frames captured");

    let first = next_event(&worker)?;
    let second = next_event(&worker)?;
    println!(
        "driver at {} delivered {} then {}",
        latest, first.info.sequence, second.info.sequence
    );
    assert!(first.info.sequence + 10 >= latest);
    assert!(second.info.sequence > first.info.sequence);
    assert!(first.rgb.is_some() && second.rgb.is_some());
    drop((first, second));

    worker.stop();
    worker.shutdown()?;
    Ok(())
}

#[test]
#[serial]
fn test_interrupted_wait_is_retried() -> Result<(), Box<dyn StdError>> {
    init_tracing();
    let dev = MockDevice::new();
    for _ in 0..3 {
        dev.state().poll_script.push_back(Err(errno(libc::EINTR)));
    }
    dev.state().poll_script.push_back(Ok(false));

    let worker = CaptureWorker::spawn(small_session(&dev)?, options())?;
    worker.start()?;
    let event = next_event(&worker)?;
    assert_eq!(event.info.fourcc, YUYV);
    assert!(worker.is_streaming());
    assert!(worker.last_error().is_none());

    worker.stop();
    worker.shutdown()?;
    Ok(())
}

#[test]
#[serial]
fn test_device_loss_stops_worker() -> Result<(), Box<dyn StdError>> {
    init_tracing();
    let dev = MockDevice::new();
    let worker = CaptureWorker::spawn(small_session(&dev)?, options())?;
    worker.start()?;
    next_event(&worker)?;

    dev.state().lost = true;
    wait_until("worker to stop", || !worker.is_streaming())?;
    let reason = worker.last_error().ok_or("no error recorded")?;
    println!("worker stopped: {reason}");

    let session = worker.shutdown()?;
    assert_eq!(session.state(), SessionState::Closed);
    Ok(())
}

#[test]
#[serial]
fn test_raw_callback_without_conversion() -> Result<(), Box<dyn StdError>> {
    init_tracing();
    let dev = MockDevice::new();
    let mut cfg = config(YUYV, 64, 32);
    cfg.convert = false;
    let mut session = session(&dev, cfg);
    session.configure()?;

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let worker = CaptureWorker::spawn_with_raw(session, options(), move |frame| {
        assert_eq!(frame.planes().len(), 1);
        assert_eq!(frame.planes()[0].len(), 64 * 32 * 2);
        counter.fetch_add(1, Ordering::SeqCst);
    })?;
    worker.start()?;

    for _ in 0..3 {
        let event = next_event(&worker)?;
        assert!(event.rgb.is_none());
    }
    assert!(seen.load(Ordering::SeqCst) >= 3);

    worker.stop();
    worker.shutdown()?;
    Ok(())
}

#[test]
#[serial]
fn test_reconfigure_resumes_streaming() -> Result<(), Box<dyn StdError>> {
    init_tracing();
    let dev = MockDevice::new();
    let worker = CaptureWorker::spawn(small_session(&dev)?, options())?;
    worker.start()?;
    next_event(&worker)?;

    worker.reconfigure(config(NV12, 32, 16))?;
    assert!(worker.is_streaming());
    assert_eq!(dev.state().opens, 2);

    let mut converted = None;
    for _ in 0..10 {
        let event = next_event(&worker)?;
        if event.info.fourcc == NV12 {
            converted = event.rgb.map(|rgb| rgb.len());
            break;
        }
    }
    assert_eq!(converted, Some(32 * 16 * 3));

    worker.stop();
    worker.shutdown()?;
    Ok(())
}

#[test]
#[serial]
fn test_start_failure_is_returned() -> Result<(), Box<dyn StdError>> {
    let dev = MockDevice::new();
    // never configured
    let worker = CaptureWorker::spawn(session(&dev, config(YUYV, 64, 32)), options())?;
    match worker.start() {
        Err(Error::InvalidState { state, .. }) => assert_eq!(state, SessionState::Closed),
        other => panic!("expected InvalidState, got {other:?}"),
    }
    assert!(!worker.is_streaming());

    let session = worker.shutdown()?;
    assert_eq!(session.state(), SessionState::Closed);
    Ok(())
}

#[test]
#[serial]
fn test_stop_then_restart() -> Result<(), Box<dyn StdError>> {
    init_tracing();
    let dev = MockDevice::new();
    let worker = CaptureWorker::spawn(small_session(&dev)?, options())?;
    worker.start()?;
    next_event(&worker)?;

    worker.stop();
    assert!(!worker.is_streaming());
    wait_until("stream off", || !dev.state().streaming)?;
    while let Ok(Some(_)) = worker.frames().try_recv() {}

    worker.start()?;
    next_event(&worker)?;
    assert_eq!(dev.state().count("STREAMON"), 2);

    worker.stop();
    worker.shutdown()?;
    Ok(())
}

#[test]
#[serial]
fn test_drop_joins_and_closes() -> Result<(), Box<dyn StdError>> {
    let dev = MockDevice::new();
    let worker = CaptureWorker::spawn(small_session(&dev)?, options())?;
    worker.start()?;
    next_event(&worker)?;

    drop(worker);
    let state = dev.state();
    assert!(!state.streaming);
    assert_eq!(state.reqbufs.last(), Some(&0));
    Ok(())
}
