// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;

use args::{Args, CaptureModel};
use clap::Parser;
use edgefirst_preview::{
    capture::FrameInfo,
    config::CaptureConfig,
    session::CaptureSession,
    snapshot::encode_jpeg,
    worker::{CaptureWorker, WorkerOptions},
};
use std::{
    error::Error,
    fs,
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tracing::{debug, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, Layer, Registry};

fn init_logging(args: &Args) -> Result<(), Box<dyn Error>> {
    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let stdout_log = tracing_subscriber::fmt::layer().with_filter(level);

    let journald = match tracing_journald::layer() {
        Ok(journald) => Some(journald.with_filter(level)),
        Err(_) => None,
    };

    let tracy = if args.tracy {
        tracy_client::Client::start();
        Some(
            tracing_tracy::TracyLayer::new(tracing_tracy::DefaultConfig::default())
                .with_filter(LevelFilter::TRACE),
        )
    } else {
        None
    };

    let console = if args.tokio_console {
        Some(console_subscriber::spawn::<Registry>())
    } else {
        None
    };

    let subscriber = Registry::default()
        .with(console)
        .with(stdout_log)
        .with(journald)
        .with(tracy);
    tracing_log::LogTracer::init()?;
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn update_fps(prev: &mut Instant, history: &mut [i64], index: &mut usize) -> i64 {
    let now = Instant::now();

    let elapsed = now.duration_since(*prev);
    *prev = now;

    history[*index] = 1e9 as i64 / (elapsed.as_nanos() as i64).max(1);
    *index = (*index + 1) % history.len();

    (history.iter().sum::<i64>() as f64 / history.len() as f64).round() as i64
}

fn save_snapshot(
    path: &Path,
    rgb: &[u8],
    frame: &FrameInfo,
    quality: i32,
) -> Result<(), Box<dyn Error>> {
    let now = Instant::now();
    let jpeg = encode_jpeg(rgb, frame.width, frame.height, quality)?;
    let encode_time = now.elapsed();
    fs::write(path, &jpeg[..])?;
    info!(
        "snapshot {}x{} jpeg: {}KB encode: {:?} written to {}",
        frame.width,
        frame.height,
        jpeg.len() / 1024,
        encode_time,
        path.display()
    );
    Ok(())
}

fn list(session: &CaptureSession) -> Result<(), Box<dyn Error>> {
    if let Some(cap) = session.capability() {
        println!("{cap}");
    }
    match session.query_std() {
        Ok(std) => println!("video standard: {std:#x}"),
        Err(e) => debug!("no video standard: {}", e),
    }
    match session.inputs() {
        Ok(inputs) => {
            for input in inputs {
                let kind = if input.is_camera() { "camera" } else { "other" };
                println!("input {}: {} ({})", input.index, input.name, kind);
            }
        }
        Err(e) => warn!("cannot enumerate inputs: {}", e),
    }
    for desc in session.formats()? {
        println!(
            "format {}: {} {}{}",
            desc.index,
            desc.fourcc,
            desc.description,
            desc.flag_suffix()
        );
        for size in session.frame_sizes(desc.fourcc).unwrap_or_default() {
            println!("    {size}");
        }
    }
    Ok(())
}

fn pull(mut session: CaptureSession, args: &Args) -> Result<(), Box<dyn Error>> {
    let timeout = session.config().poll_timeout;
    let convert = session.config().convert;
    session.start()?;

    let mut snapshot = args.snapshot.clone();
    let mut prev = Instant::now();
    let mut history = vec![0; 30];
    let mut index = 0;
    let mut count = 0;
    loop {
        match session.wait_readable(timeout) {
            Ok(()) => {}
            Err(edgefirst_preview::Error::Timeout(t)) => {
                warn!("no frame within {:?}", t);
                continue;
            }
            Err(e) if e.is_transient() => continue,
            Err(e) => return Err(e.into()),
        }

        let now = Instant::now();
        let frame = if convert {
            session.dequeue_converted().map(|(frame, rgb)| {
                if let Some(path) = snapshot.take() {
                    if let Err(e) = save_snapshot(&path, rgb, &frame, args.snapshot_quality) {
                        warn!("snapshot failed: {}", e);
                    }
                }
                frame
            })
        } else {
            session.dequeue()
        };
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) if e.is_transient() => continue,
            Err(e) => return Err(e.into()),
        };
        let capture_time = now.elapsed();

        let fps = update_fps(&mut prev, &mut history, &mut index);
        debug!("{} capture: {:?} fps: {}", frame, capture_time, fps);
        count += 1;
        if count % 30 == 0 {
            info!("{} frames fps: {}", count, fps);
        }
        if args.frames > 0 && count >= args.frames {
            break;
        }
    }

    session.stop()?;
    Ok(())
}

async fn report_fps(frames: Arc<AtomicU64>) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    interval.tick().await;
    loop {
        interval.tick().await;
        info!("fps: {}", frames.swap(0, Ordering::Relaxed));
    }
}

async fn push(session: CaptureSession, args: &Args) -> Result<(), Box<dyn Error>> {
    let options = WorkerOptions::for_config(session.config());
    let stall = options.poll_timeout * 2;
    let worker = CaptureWorker::spawn(session, options)?;
    worker.start()?;

    let counter = Arc::new(AtomicU64::new(0));
    let reporter = tokio::spawn(report_fps(counter.clone()));

    let frames = worker.frames().as_async();
    let mut snapshot = args.snapshot.clone();
    let mut count = 0;
    let res: Result<(), Box<dyn Error>> = loop {
        let event = match tokio::time::timeout(stall, frames.recv()).await {
            Ok(Ok(event)) => event,
            Ok(Err(_)) => break Ok(()),
            Err(_) => {
                if !worker.is_streaming() {
                    let reason = worker
                        .last_error()
                        .unwrap_or_else(|| "capture stopped".to_string());
                    break Err(reason.into());
                }
                warn!("no frame within {:?}", stall);
                continue;
            }
        };

        if let Some(rgb) = &event.rgb {
            if let Some(path) = snapshot.take() {
                if let Err(e) = save_snapshot(&path, rgb, &event.info, args.snapshot_quality) {
                    warn!("snapshot failed: {}", e);
                }
            }
        }
        debug!("{}", event.info);
        drop(event);

        counter.fetch_add(1, Ordering::Relaxed);
        count += 1;
        if args.frames > 0 && count >= args.frames {
            break Ok(());
        }
    };

    reporter.abort();
    worker.stop();
    let session = worker.shutdown()?;
    info!("capture finished after {} frames", count);
    drop(session);
    res
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(&args)?;
    info!("EdgeFirst V4L2 Capture Preview");

    let config = CaptureConfig::from(&args);
    let mut session = CaptureSession::new(config)?;

    if args.list {
        session.open()?;
        return list(&session);
    }

    session.configure()?;
    if let Some(format) = session.format() {
        info!("capturing {} from {}", format, args.camera.display());
    }

    match args.model {
        CaptureModel::Pull => pull(session, &args),
        CaptureModel::Push => {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_time()
                .build()?;
            rt.block_on(push(session, &args))
        }
    }
}
