// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{format::FourCC, session::SessionState};
use std::{fmt, io, path::PathBuf, time::Duration};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by capture, negotiation and conversion.
#[derive(Debug)]
pub enum Error {
    /// The device node could not be opened (missing, busy or no permission).
    DeviceUnavailable { path: PathBuf, source: io::Error },
    /// The driver adjusted the requested format and strict negotiation is on.
    NegotiationMismatch { requested: String, negotiated: String },
    /// A control call failed. The session keeps its previous state.
    Ioctl {
        request: &'static str,
        source: io::Error,
    },
    /// Mapping a kernel buffer failed. No partial mapping survives this error.
    Map {
        index: u32,
        plane: usize,
        source: io::Error,
    },
    /// Non-blocking dequeue found no filled buffer.
    WouldBlock,
    /// No frame became ready within the wait.
    Timeout(Duration),
    /// A wait was interrupted by a signal.
    Interrupted,
    /// The operation is not valid in the session's current state.
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
    InvalidConfig(String),
    UnsupportedFormat(FourCC),
    Unsupported(String),
    /// The driver granted fewer buffers than capture needs.
    InsufficientBuffers { requested: u32, granted: u32 },
    /// The driver returned a buffer index outside the pool.
    UnknownBuffer(u32),
    Worker(String),
    Encode(String),
}

impl Error {
    /// Conditions that clear up on their own; the caller retries next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::WouldBlock | Error::Timeout(_) | Error::Interrupted
        )
    }

    /// The handle is no longer usable (device unplugged or descriptor gone).
    pub fn is_device_lost(&self) -> bool {
        match self {
            Error::Ioctl { source, .. } => matches!(
                source.raw_os_error(),
                Some(libc::ENODEV) | Some(libc::ENXIO) | Some(libc::EBADF) | Some(libc::EIO)
            ),
            _ => false,
        }
    }

    /// Maps a device call failure, keeping would-block and interruption
    /// distinguishable from hard failures.
    pub(crate) fn ioctl(request: &'static str) -> impl FnOnce(io::Error) -> Error {
        move |source| match source.kind() {
            io::ErrorKind::WouldBlock => Error::WouldBlock,
            io::ErrorKind::Interrupted => Error::Interrupted,
            _ => Error::Ioctl { request, source },
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DeviceUnavailable { path, source } => {
                write!(f, "cannot open video device {}: {}", path.display(), source)
            }
            Error::NegotiationMismatch {
                requested,
                negotiated,
            } => write!(
                f,
                "driver adjusted format: requested {requested} negotiated {negotiated}"
            ),
            Error::Ioctl { request, source } => write!(f, "{request} failed: {source}"),
            Error::Map {
                index,
                plane,
                source,
            } => write!(f, "mmap of buffer {index} plane {plane} failed: {source}"),
            Error::WouldBlock => write!(f, "no frame available yet"),
            Error::Timeout(t) => write!(f, "no frame within {t:?}"),
            Error::Interrupted => write!(f, "wait interrupted"),
            Error::InvalidState { operation, state } => {
                write!(f, "cannot {operation} while session is {state:?}")
            }
            Error::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Error::UnsupportedFormat(fourcc) => write!(f, "unsupported pixel format {fourcc}"),
            Error::Unsupported(msg) => write!(f, "unsupported device: {msg}"),
            Error::InsufficientBuffers { requested, granted } => write!(
                f,
                "driver granted {granted} of {requested} requested buffers"
            ),
            Error::UnknownBuffer(index) => write!(f, "driver returned unknown buffer {index}"),
            Error::Worker(msg) => write!(f, "capture worker: {msg}"),
            Error::Encode(msg) => write!(f, "jpeg encode failed: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::DeviceUnavailable { source, .. }
            | Error::Ioctl { source, .. }
            | Error::Map { source, .. } => Some(source),
            _ => None,
        }
    }
}
