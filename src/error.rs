//! Error taxonomy for the control loop stages.
//!
//! Each stage of an iteration (fetch, decode, inference, actuation) owns one
//! error type. The loop catches all of them at the iteration boundary; none
//! of them is fatal to the process.

use thiserror::Error;

/// Transport-level failure reaching the camera endpoint.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("camera request to {url} timed out")]
    Timeout { url: String },

    #[error("camera at {url} answered with status {code}")]
    Status { url: String, code: u16 },

    #[error("camera request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("failed to read snapshot body from {url}")]
    Read {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot from {url} exceeded {limit} bytes")]
    TooLarge { url: String, limit: usize },
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        match self {
            FetchError::Timeout { .. } => true,
            FetchError::Read { source, .. } => is_timeout_io(source),
            _ => false,
        }
    }
}

/// Snapshot bytes could not be turned into a usable color image.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("snapshot body is empty")]
    NoData,

    #[error("snapshot bytes are not a recognized image")]
    Malformed(#[source] image::ImageError),

    #[error("decoded image is empty ({width}x{height})")]
    Empty { width: u32, height: u32 },
}

/// Result type of a frame source: either the transport or the decode failed.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// The detection backend failed on an otherwise valid frame.
///
/// An empty result is never an error.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("frame {width}x{height} with {len} bytes is not a 3-channel RGB buffer")]
    InputShape { width: u32, height: u32, len: usize },

    #[error("detector backend '{backend}' failed")]
    Backend {
        backend: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Transport-level failure reaching the gate endpoint.
#[derive(Error, Debug)]
pub enum ActuationError {
    #[error("gate request to {url} timed out")]
    Timeout { url: String },

    #[error("gate request to {url} failed: {message}")]
    Transport { url: String, message: String },
}

pub(crate) fn is_timeout_io(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    )
}

/// Walks the source chain of a ureq transport error looking for an I/O timeout.
pub(crate) fn transport_timed_out(transport: &ureq::Transport) -> bool {
    let mut source = std::error::Error::source(transport);
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if is_timeout_io(io) {
                return true;
            }
        }
        source = err.source();
    }
    transport
        .message()
        .is_some_and(|message| message.contains("timed out"))
}
