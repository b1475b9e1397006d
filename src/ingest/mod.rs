//! Frame sources.
//!
//! - HTTP still-image snapshots (ESP32-CAM style `/capture` endpoints)
//! - Local still images (bench testing without a camera)
//!
//! A source performs exactly one read per `fetch()` call and never retries
//! internally; retry policy belongs to the control loop. Transport and decode
//! failures are reported as distinct `CaptureError` variants.

pub mod file;
pub mod snapshot;

pub use file::StillFileSource;
pub use snapshot::{SnapshotConfig, SnapshotSource, SnapshotStats};

use anyhow::{anyhow, Context, Result};
use std::time::Duration;
use url::Url;

use crate::error::CaptureError;
use crate::frame::Frame;

/// Fetches one decoded frame per call.
pub trait FrameSource: Send {
    /// Source identifier for logs.
    fn describe(&self) -> String;

    /// Fetch and decode a single frame.
    fn fetch(&mut self) -> Result<Frame, CaptureError>;
}

/// Build a frame source from a camera URL. `file://` URLs read a local still.
pub fn source_for_url(url: &str, timeout: Duration) -> Result<Box<dyn FrameSource>> {
    let parsed = Url::parse(url).with_context(|| format!("parse camera url {}", url))?;
    match parsed.scheme() {
        "http" | "https" => Ok(Box::new(SnapshotSource::new(SnapshotConfig {
            url: url.to_string(),
            timeout,
            ..SnapshotConfig::default()
        })?)),
        "file" => {
            let path = parsed
                .to_file_path()
                .map_err(|_| anyhow!("camera url {} is not a valid file path", url))?;
            Ok(Box::new(StillFileSource::new(path)))
        }
        other => Err(anyhow!(
            "unsupported camera scheme '{}'; expected http(s) or file",
            other
        )),
    }
}
