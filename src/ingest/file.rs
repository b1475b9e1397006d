//! Local still-image frame source.
//!
//! Reads the same image file on every `fetch()`, so the loop can be exercised
//! on a bench without a camera. Read errors map to `FetchError::Read`, so a
//! missing file is handled exactly like an unreachable camera.

use std::path::PathBuf;

use crate::error::{CaptureError, FetchError};
use crate::frame::Frame;

use super::FrameSource;

pub struct StillFileSource {
    path: PathBuf,
    frame_count: u64,
}

impl StillFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            frame_count: 0,
        }
    }
}

impl FrameSource for StillFileSource {
    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }

    fn fetch(&mut self) -> Result<Frame, CaptureError> {
        let bytes = std::fs::read(&self.path).map_err(|source| FetchError::Read {
            url: self.path.display().to_string(),
            source,
        })?;
        let frame = Frame::decode(&bytes, self.frame_count + 1)?;
        self.frame_count += 1;
        Ok(frame)
    }
}
