//! HTTP still-image frame source.
//!
//! `SnapshotSource` issues one GET per frame against a camera endpoint that
//! answers with a single encoded image (ESP32-CAM `/capture`, most IP cameras'
//! `snapshot.jpg`). The source is responsible for:
//! - Bounding each request by a fixed timeout
//! - Separating transport failures from decode failures
//! - Producing decoded RGB `Frame` instances
//!
//! It does not retry, cache or persist frames.

use std::io::Read;
use std::time::{Duration, Instant};

use crate::error::{transport_timed_out, CaptureError, FetchError};
use crate::frame::Frame;

use super::FrameSource;

const MAX_SNAPSHOT_BYTES: usize = 5 * 1024 * 1024;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a snapshot source.
#[derive(Clone, Debug)]
pub struct SnapshotConfig {
    /// Snapshot URL (http or https).
    pub url: String,
    /// Upper bound for the whole request, including the body read.
    pub timeout: Duration,
    /// Bodies larger than this are rejected without decoding.
    pub max_bytes: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            url: "http://192.168.78.218/capture".to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_bytes: MAX_SNAPSHOT_BYTES,
        }
    }
}

/// Statistics for a snapshot source.
#[derive(Clone, Debug)]
pub struct SnapshotStats {
    pub frames_captured: u64,
    pub fetch_failures: u64,
    pub decode_failures: u64,
    pub source: String,
}

pub struct SnapshotSource {
    config: SnapshotConfig,
    agent: ureq::Agent,
    frame_count: u64,
    fetch_failures: u64,
    decode_failures: u64,
    last_frame_at: Option<Instant>,
}

impl SnapshotSource {
    pub fn new(config: SnapshotConfig) -> anyhow::Result<Self> {
        if config.timeout.is_zero() {
            anyhow::bail!("snapshot timeout must be greater than zero");
        }
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Ok(Self {
            config,
            agent,
            frame_count: 0,
            fetch_failures: 0,
            decode_failures: 0,
            last_frame_at: None,
        })
    }

    /// True when a frame was decoded within the last few timeouts.
    pub fn is_healthy(&self) -> bool {
        let Some(last_frame_at) = self.last_frame_at else {
            return false;
        };
        last_frame_at.elapsed() <= self.config.timeout.saturating_mul(3)
    }

    pub fn stats(&self) -> SnapshotStats {
        SnapshotStats {
            frames_captured: self.frame_count,
            fetch_failures: self.fetch_failures,
            decode_failures: self.decode_failures,
            source: self.config.url.clone(),
        }
    }

    fn fetch_bytes(&self) -> Result<Vec<u8>, FetchError> {
        let url = &self.config.url;
        let response = match self.agent.get(url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                return Err(FetchError::Status {
                    url: url.clone(),
                    code,
                })
            }
            Err(ureq::Error::Transport(transport)) => {
                if transport_timed_out(&transport) {
                    return Err(FetchError::Timeout { url: url.clone() });
                }
                return Err(FetchError::Transport {
                    url: url.clone(),
                    message: transport.to_string(),
                });
            }
        };

        let limit = self.config.max_bytes;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(limit as u64 + 1)
            .read_to_end(&mut bytes)
            .map_err(|source| FetchError::Read {
                url: url.clone(),
                source,
            })?;
        if bytes.len() > limit {
            return Err(FetchError::TooLarge {
                url: url.clone(),
                limit,
            });
        }
        Ok(bytes)
    }
}

impl FrameSource for SnapshotSource {
    fn describe(&self) -> String {
        format!("snapshot:{}", self.config.url)
    }

    fn fetch(&mut self) -> Result<Frame, CaptureError> {
        let bytes = self.fetch_bytes().inspect_err(|_| {
            self.fetch_failures += 1;
        })?;
        let frame = Frame::decode(&bytes, self.frame_count + 1).inspect_err(|_| {
            self.decode_failures += 1;
        })?;
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Ok(frame)
    }
}
