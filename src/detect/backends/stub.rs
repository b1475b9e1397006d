use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::anyhow;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetection;
use crate::error::InferenceError;
use crate::frame::InferenceView;

/// One scripted backend answer.
#[derive(Clone, Debug)]
pub enum StubResponse {
    Detections(Vec<RawDetection>),
    Fail(String),
}

/// Scripted backend for dry runs and tests.
///
/// Answers from a queue; the last answer repeats once the queue is drained.
pub struct StubBackend {
    script: VecDeque<StubResponse>,
    last: StubResponse,
    calls: Arc<AtomicUsize>,
}

impl StubBackend {
    pub fn sequence(responses: Vec<StubResponse>) -> Self {
        let mut script: VecDeque<_> = responses.into();
        let last = script
            .pop_back()
            .unwrap_or(StubResponse::Detections(Vec::new()));
        script.push_back(last.clone());
        Self {
            script,
            last,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Never detects anything.
    pub fn empty() -> Self {
        Self::sequence(Vec::new())
    }

    /// Returns the same detections on every call.
    pub fn repeating(detections: Vec<RawDetection>) -> Self {
        Self::sequence(vec![StubResponse::Detections(detections)])
    }

    /// Shared counter of `detect` calls, readable after the backend is moved.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::empty()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _view: InferenceView<'_>) -> Result<Vec<RawDetection>, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self.script.pop_front().unwrap_or_else(|| self.last.clone());
        match response {
            StubResponse::Detections(detections) => Ok(detections),
            StubResponse::Fail(message) => Err(InferenceError::Backend {
                backend: "stub",
                source: anyhow!(message),
            }),
        }
    }
}
