use std::fmt;
use std::time::{Duration, Instant};

use crate::detect::{ClassFilter, DetectionSet, Detector};
use crate::error::CaptureError;
use crate::ingest::FrameSource;
use crate::preview::{annotate, OverlayStyle, Viewer, ViewerEvent};
use crate::transport::Actuator;

use super::{RetryPolicy, StopFlag, TriggerDecision};

/// Iteration stage that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Decode,
    Inference,
    Actuation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Decode => "decode",
            Stage::Inference => "inference",
            Stage::Actuation => "actuation",
        };
        f.write_str(name)
    }
}

/// Result of one fetch -> detect -> decide -> actuate cycle.
#[derive(Clone, Debug, PartialEq)]
pub enum IterationOutcome {
    /// A stage before the decision failed; the iteration was discarded.
    Skipped { stage: Stage, reason: String },
    /// Detection ran and nothing was trigger-worthy.
    Idle { detections: DetectionSet },
    /// The gate command went out.
    Triggered { detections: DetectionSet },
    /// The decision said trigger but the gate was unreachable.
    TriggerFailed {
        detections: DetectionSet,
        reason: String,
    },
}

impl IterationOutcome {
    pub fn triggered(&self) -> bool {
        matches!(self, IterationOutcome::Triggered { .. })
    }

    pub fn detections(&self) -> Option<&DetectionSet> {
        match self {
            IterationOutcome::Skipped { .. } => None,
            IterationOutcome::Idle { detections }
            | IterationOutcome::Triggered { detections }
            | IterationOutcome::TriggerFailed { detections, .. } => Some(detections),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped,
}

/// Counters across the life of a loop.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub iterations: u64,
    pub frames: u64,
    pub fetch_failures: u64,
    pub decode_failures: u64,
    pub inference_failures: u64,
    pub idle: u64,
    pub triggers: u64,
    pub trigger_failures: u64,
    pub preview_failures: u64,
}

/// Drives source, detector and actuator forever, isolating per-iteration
/// failures.
///
/// All collaborators are constructed once by the caller and owned here for
/// the lifetime of the loop. The only exits are the shared `StopFlag` and an
/// operator quit from the viewer, both observed between iterations.
pub struct ControlLoop {
    source: Box<dyn FrameSource>,
    detector: Detector,
    gate: Box<dyn Actuator>,
    class_filter: Option<ClassFilter>,
    decision: TriggerDecision,
    retry: RetryPolicy,
    viewer: Option<Box<dyn Viewer>>,
    overlay: OverlayStyle,
    stop: StopFlag,
    state: LoopState,
    stats: LoopStats,
    consecutive_failures: u32,
    stats_interval: Option<Duration>,
    last_stats_log: Instant,
}

impl ControlLoop {
    pub fn new(source: Box<dyn FrameSource>, detector: Detector, gate: Box<dyn Actuator>) -> Self {
        Self {
            source,
            detector,
            gate,
            class_filter: None,
            decision: TriggerDecision::default(),
            retry: RetryPolicy::default(),
            viewer: None,
            overlay: OverlayStyle::default(),
            stop: StopFlag::new(),
            state: LoopState::Running,
            stats: LoopStats::default(),
            consecutive_failures: 0,
            stats_interval: None,
            last_stats_log: Instant::now(),
        }
    }

    pub fn with_class_filter(mut self, filter: ClassFilter) -> Self {
        self.class_filter = Some(filter);
        self
    }

    pub fn with_decision(mut self, decision: TriggerDecision) -> Self {
        self.decision = decision;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_viewer(mut self, viewer: Box<dyn Viewer>) -> Self {
        self.viewer = Some(viewer);
        self
    }

    pub fn with_overlay_style(mut self, overlay: OverlayStyle) -> Self {
        self.overlay = overlay;
        self
    }

    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    /// Log a health line at most once per `interval`.
    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = Some(interval);
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    /// Run until stopped.
    pub fn run(&mut self) -> LoopStats {
        self.run_bounded(None)
    }

    /// Run at most `limit` iterations, or fewer if stopped.
    pub fn run_iterations(&mut self, limit: u64) -> LoopStats {
        self.run_bounded(Some(limit))
    }

    fn run_bounded(&mut self, limit: Option<u64>) -> LoopStats {
        log::info!(
            "control loop running: source={} detector={} gate={} classes={}",
            self.source.describe(),
            self.detector.backend_name(),
            self.gate.describe(),
            self.class_filter
                .as_ref()
                .map(|filter| filter.describe(self.detector.labels()))
                .unwrap_or_else(|| "all".to_string()),
        );
        let mut completed = 0u64;
        while self.state == LoopState::Running {
            if self.stop.is_stop_requested() {
                log::info!("stop requested; leaving control loop");
                self.state = LoopState::Stopped;
                break;
            }
            if limit.is_some_and(|limit| completed >= limit) {
                break;
            }

            let outcome = self.run_iteration();
            completed += 1;

            if let IterationOutcome::Skipped { .. } = outcome {
                let delay = self.retry.delay_after(self.consecutive_failures);
                if !delay.is_zero() {
                    log::debug!(
                        "retrying in {:?} after {} consecutive skipped iterations",
                        delay,
                        self.consecutive_failures
                    );
                    std::thread::sleep(delay);
                }
            }
            self.maybe_log_stats();
        }
        self.release_viewer();
        log::info!("control loop finished: {}", format_stats(&self.stats));
        self.stats.clone()
    }

    /// Run exactly one iteration. Never fails; every stage error becomes an
    /// outcome.
    pub fn run_iteration(&mut self) -> IterationOutcome {
        self.stats.iterations += 1;

        let frame = match self.source.fetch() {
            Ok(frame) => frame,
            Err(CaptureError::Fetch(err)) => {
                self.stats.fetch_failures += 1;
                return self.skip(Stage::Fetch, error_chain(err));
            }
            Err(CaptureError::Decode(err)) => {
                self.stats.decode_failures += 1;
                return self.skip(Stage::Decode, error_chain(err));
            }
        };
        self.stats.frames += 1;

        let detections = match self.detector.detect(&frame, self.class_filter.as_ref()) {
            Ok(detections) => detections,
            Err(err) => {
                self.stats.inference_failures += 1;
                return self.skip(Stage::Inference, error_chain(err));
            }
        };
        self.consecutive_failures = 0;

        let outcome = if self.decision.should_trigger(&detections) {
            match self.gate.trigger() {
                Ok(()) => {
                    self.stats.triggers += 1;
                    if let Some(primary) = detections.first() {
                        log::info!(
                            "frame {}: {} detection(s), first {} {:.2}; gate triggered (#{})",
                            frame.sequence,
                            detections.len(),
                            primary.label,
                            primary.confidence,
                            self.stats.triggers
                        );
                    }
                    IterationOutcome::Triggered { detections }
                }
                Err(err) => {
                    self.stats.trigger_failures += 1;
                    let reason = error_chain(err);
                    log::warn!("{} stage failed: {}", Stage::Actuation, reason);
                    IterationOutcome::TriggerFailed { detections, reason }
                }
            }
        } else {
            self.stats.idle += 1;
            log::debug!(
                "frame {}: {} detection(s) after {:.3}s, no trigger",
                frame.sequence,
                detections.len(),
                frame.age_secs_f32()
            );
            IterationOutcome::Idle { detections }
        };

        if let Some(detections) = outcome.detections() {
            self.refresh_preview(&frame, detections);
        }
        outcome
    }

    fn skip(&mut self, stage: Stage, reason: String) -> IterationOutcome {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        log::warn!("{} stage failed, skipping iteration: {}", stage, reason);
        IterationOutcome::Skipped { stage, reason }
    }

    fn refresh_preview(&mut self, frame: &crate::frame::Frame, detections: &DetectionSet) {
        let Some(viewer) = self.viewer.as_mut() else {
            return;
        };
        let annotated = annotate(frame, detections, &self.overlay);
        match viewer.show(&annotated) {
            Ok(ViewerEvent::Continue) => {}
            Ok(ViewerEvent::Quit) => {
                log::info!("operator quit requested");
                self.state = LoopState::Stopped;
            }
            Err(err) => {
                self.stats.preview_failures += 1;
                log::warn!("preview refresh failed: {:#}", err);
            }
        }
    }

    fn release_viewer(&mut self) {
        if let Some(mut viewer) = self.viewer.take() {
            if let Err(err) = viewer.close() {
                log::warn!("preview close failed: {:#}", err);
            }
        }
    }

    fn maybe_log_stats(&mut self) {
        let Some(interval) = self.stats_interval else {
            return;
        };
        if self.last_stats_log.elapsed() >= interval {
            log::info!("loop health: {}", format_stats(&self.stats));
            self.last_stats_log = Instant::now();
        }
    }
}

fn format_stats(stats: &LoopStats) -> String {
    format!(
        "iterations={} frames={} triggers={} idle={} fetch_failures={} decode_failures={} inference_failures={} trigger_failures={} preview_failures={}",
        stats.iterations,
        stats.frames,
        stats.triggers,
        stats.idle,
        stats.fetch_failures,
        stats.decode_failures,
        stats.inference_failures,
        stats.trigger_failures,
        stats.preview_failures
    )
}

/// `outer: inner: root` rendering of an error and its sources.
fn error_chain<E>(err: E) -> String
where
    E: std::error::Error + Send + Sync + 'static,
{
    format!("{:#}", anyhow::Error::new(err))
}
