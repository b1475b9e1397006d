//! Sentry Gate
//!
//! A detection-triggered gate controller. Each iteration fetches one still
//! from a networked camera, runs object detection restricted to the target
//! classes, and sends an actuation command to the gate endpoint whenever the
//! frame contains a target object.
//!
//! # Module Structure
//!
//! - `frame`: decoded frames and the read-only `InferenceView`
//! - `ingest`: frame sources (HTTP snapshot endpoints, local stills)
//! - `detect`: detector backends, class labels, detection results
//! - `control`: trigger decision, retry policy, the control loop
//! - `transport`: the gate actuator
//! - `preview`: annotated operator preview
//! - `config`: file + environment configuration for `gated`
//!
//! Every stage failure is contained to its iteration; the loop only stops
//! on an explicit request.

pub mod config;
pub mod control;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod preview;
pub mod transport;

pub use config::GatedConfig;
pub use control::{
    ControlLoop, IterationOutcome, LoopState, LoopStats, RetryPolicy, Stage, StopFlag,
    TriggerDecision,
};
pub use detect::{
    BoundingBox, ClassFilter, ClassLabels, Detection, DetectionSet, Detector, DetectorBackend,
    BOTTLE_CLASS_ID,
};
pub use error::{ActuationError, CaptureError, DecodeError, FetchError, InferenceError};
pub use frame::{Frame, InferenceView};
pub use ingest::{FrameSource, SnapshotSource};
pub use transport::{Actuator, HttpGate};
