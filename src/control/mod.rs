//! The detection-triggered control loop.
//!
//! Each iteration runs fetch -> decode -> infer -> decide -> actuate strictly
//! in sequence. Every stage failure is caught at the iteration boundary,
//! logged, and turned into a skipped iteration; nothing escapes the loop.

mod decision;
mod retry;
mod runner;
mod stop;

pub use decision::TriggerDecision;
pub use retry::RetryPolicy;
pub use runner::{ControlLoop, IterationOutcome, LoopState, LoopStats, Stage};
pub use stop::StopFlag;
