//! Actuator transports.
//!
//! The gate is driven by fire-and-forget HTTP commands. Success means the
//! request reached the device; response bodies are never interpreted and the
//! physical gate state is never verified.

pub mod gate;

pub use gate::{GateConfig, GateStats, HttpGate};

use crate::error::ActuationError;

/// Sends one trigger command per call.
pub trait Actuator: Send {
    /// Endpoint identifier for logs.
    fn describe(&self) -> String;

    /// Fire the actuator. Repeated calls are allowed and not suppressed.
    fn trigger(&mut self) -> Result<(), ActuationError>;
}
