use crate::detect::result::RawDetection;
use crate::error::InferenceError;
use crate::frame::InferenceView;

/// Detector backend trait.
///
/// A backend is loaded once at startup and owned by the `Detector` for the
/// process lifetime. It returns raw detections in pixel coordinates of the
/// frame it was given; label resolution and class filtering happen in the
/// `Detector`.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// Zero objects is a valid, empty result. Errors are reserved for
    /// failures on an otherwise valid frame (bad input shape, runtime fault).
    fn detect(&mut self, view: InferenceView<'_>) -> Result<Vec<RawDetection>, InferenceError>;

    /// Optional warm-up hook, run once before the first iteration.
    fn warm_up(&mut self) -> Result<(), InferenceError> {
        Ok(())
    }
}
