use crate::error::InferenceError;
use crate::frame::{Frame, CHANNELS};

use super::backend::DetectorBackend;
use super::labels::{ClassFilter, ClassLabels};
use super::result::{Detection, DetectionSet};

/// Loaded model plus its class table.
///
/// Constructed once at startup and passed into the control loop; the backend
/// is never reloaded per iteration.
pub struct Detector {
    backend: Box<dyn DetectorBackend>,
    labels: ClassLabels,
}

impl Detector {
    pub fn new(backend: Box<dyn DetectorBackend>, labels: ClassLabels) -> Self {
        Self { backend, labels }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Class id to label lookup.
    pub fn labels(&self) -> &ClassLabels {
        &self.labels
    }

    pub fn warm_up(&mut self) -> Result<(), InferenceError> {
        self.backend.warm_up()
    }

    /// Run detection, keeping only classes allowed by `filter` when given.
    pub fn detect(
        &mut self,
        frame: &Frame,
        filter: Option<&ClassFilter>,
    ) -> Result<DetectionSet, InferenceError> {
        let view = frame.inference_view();
        let expected = (view.width() as usize)
            .checked_mul(view.height() as usize)
            .and_then(|v| v.checked_mul(CHANNELS));
        if expected != Some(view.pixels().len()) {
            return Err(InferenceError::InputShape {
                width: view.width(),
                height: view.height(),
                len: view.pixels().len(),
            });
        }

        let raw = self.backend.detect(view)?;
        let detections = raw
            .into_iter()
            .filter(|det| filter.map_or(true, |filter| filter.allows(det.class_id)))
            .map(|det| Detection {
                bbox: det.bbox.clamped(frame.width(), frame.height()),
                confidence: det.confidence.clamp(0.0, 1.0),
                class_id: det.class_id,
                label: self.labels.label_or_id(det.class_id),
            })
            .collect();

        Ok(DetectionSet::new(detections, frame.width(), frame.height()))
    }
}
