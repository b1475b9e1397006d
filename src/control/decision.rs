use crate::detect::DetectionSet;

/// Decides whether a detection set is trigger-worthy.
///
/// A pure function of one `DetectionSet`: no memory across iterations, so a
/// target that stays in view triggers on every iteration. With no confidence
/// floor (the default) any non-empty set triggers.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TriggerDecision {
    min_confidence: Option<f32>,
}

impl TriggerDecision {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require at least one detection at or above `floor`.
    pub fn with_min_confidence(mut self, floor: f32) -> Self {
        self.min_confidence = Some(floor);
        self
    }

    pub fn min_confidence(&self) -> Option<f32> {
        self.min_confidence
    }

    pub fn should_trigger(&self, detections: &DetectionSet) -> bool {
        match self.min_confidence {
            None => !detections.is_empty(),
            Some(floor) => detections.iter().any(|det| det.confidence >= floor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Detection};

    fn set(confidences: &[f32]) -> DetectionSet {
        let detections = confidences
            .iter()
            .map(|&confidence| Detection {
                bbox: BoundingBox::new(0.0, 0.0, 4.0, 4.0),
                confidence,
                class_id: 39,
                label: "bottle".to_string(),
            })
            .collect();
        DetectionSet::new(detections, 64, 64)
    }

    #[test]
    fn triggers_iff_set_is_non_empty() {
        let decision = TriggerDecision::new();
        let cases: [&[f32]; 4] = [&[], &[0.01], &[0.83], &[0.2, 0.9, 0.4]];
        for confidences in cases {
            let detections = set(confidences);
            assert_eq!(
                decision.should_trigger(&detections),
                !detections.is_empty(),
                "confidences {:?}",
                confidences
            );
        }
    }

    #[test]
    fn confidence_floor_requires_one_strong_detection() {
        let decision = TriggerDecision::new().with_min_confidence(0.5);

        assert!(!decision.should_trigger(&set(&[])));
        assert!(!decision.should_trigger(&set(&[0.2, 0.49])));
        assert!(decision.should_trigger(&set(&[0.2, 0.5])));
    }

    #[test]
    fn decision_is_memoryless() {
        let decision = TriggerDecision::new();
        let present = set(&[0.83]);
        assert!(decision.should_trigger(&present));
        assert!(decision.should_trigger(&present));
    }
}
