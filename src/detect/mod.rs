mod backend;
pub mod backends;
mod detector;
mod labels;
mod result;

pub use backend::DetectorBackend;
pub use backends::{StubBackend, StubResponse};
pub use detector::Detector;
pub use labels::{ClassFilter, ClassLabels, BOTTLE_CLASS_ID};
pub use result::{BoundingBox, Detection, DetectionSet, RawDetection};

#[cfg(feature = "backend-tract")]
pub use backends::{TractBackend, YoloParams};
