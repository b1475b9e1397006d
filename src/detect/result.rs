/// Axis-aligned box in pixel coordinates of the source frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build from center coordinates and size.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn xyxy(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    /// Center x, center y, width, height.
    pub fn xywh(&self) -> [f32; 4] {
        [
            (self.x1 + self.x2) / 2.0,
            (self.y1 + self.y2) / 2.0,
            self.width(),
            self.height(),
        ]
    }

    /// `xyxy` normalized by the frame size.
    pub fn xyxyn(&self, frame_width: u32, frame_height: u32) -> [f32; 4] {
        let (w, h) = (frame_width.max(1) as f32, frame_height.max(1) as f32);
        [self.x1 / w, self.y1 / h, self.x2 / w, self.y2 / h]
    }

    /// `xywh` normalized by the frame size.
    pub fn xywhn(&self, frame_width: u32, frame_height: u32) -> [f32; 4] {
        let (w, h) = (frame_width.max(1) as f32, frame_height.max(1) as f32);
        let [cx, cy, bw, bh] = self.xywh();
        [cx / w, cy / h, bw / w, bh / h]
    }

    /// Clamp to `[0, width] x [0, height]`.
    pub fn clamped(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self::new(
            self.x1.clamp(0.0, w),
            self.y1.clamp(0.0, h),
            self.x2.clamp(0.0, w),
            self.y2.clamp(0.0, h),
        )
    }

    /// Intersection over union.
    pub fn iou(&self, other: &Self) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);
        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// Backend output before label resolution and class filtering.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: u32,
}

/// One detected object. Immutable once produced by the `Detector`.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// 0.0..=1.0
    pub confidence: f32,
    pub class_id: u32,
    pub label: String,
}

/// All detections for one frame, in backend order (not sorted).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionSet {
    detections: Vec<Detection>,
    /// Size of the frame the boxes refer to.
    pub frame_width: u32,
    pub frame_height: u32,
}

impl DetectionSet {
    pub fn new(detections: Vec<Detection>, frame_width: u32, frame_height: u32) -> Self {
        Self {
            detections,
            frame_width,
            frame_height,
        }
    }

    pub fn empty(frame_width: u32, frame_height: u32) -> Self {
        Self::new(Vec::new(), frame_width, frame_height)
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }

    /// First detection in backend order. Only the operator overlay label uses
    /// this; trigger decisions always look at the whole set.
    pub fn first(&self) -> Option<&Detection> {
        self.detections.first()
    }

    /// Highest confidence in the set, 0.0 when empty.
    pub fn max_confidence(&self) -> f32 {
        self.detections
            .iter()
            .map(|det| det.confidence)
            .fold(0.0, f32::max)
    }
}

impl<'a> IntoIterator for &'a DetectionSet {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.detections.iter()
    }
}
