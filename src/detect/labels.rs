use std::collections::BTreeSet;

use anyhow::{anyhow, Result};

/// COCO-80 class names in model output order.
const COCO_NAMES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// COCO id of `bottle`, the default trigger class.
pub const BOTTLE_CLASS_ID: u32 = 39;

/// Immutable mapping from class id to label, owned by the detector.
#[derive(Clone, Debug)]
pub struct ClassLabels {
    names: Vec<String>,
}

impl ClassLabels {
    /// The 80-class COCO table used by stock YOLO exports.
    pub fn coco() -> Self {
        Self::from_names(COCO_NAMES.iter().map(|name| name.to_string()).collect())
    }

    pub fn from_names(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, class_id: u32) -> bool {
        (class_id as usize) < self.names.len()
    }

    pub fn label(&self, class_id: u32) -> Option<&str> {
        self.names.get(class_id as usize).map(String::as_str)
    }

    /// Label for display; unknown ids render as `class<N>`.
    pub fn label_or_id(&self, class_id: u32) -> String {
        self.label(class_id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("class{}", class_id))
    }

    /// Case-insensitive reverse lookup.
    pub fn id_of(&self, name: &str) -> Option<u32> {
        let name = name.trim();
        self.names
            .iter()
            .position(|candidate| candidate.eq_ignore_ascii_case(name))
            .map(|idx| idx as u32)
    }

    /// Resolve a class given either as a numeric id or as a label.
    pub fn resolve(&self, spec: &str) -> Result<u32> {
        let spec = spec.trim();
        let class_id = match spec.parse::<u32>() {
            Ok(id) => id,
            Err(_) => self
                .id_of(spec)
                .ok_or_else(|| anyhow!("unknown class label '{}'", spec))?,
        };
        if !self.contains(class_id) {
            return Err(anyhow!(
                "class id {} is outside the {}-class label table",
                class_id,
                self.len()
            ));
        }
        Ok(class_id)
    }
}

/// Restricts detections to a set of class ids.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassFilter {
    allowed: BTreeSet<u32>,
}

impl ClassFilter {
    pub fn new<I: IntoIterator<Item = u32>>(class_ids: I) -> Self {
        Self {
            allowed: class_ids.into_iter().collect(),
        }
    }

    pub fn single(class_id: u32) -> Self {
        Self::new([class_id])
    }

    pub fn allows(&self, class_id: u32) -> bool {
        self.allowed.contains(&class_id)
    }

    pub fn class_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.allowed.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    /// Human-readable list, e.g. `39:bottle`.
    pub fn describe(&self, labels: &ClassLabels) -> String {
        self.allowed
            .iter()
            .map(|id| format!("{}:{}", id, labels.label_or_id(*id)))
            .collect::<Vec<_>>()
            .join(",")
    }
}
