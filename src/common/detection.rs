use serde::{Deserialize, Serialize};
use crate::common::NormBox;

/// Label used whenever a class id has no entry in the label table.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// One decoded, confidence-filtered detection.
#[derive(Default, Debug, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: NormBox,
    /// Raw class id reported by the model, before the label offset is applied.
    pub class_id: i64,
}

impl Detection {
    pub fn new(label: &str, confidence: f32, bbox: NormBox) -> Self {
        Self {
            label: label.to_string(),
            confidence,
            bbox,
            class_id: -1,
        }
    }

    /// Sets the bounding box from `(top, left, bottom, right)`.
    pub fn with_tlbr(mut self, top: f32, left: f32, bottom: f32, right: f32) -> Self {
        self.bbox = NormBox::new(top, left, bottom, right);
        self
    }

    pub fn with_confidence(mut self, conf: f32) -> Self {
        self.confidence = conf;
        self
    }

    pub fn with_class_id(mut self, class_id: i64) -> Self {
        self.class_id = class_id;
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn is_unknown(&self) -> bool {
        self.label == UNKNOWN_LABEL
    }

    /// Computes the intersection area between this detection and another.
    pub fn intersect(&self, other: &Detection) -> f32 {
        self.bbox.intersect(&other.bbox)
    }

    /// Computes the union area between this detection and another.
    pub fn union(&self, other: &Detection) -> f32 {
        self.bbox.union(&other.bbox)
    }
}

impl std::fmt::Display for Detection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:.0}%)", self.label, self.confidence * 100.)
    }
}
