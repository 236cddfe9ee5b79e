use std::collections::HashSet;
use crate::common::{Detection, NormBox};
use crate::data::{LabelTable, PipelineConfig, RawOutputs, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_LABEL_OFFSET};
use crate::detection_runners::ort_detector::nms::nms;

/// Turns raw detector slots into labeled detections, highest confidence first.
#[derive(Debug, Clone)]
pub struct DetectionDecoder {
    labels: LabelTable,
    confidence_threshold: f32,
    label_offset: i64,
    nms_iou: Option<f32>,
    wanted_labels: Option<HashSet<String>>,
}

impl DetectionDecoder {
    pub fn new(labels: LabelTable) -> Self {
        Self {
            labels,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            label_offset: DEFAULT_LABEL_OFFSET,
            nms_iou: None,
            wanted_labels: None,
        }
    }

    pub fn from_config(labels: LabelTable, config: &PipelineConfig) -> Self {
        let mut decoder = Self::new(labels)
            .with_confidence_threshold(config.confidence_threshold)
            .with_label_offset(config.label_offset);
        decoder.nms_iou = config.nms_iou;
        if let Some(wanted) = &config.wanted_labels {
            decoder.wanted_labels = Some(wanted.iter().cloned().collect());
        }
        decoder
    }

    pub fn with_confidence_threshold(mut self, x: f32) -> Self {
        self.confidence_threshold = x;
        self
    }

    pub fn with_label_offset(mut self, x: i64) -> Self {
        self.label_offset = x;
        self
    }

    pub fn with_nms_iou(mut self, x: f32) -> Self {
        self.nms_iou = Some(x);
        self
    }

    pub fn with_wanted_labels(mut self, labels: &[&str]) -> Self {
        self.wanted_labels = Some(labels.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn nms_iou(&self) -> Option<f32> {
        self.nms_iou
    }

    /// Only the first `num_valid` slots are read. The sort is stable so equal scores keep
    /// network output order.
    pub fn decode(&self, raw: &RawOutputs) -> Vec<Detection> {
        let mut detections: Vec<Detection> = raw
            .valid()
            .iter()
            .filter(|r| r.score >= self.confidence_threshold)
            .filter_map(|r| {
                let bbox = NormBox::from_tlbr(r.tlbr).clamped();
                if bbox.is_degenerate() {
                    log::trace!("Dropping degenerate box {:?} (class {})", r.tlbr, r.class_id);
                    return None;
                }

                let label = self.labels.label_for_class(r.class_id, self.label_offset);
                if let Some(wanted) = &self.wanted_labels {
                    if !wanted.contains(label) {
                        return None;
                    }
                }

                Some(Detection::new(label, r.score.min(1.), bbox).with_class_id(r.class_id))
            })
            .collect();

        detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        if let Some(iou) = self.nms_iou {
            nms(&mut detections, iou);
        }

        detections
    }
}
