use crate::common::{Detection, NormBox};
use crate::detection_runners::ort_detector::raw_outputs::DetectionRaw;

pub trait Nms {
    fn iou(&self, other: &Self) -> f32;
    fn confidence(&self) -> f32;
}

impl Nms for Detection {
    /// Computes the intersection over union (IoU) between this bounding box and another.
    fn iou(&self, other: &Self) -> f32 {
        self.bbox.iou(&other.bbox)
    }

    /// Returns the confidence score of the bounding box.
    fn confidence(&self) -> f32 {
        self.confidence
    }
}

impl Nms for DetectionRaw {
    fn iou(&self, other: &Self) -> f32 {
        NormBox::from_tlbr(self.tlbr).iou(&NormBox::from_tlbr(other.tlbr))
    }

    fn confidence(&self) -> f32 {
        self.score
    }
}

/// Greedy suppression over boxes already sorted by descending confidence.
///
/// Survivors keep their relative order.
pub fn nms<T: Nms>(boxes: &mut Vec<T>, iou_threshold: f32) {
    let mut current_index = 0;
    for index in 0..boxes.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            let iou = boxes[prev_index].iou(&boxes[index]);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            boxes.swap(current_index, index);
            current_index += 1;
        }
    }
    boxes.truncate(current_index);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppresses_overlaps_and_keeps_order() {
        let mut dets = vec![
            Detection::new("cup", 0.9, NormBox::new(0.1, 0.1, 0.5, 0.5)),
            Detection::new("cup", 0.8, NormBox::new(0.12, 0.1, 0.52, 0.5)),
            Detection::new("bottle", 0.7, NormBox::new(0.6, 0.6, 0.9, 0.9)),
            Detection::new("cup", 0.6, NormBox::new(0.0, 0.6, 0.3, 0.9)),
        ];
        nms(&mut dets, 0.5);
        let labels: Vec<(&str, f32)> = dets.iter().map(|d| (d.label.as_str(), d.confidence)).collect();
        assert_eq!(labels, vec![("cup", 0.9), ("bottle", 0.7), ("cup", 0.6)]);
    }
}
