use crate::common::DetectorError;

/// One detection slot exactly as the network wrote it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DetectionRaw {
    /// `[top, left, bottom, right]`, normalized.
    pub tlbr: [f32; 4],
    pub class_id: i64,
    pub score: f32,
}

impl DetectionRaw {
    pub fn new(tlbr: [f32; 4], class_id: i64, score: f32) -> Self {
        Self {
            tlbr,
            class_id,
            score,
        }
    }
}

/// Container for the outputs of one forward pass: fixed-capacity slots plus the valid count.
#[derive(Clone, PartialEq, Default)]
pub struct RawOutputs {
    slots: Vec<DetectionRaw>,
    num_valid: usize,
}

impl std::fmt::Debug for RawOutputs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawOutputs")
            .field("capacity", &self.slots.len())
            .field("num_valid", &self.num_valid)
            .field("slots", &self.valid())
            .finish()
    }
}

impl RawOutputs {
    /// The valid count is clamped to the number of slots.
    pub fn new(slots: Vec<DetectionRaw>, num_valid: usize) -> Self {
        let num_valid = num_valid.min(slots.len());
        Self { slots, num_valid }
    }

    /// Assembles slots from the four flat output tensors of a post-processed detector.
    ///
    /// `boxes` holds 4 values per slot, `classes` and `scores` one each, and `count` the valid
    /// slot count as a float. At most `capacity` slots are kept.
    pub fn from_tensors(boxes: &[f32], classes: &[f32], scores: &[f32], count: f32, capacity: usize) -> Result<Self, DetectorError> {
        let n = scores.len().min(capacity);
        if classes.len() < n || boxes.len() < n * 4 {
            return Err(DetectorError::inference(format!(
                "output tensors disagree: {} boxes, {} classes, {} scores",
                boxes.len() / 4, classes.len(), scores.len()
            )));
        }

        let slots = (0..n)
            .map(|i| {
                let b = &boxes[i * 4..i * 4 + 4];
                DetectionRaw::new([b[0], b[1], b[2], b[3]], classes[i] as i64, scores[i])
            })
            .collect::<Vec<_>>();

        let num_valid = if count.is_finite() && count > 0. { count as usize } else { 0 };
        Ok(Self::new(slots, num_valid))
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn num_valid(&self) -> usize {
        self.num_valid
    }

    /// The first `num_valid` slots in network output order.
    pub fn valid(&self) -> &[DetectionRaw] {
        &self.slots[..self.num_valid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_is_clamped_to_capacity() {
        let boxes = [0.1, 0.1, 0.5, 0.5, 0.2, 0.2, 0.6, 0.6];
        let out = RawOutputs::from_tensors(&boxes, &[1., 2.], &[0.9, 0.8], 7., 10).unwrap();
        assert_eq!(out.capacity(), 2);
        assert_eq!(out.num_valid(), 2);
        assert_eq!(out.valid()[1].class_id, 2);
        assert_eq!(out.valid()[1].tlbr, [0.2, 0.2, 0.6, 0.6]);
    }

    #[test]
    fn capacity_limits_slots() {
        let boxes = [0.0; 12];
        let out = RawOutputs::from_tensors(&boxes, &[0.; 3], &[0.5; 3], 3., 2).unwrap();
        assert_eq!(out.capacity(), 2);
        assert_eq!(out.num_valid(), 2);
    }

    #[test]
    fn negative_or_nan_count_means_empty() {
        let out = RawOutputs::from_tensors(&[0.; 4], &[0.], &[0.9], f32::NAN, 10).unwrap();
        assert!(out.valid().is_empty());
        let out = RawOutputs::from_tensors(&[0.; 4], &[0.], &[0.9], -1., 10).unwrap();
        assert!(out.valid().is_empty());
    }

    #[test]
    fn mismatched_tensors_fail() {
        let err = RawOutputs::from_tensors(&[0.; 4], &[0., 1.], &[0.9, 0.8], 2., 10).unwrap_err();
        assert!(matches!(err, DetectorError::InferenceFailure(_)));
    }
}
