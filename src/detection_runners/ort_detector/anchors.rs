//! Box decoding for single-shot detectors exported without their post-processing head.
//!
//! Each raw box is a `(ty, tx, th, tw)` delta against a prior anchor `(yc, xc, h, w)`:
//! `yc' = ty / sy * h + yc`, `xc' = tx / sx * w + xc`, `h' = exp(th / sh) * h`, `w' = exp(tw / sw) * w`.

use std::path::Path;
use anyhow::{bail, Context, Result};
use crate::common::{DetectorError, NormBox};
use crate::data::{DetectionRaw, RawOutputs};
use crate::detection_runners::ort_detector::nms::nms;
use crate::utils;

/// IoU used to collapse overlapping anchors when the pipeline configures none.
pub const DEFAULT_ANCHOR_NMS_IOU: f32 = 0.6;

#[derive(Debug, Clone, PartialEq)]
pub struct AnchorDecoder {
    /// `(yc, xc, h, w)` per anchor.
    anchors: Vec<[f32; 4]>,
    scales: [f32; 4],
}

impl AnchorDecoder {
    pub fn new(anchors: Vec<[f32; 4]>, scales: [f32; 4]) -> Self {
        Self { anchors, scales }
    }

    /// Reads one `yc,xc,h,w` anchor per line; commas or whitespace separate the values.
    pub fn from_file(path: impl AsRef<Path>, scales: [f32; 4]) -> Result<Self> {
        let path = path.as_ref();
        let lines = utils::file_to_vec(path).with_context(|| format!("unable to read anchors {}", path.display()))?;
        let anchors = Self::parse(&lines).with_context(|| format!("invalid anchor file {}", path.display()))?;
        log::info!("Loaded {} anchors from {}", anchors.len(), path.display());
        Ok(Self::new(anchors, scales))
    }

    fn parse<S: AsRef<str>>(lines: &[S]) -> Result<Vec<[f32; 4]>> {
        let mut anchors = Vec::with_capacity(lines.len());
        for (n, line) in lines.iter().enumerate() {
            let line = line.as_ref().trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let values = line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(str::parse::<f32>)
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("line {}", n + 1))?;
            match values[..] {
                [yc, xc, h, w] => anchors.push([yc, xc, h, w]),
                _ => bail!("line {}: expected 4 values, got {}", n + 1, values.len()),
            }
        }
        if anchors.is_empty() {
            bail!("no anchors");
        }
        Ok(anchors)
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Decodes one anchor's deltas into a `[top, left, bottom, right]` box.
    pub fn decode_box(&self, anchor: &[f32; 4], deltas: &[f32]) -> [f32; 4] {
        let [yc_a, xc_a, h_a, w_a] = *anchor;
        let [sy, sx, sh, sw] = self.scales;
        let yc = deltas[0] / sy * h_a + yc_a;
        let xc = deltas[1] / sx * w_a + xc_a;
        let h = (deltas[2] / sh).exp() * h_a;
        let w = (deltas[3] / sw).exp() * w_a;
        let b = NormBox::from_center(yc, xc, h, w);
        [b.top, b.left, b.bottom, b.right]
    }

    /// Fills at most `capacity` slots from raw `[N, 4]` deltas and `[N, C + 1]` class logits.
    ///
    /// Column 0 of the logits is the background class and never wins. Candidates under
    /// `min_score` are skipped, the rest go through greedy NMS at `iou` before the top slots are kept.
    pub fn decode(
        &self,
        deltas: &[f32],
        logits: &[f32],
        min_score: f32,
        iou: f32,
        capacity: usize,
    ) -> Result<RawOutputs, DetectorError> {
        let n = self.anchors.len();
        if deltas.len() != n * 4 {
            return Err(DetectorError::inference(format!(
                "box encodings hold {} values, expected {} for {} anchors",
                deltas.len(), n * 4, n
            )));
        }
        if logits.is_empty() || logits.len() % n != 0 || logits.len() / n < 2 {
            return Err(DetectorError::inference(format!(
                "class predictions hold {} values, not a multiple of {} anchors with a background column",
                logits.len(), n
            )));
        }
        let columns = logits.len() / n;

        let mut candidates: Vec<DetectionRaw> = self
            .anchors
            .iter()
            .zip(deltas.chunks_exact(4))
            .zip(logits.chunks_exact(columns))
            .filter_map(|((anchor, delta), row)| {
                let (best, logit) = row[1..]
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))?;
                let score = sigmoid(*logit);
                if score.is_nan() || score < min_score {
                    return None;
                }
                Some(DetectionRaw::new(self.decode_box(anchor, delta), best as i64, score))
            })
            .collect();

        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        nms(&mut candidates, iou);
        candidates.truncate(capacity);

        let num_valid = candidates.len();
        Ok(RawOutputs::new(candidates, num_valid))
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1. / (1. + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logit(p: f32) -> f32 {
        (p / (1. - p)).ln()
    }

    fn decoder() -> AnchorDecoder {
        AnchorDecoder::new(
            vec![[0.25, 0.25, 0.5, 0.5], [0.75, 0.75, 0.5, 0.5], [0.26, 0.25, 0.5, 0.5]],
            [10., 10., 5., 5.],
        )
    }

    #[test]
    fn zero_deltas_reproduce_the_anchor() {
        let b = decoder().decode_box(&[0.5, 0.5, 0.2, 0.4], &[0., 0., 0., 0.]);
        let expected = [0.4, 0.3, 0.6, 0.7];
        for (got, want) in b.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "{b:?}");
        }
    }

    #[test]
    fn deltas_shift_and_scale() {
        // ty = 10 moves the center one anchor height down, th = 5 * ln 2 doubles the height.
        let b = decoder().decode_box(&[0.5, 0.5, 0.2, 0.2], &[10., 0., 5. * 2f32.ln(), 0.]);
        assert!((b[0] - 0.5).abs() < 1e-5, "{b:?}");
        assert!((b[2] - 0.9).abs() < 1e-5, "{b:?}");
        assert!((b[1] - 0.4).abs() < 1e-5, "{b:?}");
    }

    #[test]
    fn background_column_never_wins() {
        let logits = [
            9., logit(0.2), logit(0.8),
            9., logit(0.1), logit(0.1),
            9., logit(0.7), logit(0.3),
        ];
        let out = decoder().decode(&[0.; 12], &logits, 0.5, 0.6, 10).unwrap();
        let got: Vec<(i64, f32)> = out.valid().iter().map(|r| (r.class_id, (r.score * 100.).round())).collect();
        // The third anchor overlaps the first and is suppressed.
        assert_eq!(got, vec![(1, 80.)]);
    }

    #[test]
    fn nan_scores_never_suppress_real_boxes() {
        // Anchors 0 and 2 overlap almost entirely; anchor 0 has a NaN logit.
        let logits = [0., f32::NAN, 0., -9., 0., logit(0.9)];
        let raw = decoder().decode(&[0.; 12], &logits, 0.5, 0.6, 10).unwrap();
        assert_eq!(raw.num_valid(), 1);
        assert!((raw.valid()[0].score - 0.9).abs() < 1e-5);
        assert_eq!(raw.valid()[0].class_id, 0);
    }

    #[test]
    fn keeps_top_slots_only() {
        let logits = [0., 3., 0., 2., 0., 1.];
        let decoder = AnchorDecoder::new(
            vec![[0.1, 0.1, 0.1, 0.1], [0.5, 0.5, 0.1, 0.1], [0.9, 0.9, 0.1, 0.1]],
            [10., 10., 5., 5.],
        );
        let out = decoder.decode(&[0.; 12], &logits, 0., 0.6, 2).unwrap();
        assert_eq!(out.num_valid(), 2);
        assert!(out.valid()[0].score > out.valid()[1].score);
    }

    #[test]
    fn shape_mismatch_is_an_inference_failure() {
        let err = decoder().decode(&[0.; 8], &[0.; 6], 0.5, 0.6, 10).unwrap_err();
        assert!(matches!(err, DetectorError::InferenceFailure(_)));
        let err = decoder().decode(&[0.; 12], &[0.; 3], 0.5, 0.6, 10).unwrap_err();
        assert!(matches!(err, DetectorError::InferenceFailure(_)));
    }

    #[test]
    fn parses_anchor_lines() {
        let anchors = AnchorDecoder::parse(&["# yc,xc,h,w", "0.1,0.2,0.3,0.4", "", "0.5 0.6 0.7 0.8"]).unwrap();
        assert_eq!(anchors, vec![[0.1, 0.2, 0.3, 0.4], [0.5, 0.6, 0.7, 0.8]]);
        assert!(AnchorDecoder::parse(&["0.1,0.2,0.3"]).is_err());
        assert!(AnchorDecoder::parse(&["a,b,c,d"]).is_err());
        assert!(AnchorDecoder::parse::<&str>(&[]).is_err());
    }
}
