//! The single seam between camera frames and labeled detections.

use crate::common::{Detection, DetectorError, RawFrame, RgbRaster};
use crate::detection_runners::ort_detector::frame_converter;

/// Anything that can turn one camera frame into detections ordered by descending confidence.
///
/// Implementations are driven from a single worker thread, one frame at a time.
pub trait FrameAnnotator: Send {
    fn name(&self) -> &str;

    fn annotate(&mut self, frame: &RawFrame) -> Result<Vec<Detection>, DetectorError>;

    /// Called once when the pipeline shuts down, after the last frame.
    fn finish(&mut self) {}
}

impl std::fmt::Debug for dyn FrameAnnotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FrameAnnotator({})", self.name())
    }
}

type RasterFn = dyn FnMut(&RgbRaster) -> anyhow::Result<Vec<Detection>> + Send;

/// Annotator backed by any raster-to-detections function, e.g. a remote vision service client.
///
/// Frames go through the same color conversion as the on-device detector first.
pub struct ExternalAnnotator {
    name: String,
    confidence_threshold: f32,
    annotate_fn: Box<RasterFn>,
}

impl ExternalAnnotator {
    pub fn new<F>(name: &str, annotate_fn: F) -> Self
    where
        F: FnMut(&RgbRaster) -> anyhow::Result<Vec<Detection>> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            confidence_threshold: 0.,
            annotate_fn: Box::new(annotate_fn),
        }
    }

    pub fn with_confidence_threshold(mut self, x: f32) -> Self {
        self.confidence_threshold = x;
        self
    }
}

impl FrameAnnotator for ExternalAnnotator {
    fn name(&self) -> &str {
        &self.name
    }

    fn annotate(&mut self, frame: &RawFrame) -> Result<Vec<Detection>, DetectorError> {
        let raster = frame_converter::convert(frame)?;
        let mut detections = (self.annotate_fn)(&raster)
            .map_err(|e| DetectorError::inference(format!("{}: {:#}", self.name, e)))?;

        detections.retain(|d| d.confidence >= self.confidence_threshold);
        detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Ok(detections)
    }
}
