mod utils;
pub mod announcement;
pub mod common;
pub mod data;
pub mod detection_runners;
pub mod pipeline;

use std::time::Instant;
use crate::common::{Detection, DetectorError, RawFrame};
use crate::data::PipelineConfig;
use crate::detection_runners::{FrameAnnotator, OrtSsdDetector};

pub use crate::announcement::{AnnouncementController, AnnouncementSink, PresentationEvent};
pub use crate::pipeline::{Admission, DetectionPipeline, ModelStatus, PipelineBuilder, StatsSnapshot};

pub type Result<T, E = DetectorError> = std::result::Result<T, E>;

/// Loads the on-device detector synchronously, for hosts that drive frames themselves.
pub fn init_detector(config: &PipelineConfig) -> Result<OrtSsdDetector> {
    config.validate()?;
    log::info!("Initializing ORT session with ({}) execution provider", config.model.inference_device);
    OrtSsdDetector::new(config)
}

/// Runs one frame through an annotator outside of a pipeline.
pub fn run_detection(annotator: &mut dyn FrameAnnotator, frame: &RawFrame) -> Result<Vec<Detection>> {
    let now = Instant::now();
    let detections = annotator.annotate(frame)?;
    log::debug!("{}: {} detections in {:?}", annotator.name(), detections.len(), now.elapsed());
    Ok(detections)
}
