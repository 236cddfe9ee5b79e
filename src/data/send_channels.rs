use std::time::Instant;
use crossbeam_channel::{Receiver, Sender};
use crate::announcement::PresentationEvent;
use crate::common::RawFrame;
use crate::detection_runners::FrameAnnotator;

/// Result of the one-time background model load.
pub type AnnotatorLoad = anyhow::Result<Box<dyn FrameAnnotator>>;

/// A frame that passed the admission gate, stamped with its admission time.
#[derive(Debug)]
pub struct AdmittedFrame {
    pub frame: RawFrame,
    pub admitted_at: Instant,
}

/// Ends owned by the pipeline worker thread.
pub struct DetectionState {
    pub frame_rx: Receiver<AdmittedFrame>,
    pub annotator_rx: Receiver<AnnotatorLoad>,
    pub event_tx: Sender<PresentationEvent>,
}

/// Ends owned by the frame producer side of the pipeline.
#[derive(Debug)]
pub struct SendState {
    pub frame_tx: Sender<AdmittedFrame>,
}

/// Builds the single-slot frame channel, the single-slot model channel and the presentation channel.
pub fn pipeline_channels() -> (SendState, DetectionState, Sender<AnnotatorLoad>, Receiver<PresentationEvent>) {
    let (frame_tx, frame_rx) = crossbeam_channel::bounded(1);
    let (annotator_tx, annotator_rx) = crossbeam_channel::bounded(1);
    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    (
        SendState { frame_tx },
        DetectionState {
            frame_rx,
            annotator_rx,
            event_tx,
        },
        annotator_tx,
        event_rx,
    )
}
