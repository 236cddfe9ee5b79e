#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use assist_detect::common::{Detection, DetectorError, NormBox, RawFrame, Rotation};
use assist_detect::detection_runners::FrameAnnotator;
use assist_detect::{AnnouncementSink, PresentationEvent};

/// A small, valid, neutral-grey I420 frame.
pub fn grey_frame(index: u64) -> RawFrame {
    RawFrame::from_i420(vec![128; 16], vec![128; 4], vec![128; 4], 4, 4, Rotation::Deg0).with_index(index)
}

/// A frame whose luma plane is too short for its declared size.
pub fn broken_frame() -> RawFrame {
    RawFrame::from_i420(vec![128; 3], vec![128; 4], vec![128; 4], 4, 4, Rotation::Deg0)
}

pub fn det(label: &str, confidence: f32) -> Detection {
    Detection::new(label, confidence, NormBox::new(0.2, 0.2, 0.7, 0.7))
}

/// One scripted reply per frame; the script repeats once exhausted.
pub enum Step {
    Detect(Vec<Detection>),
    Nothing,
    Fail,
}

#[derive(Clone, Default)]
pub struct Probe {
    pub calls: Arc<AtomicUsize>,
    pub finished: Arc<AtomicBool>,
}

impl Probe {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

pub struct ScriptedAnnotator {
    script: Vec<Step>,
    delay: Duration,
    probe: Probe,
}

impl ScriptedAnnotator {
    pub fn new(script: Vec<Step>) -> Self {
        Self {
            script,
            delay: Duration::ZERO,
            probe: Probe::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn probe(&self) -> Probe {
        self.probe.clone()
    }
}

impl FrameAnnotator for ScriptedAnnotator {
    fn name(&self) -> &str {
        "scripted"
    }

    fn annotate(&mut self, frame: &RawFrame) -> Result<Vec<Detection>, DetectorError> {
        frame.validate()?;
        let n = self.probe.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        match &self.script[n % self.script.len()] {
            Step::Detect(dets) => Ok(dets.clone()),
            Step::Nothing => Ok(Vec::new()),
            Step::Fail => Err(DetectorError::inference("scripted failure")),
        }
    }

    fn finish(&mut self) {
        self.probe.finished.store(true, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
pub struct RecordingSink {
    pub events: Arc<Mutex<Vec<PresentationEvent>>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<PresentationEvent> {
        self.events.lock().clone()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                PresentationEvent::Speak { label, .. } => Some(label.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&PresentationEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}

impl AnnouncementSink for RecordingSink {
    fn display(&mut self, label: &str, confidence: f32) {
        self.events.lock().push(PresentationEvent::Display {
            label: label.to_string(),
            confidence,
        });
    }

    fn speak(&mut self, label: &str, confidence: f32) {
        self.events.lock().push(PresentationEvent::Speak {
            label: label.to_string(),
            confidence,
        });
    }

    fn clear(&mut self) {
        self.events.lock().push(PresentationEvent::Clear);
    }

    fn model_unavailable(&mut self, reason: &str) {
        self.events.lock().push(PresentationEvent::ModelUnavailable(reason.to_string()));
    }
}
