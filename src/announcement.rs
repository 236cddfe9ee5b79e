//! Debounces per-frame detections into stable, rate-limited announcements.

use std::time::{Duration, Instant};
use serde::{Deserialize, Serialize};
use crate::common::Detection;
use crate::data::PipelineConfig;

/// Something the presentation context should do. Posted by the worker, never awaited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PresentationEvent {
    /// Show the locked label.
    Display { label: String, confidence: f32 },
    /// Speak the locked label.
    Speak { label: String, confidence: f32 },
    /// Nothing stable is in view any more.
    Clear,
    /// The model could not be loaded; shown persistently.
    ModelUnavailable(String),
}

impl PresentationEvent {
    pub fn deliver(self, sink: &mut dyn AnnouncementSink) {
        match self {
            PresentationEvent::Display { label, confidence } => sink.display(&label, confidence),
            PresentationEvent::Speak { label, confidence } => sink.speak(&label, confidence),
            PresentationEvent::Clear => sink.clear(),
            PresentationEvent::ModelUnavailable(reason) => sink.model_unavailable(&reason),
        }
    }
}

/// User-facing speech and display. Calls are fire-and-forget.
pub trait AnnouncementSink: Send {
    fn display(&mut self, label: &str, confidence: f32);

    fn speak(&mut self, label: &str, confidence: f32);

    fn clear(&mut self) {}

    fn model_unavailable(&mut self, reason: &str) {
        log::warn!("Model unavailable: {reason}");
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AnnouncementState {
    #[default]
    Idle,
    Stabilizing { label: String, count: u32 },
    /// Stable label; speaking is gated by the last announcement time.
    Locked { label: String },
}

#[derive(Debug, Clone)]
pub struct AnnouncementController {
    stability_threshold: u32,
    speak_interval: Duration,
    state: AnnouncementState,
    /// Shared by all labels and kept across resets.
    last_spoken_at: Option<Instant>,
}

impl AnnouncementController {
    pub fn new(stability_threshold: u32, speak_interval: Duration) -> Self {
        Self {
            stability_threshold: stability_threshold.max(1),
            speak_interval,
            state: AnnouncementState::Idle,
            last_spoken_at: None,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.stability_threshold, config.speak_interval())
    }

    pub fn state(&self) -> &AnnouncementState {
        &self.state
    }

    pub fn last_spoken_at(&self) -> Option<Instant> {
        self.last_spoken_at
    }

    /// Advances the state machine by one admitted frame, given its top detection if any.
    pub fn on_frame(&mut self, top: Option<&Detection>, now: Instant) -> Vec<PresentationEvent> {
        let mut events = Vec::new();

        let Some(det) = top else {
            if matches!(self.state, AnnouncementState::Locked { .. }) {
                events.push(PresentationEvent::Clear);
            }
            self.state = AnnouncementState::Idle;
            return events;
        };

        let count = match &self.state {
            AnnouncementState::Locked { label } if *label == det.label => None,
            AnnouncementState::Locked { .. } => {
                events.push(PresentationEvent::Clear);
                Some(1)
            }
            AnnouncementState::Stabilizing { label, count } if *label == det.label => Some(count + 1),
            _ => Some(1),
        };
        let Some(count) = count else {
            self.locked_frame(det, now, &mut events);
            return events;
        };

        if count >= self.stability_threshold {
            log::debug!("Locked on {} after {} frames", det.label, count);
            self.state = AnnouncementState::Locked { label: det.label.clone() };
            self.locked_frame(det, now, &mut events);
        } else {
            self.state = AnnouncementState::Stabilizing {
                label: det.label.clone(),
                count,
            };
        }
        events
    }

    fn locked_frame(&mut self, det: &Detection, now: Instant, events: &mut Vec<PresentationEvent>) {
        events.push(PresentationEvent::Display {
            label: det.label.clone(),
            confidence: det.confidence,
        });

        let due = match self.last_spoken_at {
            None => true,
            Some(at) => now.saturating_duration_since(at) >= self.speak_interval,
        };
        if due {
            self.last_spoken_at = Some(now);
            events.push(PresentationEvent::Speak {
                label: det.label.clone(),
                confidence: det.confidence,
            });
        }
    }

    pub fn reset(&mut self) {
        self.state = AnnouncementState::Idle;
    }
}
