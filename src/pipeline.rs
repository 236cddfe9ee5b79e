//! One reusable detection session: admission gate, worker thread and presenter thread.

mod admission_gate;
mod stats;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use crossbeam_channel::{select, TrySendError};
use crate::announcement::{AnnouncementController, AnnouncementSink, PresentationEvent};
use crate::common::{DetectorError, RawFrame};
use crate::data::send_channels::{pipeline_channels, AdmittedFrame, AnnotatorLoad, DetectionState, SendState};
use crate::data::PipelineConfig;
use crate::detection_runners::{FrameAnnotator, OrtSsdDetector};

pub use admission_gate::{Admission, AdmissionGate, ModelStatus};
pub(crate) use admission_gate::StatusCell;
pub use stats::{PipelineStats, StatsSnapshot};

type AnnotatorLoader = Box<dyn FnOnce() -> AnnotatorLoad + Send>;

/// Sink used when the host registers none: announcements go to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl AnnouncementSink for LogSink {
    fn display(&mut self, label: &str, confidence: f32) {
        log::info!("Display: {} ({:.0}%)", label, confidence * 100.);
    }

    fn speak(&mut self, label: &str, _confidence: f32) {
        log::info!("Speak: {}", label);
    }

    fn clear(&mut self) {
        log::info!("Display cleared");
    }
}

pub struct PipelineBuilder {
    config: PipelineConfig,
    loader: Option<AnnotatorLoader>,
    sink: Option<Box<dyn AnnouncementSink>>,
}

impl PipelineBuilder {
    /// Without an explicit annotator the on-device ONNX detector is loaded from `config.model`.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            loader: None,
            sink: None,
        }
    }

    /// Uses an annotator that is already constructed.
    pub fn with_annotator<A: FrameAnnotator + 'static>(mut self, annotator: A) -> Self {
        self.loader = Some(Box::new(move || -> AnnotatorLoad { Ok(Box::new(annotator)) }));
        self
    }

    /// Builds the annotator on the background loader thread.
    pub fn with_annotator_loader<F>(mut self, loader: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<Box<dyn FrameAnnotator>> + Send + 'static,
    {
        self.loader = Some(Box::new(loader));
        self
    }

    pub fn with_sink<S: AnnouncementSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn build(self) -> Result<DetectionPipeline, DetectorError> {
        self.config.validate()?;
        let loader: AnnotatorLoader = match self.loader {
            Some(loader) => loader,
            None => {
                let config = self.config.clone();
                Box::new(move || {
                    OrtSsdDetector::new(&config)
                        .map(|d| Box::new(d) as Box<dyn FrameAnnotator>)
                        .map_err(anyhow::Error::from)
                })
            }
        };
        let sink: Box<dyn AnnouncementSink> = self.sink.unwrap_or_else(|| Box::new(LogSink));
        DetectionPipeline::start(self.config, loader, sink)
    }
}

/// Handle owned by the host. Frames may be submitted from any thread.
pub struct DetectionPipeline {
    config: PipelineConfig,
    gate: Arc<AdmissionGate>,
    status: Arc<StatusCell>,
    stats: Arc<PipelineStats>,
    send_state: Option<SendState>,
    worker: Option<JoinHandle<()>>,
    presenter: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for DetectionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionPipeline")
            .field("status", &self.status())
            .field("gate", &self.gate)
            .finish()
    }
}

fn spawn_named<F: FnOnce() + Send + 'static>(name: &str, f: F) -> Result<JoinHandle<()>, DetectorError> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|e| DetectorError::config(format!("unable to spawn {name} thread: {e}")))
}

impl DetectionPipeline {
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    fn start(
        config: PipelineConfig,
        loader: AnnotatorLoader,
        mut sink: Box<dyn AnnouncementSink>,
    ) -> Result<Self, DetectorError> {
        let (send_state, detection_state, annotator_tx, event_rx) = pipeline_channels();
        let gate = Arc::new(AdmissionGate::new(config.min_frame_interval()));
        let status = Arc::new(StatusCell::new());
        let stats = Arc::new(PipelineStats::default());

        let presenter = spawn_named("presenter", move || {
            for event in event_rx.iter() {
                event.deliver(sink.as_mut());
            }
            log::debug!("Presenter stopped");
        })?;

        let worker = {
            let worker = Worker {
                state: detection_state,
                controller: AnnouncementController::from_config(&config),
                gate: gate.clone(),
                status: status.clone(),
                stats: stats.clone(),
            };
            spawn_named("detection-worker", move || worker.run())?
        };

        spawn_named("model-loader", move || {
            let started = Instant::now();
            let loaded = catch_unwind(AssertUnwindSafe(loader))
                .unwrap_or_else(|_| Err(anyhow::anyhow!("annotator loader panicked")));
            if loaded.is_ok() {
                log::info!("Annotator loaded in {:?}", started.elapsed());
            }
            // The worker is gone if the pipeline shut down while loading.
            let _ = annotator_tx.send(loaded);
        })?;

        log::info!(
            "Detection pipeline started: throttle {:?}, stability {}, speak interval {:?}",
            config.min_frame_interval(),
            config.stability_threshold,
            config.speak_interval(),
        );

        Ok(Self {
            config,
            gate,
            status,
            stats,
            send_state: Some(send_state),
            worker: Some(worker),
            presenter: Some(presenter),
        })
    }

    /// Offers a frame. It is either handed to the worker or dropped on the spot.
    pub fn submit(&self, frame: RawFrame) -> Admission {
        self.submit_at(frame, Instant::now())
    }

    /// Like [`DetectionPipeline::submit`] with an explicit arrival time.
    pub fn submit_at(&self, frame: RawFrame, now: Instant) -> Admission {
        let admission = match &self.send_state {
            None => Admission::Closed,
            Some(send_state) => match self.gate.try_admit(now, self.is_ready()) {
                Admission::Admitted => {
                    let admitted = AdmittedFrame {
                        frame,
                        admitted_at: now,
                    };
                    match send_state.frame_tx.try_send(admitted) {
                        Ok(()) => Admission::Admitted,
                        Err(TrySendError::Full(_)) => {
                            self.gate.release();
                            Admission::Busy
                        }
                        Err(TrySendError::Disconnected(_)) => {
                            self.gate.release();
                            Admission::Closed
                        }
                    }
                }
                other => other,
            },
        };
        self.stats.record_admission(admission);
        log::trace!("Frame {:?}", admission);
        admission
    }

    pub fn status(&self) -> ModelStatus {
        self.status.get()
    }

    pub fn is_ready(&self) -> bool {
        self.status() == ModelStatus::Ready
    }

    /// Polls until the model leaves `Loading` or the timeout passes.
    pub fn wait_until_loaded(&self, timeout: Duration) -> ModelStatus {
        let deadline = Instant::now() + timeout;
        loop {
            let status = self.status();
            if status != ModelStatus::Loading || Instant::now() >= deadline {
                return status;
            }
            thread::sleep(Duration::from_millis(2));
        }
    }

    /// No frame is in flight.
    pub fn is_idle(&self) -> bool {
        !self.gate.is_busy()
    }

    /// Polls until the in-flight frame, if any, is done. Returns whether the worker went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_idle() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Stops admitting frames, lets the in-flight frame finish, releases the annotator and
    /// drains every pending presentation event.
    pub fn shutdown(&mut self) {
        self.gate.close();
        if self.send_state.take().is_none() {
            return;
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Detection worker panicked");
            }
        }
        if let Some(presenter) = self.presenter.take() {
            if presenter.join().is_err() {
                log::error!("Presenter panicked");
            }
        }
        log::info!("Detection pipeline stopped: {:?}", self.stats());
    }
}

impl Drop for DetectionPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// State owned by the worker thread. The controller is only ever touched here.
struct Worker {
    state: DetectionState,
    controller: AnnouncementController,
    gate: Arc<AdmissionGate>,
    status: Arc<StatusCell>,
    stats: Arc<PipelineStats>,
}

impl Worker {
    fn run(mut self) {
        let mut annotator: Option<Box<dyn FrameAnnotator>> = None;
        let mut loading = Some(self.state.annotator_rx.clone());
        let frame_rx = self.state.frame_rx.clone();

        loop {
            let load_rx = loading.clone().unwrap_or_else(crossbeam_channel::never);
            select! {
                recv(load_rx) -> msg => {
                    loading = None;
                    match msg {
                        Ok(Ok(loaded)) => {
                            log::info!("Annotator {} ready", loaded.name());
                            annotator = Some(loaded);
                            self.status.set(ModelStatus::Ready);
                        }
                        Ok(Err(err)) => self.model_unavailable(format!("{:#}", err)),
                        Err(_) => self.model_unavailable("annotator loader vanished".to_string()),
                    }
                }
                recv(frame_rx) -> msg => match msg {
                    Ok(admitted) => {
                        match annotator.as_mut() {
                            Some(annotator) => self.process(annotator.as_mut(), admitted),
                            None => log::debug!("Dropping frame {}: no annotator", admitted.frame.index),
                        }
                        self.gate.release();
                    }
                    Err(_) => break,
                },
            }
        }

        if let Some(mut annotator) = annotator {
            annotator.finish();
            drop(annotator);
            log::info!("Annotator released");
        }
    }

    fn model_unavailable(&mut self, reason: String) {
        log::error!("Model unavailable: {reason}");
        self.status.set(ModelStatus::Unavailable);
        let _ = self.state.event_tx.send(PresentationEvent::ModelUnavailable(reason));
    }

    fn process(&mut self, annotator: &mut dyn FrameAnnotator, admitted: AdmittedFrame) {
        let started = Instant::now();
        let AdmittedFrame { frame, admitted_at } = admitted;

        let result = catch_unwind(AssertUnwindSafe(|| annotator.annotate(&frame)))
            .unwrap_or_else(|_| Err(DetectorError::inference(format!("{} panicked", annotator.name()))));
        self.stats.record_processed(started.elapsed());

        let detections = match result {
            Ok(detections) => detections,
            Err(err @ DetectorError::InvalidFrameFormat(_)) => {
                log::debug!("Frame {} dropped: {}", frame.index, err);
                self.stats.record_invalid_frame();
                return;
            }
            Err(err) => {
                log::warn!("Frame {} abandoned: {}", frame.index, err);
                self.stats.record_inference_failure();
                return;
            }
        };

        log::trace!("Frame {}: {} detections", frame.index, detections.len());
        for event in self.controller.on_frame(detections.first(), admitted_at) {
            match &event {
                PresentationEvent::Display { .. } => self.stats.record_display(),
                PresentationEvent::Speak { .. } => self.stats.record_announcement(),
                _ => {}
            }
            let _ = self.state.event_tx.send(event);
        }
    }
}

/// Forwards presentation events to a channel the host polls.
#[derive(Debug, Clone)]
pub struct ChannelSink(pub crossbeam_channel::Sender<PresentationEvent>);

impl AnnouncementSink for ChannelSink {
    fn display(&mut self, label: &str, confidence: f32) {
        let _ = self.0.send(PresentationEvent::Display {
            label: label.to_string(),
            confidence,
        });
    }

    fn speak(&mut self, label: &str, confidence: f32) {
        let _ = self.0.send(PresentationEvent::Speak {
            label: label.to_string(),
            confidence,
        });
    }

    fn clear(&mut self) {
        let _ = self.0.send(PresentationEvent::Clear);
    }

    fn model_unavailable(&mut self, reason: &str) {
        let _ = self.0.send(PresentationEvent::ModelUnavailable(reason.to_string()));
    }
}
