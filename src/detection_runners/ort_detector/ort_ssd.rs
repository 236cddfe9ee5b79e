use anyhow::{Context, Result};
use crate::common::{BoxEncoding, Detection, DetectorError, RawFrame, RgbRaster};
use crate::data::{LabelTable, PipelineConfig, RawOutputs, TimeCalc, X};
use crate::detection_runners::frame_annotator::FrameAnnotator;
use crate::detection_runners::inference_process::InferenceProcess;
use crate::detection_runners::ort_detector::anchors::{AnchorDecoder, DEFAULT_ANCHOR_NMS_IOU};
use crate::detection_runners::ort_detector::decoder::DetectionDecoder;
use crate::detection_runners::ort_detector::frame_converter;
use crate::detection_runners::ort_detector::image_ops::Preprocessor;
use crate::detection_runners::ort_detector::ort_engine::{EngineOutput, OrtEngine};

const STAGE_CONVERT: usize = 3;

/// Single-shot multi-box detector running on ONNX Runtime.
///
/// Owns the session, the label table and the decoding state. Not `Sync`: one frame at a time.
#[derive(Debug)]
pub struct OrtSsdDetector {
    engine: OrtEngine,
    preprocessor: Preprocessor,
    decoder: DetectionDecoder,
    anchors: Option<AnchorDecoder>,
    anchor_iou: f32,
    num_detections: usize,
    ts: TimeCalc,
}

impl OrtSsdDetector {
    /// Loads labels, anchors and the model. Any failure is a [`DetectorError::ModelLoadFailure`].
    pub fn new(config: &PipelineConfig) -> Result<Self, DetectorError> {
        Self::load(config).map_err(|e| {
            log::error!("Failed to load detector {}: {:#}", config.model.model_path, e);
            DetectorError::load(format!("{:#}", e))
        })
    }

    fn load(config: &PipelineConfig) -> Result<Self> {
        log::info!("Loading detector: {}", config.model.summary());
        let labels = LabelTable::from_file(&config.model.labels_path)?;

        let anchors = match &config.model.box_encoding {
            BoxEncoding::Normalized => None,
            BoxEncoding::AnchorDeltas { anchors_path, scales } => Some(AnchorDecoder::from_file(anchors_path, *scales)?),
        };

        let engine = OrtEngine::new(&config.model).context("Failed to initialize ORT session")?;

        let mut side = config.model.input_size;
        if let Some(model_side) = engine.input_side() {
            if model_side != side {
                log::warn!("Model declares a {model_side}x{model_side} input, ignoring configured side {side}");
                side = model_side;
            }
        }

        Ok(Self {
            engine,
            preprocessor: Preprocessor::new(side, config.resize_filter),
            decoder: DetectionDecoder::from_config(labels, config),
            anchors,
            anchor_iou: config.nms_iou.unwrap_or(DEFAULT_ANCHOR_NMS_IOU),
            num_detections: config.model.num_detections,
            ts: TimeCalc::with_stages(STAGE_CONVERT + 1),
        })
    }

    pub fn engine(&self) -> &OrtEngine {
        &self.engine
    }

    pub fn decoder(&self) -> &DetectionDecoder {
        &self.decoder
    }

    fn raw_outputs(&self, outputs: &[EngineOutput]) -> Result<RawOutputs, DetectorError> {
        match &self.anchors {
            None => {
                let [boxes, classes, scores, count] = select_post_processed(outputs)?;
                RawOutputs::from_tensors(
                    flat(boxes)?,
                    flat(classes)?,
                    flat(scores)?,
                    flat(count)?.first().copied().unwrap_or(0.),
                    self.num_detections,
                )
            }
            Some(anchors) => {
                let [deltas, logits] = select_raw_head(outputs)?;
                anchors.decode(
                    flat(deltas)?,
                    flat(logits)?,
                    self.decoder.confidence_threshold(),
                    self.anchor_iou,
                    self.num_detections,
                )
            }
        }
    }
}

fn flat(output: &EngineOutput) -> Result<&[f32], DetectorError> {
    output
        .data
        .as_slice()
        .ok_or_else(|| DetectorError::inference(format!("output {} is not contiguous", output.name)))
}

/// Picks boxes, classes, scores and count from a post-processed head.
///
/// Names are matched first; otherwise the conventional declaration order is assumed.
pub(crate) fn select_post_processed(outputs: &[EngineOutput]) -> Result<[&EngineOutput; 4], DetectorError> {
    let find = |keys: &[&str]| {
        outputs.iter().find(|o| {
            let name = o.name.to_lowercase();
            keys.iter().any(|k| name.contains(k))
        })
    };
    if let (Some(b), Some(c), Some(s), Some(n)) = (
        find(&["box"]),
        find(&["class"]),
        find(&["score"]),
        find(&["num", "count"]),
    ) {
        return Ok([b, c, s, n]);
    }
    match outputs {
        [b, c, s, n, ..] => Ok([b, c, s, n]),
        _ => Err(DetectorError::inference(format!(
            "expected 4 detection outputs (boxes, classes, scores, count), model has {}",
            outputs.len()
        ))),
    }
}

/// Picks raw box deltas (last axis of 4) and class logits from a head without post-processing.
pub(crate) fn select_raw_head(outputs: &[EngineOutput]) -> Result<[&EngineOutput; 2], DetectorError> {
    let is_boxes = |o: &EngineOutput| o.data.shape().last() == Some(&4);
    let deltas = outputs.iter().find(|o| is_boxes(o));
    let logits = outputs.iter().find(|o| !is_boxes(o));
    match (deltas, logits) {
        (Some(d), Some(l)) => Ok([d, l]),
        _ => Err(DetectorError::inference(format!(
            "expected box encodings and class predictions, model outputs are {:?}",
            outputs.iter().map(|o| (o.name.as_str(), o.data.shape())).collect::<Vec<_>>()
        ))),
    }
}

impl InferenceProcess for OrtSsdDetector {
    type Input = RgbRaster;

    fn preprocess(&mut self, x: &RgbRaster) -> Result<X, DetectorError> {
        self.preprocessor
            .process(x)
            .map_err(|e| DetectorError::inference(format!("preprocess: {e}")))
    }

    fn inference(&mut self, x: X) -> Result<RawOutputs, DetectorError> {
        let outputs = self
            .engine
            .engine_run(&x)
            .map_err(|e| DetectorError::inference(format!("{:#}", e)))?;
        self.raw_outputs(&outputs)
    }

    fn postprocess(&self, raw: RawOutputs) -> Result<Vec<Detection>, DetectorError> {
        Ok(self.decoder.decode(&raw))
    }

    fn time_calc(&mut self) -> &mut TimeCalc {
        &mut self.ts
    }
}

impl FrameAnnotator for OrtSsdDetector {
    fn name(&self) -> &str {
        "ort-ssd"
    }

    fn annotate(&mut self, frame: &RawFrame) -> Result<Vec<Detection>, DetectorError> {
        let t_conv = std::time::Instant::now();
        let raster = frame_converter::convert(frame)?;
        self.ts.add_or_push(STAGE_CONVERT, t_conv.elapsed());
        self.run(&raster)
    }

    fn finish(&mut self) {
        self.print_time();
        log::info!("> Frame conversion: {:?} (avg over {})", self.ts.avg_i(STAGE_CONVERT), self.ts.n_i(STAGE_CONVERT));
        log::info!(
            "> Session ({}) | Alignment: {:?} | Run: {:?} | Extract: {:?} (avg)",
            self.engine.device(),
            self.engine.ts().avg_i(0),
            self.engine.ts().avg_i(1),
            self.engine.ts().avg_i(2),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    fn output(name: &str, shape: &[usize]) -> EngineOutput {
        EngineOutput {
            name: name.to_string(),
            data: Array::zeros(IxDyn(shape)),
        }
    }

    #[test]
    fn post_processed_outputs_matched_by_name() {
        let outputs = vec![
            output("num_detections", &[1]),
            output("detection_scores", &[1, 10]),
            output("detection_boxes", &[1, 10, 4]),
            output("detection_classes", &[1, 10]),
        ];
        let [b, c, s, n] = select_post_processed(&outputs).unwrap();
        assert_eq!(
            [b.name.as_str(), c.name.as_str(), s.name.as_str(), n.name.as_str()],
            ["detection_boxes", "detection_classes", "detection_scores", "num_detections"]
        );
    }

    #[test]
    fn post_processed_outputs_fall_back_to_order() {
        let outputs = vec![
            output("TFLite_Detection_PostProcess", &[1, 10, 4]),
            output("TFLite_Detection_PostProcess:1", &[1, 10]),
            output("TFLite_Detection_PostProcess:2", &[1, 10]),
            output("TFLite_Detection_PostProcess:3", &[1]),
        ];
        let [b, _, s, n] = select_post_processed(&outputs).unwrap();
        assert_eq!(b.name, "TFLite_Detection_PostProcess");
        assert_eq!(s.name, "TFLite_Detection_PostProcess:2");
        assert_eq!(n.name, "TFLite_Detection_PostProcess:3");
        assert!(select_post_processed(&outputs[..3]).is_err());
    }

    #[test]
    fn raw_head_is_split_by_shape() {
        let outputs = vec![output("class_predictions", &[1, 1917, 91]), output("box_encodings", &[1, 1917, 4])];
        let [d, l] = select_raw_head(&outputs).unwrap();
        assert_eq!(d.name, "box_encodings");
        assert_eq!(l.name, "class_predictions");
        assert!(select_raw_head(&outputs[1..]).is_err());
    }

    #[test]
    fn missing_assets_are_a_load_failure() {
        let config = PipelineConfig::new().with_model("/nonexistent/model.onnx", "/nonexistent/labels.txt");
        let err = OrtSsdDetector::new(&config).unwrap_err();
        assert!(matches!(err, DetectorError::ModelLoadFailure(_)));
        assert!(!err.is_frame_local());
    }
}
