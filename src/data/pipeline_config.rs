//! Options for building a detection pipeline.

use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use crate::common::{BoxEncoding, DetectorError, InferenceDevice, ModelConfig};
use crate::data::ResizeFilter;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_LABEL_OFFSET: i64 = 1;
pub const DEFAULT_STABILITY_THRESHOLD: u32 = 5;
pub const DEFAULT_SPEAK_INTERVAL_MS: u64 = 2500;
pub const DEFAULT_MIN_FRAME_INTERVAL_MS: u64 = 300;

const CONFIG_DIR_NAME: &str = "assist_detect";
const CONFIG_FILE_NAME: &str = "pipeline.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub model: ModelConfig,
    pub confidence_threshold: f32,
    /// Reserved leading label entries (the background class) skipped when resolving class ids.
    pub label_offset: i64,
    /// Greedy NMS is applied when set.
    pub nms_iou: Option<f32>,
    /// When set, only these labels survive decoding.
    pub wanted_labels: Option<Vec<String>>,
    pub stability_threshold: u32,
    pub speak_interval_ms: u64,
    pub min_frame_interval_ms: u64,
    pub resize_filter: ResizeFilter,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            label_offset: DEFAULT_LABEL_OFFSET,
            nms_iou: None,
            wanted_labels: None,
            stability_threshold: DEFAULT_STABILITY_THRESHOLD,
            speak_interval_ms: DEFAULT_SPEAK_INTERVAL_MS,
            min_frame_interval_ms: DEFAULT_MIN_FRAME_INTERVAL_MS,
            resize_filter: ResizeFilter::Bilinear,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_model(mut self, model_path: &str, labels_path: &str) -> Self {
        self.model.model_path = model_path.to_string();
        self.model.labels_path = labels_path.to_string();
        self
    }

    pub fn with_model_config(mut self, model: ModelConfig) -> Self {
        self.model = model;
        self
    }

    pub fn with_ort_lib_path(mut self, ort_lib_path: &str) -> Self {
        self.model.ort_lib_path = Some(ort_lib_path.to_string());
        self
    }

    pub fn with_device(mut self, device: InferenceDevice) -> Self {
        self.model.inference_device = device;
        self
    }

    pub fn with_input_size(mut self, side: u32) -> Self {
        self.model.input_size = side;
        self
    }

    pub fn with_box_encoding(mut self, encoding: BoxEncoding) -> Self {
        self.model.box_encoding = encoding;
        self
    }

    pub fn with_confidence_threshold(mut self, x: f32) -> Self {
        self.confidence_threshold = x;
        self
    }

    pub fn with_label_offset(mut self, x: i64) -> Self {
        self.label_offset = x;
        self
    }

    pub fn with_nms_iou(mut self, x: f32) -> Self {
        self.nms_iou = Some(x);
        self
    }

    pub fn with_wanted_labels(mut self, labels: &[&str]) -> Self {
        self.wanted_labels = Some(labels.iter().map(|x| x.to_string()).collect::<Vec<String>>());
        self
    }

    pub fn with_stability_threshold(mut self, n: u32) -> Self {
        self.stability_threshold = n;
        self
    }

    pub fn with_speak_interval_ms(mut self, ms: u64) -> Self {
        self.speak_interval_ms = ms;
        self
    }

    pub fn with_min_frame_interval_ms(mut self, ms: u64) -> Self {
        self.min_frame_interval_ms = ms;
        self
    }

    pub fn with_resize_filter(mut self, filter: ResizeFilter) -> Self {
        self.resize_filter = filter;
        self
    }

    pub fn speak_interval(&self) -> Duration {
        Duration::from_millis(self.speak_interval_ms)
    }

    pub fn min_frame_interval(&self) -> Duration {
        Duration::from_millis(self.min_frame_interval_ms)
    }

    pub fn validate(&self) -> Result<(), DetectorError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(DetectorError::config(format!(
                "confidence threshold {} is outside [0, 1]", self.confidence_threshold
            )));
        }
        if let Some(iou) = self.nms_iou {
            if !(0.0..=1.0).contains(&iou) {
                return Err(DetectorError::config(format!("NMS IoU {iou} is outside [0, 1]")));
            }
        }
        if self.model.input_size == 0 {
            return Err(DetectorError::config("model input size must be non-zero"));
        }
        if self.model.num_detections == 0 {
            return Err(DetectorError::config("model must expose at least one detection slot"));
        }
        if self.stability_threshold == 0 {
            return Err(DetectorError::config("stability threshold must be at least 1"));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json).context("Failed to parse pipeline config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline config {}", path.display()))?;
        Self::from_json_str(&json).with_context(|| format!("Invalid pipeline config {}", path.display()))
    }

    /// `<config dir>/assist_detect/pipeline.json`, e.g. `~/.config/assist_detect/pipeline.json`.
    pub fn default_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Unsupported operating system. Supported OS: Linux, MacOS, Windows."))?;
        path.push(CONFIG_DIR_NAME);
        path.push(CONFIG_FILE_NAME);
        Ok(path)
    }

    /// Loads the per-user config file, falling back to defaults when none exists.
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::from_json_file(&path)
        } else {
            log::info!("No pipeline config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model.input_size, 300);
        assert_eq!(config.model.num_detections, 10);
        assert_eq!(config.label_offset, 1);
        assert_eq!(config.speak_interval(), Duration::from_millis(2500));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let json = r#"{
            "model": { "model_path": "ssd.onnx", "labels_path": "labels.txt", "inference_device": { "CUDA": 0 } },
            "confidence_threshold": 0.6,
            "wanted_labels": ["bottle", "cup"]
        }"#;
        let config = PipelineConfig::from_json_str(json).unwrap();
        assert_eq!(config.model.model_path, "ssd.onnx");
        assert_eq!(config.model.inference_device, InferenceDevice::CUDA(0));
        assert_eq!(config.model.input_size, 300);
        assert_eq!(config.confidence_threshold, 0.6);
        assert_eq!(config.stability_threshold, DEFAULT_STABILITY_THRESHOLD);
        assert_eq!(config.wanted_labels.as_deref().map(|l| l.len()), Some(2));
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(PipelineConfig::new().with_confidence_threshold(1.5).validate().is_err());
        assert!(PipelineConfig::new().with_stability_threshold(0).validate().is_err());
        assert!(PipelineConfig::new().with_input_size(0).validate().is_err());
        assert!(PipelineConfig::new().with_nms_iou(-0.1).validate().is_err());
        assert!(PipelineConfig::from_json_str(r#"{ "confidence_threshold": 2.0 }"#).is_err());
    }

    #[test]
    fn json_round_trip_keeps_anchor_encoding() {
        let config = PipelineConfig::new()
            .with_model("m.onnx", "l.txt")
            .with_box_encoding(BoxEncoding::anchor_deltas("anchors.csv"));
        let back = PipelineConfig::from_json_str(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }
}
