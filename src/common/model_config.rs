use serde::{Deserialize, Serialize};
use crate::common::inference_device::InferenceDevice;

pub const DEFAULT_INPUT_SIZE: u32 = 300;
pub const DEFAULT_NUM_DETECTIONS: usize = 10;

/// How the model reports its boxes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum BoxEncoding {
    /// Post-processed `[top, left, bottom, right]` slots plus class ids, scores and a count.
    #[default] Normalized,
    /// Raw per-anchor deltas and class scores, decoded against an anchor table.
    AnchorDeltas {
        anchors_path: String,
        /// `(y, x, h, w)` divisors applied to the raw deltas.
        scales: [f32; 4],
    },
}

impl BoxEncoding {
    pub fn anchor_deltas(anchors_path: &str) -> Self {
        BoxEncoding::AnchorDeltas {
            anchors_path: anchors_path.to_string(),
            scales: [10., 10., 5., 5.],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub model_path: String,
    pub labels_path: String,
    /// Dynamic ONNX Runtime library; the default search path is used when empty.
    pub ort_lib_path: Option<String>,
    pub inference_device: InferenceDevice,
    /// Side `S` of the square `[1, S, S, 3]` input tensor.
    pub input_size: u32,
    /// Fixed number of detection slots the model emits.
    pub num_detections: usize,
    pub intra_threads: usize,
    pub box_encoding: BoxEncoding,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: String::new(),
            labels_path: String::new(),
            ort_lib_path: None,
            inference_device: InferenceDevice::CPU,
            input_size: DEFAULT_INPUT_SIZE,
            num_detections: DEFAULT_NUM_DETECTIONS,
            intra_threads: 2,
            box_encoding: BoxEncoding::Normalized,
        }
    }
}

impl ModelConfig {
    pub fn new(model_path: &str, labels_path: &str) -> Self {
        Self {
            model_path: model_path.to_string(),
            labels_path: labels_path.to_string(),
            ..Default::default()
        }
    }

    pub fn with_ort_lib_path(mut self, ort_lib_path: &str) -> Self {
        self.ort_lib_path = Some(ort_lib_path.to_string());
        self
    }

    pub fn with_device(mut self, device: InferenceDevice) -> Self {
        self.inference_device = device;
        self
    }

    pub fn with_input_size(mut self, side: u32) -> Self {
        self.input_size = side;
        self
    }

    pub fn with_num_detections(mut self, n: usize) -> Self {
        self.num_detections = n;
        self
    }

    pub fn with_intra_threads(mut self, n: usize) -> Self {
        self.intra_threads = n;
        self
    }

    pub fn with_box_encoding(mut self, encoding: BoxEncoding) -> Self {
        self.box_encoding = encoding;
        self
    }

    /// Number of bytes in one input tensor.
    pub fn input_len(&self) -> usize {
        let s = self.input_size as usize;
        s * s * 3
    }

    pub fn summary(&self) -> String {
        format!("Model Path: {}\n\
        Labels Path: {}\n\
        OnnxRuntime Lib Path: {}\n\
        Inference Device: {}\n\
        Model Input Resolution: {}x{}\n\
        Detection Slots: {}\n\
        Box Encoding: {:?}",
                self.model_path, self.labels_path,
                self.ort_lib_path.as_deref().unwrap_or("<default>"),
                self.inference_device, self.input_size, self.input_size,
                self.num_detections, self.box_encoding)
    }
}
