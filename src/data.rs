mod label_table;
mod pipeline_config;
mod time_calc;
pub mod send_channels;

pub use label_table::LabelTable;
pub use pipeline_config::*;
pub use time_calc::TimeCalc;

pub use crate::detection_runners::ort_detector::image_ops::ResizeFilter;
pub use crate::detection_runners::ort_detector::input_wrapper::X;
pub use crate::detection_runners::ort_detector::raw_outputs::{DetectionRaw, RawOutputs};

pub(crate) const CROSS_MARK: &str = "❌";
