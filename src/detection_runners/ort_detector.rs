mod ort_engine;
mod ort_ssd;
pub mod anchors;
pub mod decoder;
pub mod frame_converter;
pub mod image_ops;
pub mod input_wrapper;
pub mod nms;
pub mod raw_outputs;

pub use ort_engine::*;
pub use ort_ssd::*;
