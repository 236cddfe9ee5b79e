pub mod frame_annotator;
pub mod inference_process;
pub mod ort_detector;

pub use frame_annotator::*;
pub use ort_detector::*;
