mod detection;
mod detector_error;
mod inference_device;
mod model_config;
mod norm_box;
mod raw_frame;
mod rgb_raster;

pub use detection::*;
pub use detector_error::*;
pub use inference_device::*;
pub use model_config::*;
pub use norm_box::*;
pub use raw_frame::*;
pub use rgb_raster::*;
