//! Functions to preprocess rasters into model input tensors.

use anyhow::{bail, Result};
use fast_image_resize::{
    images::{Image as FirImage, ImageRef},
    pixels::PixelType,
    FilterType, ResizeAlg, ResizeOptions, Resizer,
};
use image::imageops;
use serde::{Deserialize, Serialize};
use crate::common::RgbRaster;
use crate::data::X;

/// Resampling used for the single uniform resize to the model side.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResizeFilter {
    #[default] Bilinear,
    Nearest,
}

impl ResizeFilter {
    fn resize_alg(&self) -> ResizeAlg {
        match self {
            ResizeFilter::Bilinear => ResizeAlg::Convolution(FilterType::Bilinear),
            ResizeFilter::Nearest => ResizeAlg::Nearest,
        }
    }

    fn fallback_filter(&self) -> imageops::FilterType {
        match self {
            ResizeFilter::Bilinear => imageops::FilterType::Triangle,
            ResizeFilter::Nearest => imageops::FilterType::Nearest,
        }
    }
}

/// Stretches a raster of any size to `side` x `side` and packs it as NHWC bytes in R,G,B order.
///
/// No letterboxing and no normalization: the quantized model consumes raw 0-255 values.
pub struct Preprocessor {
    side: u32,
    filter: ResizeFilter,
    resizer: Resizer,
}

impl std::fmt::Debug for Preprocessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preprocessor")
            .field("side", &self.side)
            .field("filter", &self.filter)
            .finish()
    }
}

impl Preprocessor {
    pub fn new(side: u32, filter: ResizeFilter) -> Self {
        Self {
            side,
            filter,
            resizer: Resizer::new(),
        }
    }

    pub fn side(&self) -> u32 {
        self.side
    }

    pub fn tensor_len(&self) -> usize {
        let s = self.side as usize;
        s * s * 3
    }

    pub fn process(&mut self, raster: &RgbRaster) -> Result<X> {
        let resized = self.resize(raster)?;
        if resized.len() != self.tensor_len() {
            bail!("Unexpected buffer size: got {}, expected {}", resized.len(), self.tensor_len());
        }
        X::from_nhwc(self.side as usize, resized)
    }

    fn resize(&mut self, raster: &RgbRaster) -> Result<Vec<u8>> {
        let (width, height) = raster.dimensions();
        if width == 0 || height == 0 {
            bail!("Cannot resize an empty {}x{} raster", width, height);
        }
        if width == self.side && height == self.side {
            return Ok(raster.as_raw().clone());
        }

        let options = ResizeOptions::new().resize_alg(self.filter.resize_alg());
        let src = ImageRef::new(width, height, raster.as_raw(), PixelType::U8x3)?;
        let mut dst = FirImage::new(self.side, self.side, PixelType::U8x3);
        match self.resizer.resize(&src, &mut dst, &options) {
            Ok(()) => Ok(dst.into_vec()),
            Err(err) => {
                log::warn!("Failed to use `fast_image_resize` ({err}). Falling back.");
                let resized = imageops::resize(&raster.image, self.side, self.side, self.filter.fallback_filter());
                Ok(resized.into_raw())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn raster(w: u32, h: u32) -> RgbRaster {
        RgbRaster::from(RgbImage::from_fn(w, h, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 7])))
    }

    #[test]
    fn tensor_is_always_s_s_3() {
        let mut pre = Preprocessor::new(300, ResizeFilter::Bilinear);
        for (w, h) in [(640, 480), (300, 300), (17, 911), (1, 1)] {
            let x = pre.process(&raster(w, h)).unwrap();
            assert_eq!(x.shape(), &[1, 300, 300, 3]);
            assert_eq!(x.len(), 300 * 300 * 3);
        }
    }

    #[test]
    fn same_size_is_copied_in_rgb_order() {
        let mut pre = Preprocessor::new(2, ResizeFilter::Nearest);
        let x = pre.process(&raster(2, 2)).unwrap();
        assert_eq!(x.as_slice().unwrap(), &[0, 0, 7, 1, 0, 7, 0, 1, 7, 1, 1, 7]);
    }

    #[test]
    fn deterministic_output() {
        let mut pre = Preprocessor::new(64, ResizeFilter::Bilinear);
        let input = raster(123, 77);
        assert_eq!(pre.process(&input).unwrap(), pre.process(&input).unwrap());
    }

    #[test]
    fn uniform_raster_stays_uniform() {
        let mut pre = Preprocessor::new(10, ResizeFilter::Bilinear);
        let flat = RgbRaster::from(RgbImage::from_pixel(37, 53, Rgb([200, 100, 50])));
        let x = pre.process(&flat).unwrap();
        let expected = [200u8, 100, 50];
        for p in x.as_slice().unwrap().chunks(3) {
            for (got, want) in p.iter().zip(expected) {
                assert!(got.abs_diff(want) <= 1, "{p:?}");
            }
        }
    }

    #[test]
    fn empty_raster_is_an_error() {
        let mut pre = Preprocessor::new(10, ResizeFilter::Nearest);
        assert!(pre.process(&RgbRaster::default()).is_err());
    }
}
