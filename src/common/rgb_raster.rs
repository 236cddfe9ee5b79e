use image::{DynamicImage, RgbImage};

/// Dense interleaved RGB raster produced from one camera frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RgbRaster {
    pub image: RgbImage,
    /// Index of the frame this raster was converted from.
    pub frame_index: u64,
}

impl std::ops::Deref for RgbRaster {
    type Target = RgbImage;

    fn deref(&self) -> &Self::Target {
        &self.image
    }
}

impl std::ops::DerefMut for RgbRaster {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.image
    }
}

impl From<RgbImage> for RgbRaster {
    fn from(image: RgbImage) -> Self {
        Self {
            image,
            ..Default::default()
        }
    }
}

impl From<DynamicImage> for RgbRaster {
    fn from(image: DynamicImage) -> Self {
        Self {
            image: image.to_rgb8(),
            ..Default::default()
        }
    }
}

impl From<RgbRaster> for RgbImage {
    fn from(raster: RgbRaster) -> Self {
        raster.image
    }
}

impl RgbRaster {
    pub fn new(image: RgbImage, frame_index: u64) -> Self {
        Self { image, frame_index }
    }

    pub fn get_ratio(&self) -> f32 {
        self.image.width() as f32 / self.image.height() as f32
    }

    pub fn size(&self) -> usize {
        self.image.as_raw().len()
    }

    pub fn into_rgb8(self) -> RgbImage {
        self.image
    }
}
