//! Planar YUV 4:2:0 to interleaved RGB conversion.
//!
//! Full-range BT.601 (JPEG) coefficients in 16.16 fixed point, chroma sampled from the
//! 2x2 block covering each pixel, rotation applied afterwards in 90 degree steps.

use image::{imageops, RgbImage};
use rayon::prelude::*;
use crate::common::{DetectorError, RawFrame, RgbRaster, Rotation};

const FIX_SHIFT: i32 = 16;
const FIX_HALF: i32 = 1 << (FIX_SHIFT - 1);
const CR_TO_R: i32 = 91_881; // 1.402
const CB_TO_G: i32 = 22_554; // 0.344136
const CR_TO_G: i32 = 46_802; // 0.714136
const CB_TO_B: i32 = 116_130; // 1.772

#[inline]
fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Converts one full-range YUV sample to RGB.
#[inline]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = (y as i32) << FIX_SHIFT;
    let cb = u as i32 - 128;
    let cr = v as i32 - 128;
    [
        clamp_u8((y + CR_TO_R * cr + FIX_HALF) >> FIX_SHIFT),
        clamp_u8((y - CB_TO_G * cb - CR_TO_G * cr + FIX_HALF) >> FIX_SHIFT),
        clamp_u8((y + CB_TO_B * cb + FIX_HALF) >> FIX_SHIFT),
    ]
}

/// Converts a camera frame into an upright RGB raster.
pub fn convert(frame: &RawFrame) -> Result<RgbRaster, DetectorError> {
    frame.validate()?;

    let (w, h) = (frame.width as usize, frame.height as usize);
    let (luma, u_plane, v_plane) = (frame.luma(), frame.u_plane(), frame.v_plane());

    let mut buf = vec![0u8; w * h * 3];
    buf.par_chunks_mut(w * 3)
        .enumerate()
        .for_each(|(row, out)| {
            let cy = row / 2;
            for col in 0..w {
                let cx = col / 2;
                let rgb = yuv_to_rgb(
                    luma.sample(col, row),
                    u_plane.sample(cx, cy),
                    v_plane.sample(cx, cy),
                );
                out[col * 3..col * 3 + 3].copy_from_slice(&rgb);
            }
        });

    let image = RgbImage::from_raw(frame.width, frame.height, buf)
        .ok_or_else(|| DetectorError::frame("converted buffer does not match frame size"))?;

    Ok(RgbRaster::new(rotate(image, frame.rotation), frame.index))
}

/// Applies a clockwise rotation in 90 degree steps.
pub fn rotate(image: RgbImage, rotation: Rotation) -> RgbImage {
    match rotation {
        Rotation::Deg0 => image,
        Rotation::Deg90 => imageops::rotate90(&image),
        Rotation::Deg180 => imageops::rotate180(&image),
        Rotation::Deg270 => imageops::rotate270(&image),
    }
}
