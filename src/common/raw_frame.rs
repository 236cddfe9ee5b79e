use serde::{Deserialize, Serialize};
use crate::common::DetectorError;

/// Clockwise rotation the camera reports for a frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rotation {
    #[default] Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Accepts 0/90/180/270 and their negative or wrapped equivalents; anything else is rejected.
    pub fn from_degrees(degrees: i32) -> Result<Self, DetectorError> {
        match degrees.rem_euclid(360) {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            _ => Err(DetectorError::frame(format!("unsupported rotation of {degrees} degrees"))),
        }
    }

    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// True when the rotation swaps width and height.
    pub fn swaps_axes(&self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// Order of the two chroma planes as delivered by the camera.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChromaOrder {
    /// U (Cb) first, then V (Cr), as in I420.
    #[default] Uv,
    /// V (Cr) first, then U (Cb), as in NV21/YV12.
    Vu,
}

/// One image plane with its memory layout.
#[derive(Debug, Clone, Default)]
pub struct Plane {
    pub data: Vec<u8>,
    pub row_stride: usize,
    pub pixel_stride: usize,
}

impl Plane {
    pub fn new(data: Vec<u8>, row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }

    /// Tightly packed plane, one byte per sample.
    pub fn packed(data: Vec<u8>, width: usize) -> Self {
        Self::new(data, width, 1)
    }

    /// Smallest buffer length able to hold `width` x `height` samples with this layout,
    /// or `None` when the layout does not fit in memory.
    pub fn required_len(&self, width: usize, height: usize) -> Option<usize> {
        if width == 0 || height == 0 {
            return Some(0);
        }
        (height - 1)
            .checked_mul(self.row_stride)?
            .checked_add(self.row_len(width)?)
    }

    /// Bytes spanned by one row of `width` samples.
    fn row_len(&self, width: usize) -> Option<usize> {
        width.checked_sub(1)?.checked_mul(self.pixel_stride)?.checked_add(1)
    }

    #[inline]
    pub(crate) fn sample(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.row_stride + x * self.pixel_stride]
    }
}

/// A planar YUV 4:2:0 camera frame: one luma plane and two half-resolution chroma planes.
#[derive(Debug, Clone, Default)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// Planes in buffer order: luma, then the two chroma planes as given by `chroma_order`.
    pub planes: [Plane; 3],
    pub chroma_order: ChromaOrder,
    pub rotation: Rotation,
    pub index: u64,
}

impl RawFrame {
    pub fn new(width: u32, height: u32, planes: [Plane; 3], chroma_order: ChromaOrder, rotation: Rotation) -> Self {
        Self {
            width,
            height,
            planes,
            chroma_order,
            rotation,
            index: 0,
        }
    }

    /// Builds a frame from tightly packed I420 planes.
    pub fn from_i420(y: Vec<u8>, u: Vec<u8>, v: Vec<u8>, width: u32, height: u32, rotation: Rotation) -> Self {
        let cw = (width as usize).div_ceil(2);
        Self::new(
            width,
            height,
            [Plane::packed(y, width as usize), Plane::packed(u, cw), Plane::packed(v, cw)],
            ChromaOrder::Uv,
            rotation,
        )
    }

    /// Builds a frame from an NV21 buffer: the luma plane followed by interleaved V/U pairs.
    pub fn from_nv21(buffer: &[u8], width: u32, height: u32, rotation: Rotation) -> Result<Self, DetectorError> {
        let (w, h) = (width as usize, height as usize);
        let luma_len = w * h;
        let chroma_len = 2 * w.div_ceil(2) * h.div_ceil(2);
        if buffer.len() < luma_len + chroma_len {
            return Err(DetectorError::frame(format!(
                "NV21 buffer of {} bytes is too small for {}x{} (need {})",
                buffer.len(), width, height, luma_len + chroma_len
            )));
        }
        let chroma_row = 2 * w.div_ceil(2);
        let vu = &buffer[luma_len..luma_len + chroma_len];
        let planes = [
            Plane::packed(buffer[..luma_len].to_vec(), w),
            Plane::new(vu.to_vec(), chroma_row, 2),
            Plane::new(vu[1..].to_vec(), chroma_row, 2),
        ];
        Ok(Self::new(width, height, planes, ChromaOrder::Vu, rotation))
    }

    pub fn with_index(mut self, index: u64) -> Self {
        self.index = index;
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn luma(&self) -> &Plane {
        &self.planes[0]
    }

    /// The Cb plane, whichever position the camera put it in.
    pub fn u_plane(&self) -> &Plane {
        match self.chroma_order {
            ChromaOrder::Uv => &self.planes[1],
            ChromaOrder::Vu => &self.planes[2],
        }
    }

    /// The Cr plane, whichever position the camera put it in.
    pub fn v_plane(&self) -> &Plane {
        match self.chroma_order {
            ChromaOrder::Uv => &self.planes[2],
            ChromaOrder::Vu => &self.planes[1],
        }
    }

    pub fn chroma_dimensions(&self) -> (usize, usize) {
        ((self.width as usize).div_ceil(2), (self.height as usize).div_ceil(2))
    }

    /// Dimensions after the declared rotation is applied.
    pub fn rotated_dimensions(&self) -> (u32, u32) {
        if self.rotation.swaps_axes() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }

    /// Checks every plane against the declared size and layout.
    pub fn validate(&self) -> Result<(), DetectorError> {
        if self.width == 0 || self.height == 0 {
            return Err(DetectorError::frame(format!("empty frame {}x{}", self.width, self.height)));
        }
        let (w, h) = (self.width as usize, self.height as usize);
        let (cw, ch) = self.chroma_dimensions();
        let names = ["Y", "chroma 1", "chroma 2"];
        for (i, plane) in self.planes.iter().enumerate() {
            let (pw, ph) = if i == 0 { (w, h) } else { (cw, ch) };
            let row_len = plane.row_len(pw);
            if plane.pixel_stride == 0 || row_len.map_or(true, |len| plane.row_stride < len) {
                return Err(DetectorError::frame(format!(
                    "{} plane has row stride {} and pixel stride {} for width {}",
                    names[i], plane.row_stride, plane.pixel_stride, pw
                )));
            }
            let need = plane.required_len(pw, ph).ok_or_else(|| {
                DetectorError::frame(format!(
                    "{} plane layout {}x{} with row stride {} overflows",
                    names[i], pw, ph, plane.row_stride
                ))
            })?;
            if plane.data.len() < need {
                return Err(DetectorError::frame(format!(
                    "{} plane holds {} bytes, need {}",
                    names[i], plane.data.len(), need
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_from_degrees() {
        assert_eq!(Rotation::from_degrees(90).unwrap(), Rotation::Deg90);
        assert_eq!(Rotation::from_degrees(-90).unwrap(), Rotation::Deg270);
        assert_eq!(Rotation::from_degrees(360).unwrap(), Rotation::Deg0);
        assert!(matches!(Rotation::from_degrees(45), Err(DetectorError::InvalidFrameFormat(_))));
    }

    #[test]
    fn nv21_planes_are_swapped_chroma() {
        // 2x2 frame: 4 luma bytes, then one V/U pair.
        let buf = [10, 20, 30, 40, 200, 50];
        let frame = RawFrame::from_nv21(&buf, 2, 2, Rotation::Deg0).unwrap();
        assert!(frame.validate().is_ok());
        assert_eq!(frame.v_plane().sample(0, 0), 200);
        assert_eq!(frame.u_plane().sample(0, 0), 50);
    }

    #[test]
    fn short_planes_fail_validation() {
        let frame = RawFrame::from_i420(vec![0; 15], vec![0; 4], vec![0; 4], 4, 4, Rotation::Deg0);
        assert!(matches!(frame.validate(), Err(DetectorError::InvalidFrameFormat(_))));

        let frame = RawFrame::from_i420(vec![0; 16], vec![0; 3], vec![0; 4], 4, 4, Rotation::Deg0);
        assert!(matches!(frame.validate(), Err(DetectorError::InvalidFrameFormat(_))));
    }

    #[test]
    fn huge_strides_are_rejected_not_overflowed() {
        let chroma = || Plane::packed(vec![128; 4], 2);
        for luma in [
            Plane::new(vec![0; 16], usize::MAX / 2, 1),
            Plane::new(vec![0; 16], usize::MAX, usize::MAX / 2),
            Plane::new(vec![0; 16], 4, usize::MAX),
        ] {
            let frame = RawFrame::new(4, 4, [luma, chroma(), chroma()], ChromaOrder::Uv, Rotation::Deg0);
            assert!(matches!(frame.validate(), Err(DetectorError::InvalidFrameFormat(_))));
        }
        assert_eq!(Plane::new(Vec::new(), usize::MAX / 2, 1).required_len(4, 4), None);
        assert_eq!(Plane::packed(Vec::new(), 4).required_len(4, 4), Some(16));
    }

    #[test]
    fn odd_sizes_round_chroma_up() {
        let frame = RawFrame::from_i420(vec![0; 15], vec![0; 6], vec![0; 6], 5, 3, Rotation::Deg90);
        assert_eq!(frame.chroma_dimensions(), (3, 2));
        assert!(frame.validate().is_ok());
        assert_eq!(frame.rotated_dimensions(), (3, 5));
    }
}
