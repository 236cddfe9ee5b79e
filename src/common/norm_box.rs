use serde::{Deserialize, Serialize};

/// Bounding box in normalized image coordinates, `[top, left, bottom, right]` in `[0, 1]`.
#[derive(Default, Debug, Clone, Copy, PartialEq, Serialize, Deserialize, PartialOrd)]
pub struct NormBox {
    pub top: f32,
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
}

impl NormBox {
    pub fn new(top: f32, left: f32, bottom: f32, right: f32) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
        }
    }

    /// Builds a box from the `[top, left, bottom, right]` slot layout the detector emits.
    pub fn from_tlbr(tlbr: [f32; 4]) -> Self {
        Self::new(tlbr[0], tlbr[1], tlbr[2], tlbr[3])
    }

    /// Builds a box from a center point and a size, all normalized.
    pub fn from_center(cy: f32, cx: f32, h: f32, w: f32) -> Self {
        Self::new(cy - h / 2., cx - w / 2., cy + h / 2., cx + w / 2.)
    }

    /// Returns the width of the bounding box.
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    /// Returns the height of the bounding box.
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.) * self.height().max(0.)
    }

    /// Returns the center as `(cy, cx)`.
    pub fn center(&self) -> (f32, f32) {
        ((self.top + self.bottom) / 2., (self.left + self.right) / 2.)
    }

    /// A box is degenerate when it has no area or carries a non-finite coordinate.
    pub fn is_degenerate(&self) -> bool {
        let finite = self.top.is_finite()
            && self.left.is_finite()
            && self.bottom.is_finite()
            && self.right.is_finite();
        !finite || self.bottom <= self.top || self.right <= self.left
    }

    /// Clamps every edge into `[0, 1]`.
    pub fn clamped(&self) -> Self {
        Self::new(
            self.top.clamp(0., 1.),
            self.left.clamp(0., 1.),
            self.bottom.clamp(0., 1.),
            self.right.clamp(0., 1.),
        )
    }

    /// Computes the intersection area between this bounding box and another.
    pub fn intersect(&self, other: &NormBox) -> f32 {
        let left = self.left.max(other.left);
        let right = self.right.min(other.right);
        let top = self.top.max(other.top);
        let bottom = self.bottom.min(other.bottom);
        (right - left).max(0.) * (bottom - top).max(0.)
    }

    /// Computes the union area between this bounding box and another.
    pub fn union(&self, other: &NormBox) -> f32 {
        self.area() + other.area() - self.intersect(other)
    }

    pub fn iou(&self, other: &NormBox) -> f32 {
        let union = self.union(other);
        if union > 0. {
            self.intersect(other) / union
        } else {
            0.
        }
    }

    /// Projects the box onto an image of the given size as `(x, y, w, h)` pixels.
    pub fn as_xy_wh_i32(&self, img_width: u32, img_height: u32) -> (i32, i32, i32, i32) {
        let (w, h) = (img_width as f32, img_height as f32);
        ((self.left * w).round() as i32,
         (self.top * h).round() as i32,
         (self.width() * w).round() as i32,
         (self.height() * h).round() as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = NormBox::new(0.1, 0.1, 0.5, 0.5);
        let b = NormBox::new(0.6, 0.6, 0.9, 0.9);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn degenerate_boxes_are_flagged() {
        assert!(NormBox::new(0.5, 0.1, 0.5, 0.4).is_degenerate());
        assert!(NormBox::new(0.1, 0.4, 0.5, 0.2).is_degenerate());
        assert!(NormBox::new(f32::NAN, 0.1, 0.5, 0.4).is_degenerate());
        assert!(!NormBox::new(0.1, 0.1, 0.5, 0.4).is_degenerate());
    }

    #[test]
    fn pixel_projection() {
        let b = NormBox::new(0.25, 0.5, 0.75, 1.0);
        assert_eq!(b.as_xy_wh_i32(200, 100), (100, 25, 100, 50));
    }
}
