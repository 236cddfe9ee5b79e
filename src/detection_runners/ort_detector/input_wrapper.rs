use anyhow::Result;
use ndarray::{Array, ArrayView4, Ix4};

/// Model input, wrapper over a `[1, S, S, 3]` [`Array<u8, Ix4>`] of raw RGB bytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct X(pub Array<u8, Ix4>);

impl From<Array<u8, Ix4>> for X {
    fn from(x: Array<u8, Ix4>) -> Self {
        Self(x)
    }
}

impl std::ops::Deref for X {
    type Target = Array<u8, Ix4>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl X {
    /// Wraps an interleaved RGB buffer of `side * side * 3` bytes.
    pub fn from_nhwc(side: usize, xs: Vec<u8>) -> Result<Self> {
        Ok(Self::from(Array::from_shape_vec((1, side, side, 3), xs)?))
    }

    pub fn side(&self) -> usize {
        self.0.shape()[1]
    }

    pub fn view(&self) -> ArrayView4<'_, u8> {
        self.0.view()
    }

    pub fn into_inner(self) -> Array<u8, Ix4> {
        self.0
    }
}
