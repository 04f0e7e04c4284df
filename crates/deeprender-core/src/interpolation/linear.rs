//! Linear interpolation on a plane (bilinear).

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::trait_::Interpolator;

/// Linear Interpolator.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearInterpolator;

impl LinearInterpolator {
    /// Create a new linear interpolator.
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Interpolator<B> for LinearInterpolator {
    fn offsets(&self) -> &'static [i32] {
        &[0, 1]
    }

    fn weights(&self, frac: Tensor<B, 1>) -> Vec<Tensor<B, 1>> {
        vec![frac.clone().neg().add_scalar(1.0), frac]
    }
}
