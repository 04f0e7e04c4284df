//! Interpolation types and operations.
//!
//! Interpolators sample a plane-major grid `[Na * Nb, Nc]` at continuous
//! positions in the `(a, b)` plane, returning one row of `Nc` values per
//! position. Taps that fall outside the plane read a constant fill value.

pub mod cubic;
pub mod linear;
pub mod nearest;
pub mod trait_;

pub use cubic::CubicInterpolator;
pub use linear::LinearInterpolator;
pub use nearest::NearestInterpolator;
pub use trait_::Interpolator;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

/// Spline order used when resampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InterpolationOrder {
    /// Order 0.
    Nearest,
    /// Order 1.
    Linear,
    /// Order 3, cubic convolution.
    #[default]
    Cubic,
}

impl InterpolationOrder {
    /// Sample `data` with the interpolator matching this order.
    pub fn sample_plane<B: Backend>(
        &self,
        data: &Tensor<B, 2>,
        plane: [usize; 2],
        coords: Tensor<B, 2>,
        fill: f32,
    ) -> Tensor<B, 2> {
        match self {
            Self::Nearest => NearestInterpolator::new().sample_plane(data, plane, coords, fill),
            Self::Linear => LinearInterpolator::new().sample_plane(data, plane, coords, fill),
            Self::Cubic => CubicInterpolator::new().sample_plane(data, plane, coords, fill),
        }
    }
}
