//! Nearest neighbour interpolation.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::trait_::Interpolator;

/// Nearest Neighbor Interpolator.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestInterpolator;

impl NearestInterpolator {
    /// Create a new nearest neighbor interpolator.
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Interpolator<B> for NearestInterpolator {
    fn offsets(&self) -> &'static [i32] {
        &[0]
    }

    fn weights(&self, frac: Tensor<B, 1>) -> Vec<Tensor<B, 1>> {
        vec![frac.ones_like()]
    }

    fn anchor(&self, coord: Tensor<B, 1>) -> Tensor<B, 1> {
        coord.add_scalar(0.5).floor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_nearest_rounds() {
        let device = Default::default();
        // 2x2 plane, one channel.
        let data = Tensor::<TestBackend, 2>::from_floats([[1.0], [2.0], [3.0], [4.0]], &device);
        let coords = Tensor::<TestBackend, 2>::from_floats([[0.2, 0.7], [0.9, 0.1], [5.0, 0.0]], &device);

        let out = NearestInterpolator::new().sample_plane(&data, [2, 2], coords, 0.0);
        let values = out.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![2.0, 3.0, 0.0]);
    }
}
