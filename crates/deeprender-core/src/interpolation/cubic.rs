//! Cubic convolution interpolation.
//!
//! Uses the Keys kernel over a 4x4 neighbourhood:
//!
//! ```text
//! k(t) = (a + 2)|t|^3 - (a + 3)|t|^2 + 1        for |t| <= 1
//! k(t) = a|t|^3 - 5a|t|^2 + 8a|t| - 4a          for 1 < |t| < 2
//! k(t) = 0                                      otherwise
//! ```
//!
//! With `a = -0.5` (Catmull-Rom) the kernel interpolates: sampling exactly
//! on grid positions reproduces the input.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::trait_::Interpolator;

/// Cubic convolution interpolator.
#[derive(Debug, Clone, Copy)]
pub struct CubicInterpolator {
    a: f32,
}

impl CubicInterpolator {
    /// Catmull-Rom cubic (`a = -0.5`).
    pub fn new() -> Self {
        Self { a: -0.5 }
    }

    /// Cubic convolution with a custom kernel parameter.
    pub fn with_parameter(a: f32) -> Self {
        Self { a }
    }
}

impl Default for CubicInterpolator {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Interpolator<B> for CubicInterpolator {
    fn offsets(&self) -> &'static [i32] {
        &[-1, 0, 1, 2]
    }

    fn weights(&self, frac: Tensor<B, 1>) -> Vec<Tensor<B, 1>> {
        let a = self.a;
        let f2 = frac.clone() * frac.clone();
        let f3 = f2.clone() * frac.clone();

        // k(1 + f)
        let w0 = (f3.clone() - f2.clone().mul_scalar(2.0) + frac.clone()).mul_scalar(a);
        // k(f)
        let w1 = f3.clone().mul_scalar(a + 2.0) - f2.clone().mul_scalar(a + 3.0) + 1.0;
        // k(1 - f)
        let w2 = frac.mul_scalar(-a) + f2.clone().mul_scalar(2.0 * a + 3.0) - f3.clone().mul_scalar(a + 2.0);
        // k(2 - f)
        let w3 = (f2 - f3).mul_scalar(a);

        vec![w0, w1, w2, w3]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_weights_partition_unity() {
        let device = Default::default();
        let frac = Tensor::<TestBackend, 1>::from_floats([0.0, 0.25, 0.5, 0.9], &device);
        let weights: Vec<_> = Interpolator::<TestBackend>::weights(&CubicInterpolator::new(), frac);

        let total = weights.into_iter().reduce(|acc, w| acc + w).unwrap();
        for v in total.into_data().to_vec::<f32>().unwrap() {
            assert!((v - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_grid_positions_reproduce_input() {
        let device = Default::default();
        let values: Vec<f32> = (0..16).map(|v| (v * 7 % 11) as f32).collect();
        let data = Tensor::<TestBackend, 2>::from_data(TensorData::new(values.clone(), [16, 1]), &device);

        let mut coords = Vec::new();
        for a in 0..4 {
            for b in 0..4 {
                coords.push(a as f32);
                coords.push(b as f32);
            }
        }
        let coords = Tensor::<TestBackend, 2>::from_data(TensorData::new(coords, [16, 2]), &device);

        let out = CubicInterpolator::new().sample_plane(&data, [4, 4], coords, 0.0);
        let sampled = out.into_data().to_vec::<f32>().unwrap();
        for (s, v) in sampled.iter().zip(values.iter()) {
            assert!((s - v).abs() < 1e-5, "{} != {}", s, v);
        }
    }

    #[test]
    fn test_linear_ramp_midpoint() {
        let device = Default::default();
        // Row-constant ramp along b: value = 10 * b.
        let mut values = Vec::new();
        for _a in 0..6 {
            for b in 0..6 {
                values.push(10.0 * b as f32);
            }
        }
        let data = Tensor::<TestBackend, 2>::from_data(TensorData::new(values, [36, 1]), &device);
        let coords = Tensor::<TestBackend, 2>::from_floats([[2.0, 2.5]], &device);

        let out = CubicInterpolator::new().sample_plane(&data, [6, 6], coords, 0.0);
        assert!((out.into_scalar() - 25.0).abs() < 1e-4);
    }
}
