//! In-plane rotation of a volume.
//!
//! The volume is rotated about the centre of a plane spanned by two of its
//! axes; the third axis is carried along unchanged. The output keeps the
//! input extent: content rotated out of the grid is dropped and content
//! rotated in from outside reads the fill value.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use nalgebra::{Rotation2, Vector2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::interpolation::InterpolationOrder;
use crate::volume::{AxisLayout, Volume};

/// Which pair of axes of a ray-last `(height, width, depth)` volume spans the
/// rotation plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RotationPlane {
    /// Height and width: the projection spins in the image plane.
    #[default]
    CrossSection,
    /// Width and depth: the object spins on a turntable in front of the
    /// viewer, exposing new sides to the ray.
    Turntable,
}

impl RotationPlane {
    /// Axis indices `(a, b, carried)` in a ray-last volume.
    pub fn axes(&self) -> [isize; 3] {
        match self {
            Self::CrossSection => [0, 1, 2],
            Self::Turntable => [1, 2, 0],
        }
    }
}

/// Rotation by a fixed angle within a plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneRotation {
    /// Angle in degrees.
    pub degrees: f64,
    /// Plane of rotation.
    pub plane: RotationPlane,
    /// Resampling order.
    pub order: InterpolationOrder,
    /// Value read from outside the grid.
    pub fill: f32,
}

impl PlaneRotation {
    /// Cubic rotation with zero fill.
    pub fn new(degrees: f64, plane: RotationPlane) -> Self {
        Self {
            degrees,
            plane,
            order: InterpolationOrder::Cubic,
            fill: 0.0,
        }
    }

    /// Draw an angle uniformly from `[0, 360)`.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, plane: RotationPlane) -> Self {
        Self::new(rng.random_range(0.0..360.0), plane)
    }

    /// Set the resampling order.
    pub fn with_order(mut self, order: InterpolationOrder) -> Self {
        self.order = order;
        self
    }

    /// Set the fill value.
    pub fn with_fill(mut self, fill: f32) -> Self {
        self.fill = fill;
        self
    }

    /// Source positions `[Na * Nb, 2]` for every output cell of the plane.
    ///
    /// Each output cell `p` reads from `R^-1 (p - c) + c`, `c` the plane
    /// centre `((Na - 1) / 2, (Nb - 1) / 2)`.
    pub fn source_coordinates(&self, plane: [usize; 2]) -> Vec<f32> {
        let [na, nb] = plane;
        let inverse = Rotation2::new(-self.degrees.to_radians());
        let centre = Vector2::new((na as f64 - 1.0) / 2.0, (nb as f64 - 1.0) / 2.0);

        let mut coords = Vec::with_capacity(na * nb * 2);
        for a in 0..na {
            for b in 0..nb {
                let offset = Vector2::new(a as f64, b as f64) - centre;
                let source = inverse * offset + centre;
                coords.push(source.x as f32);
                coords.push(source.y as f32);
            }
        }
        coords
    }

    /// Rotate a raw tensor. `plane` axes follow [`RotationPlane::axes`].
    pub fn apply_tensor<B: Backend>(&self, data: Tensor<B, 3>) -> Tensor<B, 3> {
        let axes = self.plane.axes();
        let dims = data.dims();
        let [na, nb, nc] = axes.map(|axis| dims[axis as usize]);
        let device = data.device();

        // Plane-major rows, one column per carried-axis position.
        let rows = data.permute(axes).reshape([na * nb, nc]);

        let coords = self.source_coordinates([na, nb]);
        let coords = Tensor::<B, 2>::from_data(TensorData::new(coords, [na * nb, 2]), &device);

        let rotated = self
            .order
            .sample_plane(&rows, [na, nb], coords, self.fill)
            .reshape([na, nb, nc]);

        rotated.permute(inverse_permutation(axes))
    }

    /// Rotate a volume. A volume still in decode order is moved to ray-last
    /// order first so the plane refers to the same axes either way.
    pub fn apply<B: Backend>(&self, volume: Volume<B>) -> Volume<B> {
        let volume = match volume.layout() {
            AxisLayout::RayLast => volume,
            AxisLayout::DepthHeightWidth => volume.ray_axis_last(),
        };
        tracing::trace!("Rotating volume {:?} by {:.2} degrees in {:?}", volume.dims(), self.degrees, self.plane);
        volume.map(|data| self.apply_tensor(data))
    }
}

fn inverse_permutation(axes: [isize; 3]) -> [isize; 3] {
    let mut inverse = [0; 3];
    for (position, &axis) in axes.iter().enumerate() {
        inverse[axis as usize] = position as isize;
    }
    inverse
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type TestBackend = NdArray<f32>;

    fn blob(shape: [usize; 3]) -> Tensor<TestBackend, 3> {
        let [h, w, d] = shape;
        let mut values = Vec::with_capacity(h * w * d);
        for y in 0..h {
            for x in 0..w {
                for z in 0..d {
                    values.push(((y * 31 + x * 17 + z * 5) % 250) as f32);
                }
            }
        }
        Tensor::from_data(TensorData::new(values, shape), &Default::default())
    }

    fn max_abs_diff(a: Tensor<TestBackend, 3>, b: Tensor<TestBackend, 3>) -> f32 {
        (a - b).abs().max().into_scalar()
    }

    #[test]
    fn test_inverse_permutation() {
        assert_eq!(inverse_permutation([0, 1, 2]), [0, 1, 2]);
        assert_eq!(inverse_permutation([1, 2, 0]), [2, 0, 1]);
    }

    #[test]
    fn test_zero_degrees_is_identity() {
        let data = blob([6, 7, 3]);
        for plane in [RotationPlane::CrossSection, RotationPlane::Turntable] {
            let rotated = PlaneRotation::new(0.0, plane).apply_tensor(data.clone());
            assert_eq!(rotated.dims(), [6, 7, 3]);
            assert!(max_abs_diff(rotated, data.clone()) < 1e-3);
        }
    }

    #[test]
    fn test_full_turn_matches_identity() {
        let data = blob([8, 8, 2]);
        let identity = PlaneRotation::new(0.0, RotationPlane::CrossSection).apply_tensor(data.clone());
        let full = PlaneRotation::new(360.0, RotationPlane::CrossSection).apply_tensor(data);
        assert!(max_abs_diff(identity, full) < 1e-2);
    }

    #[test]
    fn test_quarter_turn_moves_content() {
        // Single bright voxel off-centre in a 5x5 plane.
        let device = Default::default();
        let mut values = vec![0.0f32; 25];
        values[2 * 5 + 4] = 100.0; // (a = 2, b = 4)
        let data = Tensor::<TestBackend, 3>::from_data(TensorData::new(values, [5, 5, 1]), &device);

        let rotated = PlaneRotation::new(90.0, RotationPlane::CrossSection).apply_tensor(data);
        let values = rotated.into_data().to_vec::<f32>().unwrap();

        // A positive quarter turn about (2, 2) maps (2, 4) onto (0, 2).
        assert!((values[2] - 100.0).abs() < 1e-3);
        assert!(values[2 * 5 + 4].abs() < 1e-3);
    }

    #[test]
    fn test_turntable_quarter_turn() {
        // (height, width, depth) = (2, 5, 5); bright voxel at width 2, depth 4
        // in both rows.
        let device = Default::default();
        let mut values = vec![0.0f32; 50];
        for h in 0..2 {
            values[h * 25 + 2 * 5 + 4] = 100.0;
        }
        let data = Tensor::<TestBackend, 3>::from_data(TensorData::new(values, [2, 5, 5]), &device);

        let rotated = PlaneRotation::new(90.0, RotationPlane::Turntable).apply_tensor(data);
        assert_eq!(rotated.dims(), [2, 5, 5]);
        let values = rotated.into_data().to_vec::<f32>().unwrap();

        // (width, depth) = (2, 4) lands on (0, 2); the height axis is carried.
        for h in 0..2 {
            assert!((values[h * 25 + 2] - 100.0).abs() < 1e-3);
            assert!(values[h * 25 + 2 * 5 + 4].abs() < 1e-3);
        }
    }

    #[test]
    fn test_rotation_keeps_extent_and_fills_corners() {
        let device = Default::default();
        let data = Tensor::<TestBackend, 3>::ones([9, 9, 2], &device).mul_scalar(50.0);
        let rotated = PlaneRotation::new(45.0, RotationPlane::CrossSection)
            .with_order(InterpolationOrder::Linear)
            .apply_tensor(data);

        assert_eq!(rotated.dims(), [9, 9, 2]);
        let values = rotated.into_data().to_vec::<f32>().unwrap();
        // Corner reads from outside the grid.
        assert!(values[0].abs() < 1e-3);
        // Centre stays inside.
        assert!((values[(4 * 9 + 4) * 2] - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_random_angle_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let rotation = PlaneRotation::random(&mut rng, RotationPlane::CrossSection);
            assert!((0.0..360.0).contains(&rotation.degrees));
            assert_eq!(rotation.order, InterpolationOrder::Cubic);
            assert_eq!(rotation.fill, 0.0);
        }
    }

    #[test]
    fn test_apply_reorders_decode_layout() {
        let data = blob([3, 4, 5]); // (depth, height, width)
        let volume = PlaneRotation::new(0.0, RotationPlane::CrossSection).apply(Volume::new(data));
        assert_eq!(volume.layout(), AxisLayout::RayLast);
        assert_eq!(volume.dims(), [4, 5, 3]);
    }
}
