//! Interpolator trait for separable kernels on a 2D plane.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Separable interpolation kernel.
///
/// An implementation names the tap offsets around an anchor index and the
/// weight of each tap as a function of the fractional distance from the
/// anchor. [`Interpolator::sample_plane`] combines those into a 2D resampler
/// with constant boundary handling.
///
/// # Type Parameters
/// * `B` - The Burn backend
pub trait Interpolator<B: Backend> {
    /// Tap offsets relative to the anchor index.
    fn offsets(&self) -> &'static [i32];

    /// Weight per tap, in the same order as [`Interpolator::offsets`].
    ///
    /// `frac` is `coord - anchor(coord)` for every sample position.
    fn weights(&self, frac: Tensor<B, 1>) -> Vec<Tensor<B, 1>>;

    /// Anchor index for each continuous coordinate.
    fn anchor(&self, coord: Tensor<B, 1>) -> Tensor<B, 1> {
        coord.floor()
    }

    /// Sample a plane-major grid at continuous positions.
    ///
    /// # Arguments
    /// * `data` - Source values `[Na * Nb, Nc]`, row `ia * Nb + ib`
    /// * `plane` - Plane extent `[Na, Nb]`
    /// * `coords` - Sample positions `[N, 2]` as `(a, b)`
    /// * `fill` - Value read by taps outside the plane
    ///
    /// # Returns
    /// Sampled rows `[N, Nc]`
    fn sample_plane(&self, data: &Tensor<B, 2>, plane: [usize; 2], coords: Tensor<B, 2>, fill: f32) -> Tensor<B, 2> {
        let [na, nb] = plane;
        let n = coords.dims()[0];
        let channels = data.dims()[1];
        let device = coords.device();

        let a = coords.clone().narrow(1, 0, 1).squeeze::<1>(1);
        let b = coords.narrow(1, 1, 1).squeeze::<1>(1);

        let a0 = self.anchor(a.clone());
        let b0 = self.anchor(b.clone());
        let weights_a = self.weights(a - a0.clone());
        let weights_b = self.weights(b - b0.clone());

        let mut acc = Tensor::<B, 2>::zeros([n, channels], &device);
        let mut outside = Tensor::<B, 1>::zeros([n], &device);

        for (&da, wa) in self.offsets().iter().zip(weights_a.iter()) {
            let ia = a0.clone().add_scalar(da as f32);
            let valid_a = inside(ia.clone(), na);
            let row = ia.clamp(0.0, (na - 1) as f32).mul_scalar(nb as f32);

            for (&db, wb) in self.offsets().iter().zip(weights_b.iter()) {
                let ib = b0.clone().add_scalar(db as f32);
                let valid = valid_a.clone() * inside(ib.clone(), nb);
                let idx = (row.clone() + ib.clamp(0.0, (nb - 1) as f32)).int();

                let weight = wa.clone() * wb.clone();
                let taps = data.clone().select(0, idx);
                acc = acc + taps * (weight.clone() * valid.clone()).unsqueeze_dim::<2>(1);

                if fill != 0.0 {
                    outside = outside + weight * valid.neg().add_scalar(1.0);
                }
            }
        }

        if fill != 0.0 {
            acc = acc + outside.mul_scalar(fill).unsqueeze_dim::<2>(1);
        }
        acc
    }
}

/// 1.0 where `index` addresses one of `len` cells, 0.0 elsewhere.
fn inside<B: Backend>(index: Tensor<B, 1>, len: usize) -> Tensor<B, 1> {
    let lower = index.clone().greater_equal_elem(0.0).float();
    let upper = index.lower_equal_elem((len - 1) as f32).float();
    lower * upper
}
