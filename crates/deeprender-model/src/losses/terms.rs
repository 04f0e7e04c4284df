//! Individual loss terms on NCHW tensors.

use burn::prelude::*;

use crate::error::{ModelError, Result};

/// Guards the per-sample normalisation against all-zero activations.
pub const NORMALIZE_EPSILON: f32 = 1e-8;

/// Divide every sample by its mean activation over channels and space.
pub fn normalize<B: Backend>(v: Tensor<B, 4>) -> Tensor<B, 4> {
    let mean = v.clone().mean_dim(1).mean_dim(2).mean_dim(3);
    v / mean.add_scalar(NORMALIZE_EPSILON)
}

/// Mean squared error over all elements.
pub fn mse<B: Backend, const D: usize>(a: Tensor<B, D>, b: Tensor<B, D>) -> Tensor<B, 1> {
    (a - b).powf_scalar(2.0).mean()
}

/// Gram matrices of non-overlapping `patch x patch` tiles.
///
/// `[N, C, H, W]` becomes `[N * (H/p) * (W/p), C, C]`, one `PᵀP` per tile
/// where `P` is the tile flattened to `[p*p, C]`.
pub fn patch_gram<B: Backend>(x: Tensor<B, 4>, patch: usize, layer: &str) -> Result<Tensor<B, 3>> {
    let [n, c, h, w] = x.dims();
    if patch == 0 || h % patch != 0 || w % patch != 0 {
        return Err(ModelError::PatchMisaligned {
            layer: layer.to_string(),
            height: h,
            width: w,
            patch,
        });
    }

    let (rows, cols) = (h / patch, w / patch);
    let tiles = x
        .reshape([n, c, rows, patch, cols, patch])
        .permute([0, 2, 4, 3, 5, 1])
        .reshape([n * rows * cols, patch * patch, c]);

    Ok(tiles.clone().swap_dims(1, 2).matmul(tiles))
}

/// Anisotropic total variation: per-image sum of absolute neighbour
/// differences, averaged over the batch.
pub fn total_variation<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 1> {
    let [_, _, h, w] = x.dims();

    let dy = x.clone().narrow(2, 1, h - 1) - x.clone().narrow(2, 0, h - 1);
    let dx = x.clone().narrow(3, 1, w - 1) - x.narrow(3, 0, w - 1);

    let per_image = per_sample_sum(dy.abs()) + per_sample_sum(dx.abs());
    per_image.mean()
}

fn per_sample_sum<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    x.sum_dim(1).sum_dim(2).sum_dim(3)
}
