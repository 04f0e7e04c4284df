//! Pixel-range conversions and tensor layout helpers.
//!
//! Pipeline tensors are NHWC in `[0, 255]`; the networks work on NCHW in
//! the `tanh` range `[-1, 1]`.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Full-scale pixel value.
pub const PIXEL_MAX: f32 = 255.0;

/// `[0, 255]` to `[-1, 1]`.
pub fn to_tanh<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.div_scalar(PIXEL_MAX).sub_scalar(0.5).mul_scalar(2.0)
}

/// `[-1, 1]` to `[0, 255]`.
pub fn to_image<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.div_scalar(2.0).add_scalar(0.5).mul_scalar(PIXEL_MAX)
}

/// `[N, H, W, C]` to `[N, C, H, W]`.
pub fn nhwc_to_nchw<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    x.permute([0, 3, 1, 2])
}

/// `[N, C, H, W]` to `[N, H, W, C]`.
pub fn nchw_to_nhwc<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    x.permute([0, 2, 3, 1])
}
