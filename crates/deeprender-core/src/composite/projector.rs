//! Front-to-back and back-to-front compositing along the ray axis.
//!
//! For slice `z` the source colour is `c = I[.., z] / 255` and the source
//! opacity is `a = LUT[I[.., z]] / 255`.
//!
//! Back-to-front ("over"), `z` from `D - 1` down to `0`:
//!
//! ```text
//! color <- c + (1 - a) * color
//! alpha <- a + (1 - a) * alpha
//! ```
//!
//! Front-to-back ("under"), `z` from `0` up to `D - 1`:
//!
//! ```text
//! color <- color + (1 - alpha) * c
//! alpha <- alpha + (1 - alpha) * a
//! ```
//!
//! Each step is a whole-slice tensor operation; the recurrence itself runs
//! strictly in traversal order.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use super::lut::OpacityLut;
use crate::error::{CoreError, Result};
use crate::volume::{AxisLayout, Volume, MAX_INTENSITY};

/// Ray traversal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompositeOrder {
    /// "Over" operator, farthest slice first.
    #[default]
    BackToFront,
    /// "Under" operator, nearest slice first.
    FrontToBack,
}

/// Result of projecting a `(height, width, depth)` volume.
#[derive(Debug, Clone)]
pub struct Projection<B: Backend> {
    /// Accumulated colour `[H, W]` in `[0, 1]` for in-range inputs.
    pub color: Tensor<B, 2>,
    /// Accumulated opacity `[H, W]`.
    pub alpha: Tensor<B, 2>,
    /// Per-voxel opacity `[H, W, D]` in `[0, 255]`.
    pub voxel_alpha: Tensor<B, 3>,
}

impl<B: Backend> Projection<B> {
    /// Grey colour replicated to RGB in `[0, 255]`, shaped `[1, H, W, 3]`.
    pub fn to_rgb(&self) -> Tensor<B, 4> {
        let [h, w] = self.color.dims();
        let grey = self
            .color
            .clone()
            .mul_scalar(MAX_INTENSITY)
            .clamp(0.0, MAX_INTENSITY)
            .reshape([1, h, w, 1]);
        Tensor::cat(vec![grey.clone(), grey.clone(), grey], 3)
    }

    /// Per-voxel opacity as a batch of one, `[1, H, W, D]`.
    pub fn alpha_channels(&self) -> Tensor<B, 4> {
        self.voxel_alpha.clone().unsqueeze::<4>()
    }
}

/// Ray caster combining slices with the configured operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlphaCompositor {
    pub order: CompositeOrder,
}

impl AlphaCompositor {
    pub fn new(order: CompositeOrder) -> Self {
        Self { order }
    }

    /// Project a ray-last volume.
    pub fn project<B: Backend>(&self, volume: &Volume<B>, lut: &OpacityLut) -> Result<Projection<B>> {
        if volume.layout() != AxisLayout::RayLast {
            return Err(CoreError::layout("compositing requires the ray axis last"));
        }
        Ok(self.project_tensor(volume.data().clone(), lut))
    }

    /// Project a `[H, W, D]` intensity tensor.
    pub fn project_tensor<B: Backend>(&self, data: Tensor<B, 3>, lut: &OpacityLut) -> Projection<B> {
        let [h, w, d] = data.dims();
        let device = data.device();

        let voxel_alpha = lut.lookup(data.clone());
        let colors = data.div_scalar(MAX_INTENSITY);
        let alphas = voxel_alpha.clone().div_scalar(MAX_INTENSITY);

        let slice = |t: &Tensor<B, 3>, z: usize| t.clone().narrow(2, z, 1).reshape([h, w]);

        let mut color = Tensor::<B, 2>::zeros([h, w], &device);
        let mut alpha = Tensor::<B, 2>::zeros([h, w], &device);

        match self.order {
            CompositeOrder::BackToFront => {
                for z in (0..d).rev() {
                    let c = slice(&colors, z);
                    let a = slice(&alphas, z);
                    let transmit = a.clone().neg().add_scalar(1.0);
                    color = c + transmit.clone() * color;
                    alpha = a + transmit * alpha;
                }
            }
            CompositeOrder::FrontToBack => {
                for z in 0..d {
                    let c = slice(&colors, z);
                    let a = slice(&alphas, z);
                    let transmit = alpha.clone().neg().add_scalar(1.0);
                    color = color + transmit.clone() * c;
                    alpha = alpha + transmit * a;
                }
            }
        }

        Projection {
            color,
            alpha,
            voxel_alpha,
        }
    }
}
