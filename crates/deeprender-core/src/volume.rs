//! Volume type with canonical-extent conditioning.
//!
//! A [`Volume`] wraps a rank-3 intensity tensor and remembers which axis
//! order it is stored in. Volumes are decoded in (depth, height, width)
//! order; before ray casting they are reordered so the ray-marching axis
//! (depth) is last.

use burn::config::Config;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::{self, CoreError};

/// Highest intensity a conditioned volume may hold.
pub const MAX_INTENSITY: f32 = 255.0;

/// Configuration of the canonical volume grid.
#[derive(Config, Debug, PartialEq)]
pub struct VolumeConfig {
    /// Canonical extent in (depth, height, width) order.
    #[config(default = "[256, 256, 256]")]
    pub extent: [usize; 3],
}

impl VolumeConfig {
    /// Cubic grid with the given side length.
    pub fn cube(side: usize) -> Self {
        Self::new().with_extent([side, side, side])
    }

    /// Extent after the ray axis has been moved last: (height, width, depth).
    pub fn ray_last_extent(&self) -> [usize; 3] {
        let [d, h, w] = self.extent;
        [h, w, d]
    }
}

/// Axis order of the stored tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxisLayout {
    /// (depth, height, width), the order volumes are decoded in.
    DepthHeightWidth,
    /// (height, width, depth), ray-marching axis last.
    RayLast,
}

/// Leading and trailing amounts that split `|canonical - actual|` as evenly
/// as possible. Any odd remainder goes to the trailing side.
pub fn split_difference(canonical: usize, actual: usize) -> (usize, usize) {
    let diff = canonical.abs_diff(actual);
    let leading = diff / 2;
    (leading, diff - leading)
}

/// 3D intensity grid.
#[derive(Debug, Clone)]
pub struct Volume<B: Backend> {
    data: Tensor<B, 3>,
    layout: AxisLayout,
}

impl<B: Backend> Volume<B> {
    /// Wrap a tensor decoded in (depth, height, width) order.
    pub fn new(data: Tensor<B, 3>) -> Self {
        Self {
            data,
            layout: AxisLayout::DepthHeightWidth,
        }
    }

    /// Wrap a tensor that already has the ray axis last.
    pub fn from_ray_last(data: Tensor<B, 3>) -> Self {
        Self {
            data,
            layout: AxisLayout::RayLast,
        }
    }

    /// Get the intensity tensor.
    pub fn data(&self) -> &Tensor<B, 3> {
        &self.data
    }

    /// Consume the volume and return its tensor.
    pub fn into_data(self) -> Tensor<B, 3> {
        self.data
    }

    /// Current axis order.
    pub fn layout(&self) -> AxisLayout {
        self.layout
    }

    /// Shape in the current axis order.
    pub fn dims(&self) -> [usize; 3] {
        self.data.dims()
    }

    /// Pad or crop every axis so the shape equals `extent`.
    ///
    /// Smaller axes are zero-padded by `(extent - actual) / 2` on both sides,
    /// larger axes are center-cropped by `(actual - extent) / 2` on both sides.
    /// An odd difference leaves one extra voxel to pad or drop on the trailing
    /// side. A volume already at `extent` is returned untouched.
    pub fn conform(self, extent: [usize; 3]) -> error::Result<Self> {
        if extent.iter().any(|&e| e == 0) {
            return Err(CoreError::invalid_argument(format!(
                "canonical extent must be non-zero, got {:?}",
                extent
            )));
        }

        let dims = self.dims();
        if dims == extent {
            return Ok(self);
        }

        let layout = self.layout;
        let mut data = self.data;
        for axis in 0..3 {
            let actual = data.dims()[axis];
            let canonical = extent[axis];
            let (leading, trailing) = split_difference(canonical, actual);

            if actual < canonical {
                data = pad_axis(data, axis, leading, trailing);
            } else if actual > canonical {
                data = data.narrow(axis, leading, actual - leading - trailing);
            }
        }

        let conformed = data.dims();
        if conformed != extent {
            return Err(CoreError::shape_mismatch(extent, conformed));
        }

        tracing::debug!("Conformed volume {:?} -> {:?}", dims, conformed);
        Ok(Self { data, layout })
    }

    /// Reorder (depth, height, width) into (height, width, depth).
    ///
    /// Volumes that already have the ray axis last are returned as-is.
    pub fn ray_axis_last(self) -> Self {
        match self.layout {
            AxisLayout::RayLast => self,
            AxisLayout::DepthHeightWidth => Self {
                data: self.data.permute([1, 2, 0]),
                layout: AxisLayout::RayLast,
            },
        }
    }

    /// Clip intensities into `[0, 255]`.
    pub fn clip(self) -> Self {
        Self {
            data: self.data.clamp(0.0, MAX_INTENSITY),
            layout: self.layout,
        }
    }

    /// Replace the tensor, keeping the layout.
    pub fn map<F>(self, f: F) -> Self
    where
        F: FnOnce(Tensor<B, 3>) -> Tensor<B, 3>,
    {
        Self {
            data: f(self.data),
            layout: self.layout,
        }
    }
}

fn pad_axis<B: Backend>(data: Tensor<B, 3>, axis: usize, leading: usize, trailing: usize) -> Tensor<B, 3> {
    let device = data.device();
    let mut parts = Vec::with_capacity(3);

    let mut shape = data.dims();
    if leading > 0 {
        shape[axis] = leading;
        parts.push(Tensor::zeros(shape, &device));
    }
    parts.push(data);
    if trailing > 0 {
        shape[axis] = trailing;
        parts.push(Tensor::zeros(shape, &device));
    }

    Tensor::cat(parts, axis)
}
