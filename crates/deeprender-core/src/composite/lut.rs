//! Opacity lookup tables.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Number of intensity buckets.
pub const LUT_SIZE: usize = 256;

/// How the opacity table for a training pair is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum LutPolicy {
    /// Decreasing ramp `128 - floor(i / 2)`: dense voxels are more transparent.
    #[default]
    Ramp,
    /// Increasing ramp `i`.
    Linear,
    /// Same opacity for every bucket.
    Constant(u8),
    /// Fresh uniform draw in `[0, 256)` per bucket for every pair.
    Random,
}

/// Mapping from intensity bucket to opacity in `[0, 255]`.
#[derive(Debug, Clone, PartialEq)]
pub struct OpacityLut {
    table: Vec<f32>,
}

impl OpacityLut {
    /// Build from an explicit table of `LUT_SIZE` entries.
    pub fn from_table(table: Vec<f32>) -> Result<Self> {
        if table.len() != LUT_SIZE {
            return Err(CoreError::shape_mismatch([LUT_SIZE], [table.len()]));
        }
        if let Some(bad) = table.iter().find(|v| !(0.0..=255.0).contains(*v)) {
            return Err(CoreError::invalid_argument(format!("opacity {} outside [0, 255]", bad)));
        }
        Ok(Self { table })
    }

    /// Decreasing ramp from 128 down to 1.
    pub fn ramp() -> Self {
        let table = (0..LUT_SIZE).map(|i| (128 - i / 2) as f32).collect();
        Self { table }
    }

    /// Identity ramp from 0 to 255.
    pub fn linear() -> Self {
        let table = (0..LUT_SIZE).map(|i| i as f32).collect();
        Self { table }
    }

    /// Every bucket maps to `value`.
    pub fn constant(value: u8) -> Self {
        Self {
            table: vec![value as f32; LUT_SIZE],
        }
    }

    /// Uniform random opacity per bucket.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let table = (0..LUT_SIZE).map(|_| rng.random_range(0..256u32) as f32).collect();
        Self { table }
    }

    /// Table for `policy` with the first `zeroed` buckets forced transparent.
    pub fn from_policy<R: Rng + ?Sized>(policy: LutPolicy, zeroed: usize, rng: &mut R) -> Self {
        let lut = match policy {
            LutPolicy::Ramp => Self::ramp(),
            LutPolicy::Linear => Self::linear(),
            LutPolicy::Constant(value) => Self::constant(value),
            LutPolicy::Random => Self::random(rng),
        };
        lut.with_zeroed_buckets(zeroed)
    }

    /// Force the first `count` buckets to zero opacity.
    pub fn with_zeroed_buckets(mut self, count: usize) -> Self {
        for entry in self.table.iter_mut().take(count) {
            *entry = 0.0;
        }
        self
    }

    /// Opacity of bucket `index`.
    pub fn get(&self, index: usize) -> Option<f32> {
        self.table.get(index).copied()
    }

    /// Raw table.
    pub fn as_slice(&self) -> &[f32] {
        &self.table
    }

    /// Per-voxel opacity `LUT[floor(clamp(v, 0, 255))]`, same shape as input.
    pub fn lookup<B: Backend, const D: usize>(&self, intensities: Tensor<B, D>) -> Tensor<B, D> {
        let dims = intensities.dims();
        let count = intensities.shape().num_elements();
        let device = intensities.device();

        let table = Tensor::<B, 1>::from_data(TensorData::new(self.table.clone(), [LUT_SIZE]), &device);
        let buckets = intensities
            .clamp(0.0, (LUT_SIZE - 1) as f32)
            .floor()
            .reshape([count])
            .int();

        table.select(0, buckets).reshape(dims)
    }
}

impl Default for OpacityLut {
    fn default() -> Self {
        Self::ramp().with_zeroed_buckets(1)
    }
}
