//! Building blocks of the generator.
//!
//! Every convolution is 3x3 with "same" padding, bias-free and initialised
//! from N(0, std). Activated convolutions are followed by instance norm and
//! a leaky ReLU.

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{Initializer, InstanceNorm, InstanceNormConfig, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation::leaky_relu;

/// Dilation rates of the residual branch, applied in sequence.
pub const RESIDUAL_DILATIONS: [usize; 4] = [1, 2, 4, 8];

/// Settings shared by all convolutions of one network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvSettings {
    /// Slope of the leaky ReLU for negative inputs.
    pub negative_slope: f64,
    /// Standard deviation of the weight initialiser.
    pub init_std: f64,
}

impl Default for ConvSettings {
    fn default() -> Self {
        Self {
            negative_slope: 0.2,
            init_std: 0.02,
        }
    }
}

impl ConvSettings {
    /// 3x3 convolution config with "same" padding for the given dilation.
    pub fn conv3x3(&self, channels: [usize; 2], stride: usize, dilation: usize) -> Conv2dConfig {
        Conv2dConfig::new(channels, [3, 3])
            .with_stride([stride, stride])
            .with_dilation([dilation, dilation])
            .with_padding(PaddingConfig2d::Explicit(dilation, dilation))
            .with_bias(false)
            .with_initializer(Initializer::Normal {
                mean: 0.0,
                std: self.init_std,
            })
    }
}

/// Convolution, optionally followed by instance norm and leaky ReLU.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    /// Present when the block is activated.
    pub norm: Option<InstanceNorm<B>>,
    negative_slope: f64,
}

impl<B: Backend> ConvBlock<B> {
    /// Instance-normalised, leaky-ReLU activated convolution.
    pub fn activated(
        channels: [usize; 2],
        stride: usize,
        dilation: usize,
        settings: &ConvSettings,
        device: &B::Device,
    ) -> Self {
        Self {
            conv: settings.conv3x3(channels, stride, dilation).init(device),
            norm: Some(InstanceNormConfig::new(channels[1]).init(device)),
            negative_slope: settings.negative_slope,
        }
    }

    /// Plain convolution.
    pub fn linear(channels: [usize; 2], settings: &ConvSettings, device: &B::Device) -> Self {
        Self {
            conv: settings.conv3x3(channels, 1, 1).init(device),
            norm: None,
            negative_slope: settings.negative_slope,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(input);
        match &self.norm {
            Some(norm) => leaky_relu(norm.forward(x), self.negative_slope),
            None => x,
        }
    }
}

/// Residual block with a chain of increasingly dilated convolutions.
///
/// ```text
/// x ─► conv d1 ─► conv d2 ─► conv d4 ─► conv d8 ─► conv ─► norm ─► (+ x)
/// ```
#[derive(Module, Debug)]
pub struct DilatedResidual<B: Backend> {
    pub branch: Vec<ConvBlock<B>>,
    pub project: ConvBlock<B>,
    pub norm: InstanceNorm<B>,
}

impl<B: Backend> DilatedResidual<B> {
    pub fn new(channels: usize, settings: &ConvSettings, device: &B::Device) -> Self {
        let branch = RESIDUAL_DILATIONS
            .iter()
            .map(|&d| ConvBlock::activated([channels, channels], 1, d, settings, device))
            .collect();

        Self {
            branch,
            project: ConvBlock::linear([channels, channels], settings, device),
            norm: InstanceNormConfig::new(channels).init(device),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = input.clone();
        for block in &self.branch {
            x = block.forward(x);
        }
        let x = self.norm.forward(self.project.forward(x));
        input + x
    }
}

/// Activated convolution producing `channels * scale^2` maps, rearranged
/// into a `scale`-times larger image when `scale > 1`.
#[derive(Module, Debug)]
pub struct SubPixel<B: Backend> {
    pub conv: ConvBlock<B>,
    scale: usize,
}

impl<B: Backend> SubPixel<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        scale: usize,
        settings: &ConvSettings,
        device: &B::Device,
    ) -> Self {
        let expanded = out_channels * scale * scale;
        Self {
            conv: ConvBlock::activated([in_channels, expanded], 1, 1, settings, device),
            scale,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(input);
        if self.scale > 1 {
            depth_to_space(x, self.scale)
        } else {
            x
        }
    }
}

/// Move `r * r` channel groups into `r x r` spatial blocks.
///
/// `[N, r*r*C, H, W]` becomes `[N, C, H*r, W*r]`; output pixel
/// `(h*r + i, w*r + j)` of channel `c` reads input channel `(i*r + j)*C + c`.
pub fn depth_to_space<B: Backend>(input: Tensor<B, 4>, r: usize) -> Tensor<B, 4> {
    let [n, channels, h, w] = input.dims();
    let c = channels / (r * r);
    input
        .reshape([n, r, r, c, h, w])
        .permute([0, 3, 4, 1, 5, 2])
        .reshape([n, c, h * r, w * r])
}
