//! Residual encoder-decoder that renders a volume stack into RGB.
//!
//! # Architecture
//!
//! ```text
//! Input: [batch, 2D, H, W] (intensity slices + per-slice opacity)
//!          │
//!    ┌───────────┐
//!    │ Encoder 0 │──► i0: [batch, F,  H/2,  W/2]
//!    │ Encoder 1 │──► i1: [batch, 2F, H/4,  W/4]
//!    │ Encoder 2 │──► i2: [batch, 4F, H/8,  W/8]
//!    │ Encoder 3 │──► i3: [batch, 8F, H/16, W/16]
//!    └───────────┘
//!          │
//!    d3 = Decoder(i3)        [batch, 4F, H/8, W/8]
//!    d2 = Decoder(d3 + i2)   [batch, 2F, H/4, W/4]
//!    d1 = Decoder(d2 + i1)   [batch, F,  H/2, W/2]
//!    d0 = Decoder(d1 + i0)   [batch, F,  H,   W]
//!          │
//!    conv 3x3 + bias, tanh   [batch, 3,  H,   W]
//! ```
//!
//! Spatial sides must be multiples of 16.

pub mod blocks;

use burn::nn::conv::Conv2d;
use burn::prelude::*;
use burn::tensor::activation::tanh;

pub use blocks::{depth_to_space, ConvBlock, ConvSettings, DilatedResidual, SubPixel};

/// Downsampling factor between the input and the deepest features.
pub const DOWNSAMPLING: usize = 16;

/// Configuration of a single encoder or decoder stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageConfig {
    pub in_channels: usize,
    pub out_channels: usize,
}

/// Configuration for [`Generator`].
#[derive(Config, Debug, PartialEq)]
pub struct GeneratorConfig {
    /// Input channels: twice the depth of the conditioned volume.
    #[config(default = "512")]
    pub in_channels: usize,
    /// Filters of the first stage; stages use 1x, 2x, 4x and 8x.
    #[config(default = "32")]
    pub base_filters: usize,
    /// Output channels.
    #[config(default = "3")]
    pub out_channels: usize,
    #[config(default = "0.2")]
    pub negative_slope: f64,
    #[config(default = "0.02")]
    pub init_std: f64,
}

impl GeneratorConfig {
    /// Configuration for a cubic volume with the given depth.
    pub fn for_depth(depth: usize) -> Self {
        Self::new().with_in_channels(2 * depth)
    }

    /// Small network for quick experiments.
    pub fn lightweight(depth: usize) -> Self {
        Self::for_depth(depth).with_base_filters(8)
    }

    fn settings(&self) -> ConvSettings {
        ConvSettings {
            negative_slope: self.negative_slope,
            init_std: self.init_std,
        }
    }

    /// Encoder stages, shallow to deep.
    pub fn encoder_stages(&self) -> Vec<StageConfig> {
        let f = self.base_filters;
        let widths = [f, 2 * f, 4 * f, 8 * f];
        let mut in_channels = self.in_channels;
        widths
            .iter()
            .map(|&out_channels| {
                let stage = StageConfig {
                    in_channels,
                    out_channels,
                };
                in_channels = out_channels;
                stage
            })
            .collect()
    }

    /// Decoder stages, deep to shallow.
    pub fn decoder_stages(&self) -> Vec<StageConfig> {
        let f = self.base_filters;
        vec![
            StageConfig { in_channels: 8 * f, out_channels: 4 * f },
            StageConfig { in_channels: 4 * f, out_channels: 2 * f },
            StageConfig { in_channels: 2 * f, out_channels: f },
            StageConfig { in_channels: f, out_channels: f },
        ]
    }

    /// Initialize the network.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Generator<B> {
        Generator::new(self, device)
    }
}

/// Strided convolution, residual block, convolution.
#[derive(Module, Debug)]
pub struct EncoderStage<B: Backend> {
    pub down: ConvBlock<B>,
    pub residual: DilatedResidual<B>,
    pub out: ConvBlock<B>,
}

impl<B: Backend> EncoderStage<B> {
    pub fn new(config: &StageConfig, settings: &ConvSettings, device: &B::Device) -> Self {
        let c = config.out_channels;
        Self {
            down: ConvBlock::activated([config.in_channels, c], 2, 1, settings, device),
            residual: DilatedResidual::new(c, settings, device),
            out: ConvBlock::activated([c, c], 1, 1, settings, device),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.out.forward(self.residual.forward(self.down.forward(input)))
    }
}

/// Sub-pixel projection, residual block, 2x sub-pixel upsampling.
#[derive(Module, Debug)]
pub struct DecoderStage<B: Backend> {
    pub project: SubPixel<B>,
    pub residual: DilatedResidual<B>,
    pub up: SubPixel<B>,
}

impl<B: Backend> DecoderStage<B> {
    pub fn new(config: &StageConfig, settings: &ConvSettings, device: &B::Device) -> Self {
        let c = config.out_channels;
        Self {
            project: SubPixel::new(config.in_channels, c, 1, settings, device),
            residual: DilatedResidual::new(c, settings, device),
            up: SubPixel::new(c, c, 2, settings, device),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.up.forward(self.residual.forward(self.project.forward(input)))
    }
}

/// Volume-to-image rendering network.
#[derive(Module, Debug)]
pub struct Generator<B: Backend> {
    pub encoders: Vec<EncoderStage<B>>,
    pub decoders: Vec<DecoderStage<B>>,
    pub head: Conv2d<B>,
}

impl<B: Backend> Generator<B> {
    pub fn new(config: &GeneratorConfig, device: &B::Device) -> Self {
        let settings = config.settings();
        let encoders = config
            .encoder_stages()
            .iter()
            .map(|stage| EncoderStage::new(stage, &settings, device))
            .collect();
        let decoders = config
            .decoder_stages()
            .iter()
            .map(|stage| DecoderStage::new(stage, &settings, device))
            .collect();

        let head = settings
            .conv3x3([config.base_filters, config.out_channels], 1, 1)
            .with_bias(true)
            .init(device);

        Self {
            encoders,
            decoders,
            head,
        }
    }

    /// Render `[batch, 2D, H, W]` into `[batch, 3, H, W]` in `[-1, 1]`.
    ///
    /// The style batch is accepted so conditioned variants share the same
    /// call shape; this network does not read it.
    pub fn forward(&self, volume: Tensor<B, 4>, _style: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut skips = Vec::with_capacity(self.encoders.len());
        let mut x = volume;
        for encoder in &self.encoders {
            x = encoder.forward(x);
            skips.push(x.clone());
        }

        // The deepest encoder output feeds the first decoder directly; each
        // later decoder sees the previous decoder output plus its skip.
        skips.pop();
        for decoder in &self.decoders {
            x = decoder.forward(x);
            if let Some(skip) = skips.pop() {
                x = x + skip;
            }
        }

        tanh(self.head.forward(x))
    }
}
