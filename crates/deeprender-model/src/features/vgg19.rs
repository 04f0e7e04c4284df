//! VGG-19 convolutional trunk with named taps.
//!
//! Layers are named `conv{block}_{index}` and `pool{block}`; every
//! convolution output is recorded after its ReLU.

use std::path::Path;

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::PaddingConfig2d;
use burn::module::Param;
use burn::prelude::*;
use burn::tensor::activation::relu;
use deeprender_io::NpzWeights;

use super::{FeatureExtractor, FeatureMaps};
use crate::error::{self, ModelError};

/// Convolutions per block.
pub const VGG19_BLOCKS: [usize; 5] = [2, 2, 4, 4, 4];

/// Per-channel RGB mean subtracted before the first convolution.
pub const IMAGENET_MEAN: [f32; 3] = [123.68, 116.779, 103.939];

/// Configuration for [`Vgg19`].
#[derive(Config, Debug, PartialEq)]
pub struct Vgg19Config {
    /// Output channels of each block.
    #[config(default = "[64, 128, 256, 512, 512]")]
    pub widths: [usize; 5],
}

impl Vgg19Config {
    /// Name and `[in, out]` channels of every convolution, in order.
    pub fn layers(&self) -> Vec<(String, [usize; 2])> {
        let mut layers = Vec::new();
        let mut in_channels = 3;
        for (block, (&count, &width)) in VGG19_BLOCKS.iter().zip(self.widths.iter()).enumerate() {
            for index in 0..count {
                layers.push((format!("conv{}_{}", block + 1, index + 1), [in_channels, width]));
                in_channels = width;
            }
        }
        layers
    }

    /// Randomly initialised trunk.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Vgg19<B> {
        let convs = self
            .layers()
            .into_iter()
            .map(|(_, channels)| {
                Conv2dConfig::new(channels, [3, 3])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .with_bias(true)
                    .init(device)
            })
            .collect();

        Vgg19 {
            convs,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    /// Trunk with pretrained, frozen weights from an `.npz` archive.
    pub fn load_npz<B: Backend, P: AsRef<Path>>(&self, path: P, device: &B::Device) -> anyhow::Result<Vgg19<B>> {
        let weights = deeprender_io::read_npz(path)?;
        let vgg = self.init(device).load_weights(&weights)?;
        Ok(vgg)
    }
}

/// VGG-19 feature extractor.
#[derive(Module, Debug)]
pub struct Vgg19<B: Backend> {
    pub convs: Vec<Conv2d<B>>,
    pub pool: MaxPool2d,
}

impl<B: Backend> Vgg19<B> {
    /// Load pretrained weights from an `.npz` archive and freeze them.
    pub fn from_npz<P: AsRef<Path>>(path: P, device: &B::Device) -> anyhow::Result<Self> {
        Vgg19Config::new().load_npz(path, device)
    }

    /// Replace every kernel and bias from `weights` and freeze the trunk.
    ///
    /// Kernels are stored `[kh, kw, in, out]`, biases `[out]`.
    pub fn load_weights(mut self, weights: &NpzWeights) -> error::Result<Self> {
        let widths = self.widths();
        let layers = Vgg19Config::new().with_widths(widths).layers();

        for (conv, (name, [in_channels, out_channels])) in self.convs.iter_mut().zip(layers) {
            let device = conv.weight.device();

            let kernel_name = format!("{}/W", name);
            let kernel = weights
                .get(&kernel_name)
                .ok_or_else(|| ModelError::MissingWeight(kernel_name.clone()))?;
            let expected = vec![3, 3, in_channels, out_channels];
            if kernel.shape != expected {
                return Err(ModelError::WeightShape {
                    name: kernel_name,
                    expected,
                    actual: kernel.shape.clone(),
                });
            }
            let kernel = Tensor::<B, 4>::from_data(
                TensorData::new(kernel.values.clone(), [3, 3, in_channels, out_channels]),
                &device,
            )
            .permute([3, 2, 0, 1]);
            conv.weight = Param::from_tensor(kernel);

            let bias_name = format!("{}/b", name);
            let bias = weights
                .get(&bias_name)
                .ok_or_else(|| ModelError::MissingWeight(bias_name.clone()))?;
            if bias.shape != [out_channels] {
                return Err(ModelError::WeightShape {
                    name: bias_name,
                    expected: vec![out_channels],
                    actual: bias.shape.clone(),
                });
            }
            let bias = Tensor::<B, 1>::from_data(TensorData::new(bias.values.clone(), [out_channels]), &device);
            conv.bias = Some(Param::from_tensor(bias));
        }

        tracing::debug!("Bound {} VGG-19 convolutions", self.convs.len());
        Ok(self.no_grad())
    }

    fn widths(&self) -> [usize; 5] {
        let mut widths = [0; 5];
        let mut offset = 0;
        for (block, &count) in VGG19_BLOCKS.iter().enumerate() {
            offset += count;
            widths[block] = self.convs[offset - 1].weight.dims()[0];
        }
        widths
    }
}

impl<B: Backend> FeatureExtractor<B> for Vgg19<B> {
    fn extract(&self, images: Tensor<B, 4>) -> FeatureMaps<B> {
        let device = images.device();
        let mean = Tensor::<B, 1>::from_floats(IMAGENET_MEAN, &device).reshape([1, 3, 1, 1]);
        let mut x = images - mean;

        let mut maps = FeatureMaps::new();
        let mut convs = self.convs.iter();
        for (block, &count) in VGG19_BLOCKS.iter().enumerate() {
            for (index, conv) in convs.by_ref().take(count).enumerate() {
                x = relu(conv.forward(x));
                maps.insert(format!("conv{}_{}", block + 1, index + 1), x.clone());
            }
            x = self.pool.forward(x);
            maps.insert(format!("pool{}", block + 1), x.clone());
        }
        maps
    }
}
