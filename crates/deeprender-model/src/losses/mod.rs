//! Rendering objective.
//!
//! The render, its reference projection and the style image are passed
//! together through a frozen [`FeatureExtractor`]. The objective combines
//!
//! * perceptual terms: MSE of normalised activations, render vs reference;
//! * texture terms: MSE of patch-wise Gram matrices, render vs style;
//! * total variation of the render.

pub mod terms;

use std::marker::PhantomData;

use burn::prelude::*;
use burn::tensor::ElementConversion;
use serde::{Deserialize, Serialize};

use crate::error::{self, ModelError};
use crate::features::FeatureExtractor;
use crate::scaling::to_image;

pub use terms::{mse, normalize, patch_gram, total_variation};

/// A feature layer and the weight of its term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedLayer {
    pub layer: String,
    pub weight: f64,
}

impl WeightedLayer {
    pub fn new(layer: impl Into<String>, weight: f64) -> Self {
        Self {
            layer: layer.into(),
            weight,
        }
    }
}

fn default_perceptual() -> Vec<WeightedLayer> {
    vec![WeightedLayer::new("pool2", 0.2), WeightedLayer::new("pool5", 0.2)]
}

fn default_texture() -> Vec<WeightedLayer> {
    ["conv1_1", "conv2_1", "conv3_1", "conv4_1", "conv5_1"]
        .into_iter()
        .map(|layer| WeightedLayer::new(layer, 8e-7))
        .collect()
}

/// Configuration of the rendering objective.
#[derive(Config, Debug, PartialEq)]
pub struct LossConfig {
    /// Render vs reference.
    #[config(default = "default_perceptual()")]
    pub perceptual: Vec<WeightedLayer>,
    /// Render vs style.
    #[config(default = "default_texture()")]
    pub texture: Vec<WeightedLayer>,
    #[config(default = "5e-6")]
    pub total_variation_weight: f64,
    /// Side of the square tiles the texture Gram matrices are taken over.
    #[config(default = "16")]
    pub patch_size: usize,
}

impl LossConfig {
    /// Check that the configuration describes a usable objective.
    pub fn validate(&self) -> error::Result<()> {
        if self.patch_size == 0 {
            return Err(ModelError::invalid_configuration("patch size must be positive"));
        }
        let weights = self
            .perceptual
            .iter()
            .chain(self.texture.iter())
            .map(|l| l.weight)
            .chain(std::iter::once(self.total_variation_weight));
        for weight in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ModelError::invalid_configuration(format!(
                    "loss weights must be finite and non-negative, got {}",
                    weight
                )));
            }
        }
        Ok(())
    }
}

/// One weighted component of the objective.
#[derive(Debug, Clone)]
pub struct LossTerm<B: Backend> {
    /// `perceptual/<layer>`, `texture/<layer>` or `total_variation`.
    pub name: String,
    pub weight: f64,
    /// Unweighted value.
    pub value: Tensor<B, 1>,
}

/// Every term of one evaluation plus their weighted sum.
#[derive(Debug, Clone)]
pub struct LossBreakdown<B: Backend> {
    pub terms: Vec<LossTerm<B>>,
    pub total: Tensor<B, 1>,
}

impl<B: Backend> LossBreakdown<B> {
    /// Unweighted term values and the total, as host scalars.
    pub fn scalars(&self) -> Vec<(String, f64)> {
        self.terms
            .iter()
            .map(|term| (term.name.clone(), term.value.clone().into_scalar().elem::<f64>()))
            .chain(std::iter::once((
                "total".to_string(),
                self.total.clone().into_scalar().elem::<f64>(),
            )))
            .collect()
    }

    pub fn term(&self, name: &str) -> Option<&LossTerm<B>> {
        self.terms.iter().find(|term| term.name == name)
    }
}

/// Evaluates the rendering objective with a fixed feature extractor.
#[derive(Debug)]
pub struct LossComposer<B: Backend, F: FeatureExtractor<B>> {
    extractor: F,
    config: LossConfig,
    _backend: PhantomData<B>,
}

impl<B: Backend, F: FeatureExtractor<B>> LossComposer<B, F> {
    pub fn new(extractor: F, config: LossConfig) -> error::Result<Self> {
        config.validate()?;
        Ok(Self {
            extractor,
            config,
            _backend: PhantomData,
        })
    }

    pub fn config(&self) -> &LossConfig {
        &self.config
    }

    pub fn extractor(&self) -> &F {
        &self.extractor
    }

    /// Evaluate the objective.
    ///
    /// All three inputs are `[N, 3, H, W]` in `[-1, 1]`.
    pub fn compute(
        &self,
        render: Tensor<B, 4>,
        reference: Tensor<B, 4>,
        style: Tensor<B, 4>,
    ) -> error::Result<LossBreakdown<B>> {
        let dims = render.dims();
        for other in [reference.dims(), style.dims()] {
            if other != dims {
                return Err(ModelError::ExtentMismatch {
                    expected: dims.to_vec(),
                    actual: other.to_vec(),
                });
            }
        }
        let n = dims[0];

        let batch = Tensor::cat(vec![render.clone(), reference, style], 0);
        let maps = self.extractor.extract(to_image(batch));

        let mut terms = Vec::with_capacity(self.config.perceptual.len() + self.config.texture.len() + 1);

        for entry in &self.config.perceptual {
            let features = normalize(maps.require(&entry.layer)?);
            let ours = features.clone().narrow(0, 0, n);
            let theirs = features.narrow(0, n, n);
            terms.push(LossTerm {
                name: format!("perceptual/{}", entry.layer),
                weight: entry.weight,
                value: mse(ours, theirs),
            });
        }

        for entry in &self.config.texture {
            let features = normalize(maps.require(&entry.layer)?);
            let ours = patch_gram(features.clone().narrow(0, 0, n), self.config.patch_size, &entry.layer)?;
            let theirs = patch_gram(features.narrow(0, 2 * n, n), self.config.patch_size, &entry.layer)?;
            terms.push(LossTerm {
                name: format!("texture/{}", entry.layer),
                weight: entry.weight,
                value: mse(ours, theirs),
            });
        }

        terms.push(LossTerm {
            name: "total_variation".to_string(),
            weight: self.config.total_variation_weight,
            value: total_variation(render),
        });

        let total = terms
            .iter()
            .map(|term| term.value.clone().mul_scalar(term.weight))
            .reduce(|a, b| a + b)
            .ok_or_else(|| ModelError::invalid_configuration("objective has no terms"))?;

        Ok(LossBreakdown { terms, total })
    }
}
