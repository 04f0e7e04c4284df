//! Frozen image feature extractors for the perceptual and texture losses.

mod vgg19;

pub use vgg19::{Vgg19, Vgg19Config, IMAGENET_MEAN, VGG19_BLOCKS};

use burn::prelude::*;

use crate::error::{ModelError, Result};

/// Named activations in the order the extractor produced them.
#[derive(Debug, Clone)]
pub struct FeatureMaps<B: Backend> {
    maps: Vec<(String, Tensor<B, 4>)>,
}

impl<B: Backend> Default for FeatureMaps<B> {
    fn default() -> Self {
        Self { maps: Vec::new() }
    }
}

impl<B: Backend> FeatureMaps<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an activation, replacing one of the same name.
    pub fn insert(&mut self, name: impl Into<String>, map: Tensor<B, 4>) {
        let name = name.into();
        match self.maps.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = map,
            None => self.maps.push((name, map)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Tensor<B, 4>> {
        self.maps.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    /// Like [`get`](Self::get), but a missing layer is an error.
    pub fn require(&self, name: &str) -> Result<Tensor<B, 4>> {
        self.get(name).cloned().ok_or_else(|| ModelError::missing_feature(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.maps.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

/// Maps an image batch to named activations.
///
/// Implementations take `[N, 3, H, W]` images in `[0, 255]` and must not
/// be updated by training.
pub trait FeatureExtractor<B: Backend> {
    fn extract(&self, images: Tensor<B, 4>) -> FeatureMaps<B>;
}
