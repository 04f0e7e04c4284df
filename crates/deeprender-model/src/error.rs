//! Error types for model construction and loss evaluation.

use thiserror::Error;

/// Main error type for model operations.
#[derive(Error, Debug)]
pub enum ModelError {
    /// Feature map cannot be tiled by the texture patch size.
    #[error("Layer {layer} is {height}x{width}, not divisible by patch size {patch}")]
    PatchMisaligned {
        layer: String,
        height: usize,
        width: usize,
        patch: usize,
    },

    /// Render, reference and style batches differ in shape.
    #[error("Extent mismatch: expected {expected:?}, got {actual:?}")]
    ExtentMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Feature extractor does not produce a requested layer.
    #[error("Missing feature layer: {0}")]
    MissingFeature(String),

    /// Weight archive lacks a parameter.
    #[error("Missing weight: {0}")]
    MissingWeight(String),

    /// Weight archive entry has the wrong shape.
    #[error("Weight {name} has shape {actual:?}, expected {expected:?}")]
    WeightShape {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

impl ModelError {
    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a missing feature error.
    pub fn missing_feature(layer: impl Into<String>) -> Self {
        Self::MissingFeature(layer.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_misaligned_display() {
        let err = ModelError::PatchMisaligned {
            layer: "conv5_1".into(),
            height: 12,
            width: 16,
            patch: 16,
        };
        assert_eq!(err.to_string(), "Layer conv5_1 is 12x16, not divisible by patch size 16");
    }

    #[test]
    fn test_weight_shape_display() {
        let err = ModelError::WeightShape {
            name: "conv1_1/W".into(),
            expected: vec![3, 3, 3, 64],
            actual: vec![3, 3, 64],
        };
        assert!(err.to_string().contains("conv1_1/W"));
    }
}
