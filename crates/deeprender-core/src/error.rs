//! Error types for volume and image operations.

use thiserror::Error;

/// Main error type for the core pipeline stages.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Shape does not match what the operation requires.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Argument outside the accepted domain.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation requires a different axis layout.
    #[error("Layout error: {0}")]
    LayoutError(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create a shape mismatch error.
    pub fn shape_mismatch(expected: impl Into<Vec<usize>>, actual: impl Into<Vec<usize>>) -> Self {
        Self::ShapeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a layout error.
    pub fn layout(msg: impl Into<String>) -> Self {
        Self::LayoutError(msg.into())
    }
}
