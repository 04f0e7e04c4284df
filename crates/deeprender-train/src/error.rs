//! Error types for pair generation and training.

use std::path::{Path, PathBuf};

use deeprender_core::CoreError;
use deeprender_model::ModelError;
use thiserror::Error;

/// Main error type for training operations.
#[derive(Error, Debug)]
pub enum TrainingError {
    /// A data directory holds no regular files.
    #[error("No files found in {0}")]
    EmptyDirectory(PathBuf),

    /// A file could not be listed or decoded.
    #[error("Failed to load {path}: {message}")]
    Load { path: PathBuf, message: String },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Model(#[from] ModelError),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Saving or restoring model state failed.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// The objective stopped being finite.
    #[error("Loss diverged at epoch {epoch}")]
    Diverged { epoch: usize },

    /// A prefetch worker stopped unexpectedly.
    #[error("Worker error: {0}")]
    Worker(String),
}

/// Result type for training operations.
pub type Result<T> = std::result::Result<T, TrainingError>;

impl TrainingError {
    /// Wrap an I/O failure for `path`, keeping the whole cause chain.
    pub fn load(path: &Path, error: anyhow::Error) -> Self {
        Self::Load {
            path: path.to_path_buf(),
            message: format!("{:#}", error),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a checkpoint error.
    pub fn checkpoint(msg: impl Into<String>) -> Self {
        Self::Checkpoint(msg.into())
    }
}
