//! Training pipeline for the deep renderer.
//!
//! * [`dataset`]: synthesises (volume, style, reference) triples on demand.
//! * [`prefetch`]: background workers feeding pairs through a bounded queue.
//! * [`trainer`]: the optimisation loop, with [`schedule`], [`checkpoint`],
//!   [`progress`] and [`visualize`] hooks.

pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod error;
pub mod prefetch;
pub mod progress;
pub mod schedule;
pub mod trainer;
pub mod visualize;

pub use checkpoint::{latest_checkpoint, load_checkpoint, save_checkpoint};
pub use config::{PipelineConfig, TrainingConfig};
pub use dataset::{PairMode, PipelineStages, TrainingPair, TrainingPairGenerator};
pub use error::{Result, TrainingError};
pub use prefetch::{PrefetchConfig, PrefetchLoader};
pub use progress::{ConsoleProgressCallback, JsonLinesCallback, ProgressBarCallback, ProgressTracker};
pub use schedule::LearningRateSchedule;
pub use trainer::{into_inference, render, Trainer};
pub use visualize::{PngVisualizer, Visualizer};
