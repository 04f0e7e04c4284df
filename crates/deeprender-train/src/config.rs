//! Serializable configuration for pair synthesis and training.

use std::path::PathBuf;

use burn::config::Config;
use burn::optim::AdamConfig;
use deeprender_core::{CompositeOrder, InterpolationOrder, LutPolicy, RotationPlane, VolumeConfig};
use deeprender_model::{GeneratorConfig, LossConfig};

use crate::error::{self, TrainingError};
use crate::schedule::LearningRateSchedule;

/// How training pairs are synthesised.
#[derive(Config, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Directory of volume files.
    pub image_dir: PathBuf,
    /// Directory of style images.
    pub style_dir: PathBuf,
    #[config(default = "VolumeConfig::new()")]
    pub volume: VolumeConfig,
    #[config(default = "LutPolicy::Ramp")]
    pub lut: LutPolicy,
    /// Leading LUT buckets forced transparent.
    #[config(default = "1")]
    pub zeroed_buckets: usize,
    #[config(default = "CompositeOrder::BackToFront")]
    pub composite: CompositeOrder,
    #[config(default = "RotationPlane::CrossSection")]
    pub rotation_plane: RotationPlane,
    #[config(default = "InterpolationOrder::Cubic")]
    pub interpolation: InterpolationOrder,
    /// Pairs per pass; the number of volume files when unset.
    #[config(default = "None")]
    pub size: Option<usize>,
    /// Resample style images to the pair's height and width.
    #[config(default = "true")]
    pub resize_style: bool,
}

/// Everything a training run needs besides the data and weight files.
#[derive(Config)]
pub struct TrainingConfig {
    pub pipeline: PipelineConfig,
    #[config(default = "GeneratorConfig::new()")]
    pub generator: GeneratorConfig,
    #[config(default = "LossConfig::new()")]
    pub loss: LossConfig,
    #[config(default = "AdamConfig::new()")]
    pub optimizer: AdamConfig,
    #[config(default = "LearningRateSchedule::default()")]
    pub schedule: LearningRateSchedule,
    #[config(default = "500")]
    pub max_epochs: usize,
    /// Optimisation steps per epoch.
    #[config(default = "10")]
    pub epoch_size: usize,
    #[config(default = "50")]
    pub checkpoint_every: usize,
    /// Epochs between visualisation dumps; 0 disables them.
    #[config(default = "5")]
    pub visualize_every: usize,
    #[config(default = "4")]
    pub workers: usize,
    #[config(default = "4")]
    pub prefetch_depth: usize,
    /// Base seed for the prefetch workers; OS entropy when unset.
    #[config(default = "None")]
    pub seed: Option<u64>,
}

impl TrainingConfig {
    /// Generator input width follows from the volume depth.
    pub fn with_matching_generator(mut self) -> Self {
        let depth = self.pipeline.volume.extent[0];
        self.generator.in_channels = 2 * depth;
        self
    }

    /// Check cross-field consistency before anything is spawned.
    pub fn validate(&self) -> error::Result<()> {
        let [d, h, w] = self.pipeline.volume.extent;
        if d == 0 || h == 0 || w == 0 {
            return Err(TrainingError::invalid_configuration("volume extent must be non-zero"));
        }
        let factor = deeprender_model::generator::DOWNSAMPLING;
        if h % factor != 0 || w % factor != 0 {
            return Err(TrainingError::invalid_configuration(format!(
                "height and width must be multiples of {}, got {}x{}",
                factor, h, w
            )));
        }
        if self.generator.in_channels != 2 * d {
            return Err(TrainingError::invalid_configuration(format!(
                "generator expects {} input channels but volumes have depth {}",
                self.generator.in_channels, d
            )));
        }
        if self.epoch_size == 0 || self.workers == 0 || self.prefetch_depth == 0 {
            return Err(TrainingError::invalid_configuration(
                "epoch size, workers and prefetch depth must be positive",
            ));
        }
        if !self.schedule.is_valid() {
            return Err(TrainingError::invalid_configuration(format!(
                "invalid learning-rate schedule {:?}",
                self.schedule
            )));
        }
        self.loss.validate()?;
        Ok(())
    }
}
