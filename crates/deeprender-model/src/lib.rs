//! Networks and objectives for the deep renderer.
//!
//! * [`generator`]: residual encoder-decoder mapping a volume stack to RGB.
//! * [`features`]: frozen feature extractors used by the losses.
//! * [`losses`]: perceptual, texture and total-variation terms.

pub mod error;
pub mod features;
pub mod generator;
pub mod losses;
pub mod scaling;

pub use error::{ModelError, Result};
pub use features::{FeatureExtractor, FeatureMaps, Vgg19, Vgg19Config};
pub use generator::{Generator, GeneratorConfig};
pub use losses::{LossBreakdown, LossComposer, LossConfig, LossTerm, WeightedLayer};
