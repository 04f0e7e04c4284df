//! Style image augmentation.

pub mod style;

pub use style::{normalize_channels, FlipMode, StyleAugmentation, STYLE_SEED_RANGE};
