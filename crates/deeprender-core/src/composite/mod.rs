//! Alpha-compositing ray caster.
//!
//! A conditioned volume is projected onto its cross-section by marching
//! along the last axis. Each voxel contributes its normalised intensity as
//! colour and an opacity looked up from an [`OpacityLut`].

pub mod lut;
pub mod projector;

pub use lut::{LutPolicy, OpacityLut, LUT_SIZE};
pub use projector::{AlphaCompositor, CompositeOrder, Projection};
