//! Volume conditioning and training-image synthesis.
//!
//! The core crate holds the tensor-level building blocks of the data
//! pipeline: conforming volumes to a canonical extent, rotating them within
//! a plane, ray casting them into a 2D projection through an opacity lookup
//! table, and augmenting style images.

pub mod augment;
pub mod composite;
pub mod error;
pub mod interpolation;
pub mod transform;
pub mod volume;

pub use augment::{FlipMode, StyleAugmentation};
pub use composite::{AlphaCompositor, CompositeOrder, LutPolicy, OpacityLut, Projection};
pub use error::{CoreError, Result};
pub use interpolation::{InterpolationOrder, Interpolator};
pub use transform::{PlaneRotation, RotationPlane};
pub use volume::{AxisLayout, Volume, VolumeConfig};
