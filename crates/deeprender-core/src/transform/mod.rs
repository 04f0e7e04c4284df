//! Spatial transforms applied to conditioned volumes.

pub mod rotation;

pub use rotation::{PlaneRotation, RotationPlane};
