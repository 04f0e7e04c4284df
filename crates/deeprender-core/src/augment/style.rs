//! Random flip, reverse and quarter-turn augmentation of `[h, w, c]` images.
//!
//! The three draws are made in a fixed order: flip, reverse, rotate. When a
//! seed is supplied every draw restarts from a generator seeded with it, so
//! the same seed always yields the same combination no matter what the
//! caller's generator has produced before.

use std::ops::Range;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Range style seeds are drawn from for each training pair.
pub const STYLE_SEED_RANGE: Range<u64> = 0..20_152_015;

/// Mirror applied to the image plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlipMode {
    /// Mirror left-right.
    Horizontal,
    /// Mirror top-bottom.
    Vertical,
    /// Mirror both ways.
    Both,
    /// Leave unchanged.
    Identity,
}

impl FlipMode {
    pub const ALL: [FlipMode; 4] = [Self::Horizontal, Self::Vertical, Self::Both, Self::Identity];

    fn apply<B: Backend>(&self, image: Tensor<B, 3>) -> Tensor<B, 3> {
        match self {
            Self::Horizontal => image.flip([1]),
            Self::Vertical => image.flip([0]),
            Self::Both => image.flip([0, 1]),
            Self::Identity => image,
        }
    }
}

/// One concrete combination of style augmentations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StyleAugmentation {
    pub flip: FlipMode,
    /// Reverse the leading (row) axis.
    pub reverse: bool,
    /// Counter-clockwise quarter turns, `0..4`.
    pub quarter_turns: u8,
}

impl StyleAugmentation {
    /// Leaves the image unchanged.
    pub fn identity() -> Self {
        Self {
            flip: FlipMode::Identity,
            reverse: false,
            quarter_turns: 0,
        }
    }

    /// Draw all three operations from `rng`.
    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let flip = draw_flip(rng);
        let reverse = draw_reverse(rng);
        let quarter_turns = draw_quarter_turns(rng);
        Self {
            flip,
            reverse,
            quarter_turns,
        }
    }

    /// Draw with optional reseeding.
    ///
    /// A non-zero seed restarts a dedicated generator before each of the
    /// three draws. `None` or a zero seed draws from `rng` instead.
    pub fn from_seed<R: Rng + ?Sized>(seed: Option<u64>, rng: &mut R) -> Self {
        match seed.filter(|s| *s != 0) {
            Some(seed) => Self {
                flip: draw_flip(&mut StdRng::seed_from_u64(seed)),
                reverse: draw_reverse(&mut StdRng::seed_from_u64(seed)),
                quarter_turns: draw_quarter_turns(&mut StdRng::seed_from_u64(seed)),
            },
            None => Self::sample(rng),
        }
    }

    /// Apply flip, then reverse, then rotation to an `[h, w, c]` image.
    pub fn apply<B: Backend>(&self, image: Tensor<B, 3>) -> Tensor<B, 3> {
        let mut image = self.flip.apply(image);
        if self.reverse {
            image = image.flip([0]);
        }
        for _ in 0..self.quarter_turns % 4 {
            image = image.swap_dims(0, 1).flip([0]);
        }
        image
    }
}

fn draw_flip<R: Rng + ?Sized>(rng: &mut R) -> FlipMode {
    FlipMode::ALL[rng.random_range(0..FlipMode::ALL.len())]
}

fn draw_reverse<R: Rng + ?Sized>(rng: &mut R) -> bool {
    rng.random_range(0..2u8) == 1
}

fn draw_quarter_turns<R: Rng + ?Sized>(rng: &mut R) -> u8 {
    rng.random_range(0..4u8)
}

/// Bring an `[h, w, c]` image to exactly three channels.
///
/// Single-channel (and grey plus alpha) images are replicated into RGB;
/// images with three or more channels keep their first three.
pub fn normalize_channels<B: Backend>(image: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
    let [_, _, c] = image.dims();
    match c {
        0 => Err(CoreError::invalid_argument("image has no channels")),
        1 | 2 => {
            let grey = image.narrow(2, 0, 1);
            Ok(Tensor::cat(vec![grey.clone(), grey.clone(), grey], 2))
        }
        _ => Ok(image.narrow(2, 0, 3)),
    }
}
