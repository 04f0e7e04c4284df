//! Named image dumps for monitoring training.

use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use image::{GrayImage, RgbImage};

use crate::dataset::TrainingPair;
use crate::error::{Result, TrainingError};

/// Depth slices shown around the middle of the volume input.
pub const VIZ_SLICES: usize = 4;

/// Image batches keyed by name, each `[N, H, W, C]` in `[0, 255]` with
/// `C` of 1 or 3.
#[derive(Debug, Clone)]
pub struct NamedOutputs<B: Backend> {
    entries: Vec<(String, Tensor<B, 4>)>,
}

impl<B: Backend> NamedOutputs<B> {
    /// The standard set for one step: `viz_image`, `viz_img2d`, `viz_style`
    /// and `rendering`.
    ///
    /// `render` is the generator output, NHWC in `[-1, 1]`.
    pub fn for_step(pair: &TrainingPair<B>, render: Tensor<B, 4>) -> Self {
        let [_, h, w, channels] = pair.volume.dims();
        // Composited inputs hold intensities in the first half.
        let depth = if channels % 2 == 0 { channels / 2 } else { channels };
        let count = VIZ_SLICES.min(depth);
        let start = (depth / 2).saturating_sub(count / 2).min(depth - count);
        let slices = pair
            .volume
            .clone()
            .narrow(3, start, count)
            .permute([3, 1, 2, 0])
            .reshape([count, h, w, 1]);

        let rendering = render.div_scalar(2.0).add_scalar(0.5).mul_scalar(255.0);

        Self {
            entries: vec![
                ("viz_image".to_string(), slices),
                ("viz_img2d".to_string(), pair.reference.clone()),
                ("viz_style".to_string(), pair.style.clone()),
                ("rendering".to_string(), rendering),
            ],
        }
    }

    pub fn get(&self, name: &str) -> Option<&Tensor<B, 4>> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor<B, 4>)> {
        self.entries.iter().map(|(n, t)| (n.as_str(), t))
    }
}

/// Consumes named outputs at a given epoch.
pub trait Visualizer<B: Backend>: Send {
    fn visualize(&self, epoch: usize, outputs: &NamedOutputs<B>) -> Result<()>;
}

/// Writes every image as `<dir>/<name>-epoch<N>-<i>.png`.
#[derive(Debug, Clone)]
pub struct PngVisualizer {
    dir: PathBuf,
}

impl PngVisualizer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl<B: Backend> Visualizer<B> for PngVisualizer {
    fn visualize(&self, epoch: usize, outputs: &NamedOutputs<B>) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| TrainingError::load(&self.dir, anyhow::Error::from(e)))?;

        for (name, batch) in outputs.iter() {
            let [n, h, w, c] = batch.dims();
            let values = batch
                .clone()
                .clamp(0.0, 255.0)
                .into_data()
                .convert::<f32>()
                .to_vec::<f32>()
                .map_err(|e| TrainingError::Worker(format!("cannot read {} pixels: {:?}", name, e)))?;
            let bytes: Vec<u8> = values.into_iter().map(|v| v.round() as u8).collect();

            for (i, image) in bytes.chunks(h * w * c).take(n).enumerate() {
                let path = self.dir.join(format!("{}-epoch{}-{}.png", name, epoch, i));
                save_u8(&path, image.to_vec(), w as u32, h as u32, c)?;
            }
        }
        tracing::debug!("Wrote visualisations for epoch {} to {}", epoch, self.dir.display());
        Ok(())
    }
}

fn save_u8(path: &Path, bytes: Vec<u8>, width: u32, height: u32, channels: usize) -> Result<()> {
    let saved = match channels {
        1 => GrayImage::from_raw(width, height, bytes).map(|img| img.save(path)),
        3 => RgbImage::from_raw(width, height, bytes).map(|img| img.save(path)),
        other => {
            return Err(TrainingError::invalid_configuration(format!(
                "cannot visualise {} channels",
                other
            )))
        }
    };
    match saved {
        Some(Ok(())) => Ok(()),
        Some(Err(e)) => Err(TrainingError::load(path, anyhow::Error::from(e))),
        None => Err(TrainingError::load(path, anyhow::anyhow!("image buffer size mismatch"))),
    }
}
