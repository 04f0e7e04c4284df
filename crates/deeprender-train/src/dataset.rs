//! On-the-fly training pair synthesis.
//!
//! A pair is built from one volume and one style image drawn uniformly with
//! replacement from their directories:
//!
//! ```text
//! volume file ─► conform ─► ray axis last ─► rotate ─► clip ─┬─► intensities ─┐
//!                                                            └─► LUT ─► alpha ┴─► [1, H, W, 2D]
//!                                                                      └─► composite ─► reference [1, H, W, 3]
//! style file ─► RGB ─► resize ─► flip / reverse / rot90 ─► style [1, h, w, 3]
//! ```

use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use deeprender_core::augment::{normalize_channels, StyleAugmentation, STYLE_SEED_RANGE};
use deeprender_core::{AlphaCompositor, OpacityLut, PlaneRotation, Volume};
use rand::Rng;

use crate::config::PipelineConfig;
use crate::error::{Result, TrainingError};

/// Which flavour of pair the generator produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairMode {
    /// Synthesised supervision: rotated, composited and augmented.
    Train,
    /// Raw inputs, the reference is the input itself.
    Evaluate,
}

/// Independently switchable pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStages {
    /// Random rotation of the volume.
    pub augment_volume: bool,
    /// Ray casting into a reference image and opacity channels.
    pub composite: bool,
    /// Random flips and quarter turns of the style.
    pub augment_style: bool,
}

impl PipelineStages {
    pub fn for_mode(mode: PairMode) -> Self {
        match mode {
            PairMode::Train => Self {
                augment_volume: true,
                composite: true,
                augment_style: true,
            },
            PairMode::Evaluate => Self {
                augment_volume: false,
                composite: false,
                augment_style: false,
            },
        }
    }

    /// Composited pairs without random augmentation, for rendering with a
    /// trained generator.
    pub fn inference() -> Self {
        Self {
            augment_volume: false,
            composite: true,
            augment_style: false,
        }
    }
}

/// One (volume, style, reference) triple, NHWC in `[0, 255]`.
#[derive(Debug, Clone)]
pub struct TrainingPair<B: Backend> {
    /// `[1, H, W, 2D]` intensities then opacities, or the raw image when
    /// not composited.
    pub volume: Tensor<B, 4>,
    /// `[1, h, w, 3]`.
    pub style: Tensor<B, 4>,
    /// `[1, H, W, 3]`.
    pub reference: Tensor<B, 4>,
}

impl<B: Backend> TrainingPair<B> {
    /// Move the tensors to another backend or device.
    pub fn to_device<B2: Backend>(self, device: &B2::Device) -> TrainingPair<B2> {
        TrainingPair {
            volume: transfer(self.volume, device),
            style: transfer(self.style, device),
            reference: transfer(self.reference, device),
        }
    }
}

fn transfer<B: Backend, B2: Backend>(tensor: Tensor<B, 4>, device: &B2::Device) -> Tensor<B2, 4> {
    Tensor::from_data(tensor.into_data(), device)
}

/// Produces training pairs from a volume and a style directory.
#[derive(Debug, Clone)]
pub struct TrainingPairGenerator<B: Backend> {
    config: PipelineConfig,
    mode: PairMode,
    stages: PipelineStages,
    device: B::Device,
}

impl<B: Backend> TrainingPairGenerator<B> {
    pub fn new(config: PipelineConfig, mode: PairMode, device: B::Device) -> Self {
        Self {
            config,
            mode,
            stages: PipelineStages::for_mode(mode),
            device,
        }
    }

    /// Override the stages implied by the mode.
    pub fn with_stages(mut self, stages: PipelineStages) -> Self {
        self.stages = stages;
        self
    }

    pub fn mode(&self) -> PairMode {
        self.mode
    }

    pub fn stages(&self) -> PipelineStages {
        self.stages
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Pairs per pass: the configured size, else the number of volumes.
    pub fn len(&self) -> Result<usize> {
        let (volumes, _) = self.list_inputs()?;
        Ok(self.config.size.unwrap_or(volumes.len()))
    }

    /// Start a pass of [`len`](Self::len) pairs.
    ///
    /// Both directories are listed afresh on every call and an empty one is
    /// an error before any pair is produced. Indices are drawn from `rng`
    /// as the iterator advances.
    pub fn pairs<'a, R: Rng + ?Sized>(&'a self, rng: &'a mut R) -> Result<Pairs<'a, B, R>> {
        let (volumes, styles) = self.list_inputs()?;
        let remaining = self.config.size.unwrap_or(volumes.len());
        tracing::debug!(
            "Pair pass over {} volumes and {} styles, {} pairs",
            volumes.len(),
            styles.len(),
            remaining
        );
        Ok(Pairs {
            generator: self,
            volumes,
            styles,
            remaining,
            rng,
        })
    }

    fn list_inputs(&self) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
        let volumes = list_nonempty(&self.config.image_dir)?;
        let styles = list_nonempty(&self.config.style_dir)?;
        Ok((volumes, styles))
    }

    /// Build one pair from the given files.
    pub fn make_pair<R: Rng + ?Sized>(&self, volume_path: &Path, style_path: &Path, rng: &mut R) -> Result<TrainingPair<B>> {
        let (volume, reference) = if self.stages.composite {
            self.composited_volume(volume_path, rng)?
        } else {
            let image = self.raw_volume(volume_path)?;
            (image.clone(), image)
        };

        let [_, h, w, _] = volume.dims();
        let style = self.style(style_path, [h, w], rng)?;
        Ok(TrainingPair {
            volume,
            style,
            reference,
        })
    }

    fn composited_volume<R: Rng + ?Sized>(&self, path: &Path, rng: &mut R) -> Result<(Tensor<B, 4>, Tensor<B, 4>)> {
        let volume = deeprender_io::read_volume::<B, _>(path, &self.device).map_err(|e| TrainingError::load(path, e))?;
        let mut volume = volume.conform(self.config.volume.extent)?.ray_axis_last();

        if self.stages.augment_volume {
            let rotation = PlaneRotation::random(rng, self.config.rotation_plane).with_order(self.config.interpolation);
            volume = rotation.apply(volume);
        }
        let volume = volume.clip();

        let lut = OpacityLut::from_policy(self.config.lut, self.config.zeroed_buckets, rng);
        let projection = AlphaCompositor::new(self.config.composite).project(&volume, &lut)?;

        let intensities = volume.into_data().unsqueeze::<4>();
        let stacked = Tensor::cat(vec![intensities, projection.alpha_channels()], 3);
        Ok((stacked, projection.to_rgb()))
    }

    fn raw_volume(&self, path: &Path) -> Result<Tensor<B, 4>> {
        let volume: Volume<B> =
            deeprender_io::read_volume(path, &self.device).map_err(|e| TrainingError::load(path, e))?;
        let image = normalize_channels(volume.ray_axis_last().into_data())?;
        Ok(image.unsqueeze::<4>())
    }

    fn style<R: Rng + ?Sized>(&self, path: &Path, extent: [usize; 2], rng: &mut R) -> Result<Tensor<B, 4>> {
        let augmentation = self.stages.augment_style.then(|| {
            let seed = rng.random_range(STYLE_SEED_RANGE);
            StyleAugmentation::from_seed(Some(seed), rng)
        });

        // Odd quarter turns swap height and width, so read at the transposed
        // extent to land on the pair's extent after augmenting.
        let [height, width] = extent;
        let read_extent = match augmentation {
            Some(augmentation) if augmentation.quarter_turns % 2 == 1 => [width, height],
            _ => [height, width],
        };
        let read_extent = self.config.resize_style.then_some(read_extent);
        let mut style = deeprender_io::read_style::<B, _>(path, read_extent, &self.device)
            .map_err(|e| TrainingError::load(path, e))?;

        if let Some(augmentation) = augmentation {
            style = augmentation.apply(style);
        }
        Ok(style.unsqueeze::<4>())
    }
}

fn list_nonempty(dir: &Path) -> Result<Vec<PathBuf>> {
    let files = deeprender_io::list_files(dir).map_err(|e| TrainingError::load(dir, e))?;
    if files.is_empty() {
        return Err(TrainingError::EmptyDirectory(dir.to_path_buf()));
    }
    Ok(files)
}

/// Lazy pass over synthesised pairs; see [`TrainingPairGenerator::pairs`].
pub struct Pairs<'a, B: Backend, R: Rng + ?Sized> {
    generator: &'a TrainingPairGenerator<B>,
    volumes: Vec<PathBuf>,
    styles: Vec<PathBuf>,
    remaining: usize,
    rng: &'a mut R,
}

impl<B: Backend, R: Rng + ?Sized> Iterator for Pairs<'_, B, R> {
    type Item = Result<TrainingPair<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let volume = &self.volumes[self.rng.random_range(0..self.volumes.len())];
        let style = &self.styles[self.rng.random_range(0..self.styles.len())];
        tracing::trace!("Pair from {} and {}", volume.display(), style.display());
        Some(self.generator.make_pair(volume, style, self.rng))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<B: Backend, R: Rng + ?Sized> ExactSizeIterator for Pairs<'_, B, R> {}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use deeprender_core::VolumeConfig;
    use image::{Rgb, RgbImage};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::{tempdir, TempDir};

    type TestBackend = NdArray<f32>;

    struct Fixture {
        _root: TempDir,
        config: PipelineConfig,
    }

    fn fixture(volumes: usize, value: f32) -> Fixture {
        let root = tempdir().unwrap();
        let image_dir = root.path().join("image_3d");
        let style_dir = root.path().join("style");
        std::fs::create_dir_all(&image_dir).unwrap();
        std::fs::create_dir_all(&style_dir).unwrap();

        let device = Default::default();
        for i in 0..volumes {
            let data = Tensor::<TestBackend, 3>::ones([6, 8, 10], &device).mul_scalar(value);
            deeprender_io::write_nifti(image_dir.join(format!("vol{}.nii", i)), &data).unwrap();
        }
        RgbImage::from_pixel(5, 7, Rgb([30, 60, 90]))
            .save(style_dir.join("style.png"))
            .unwrap();

        let config = PipelineConfig::new(image_dir, style_dir).with_volume(VolumeConfig::cube(8));
        Fixture { _root: root, config }
    }

    #[test]
    fn test_stages_for_mode() {
        let train = PipelineStages::for_mode(PairMode::Train);
        assert!(train.augment_volume && train.composite && train.augment_style);
        let eval = PipelineStages::for_mode(PairMode::Evaluate);
        assert!(!eval.augment_volume && !eval.composite && !eval.augment_style);
        assert!(PipelineStages::inference().composite);
    }

    #[test]
    fn test_size_defaults_to_volume_count() {
        let fx = fixture(3, 40.0);
        let generator = TrainingPairGenerator::<TestBackend>::new(fx.config.clone(), PairMode::Train, Default::default());
        assert_eq!(generator.len().unwrap(), 3);

        let sized = TrainingPairGenerator::<TestBackend>::new(fx.config.with_size(Some(5)), PairMode::Train, Default::default());
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(sized.pairs(&mut rng).unwrap().count(), 5);
        // A second pass starts over.
        assert_eq!(sized.pairs(&mut rng).unwrap().count(), 5);
    }

    fn references(generator: &TrainingPairGenerator<TestBackend>, rng: &mut StdRng) -> Vec<Vec<f32>> {
        generator
            .pairs(rng)
            .unwrap()
            .map(|pair| pair.unwrap().reference.into_data().to_vec::<f32>().unwrap())
            .collect()
    }

    #[test]
    fn test_each_pass_draws_fresh_augmentation() {
        let fx = fixture(1, 80.0);
        let generator =
            TrainingPairGenerator::<TestBackend>::new(fx.config.with_size(Some(3)), PairMode::Train, Default::default());

        let mut rng = StdRng::seed_from_u64(21);
        let first = references(&generator, &mut rng);
        let second = references(&generator, &mut rng);
        assert_eq!(first.len(), 3);
        assert!(first.iter().zip(second.iter()).any(|(a, b)| a != b));

        // The same seed replays the same pass.
        let replay = references(&generator, &mut StdRng::seed_from_u64(21));
        assert_eq!(first, replay);
    }

    #[test]
    fn test_non_square_extent_keeps_style_aligned() {
        let fx = fixture(1, 80.0);
        let config = fx
            .config
            .with_volume(VolumeConfig::new().with_extent([4, 8, 16]))
            .with_size(Some(20));
        let generator = TrainingPairGenerator::<TestBackend>::new(config, PairMode::Train, Default::default());
        let mut rng = StdRng::seed_from_u64(5);

        for pair in generator.pairs(&mut rng).unwrap() {
            let pair = pair.unwrap();
            assert_eq!(pair.reference.dims(), [1, 8, 16, 3]);
            // Quarter turns must not transpose the style away from the render.
            assert_eq!(pair.style.dims(), [1, 8, 16, 3]);
        }
    }

    #[test]
    fn test_train_pair_shapes() {
        let fx = fixture(1, 80.0);
        let generator = TrainingPairGenerator::<TestBackend>::new(fx.config, PairMode::Train, Default::default());
        let mut rng = StdRng::seed_from_u64(7);

        let pair = generator.pairs(&mut rng).unwrap().next().unwrap().unwrap();
        assert_eq!(pair.volume.dims(), [1, 8, 8, 16]);
        assert_eq!(pair.reference.dims(), [1, 8, 8, 3]);
        assert_eq!(pair.style.dims(), [1, 8, 8, 3]);

        assert!(pair.volume.clone().min().into_scalar() >= 0.0);
        assert!(pair.volume.max().into_scalar() <= 255.0);
        assert!(pair.reference.max().into_scalar() <= 255.0);
    }

    #[test]
    fn test_zero_volume_renders_black() {
        let fx = fixture(1, 0.0);
        let generator = TrainingPairGenerator::<TestBackend>::new(fx.config, PairMode::Train, Default::default());
        let mut rng = StdRng::seed_from_u64(3);

        let pair = generator.pairs(&mut rng).unwrap().next().unwrap().unwrap();
        assert_eq!(pair.reference.clone().abs().max().into_scalar(), 0.0);
        // Bucket 0 is transparent, so the opacity channels are zero too.
        assert_eq!(pair.volume.abs().max().into_scalar(), 0.0);
    }

    #[test]
    fn test_evaluate_pair_is_its_own_reference() {
        let fx = fixture(1, 12.0);
        let generator = TrainingPairGenerator::<TestBackend>::new(fx.config, PairMode::Evaluate, Default::default());
        let mut rng = StdRng::seed_from_u64(0);

        let pair = generator.pairs(&mut rng).unwrap().next().unwrap().unwrap();
        // Raw 6x8x10 volume, ray axis last, first three slices kept.
        assert_eq!(pair.volume.dims(), [1, 8, 10, 3]);
        pair.volume.to_data().assert_eq(&pair.reference.to_data(), true);
        assert_eq!(pair.style.dims(), [1, 8, 10, 3]);
    }

    #[test]
    fn test_empty_directory_fails_up_front() {
        let fx = fixture(0, 0.0);
        let generator = TrainingPairGenerator::<TestBackend>::new(fx.config, PairMode::Train, Default::default());
        let mut rng = StdRng::seed_from_u64(0);

        assert!(matches!(generator.pairs(&mut rng), Err(TrainingError::EmptyDirectory(_))));
        assert!(matches!(generator.len(), Err(TrainingError::EmptyDirectory(_))));
    }

    #[test]
    fn test_missing_directory_is_a_load_error() {
        let config = PipelineConfig::new("/no/such/volumes".into(), "/no/such/styles".into());
        let generator = TrainingPairGenerator::<TestBackend>::new(config, PairMode::Train, Default::default());
        assert!(matches!(generator.len(), Err(TrainingError::Load { .. })));
    }

    #[test]
    fn test_to_device_keeps_values() {
        let device = Default::default();
        let pair = TrainingPair::<TestBackend> {
            volume: Tensor::ones([1, 2, 2, 4], &device),
            style: Tensor::zeros([1, 2, 2, 3], &device),
            reference: Tensor::ones([1, 2, 2, 3], &device),
        };
        let moved: TrainingPair<NdArray<f64>> = pair.to_device(&Default::default());
        assert_eq!(moved.volume.sum().into_scalar(), 16.0);
    }
}
