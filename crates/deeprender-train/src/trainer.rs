//! The optimisation loop.
//!
//! Each step moves a prefetched pair onto the training device, maps it to
//! the `tanh` range in NCHW layout, renders it, evaluates the objective and
//! applies one Adam update to the generator. Per-epoch means of every loss
//! term go to the progress tracker; checkpoints and image dumps are taken
//! on their configured cadence.

use std::path::{Path, PathBuf};

use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use deeprender_model::scaling::{nchw_to_nhwc, nhwc_to_nchw, to_image, to_tanh, PIXEL_MAX};
use deeprender_model::{FeatureExtractor, Generator, LossComposer};

use crate::checkpoint::save_checkpoint;
use crate::config::TrainingConfig;
use crate::dataset::TrainingPair;
use crate::error::{Result, TrainingError};
use crate::progress::ProgressTracker;
use crate::visualize::{NamedOutputs, Visualizer};

/// Render a pair with a generator: NHWC pixels in `[0, 255]`.
pub fn render<B: Backend>(generator: &Generator<B>, pair: &TrainingPair<B>) -> Tensor<B, 4> {
    let volume = nhwc_to_nchw(to_tanh(pair.volume.clone()));
    let style = nhwc_to_nchw(to_tanh(pair.style.clone()));
    nchw_to_nhwc(to_image(generator.forward(volume, style))).clamp(0.0, PIXEL_MAX)
}

/// Per-epoch running sums of the loss scalars.
#[derive(Debug, Default)]
struct EpochMeans {
    sums: Vec<(String, f64)>,
    steps: usize,
}

impl EpochMeans {
    fn add(&mut self, scalars: Vec<(String, f64)>) {
        if self.sums.is_empty() {
            self.sums = scalars;
        } else {
            for ((_, sum), (_, value)) in self.sums.iter_mut().zip(scalars) {
                *sum += value;
            }
        }
        self.steps += 1;
    }

    fn means(&self) -> Vec<(String, f64)> {
        let n = self.steps.max(1) as f64;
        self.sums.iter().map(|(name, sum)| (name.clone(), sum / n)).collect()
    }

    fn total(&self) -> f64 {
        self.sums
            .iter()
            .find(|(name, _)| name == "total")
            .map(|(_, sum)| sum / self.steps.max(1) as f64)
            .unwrap_or(f64::NAN)
    }
}

/// Trains a [`Generator`] against a frozen feature extractor.
pub struct Trainer<B: AutodiffBackend, F: FeatureExtractor<B>> {
    config: TrainingConfig,
    objective: LossComposer<B, F>,
    device: B::Device,
    tracker: ProgressTracker,
    visualizer: Option<Box<dyn Visualizer<B>>>,
    checkpoint_dir: PathBuf,
}

impl<B: AutodiffBackend, F: FeatureExtractor<B>> Trainer<B, F> {
    /// Checkpoints go to `<output_dir>/checkpoints`.
    pub fn new(config: TrainingConfig, extractor: F, device: B::Device, output_dir: &Path) -> Result<Self> {
        config.validate()?;
        let objective = LossComposer::new(extractor, config.loss.clone())?;
        Ok(Self {
            config,
            objective,
            device,
            tracker: ProgressTracker::new(),
            visualizer: None,
            checkpoint_dir: output_dir.join("checkpoints"),
        })
    }

    pub fn with_tracker(mut self, tracker: ProgressTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_visualizer(mut self, visualizer: impl Visualizer<B> + 'static) -> Self {
        self.visualizer = Some(Box::new(visualizer));
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    /// Train from `start_epoch` up to the configured epoch count.
    ///
    /// `pairs` must keep yielding for `epoch_size` steps per epoch; a pair
    /// that failed to synthesise aborts the run.
    pub fn fit<P, I>(&mut self, generator: Generator<B>, mut pairs: I, start_epoch: usize) -> Result<Generator<B>>
    where
        P: Backend,
        I: Iterator<Item = Result<TrainingPair<P>>>,
    {
        let total = self.config.max_epochs;
        tracing::info!(
            "Training epochs {}..{} with {} steps each",
            start_epoch + 1,
            total,
            self.config.epoch_size
        );

        let mut optimizer = self.config.optimizer.init::<B, Generator<B>>();
        let mut generator = generator;
        let mut last = (f64::NAN, self.config.schedule.get_learning_rate(start_epoch));
        self.tracker.start(start_epoch);

        for epoch in (start_epoch + 1)..=total {
            let lr = self.config.schedule.get_learning_rate(epoch);
            generator = match self.run_epoch(generator, &mut optimizer, &mut pairs, epoch, lr) {
                Ok((generator, loss)) => {
                    last = (loss, lr);
                    generator
                }
                Err(e) => {
                    self.tracker.error(&e.to_string());
                    return Err(e);
                }
            };

            if self.config.checkpoint_every > 0 && epoch % self.config.checkpoint_every == 0 && epoch != total {
                save_checkpoint(&generator, &self.checkpoint_dir, epoch)?;
            }
        }

        if total > start_epoch {
            save_checkpoint(&generator, &self.checkpoint_dir, total)?;
        }
        self.tracker.complete(total, last.0, last.1);
        Ok(generator)
    }

    fn run_epoch<P, I, O>(
        &self,
        mut generator: Generator<B>,
        optimizer: &mut O,
        pairs: &mut I,
        epoch: usize,
        lr: f64,
    ) -> Result<(Generator<B>, f64)>
    where
        P: Backend,
        I: Iterator<Item = Result<TrainingPair<P>>>,
        O: Optimizer<Generator<B>, B>,
    {
        let mut means = EpochMeans::default();
        let mut shown = None;

        for _ in 0..self.config.epoch_size {
            let pair = pairs
                .next()
                .ok_or_else(|| TrainingError::Worker("pair stream ended".into()))??
                .to_device::<B>(&self.device);

            let (updated, scalars, rendering) = self.step(generator, optimizer, &pair, lr)?;
            generator = updated;
            means.add(scalars);
            shown = Some((pair, rendering));
        }

        let loss = means.total();
        if !loss.is_finite() {
            return Err(TrainingError::Diverged { epoch });
        }
        self.tracker
            .update(epoch, Some(self.config.max_epochs), loss, lr, means.means());

        let due = self.config.visualize_every > 0 && epoch % self.config.visualize_every == 0;
        if let (true, Some(visualizer), Some((pair, rendering))) = (due, &self.visualizer, shown) {
            visualizer.visualize(epoch, &NamedOutputs::for_step(&pair, rendering))?;
        }
        Ok((generator, loss))
    }

    /// One update; returns the new generator, the loss scalars and the
    /// detached NHWC rendering in `[-1, 1]`.
    fn step<O>(
        &self,
        generator: Generator<B>,
        optimizer: &mut O,
        pair: &TrainingPair<B>,
        lr: f64,
    ) -> Result<(Generator<B>, Vec<(String, f64)>, Tensor<B, 4>)>
    where
        O: Optimizer<Generator<B>, B>,
    {
        let volume = nhwc_to_nchw(to_tanh(pair.volume.clone()));
        let reference = nhwc_to_nchw(to_tanh(pair.reference.clone()));
        let style = nhwc_to_nchw(to_tanh(pair.style.clone()));

        let rendering = generator.forward(volume, style.clone());
        let losses = self.objective.compute(rendering.clone(), reference, style)?;
        let scalars = losses.scalars();

        let grads = losses.total.backward();
        let grads = GradientsParams::from_grads(grads, &generator);
        let generator = optimizer.step(lr, generator, grads);

        Ok((generator, scalars, nchw_to_nhwc(rendering.detach())))
    }
}

/// Drop autodiff tracking from a trained generator.
pub fn into_inference<B: AutodiffBackend>(generator: Generator<B>) -> Generator<B::InnerBackend> {
    generator.valid()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::progress::HistoryCallback;
    use crate::schedule::LearningRateSchedule;
    use burn::backend::Autodiff;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;
    use deeprender_core::VolumeConfig;
    use deeprender_model::{FeatureMaps, LossConfig, WeightedLayer};
    use std::sync::Arc;
    use tempfile::tempdir;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<TestBackend>;

    const DEPTH: usize = 4;
    const SIDE: usize = 16;

    /// Exposes the image itself as its only feature map.
    struct PixelExtractor;

    impl<B: Backend> FeatureExtractor<B> for PixelExtractor {
        fn extract(&self, images: Tensor<B, 4>) -> FeatureMaps<B> {
            let mut maps = FeatureMaps::new();
            maps.insert("pixels", images);
            maps
        }
    }

    fn config(epochs: usize) -> TrainingConfig {
        let pipeline = PipelineConfig::new("unused".into(), "unused".into())
            .with_volume(VolumeConfig::new().with_extent([DEPTH, SIDE, SIDE]));
        let loss = LossConfig::new()
            .with_perceptual(vec![WeightedLayer::new("pixels", 1.0)])
            .with_texture(vec![WeightedLayer::new("pixels", 1e-3)])
            .with_patch_size(4);
        TrainingConfig::new(pipeline)
            .with_generator(deeprender_model::GeneratorConfig::for_depth(DEPTH).with_base_filters(2))
            .with_loss(loss)
            .with_schedule(LearningRateSchedule::constant(1e-3))
            .with_max_epochs(epochs)
            .with_epoch_size(2)
            .with_checkpoint_every(1)
            .with_visualize_every(0)
    }

    fn pair() -> TrainingPair<TestBackend> {
        let device = Default::default();
        TrainingPair {
            volume: Tensor::random([1, SIDE, SIDE, 2 * DEPTH], Distribution::Uniform(0.0, 255.0), &device),
            style: Tensor::random([1, SIDE, SIDE, 3], Distribution::Uniform(0.0, 255.0), &device),
            reference: Tensor::random([1, SIDE, SIDE, 3], Distribution::Uniform(0.0, 255.0), &device),
        }
    }

    fn stream() -> impl Iterator<Item = Result<TrainingPair<TestBackend>>> {
        let fixed = pair();
        std::iter::repeat_with(move || Ok(fixed.clone()))
    }

    #[test]
    fn test_render_range() {
        let device = Default::default();
        let generator = config(1).generator.init::<TestBackend>(&device);
        let image = render(&generator, &pair());
        assert_eq!(image.dims(), [1, SIDE, SIDE, 3]);
        assert!(image.clone().min().into_scalar() >= 0.0);
        assert!(image.max().into_scalar() <= 255.0);
    }

    #[test]
    fn test_fit_updates_and_checkpoints() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let config = config(2);
        let generator = config.generator.init::<TestAutodiffBackend>(&device);

        let probe = pair();
        let before = render(&into_inference(generator.clone()), &probe);

        let history = Arc::new(HistoryCallback::new());
        let mut tracker = ProgressTracker::new();
        tracker.add_callback(history.clone());

        let mut trainer = Trainer::<TestAutodiffBackend, _>::new(config, PixelExtractor, device, dir.path())
            .unwrap()
            .with_tracker(tracker);
        let trained = trainer.fit(generator, stream(), 0).unwrap();

        let after = render(&into_inference(trained), &probe);
        let change: f32 = (after - before).abs().sum().into_scalar();
        assert!(change > 0.0);

        let epochs: Vec<usize> = history.get_history().iter().map(|info| info.epoch).collect();
        assert_eq!(epochs, vec![1, 2]);
        let metrics = &history.get_history()[0].metrics;
        for name in ["perceptual/pixels", "texture/pixels", "total_variation", "total"] {
            assert!(metrics.iter().any(|(n, v)| n == name && v.is_finite()), "{}", name);
        }

        assert!(dir.path().join("checkpoints/epoch-1.bin").exists());
        assert!(dir.path().join("checkpoints/epoch-2.bin").exists());
    }

    #[test]
    fn test_resume_past_last_epoch_is_a_no_op() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let config = config(2);
        let generator = config.generator.init::<TestAutodiffBackend>(&device);

        let mut trainer = Trainer::<TestAutodiffBackend, _>::new(config, PixelExtractor, device, dir.path()).unwrap();
        trainer.fit(generator, std::iter::empty::<Result<TrainingPair<TestBackend>>>(), 2).unwrap();
        assert!(!trainer.checkpoint_dir().exists());
    }

    #[test]
    fn test_exhausted_stream_is_an_error() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let config = config(1);
        let generator = config.generator.init::<TestAutodiffBackend>(&device);

        let mut trainer = Trainer::<TestAutodiffBackend, _>::new(config, PixelExtractor, device, dir.path()).unwrap();
        let one = std::iter::once(Ok(pair()));
        assert!(matches!(trainer.fit(generator, one, 0), Err(TrainingError::Worker(_))));
    }

    #[test]
    fn test_failed_pair_aborts() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let config = config(1);
        let generator = config.generator.init::<TestAutodiffBackend>(&device);

        let mut trainer = Trainer::<TestAutodiffBackend, _>::new(config, PixelExtractor, device, dir.path()).unwrap();
        let failing = std::iter::once(Err(TrainingError::EmptyDirectory("styles".into())));
        let result = trainer.fit::<TestBackend, _>(generator, failing, 0);
        assert!(matches!(result, Err(TrainingError::EmptyDirectory(_))));
    }

    #[test]
    fn test_rejects_mismatched_generator() {
        let dir = tempdir().unwrap();
        let config = config(1).with_generator(deeprender_model::GeneratorConfig::for_depth(DEPTH + 1));
        let result = Trainer::<TestAutodiffBackend, _>::new(config, PixelExtractor, Default::default(), dir.path());
        assert!(matches!(result, Err(TrainingError::InvalidConfiguration(_))));
    }
}
