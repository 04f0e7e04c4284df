use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use burn::backend::wgpu::WgpuDevice;
use burn::backend::{Autodiff, Wgpu};
use burn::config::Config;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn_ndarray::{NdArray, NdArrayDevice};
use clap::Parser;
use deeprender_model::Vgg19Config;
use deeprender_train::checkpoint::checkpoint_epoch;
use deeprender_train::{
    load_checkpoint, render, ConsoleProgressCallback, JsonLinesCallback, PairMode, PipelineConfig, PipelineStages, PngVisualizer,
    PrefetchConfig, PrefetchLoader, ProgressBarCallback, ProgressTracker, Trainer, TrainingConfig,
    TrainingPairGenerator,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

const DEFAULT_IMAGE_DIR: &str = "data/image_3d/";
const DEFAULT_STYLE_DIR: &str = "data/style_chinese/";

#[derive(Parser, Debug)]
#[command(name = "deeprender")]
#[command(about = "Train a network that renders 3D volumes as stylised 2D projections")]
struct Cli {
    /// GPU index to train on with the wgpu backend; CPU when absent
    #[arg(long)]
    gpu: Option<usize>,

    /// Generator checkpoint to resume from or to apply
    #[arg(long)]
    load: Option<PathBuf>,

    /// Render every volume with the loaded generator instead of training
    #[arg(long)]
    apply: bool,

    /// Directory of volumes [default: data/image_3d/]
    #[arg(long)]
    image: Option<PathBuf>,

    /// Directory of style images [default: data/style_chinese/]
    #[arg(long)]
    style: Option<PathBuf>,

    /// Pretrained VGG-19 weights
    #[arg(long, default_value = "data/vgg19.npz")]
    vgg19: PathBuf,

    /// Directory for checkpoints, visualisations and renderings
    #[arg(long, default_value = ".")]
    output: PathBuf,

    /// Training configuration as JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the number of epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Override the optimisation steps per epoch
    #[arg(long)]
    epoch_size: Option<usize>,

    /// Seed the pair workers for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!("{:?}", cli);
    let config = training_config(&cli)?;

    match (cli.apply, cli.gpu) {
        (true, Some(index)) => apply::<Wgpu>(&cli, &config, WgpuDevice::DiscreteGpu(index)),
        (true, None) => apply::<NdArray>(&cli, &config, NdArrayDevice::Cpu),
        (false, Some(index)) => train::<Autodiff<Wgpu>>(&cli, config, WgpuDevice::DiscreteGpu(index)),
        (false, None) => train::<Autodiff<NdArray>>(&cli, config, NdArrayDevice::Cpu),
    }
}

/// Merge the JSON configuration, if any, with the command line.
fn training_config(cli: &Cli) -> Result<TrainingConfig> {
    let mut config = match &cli.config {
        Some(path) => TrainingConfig::load(path)
            .map_err(|e| anyhow::anyhow!("Failed to read configuration {}: {}", path.display(), e))?,
        None => TrainingConfig::new(PipelineConfig::new(
            PathBuf::from(DEFAULT_IMAGE_DIR),
            PathBuf::from(DEFAULT_STYLE_DIR),
        )),
    };

    if let Some(image) = &cli.image {
        config.pipeline.image_dir = image.clone();
    }
    if let Some(style) = &cli.style {
        config.pipeline.style_dir = style.clone();
    }
    if let Some(epochs) = cli.epochs {
        config.max_epochs = epochs;
    }
    if let Some(epoch_size) = cli.epoch_size {
        config.epoch_size = epoch_size;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }

    let config = config.with_matching_generator();
    config.validate()?;
    Ok(config)
}

fn train<B: AutodiffBackend>(cli: &Cli, config: TrainingConfig, device: B::Device) -> Result<()> {
    // Checkpoints hold the generator only, so resumed runs need the weights too.
    if !cli.vgg19.is_file() {
        anyhow::bail!("VGG-19 weights not found at {}", cli.vgg19.display());
    }
    let vgg = Vgg19Config::new().load_npz::<B, _>(&cli.vgg19, &device)?;

    let mut generator = config.generator.init::<B>(&device);
    let mut start_epoch = 0;
    if let Some(path) = &cli.load {
        generator = load_checkpoint(generator, path, &device)?;
        start_epoch = checkpoint_epoch(path).unwrap_or(0);
    }

    std::fs::create_dir_all(&cli.output)
        .with_context(|| format!("Failed to create output directory {}", cli.output.display()))?;
    config
        .save(cli.output.join("config.json"))
        .context("Failed to save the training configuration")?;

    let pairs = TrainingPairGenerator::<NdArray>::new(config.pipeline.clone(), PairMode::Train, NdArrayDevice::Cpu);
    info!("{} volumes per pass", pairs.len()?);
    let mut loader = PrefetchLoader::spawn(
        &pairs,
        PrefetchConfig {
            workers: config.workers,
            depth: config.prefetch_depth,
            seed: config.seed,
        },
    )?;

    let mut tracker = ProgressTracker::new();
    tracker.add_callback(Arc::new(ConsoleProgressCallback::new(1)));
    tracker.add_callback(Arc::new(ProgressBarCallback::new(config.max_epochs)));
    tracker.add_callback(Arc::new(JsonLinesCallback::create(&cli.output.join("stats.jsonl"))?));

    let mut trainer = Trainer::new(config, vgg, device, &cli.output)?
        .with_tracker(tracker)
        .with_visualizer(PngVisualizer::new(cli.output.join("viz")));
    let result = trainer.fit(generator, &mut loader, start_epoch);
    loader.shutdown();
    result?;

    info!("Checkpoints written to {}", trainer.checkpoint_dir().display());
    Ok(())
}

fn apply<B: Backend>(cli: &Cli, config: &TrainingConfig, device: B::Device) -> Result<()> {
    let checkpoint = cli.load.as_ref().context("--apply needs a checkpoint given with --load")?;
    let generator = load_checkpoint(config.generator.init::<B>(&device), checkpoint, &device)?;

    let pipeline = &config.pipeline;
    let pairs = TrainingPairGenerator::<B>::new(pipeline.clone(), PairMode::Evaluate, device)
        .with_stages(PipelineStages::inference());
    let volumes = deeprender_io::list_files(&pipeline.image_dir)?;
    let styles = deeprender_io::list_files(&pipeline.style_dir)?;
    let style = styles
        .first()
        .with_context(|| format!("No style images in {}", pipeline.style_dir.display()))?;

    std::fs::create_dir_all(&cli.output)
        .with_context(|| format!("Failed to create output directory {}", cli.output.display()))?;

    let mut rng = StdRng::seed_from_u64(config.seed.unwrap_or_default());
    for volume in &volumes {
        let pair = pairs.make_pair(volume, style, &mut rng)?;
        let [_, h, w, c] = pair.reference.dims();
        let image = render(&generator, &pair).reshape([h, w, c]);

        let path = cli.output.join(format!("{}.png", base_name(volume)));
        deeprender_io::write_rgb_png(&path, image)?;
        info!("Rendered {} -> {}", volume.display(), path.display());
    }
    Ok(())
}

/// File name up to the first dot, so `a.nii.gz` becomes `a`.
fn base_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.split('.').next())
        .unwrap_or("volume")
        .to_string()
}
