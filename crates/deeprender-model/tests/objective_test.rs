use burn::backend::Autodiff;
use burn::prelude::*;
use burn::tensor::Distribution;
use burn_ndarray::NdArray;
use deeprender_model::features::{FeatureExtractor, Vgg19Config};
use deeprender_model::{GeneratorConfig, LossComposer, LossConfig};
use ndarray::{Array1, Array4};
use ndarray_npy::NpzWriter;
use std::fs::File;
use tempfile::tempdir;

type TestBackend = NdArray<f32>;
type TrainBackend = Autodiff<NdArray<f32>>;

const WIDTHS: [usize; 5] = [2, 2, 2, 2, 2];

fn write_archive(path: &std::path::Path) -> anyhow::Result<()> {
    let mut writer = NpzWriter::new(File::create(path)?);
    for (index, (name, [i, o])) in Vgg19Config::new().with_widths(WIDTHS).layers().into_iter().enumerate() {
        let kernel = Array4::<f32>::from_shape_fn((3, 3, i, o), |(y, x, c, k)| {
            0.01 * ((y + 2 * x + c + k + index) % 5) as f32
        });
        let bias = Array1::<f32>::from_elem(o, 0.1);
        writer.add_array(format!("VGG19/{}/W", name), &kernel)?;
        writer.add_array(format!("VGG19/{}/b", name), &bias)?;
    }
    writer.finish()?;
    Ok(())
}

#[test]
fn test_pretrained_extractor_from_archive() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("vgg19.npz");
    write_archive(&path)?;

    let device = Default::default();
    let vgg = Vgg19Config::new().with_widths(WIDTHS).load_npz::<TestBackend, _>(&path, &device)?;
    let images = Tensor::<TestBackend, 4>::random([1, 3, 32, 32], Distribution::Uniform(0.0, 255.0), &device);
    let maps = vgg.extract(images);

    assert_eq!(maps.len(), 21);
    assert_eq!(maps.require("pool5")?.dims(), [1, 2, 1, 1]);
    // Every tap is post-ReLU.
    assert!(maps.require("conv3_2")?.min().into_scalar() >= 0.0);
    Ok(())
}

#[test]
fn test_missing_archive_fails() {
    let device = Default::default();
    assert!(Vgg19Config::new().load_npz::<TestBackend, _>("/no/such/vgg19.npz", &device).is_err());
}

#[test]
fn test_gradients_reach_generator_only() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("vgg19.npz");
    write_archive(&path)?;

    let device = Default::default();
    let vgg = Vgg19Config::new().with_widths(WIDTHS).load_npz::<TrainBackend, _>(&path, &device)?;
    let composer = LossComposer::new(vgg, LossConfig::new().with_patch_size(2))?;

    let generator = GeneratorConfig::for_depth(2).with_base_filters(2).init::<TrainBackend>(&device);
    let volume = Tensor::<TrainBackend, 4>::random([1, 4, 32, 32], Distribution::Uniform(-1.0, 1.0), &device);
    let reference = Tensor::<TrainBackend, 4>::random([1, 3, 32, 32], Distribution::Uniform(-1.0, 1.0), &device);
    let style = Tensor::<TrainBackend, 4>::random([1, 3, 32, 32], Distribution::Uniform(-1.0, 1.0), &device);

    let render = generator.forward(volume, style.clone());
    let breakdown = composer.compute(render, reference, style)?;
    assert!(breakdown.total.clone().into_scalar().is_finite());

    let grads = breakdown.total.backward();
    assert!(generator.head.weight.grad(&grads).is_some());
    assert!(composer.extractor().convs[0].weight.grad(&grads).is_none());
    Ok(())
}
