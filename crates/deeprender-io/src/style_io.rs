//! 2D raster images: style inputs and rendered outputs.

use anyhow::{Context, Result};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use deeprender_core::augment::normalize_channels;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use std::path::Path;

/// Read an image as `[h, w, c]` in `[0, 255]`, keeping its channel count.
pub fn read_image<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Tensor<B, 3>> {
    let path = path.as_ref();
    let image = image::open(path).with_context(|| format!("Failed to read image {}", path.display()))?;
    Ok(image_to_tensor(image, device))
}

/// Read a style image as RGB `[h, w, 3]`.
///
/// Greyscale sources are replicated into three channels and alpha is
/// dropped. When `extent` is `[height, width]` the image is resampled to it.
pub fn read_style<B: Backend, P: AsRef<Path>>(
    path: P,
    extent: Option<[usize; 2]>,
    device: &B::Device,
) -> Result<Tensor<B, 3>> {
    let path = path.as_ref();
    let mut image = image::open(path).with_context(|| format!("Failed to read style {}", path.display()))?;

    if let Some([height, width]) = extent {
        if image.height() as usize != height || image.width() as usize != width {
            image = image.resize_exact(width as u32, height as u32, FilterType::CatmullRom);
        }
    }

    normalize_channels(image_to_tensor(image, device)).map_err(anyhow::Error::from)
}

/// Write an `[h, w, 3]` tensor in `[0, 255]` as an 8-bit PNG.
pub fn write_rgb_png<B: Backend, P: AsRef<Path>>(path: P, image: Tensor<B, 3>) -> Result<()> {
    let path = path.as_ref();
    let [h, w, c] = image.dims();
    if c != 3 {
        anyhow::bail!("Expected 3 channels, found {}", c);
    }

    let values = image
        .clamp(0.0, 255.0)
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Failed to get tensor data: {:?}", e))?;
    let bytes: Vec<u8> = values.into_iter().map(|v| v.round() as u8).collect();

    let buffer = RgbImage::from_raw(w as u32, h as u32, bytes).context("Image buffer size mismatch")?;
    buffer
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn image_to_tensor<B: Backend>(image: DynamicImage, device: &B::Device) -> Tensor<B, 3> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let channels = image.color().channel_count() as usize;

    let bytes = match channels {
        1 => image.into_luma8().into_raw(),
        2 => image.into_luma_alpha8().into_raw(),
        3 => image.into_rgb8().into_raw(),
        _ => image.into_rgba8().into_raw(),
    };
    let channels = bytes.len() / (width * height).max(1);
    let values: Vec<f32> = bytes.into_iter().map(f32::from).collect();

    Tensor::from_data(TensorData::new(values, [height, width, channels]), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use image::{GrayImage, Luma, Rgb, Rgba, RgbaImage};
    use tempfile::tempdir;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_grey_style_is_replicated() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("grey.png");
        GrayImage::from_pixel(6, 4, Luma([77])).save(&path)?;

        let device = Default::default();
        let style = read_style::<TestBackend, _>(&path, None, &device)?;
        assert_eq!(style.dims(), [4, 6, 3]);
        assert_eq!(style.clone().min().into_scalar(), 77.0);
        assert_eq!(style.max().into_scalar(), 77.0);
        Ok(())
    }

    #[test]
    fn test_alpha_is_dropped() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("rgba.png");
        RgbaImage::from_pixel(3, 3, Rgba([10, 20, 30, 255])).save(&path)?;

        let device = Default::default();
        let raw = read_image::<TestBackend, _>(&path, &device)?;
        assert_eq!(raw.dims(), [3, 3, 4]);

        let style = read_style::<TestBackend, _>(&path, None, &device)?;
        let values = style.into_data().to_vec::<f32>().unwrap();
        assert_eq!(&values[..3], &[10.0, 20.0, 30.0]);
        Ok(())
    }

    #[test]
    fn test_style_resampled_to_extent() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("solid.png");
        RgbImage::from_pixel(8, 8, Rgb([200, 100, 50])).save(&path)?;

        let device = Default::default();
        let style = read_style::<TestBackend, _>(&path, Some([16, 32]), &device)?;
        assert_eq!(style.dims(), [16, 32, 3]);
        Ok(())
    }

    #[test]
    fn test_png_roundtrip() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("out.png");
        let device = Default::default();

        let image = Tensor::<TestBackend, 3>::ones([5, 7, 3], &device).mul_scalar(300.0);
        write_rgb_png(&path, image)?;

        let back = read_image::<TestBackend, _>(&path, &device)?;
        assert_eq!(back.dims(), [5, 7, 3]);
        assert_eq!(back.min().into_scalar(), 255.0);
        Ok(())
    }

    #[test]
    fn test_missing_image_is_an_error() {
        let device = Default::default();
        assert!(read_image::<TestBackend, _>("/no/such/style.png", &device).is_err());
    }
}
