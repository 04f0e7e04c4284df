use anyhow::{Context, Result};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use deeprender_core::Volume;
use ndarray::{Array3, Ix3};
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};
use rayon::prelude::*;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::ColorType;

/// On-disk volume encodings understood by [`read_volume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeFormat {
    /// NIfTI-1, plain or gzip-compressed.
    Nifti,
    /// Multi-page greyscale TIFF, one page per depth slice.
    Tiff,
}

impl VolumeFormat {
    /// Guess the format from the file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".nii") || name.ends_with(".nii.gz") {
            Some(Self::Nifti)
        } else if name.ends_with(".tif") || name.ends_with(".tiff") {
            Some(Self::Tiff)
        } else {
            None
        }
    }
}

/// Read a volume in (depth, height, width) order.
pub fn read_volume<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Volume<B>> {
    let path = path.as_ref();
    match VolumeFormat::from_path(path) {
        Some(VolumeFormat::Nifti) => read_nifti(path, device),
        Some(VolumeFormat::Tiff) => read_tiff_stack(path, device),
        None => anyhow::bail!("Unsupported volume format: {}", path.display()),
    }
}

/// Read a NIfTI file.
///
/// NIfTI stores voxels as (x, y, z); the volume is returned as
/// (z, y, x) = (depth, height, width).
pub fn read_nifti<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Volume<B>> {
    let path = path.as_ref();
    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to read NIfTI file {}", path.display()))?;

    let array = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context("Failed to convert volume to ndarray")?;

    // Drop trailing singleton axes such as a one-frame time dimension.
    let mut array = array;
    while array.ndim() > 3 && array.shape()[array.ndim() - 1] == 1 {
        let last = array.ndim() - 1;
        array = array.index_axis_move(ndarray::Axis(last), 0);
    }
    if array.ndim() != 3 {
        anyhow::bail!("Expected 3D NIfTI file, found {} dimensions", array.ndim());
    }

    let array = array
        .into_dimensionality::<Ix3>()
        .context("Failed to view volume as 3D")?
        .permuted_axes([2, 1, 0]);
    let shape = array.shape().to_vec();
    let values: Vec<f32> = array.iter().copied().collect();

    let data = TensorData::new(values, [shape[0], shape[1], shape[2]]);
    Ok(Volume::new(Tensor::<B, 3>::from_data(data, device)))
}

/// Write a (depth, height, width) tensor as NIfTI.
pub fn write_nifti<B: Backend, P: AsRef<Path>>(path: P, data: &Tensor<B, 3>) -> Result<()> {
    use nifti::writer::WriterOptions;

    let [d, h, w] = data.dims();
    let values = data
        .to_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Failed to get tensor data: {:?}", e))?;

    let array = Array3::from_shape_vec((d, h, w), values)
        .context("Failed to create ndarray")?
        .permuted_axes([2, 1, 0]);

    WriterOptions::new(path.as_ref())
        .write_nifti(&array)
        .map_err(|e| anyhow::anyhow!("Failed to write NIfTI file: {}", e))?;
    Ok(())
}

/// Read a multi-page TIFF, one greyscale page per depth slice.
pub fn read_tiff_stack<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Volume<B>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .with_context(|| format!("Failed to read TIFF file {}", path.display()))?;

    let mut pages = Vec::new();
    let mut extent: Option<(u32, u32)> = None;
    loop {
        let (width, height) = decoder.dimensions()?;
        match decoder.colortype()? {
            ColorType::Gray(_) => {}
            other => anyhow::bail!("Unsupported TIFF color type {:?} in {}", other, path.display()),
        }
        match extent {
            None => extent = Some((width, height)),
            Some(first) if first != (width, height) => anyhow::bail!(
                "TIFF page {} is {}x{}, expected {}x{}",
                pages.len(),
                width,
                height,
                first.0,
                first.1
            ),
            Some(_) => {}
        }

        pages.push(decoder.read_image()?);
        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }

    let (width, height) = extent.context("TIFF file has no pages")?;
    let depth = pages.len();

    let slices = pages
        .into_par_iter()
        .map(page_to_f32)
        .collect::<Result<Vec<_>>>()?;
    let values: Vec<f32> = slices.into_iter().flatten().collect();

    let data = TensorData::new(values, [depth, height as usize, width as usize]);
    Ok(Volume::new(Tensor::<B, 3>::from_data(data, device)))
}

/// Write a (depth, height, width) tensor as a multi-page float TIFF.
pub fn write_tiff_stack<B: Backend, P: AsRef<Path>>(path: P, data: &Tensor<B, 3>) -> Result<()> {
    let path = path.as_ref();
    let [d, h, w] = data.dims();
    let values = data
        .to_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Failed to get tensor data: {:?}", e))?;

    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut encoder = TiffEncoder::new(file)?;
    for page in values.chunks(h * w).take(d) {
        encoder.write_image::<colortype::Gray32Float>(w as u32, h as u32, page)?;
    }
    Ok(())
}

fn page_to_f32(page: DecodingResult) -> Result<Vec<f32>> {
    let values = match page {
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
    };
    Ok(values)
}
