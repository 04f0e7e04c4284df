//! Pretrained weight archives in NumPy `.npz` form.
//!
//! Entries are keyed the way the VGG-19 conversion scripts emit them,
//! `conv1_1/W` for kernels and `conv1_1/b` for biases. A `VGG19/` scope
//! prefix, a TensorFlow `:0` output suffix and the `.npy` member extension
//! are all accepted and stripped.

use anyhow::{Context, Result};
use ndarray::ArrayD;
use ndarray_npy::NpzReader;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

/// Scope prefix the feature extractor's parameters live under.
pub const VGG19_SCOPE: &str = "VGG19/";

/// One named array from an archive.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightArray {
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

/// All arrays from an archive, by canonical name.
#[derive(Debug, Clone, Default)]
pub struct NpzWeights {
    arrays: HashMap<String, WeightArray>,
}

impl NpzWeights {
    /// Insert an array under its canonical name.
    pub fn insert(&mut self, name: &str, array: WeightArray) {
        self.arrays.insert(canonical_name(name), array);
    }

    /// Look up an array; `name` may carry any accepted prefix or suffix.
    pub fn get(&self, name: &str) -> Option<&WeightArray> {
        self.arrays.get(&canonical_name(name))
    }

    /// Canonical names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.arrays.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}

/// Read every array of an `.npz` archive as `f32`.
pub fn read_npz<P: AsRef<Path>>(path: P) -> Result<NpzWeights> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open weight archive {}", path.display()))?;
    let mut npz = NpzReader::new(file).with_context(|| format!("Failed to read weight archive {}", path.display()))?;

    let mut weights = NpzWeights::default();
    for name in npz.names().context("Failed to list weight archive")? {
        let array = match npz.by_name::<ndarray::OwnedRepr<f32>, ndarray::IxDyn>(&name) {
            Ok(array) => array,
            Err(_) => {
                let wide: ArrayD<f64> = npz
                    .by_name(&name)
                    .with_context(|| format!("Failed to read array {}", name))?;
                wide.mapv(|v| v as f32)
            }
        };
        weights.insert(&name, to_weight_array(array));
    }

    tracing::info!("Loaded {} arrays from {}", weights.len(), path.display());
    Ok(weights)
}

fn to_weight_array(array: ArrayD<f32>) -> WeightArray {
    let shape = array.shape().to_vec();
    let values = array.iter().copied().collect();
    WeightArray { shape, values }
}

fn canonical_name(name: &str) -> String {
    let name = name.strip_suffix(".npy").unwrap_or(name);
    let name = name.strip_suffix(":0").unwrap_or(name);
    let name = name.strip_prefix(VGG19_SCOPE).unwrap_or(name);
    name.to_string()
}
