//! Generator checkpoints on disk.
//!
//! Checkpoints live in `<dir>/epoch-<N>.bin`, written with burn's
//! full-precision binary recorder.

use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use deeprender_model::Generator;

use crate::error::{Result, TrainingError};

const PREFIX: &str = "epoch-";
const EXTENSION: &str = "bin";

/// Checkpoint path for `epoch`, without the recorder's extension.
pub fn checkpoint_stem(dir: &Path, epoch: usize) -> PathBuf {
    dir.join(format!("{}{}", PREFIX, epoch))
}

/// Save `generator` after `epoch` and return the written file.
pub fn save_checkpoint<B: Backend>(generator: &Generator<B>, dir: &Path, epoch: usize) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .map_err(|e| TrainingError::checkpoint(format!("cannot create {}: {}", dir.display(), e)))?;

    let stem = checkpoint_stem(dir, epoch);
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    generator
        .clone()
        .save_file(&stem, &recorder)
        .map_err(|e| TrainingError::checkpoint(format!("cannot save {}: {}", stem.display(), e)))?;

    let path = stem.with_extension(EXTENSION);
    tracing::info!("Saved checkpoint {}", path.display());
    Ok(path)
}

/// Load weights from `path` into `generator`.
///
/// `path` may name the file with or without its extension.
pub fn load_checkpoint<B: Backend>(generator: Generator<B>, path: &Path, device: &B::Device) -> Result<Generator<B>> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let generator = generator
        .load_file(path.to_path_buf(), &recorder, device)
        .map_err(|e| TrainingError::checkpoint(format!("cannot load {}: {}", path.display(), e)))?;
    tracing::info!("Restored checkpoint {}", path.display());
    Ok(generator)
}

/// Epoch encoded in a checkpoint file name.
pub fn checkpoint_epoch(path: &Path) -> Option<usize> {
    let stem = path.file_stem()?.to_str()?;
    stem.strip_prefix(PREFIX)?.parse().ok()
}

/// Most recent checkpoint in `dir`, if any.
pub fn latest_checkpoint(dir: &Path) -> Option<(usize, PathBuf)> {
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(EXTENSION))
        .filter_map(|path| checkpoint_epoch(&path).map(|epoch| (epoch, path)))
        .max_by_key(|(epoch, _)| *epoch)
}
