//! Background pair synthesis.
//!
//! Worker threads each own a pair generator and a random generator and push
//! finished pairs into a bounded channel. Workers restart their pass when it
//! runs out, so the stream is endless; the consumer decides how many pairs
//! make an epoch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use burn::tensor::backend::Backend;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::dataset::{TrainingPair, TrainingPairGenerator};
use crate::error::{Result, TrainingError};

/// Worker pool settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchConfig {
    pub workers: usize,
    /// Capacity of the pair queue.
    pub depth: usize,
    /// Worker `i` seeds its generator with `seed + i`; OS entropy when unset.
    pub seed: Option<u64>,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            depth: 4,
            seed: None,
        }
    }
}

impl PrefetchConfig {
    /// Single worker, as used for evaluation pairs.
    pub fn evaluation() -> Self {
        Self {
            workers: 1,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
}

/// Endless stream of pairs produced by background workers.
pub struct PrefetchLoader<B: Backend> {
    receiver: Option<Receiver<Result<TrainingPair<B>>>>,
    handles: Vec<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl<B: Backend> PrefetchLoader<B>
where
    B::Device: Send + 'static,
{
    /// Start `config.workers` threads, each with its own copy of `generator`.
    pub fn spawn(generator: &TrainingPairGenerator<B>, config: PrefetchConfig) -> Result<Self> {
        if config.workers == 0 || config.depth == 0 {
            return Err(TrainingError::invalid_configuration(
                "prefetch needs at least one worker and a non-empty queue",
            ));
        }

        let (sender, receiver) = mpsc::sync_channel(config.depth);
        let stop = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(config.workers);

        for index in 0..config.workers {
            let sender = sender.clone();
            let stop = stop.clone();
            let generator = generator.clone();
            let mut rng = match config.seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
                None => StdRng::from_rng(&mut rand::rng()),
            };

            let handle = thread::Builder::new()
                .name(format!("prefetch-{}", index))
                .spawn(move || {
                    'passes: loop {
                        let pairs = match generator.pairs(&mut rng) {
                            Ok(pairs) => pairs,
                            Err(e) => {
                                let _ = sender.send(Err(e));
                                break;
                            }
                        };
                        let mut produced = 0usize;
                        for pair in pairs {
                            if stop.load(Ordering::Relaxed) {
                                break 'passes;
                            }
                            let failed = pair.is_err();
                            if sender.send(pair).is_err() || failed {
                                break 'passes;
                            }
                            produced += 1;
                        }
                        if produced == 0 {
                            let _ = sender.send(Err(TrainingError::Worker("pass produced no pairs".into())));
                            break;
                        }
                    }
                    tracing::debug!("Prefetch worker {} exiting", index);
                })
                .map_err(|e| TrainingError::Worker(format!("failed to spawn worker: {}", e)))?;
            handles.push(handle);
        }
        drop(sender);

        tracing::info!("Started {} prefetch workers (queue depth {})", config.workers, config.depth);
        Ok(Self {
            receiver: Some(receiver),
            handles,
            stop,
        })
    }
}

impl<B: Backend> PrefetchLoader<B> {
    /// Block until the next pair is ready.
    pub fn next_pair(&self) -> Result<TrainingPair<B>> {
        let receiver = self
            .receiver
            .as_ref()
            .ok_or_else(|| TrainingError::Worker("loader is shut down".into()))?;
        receiver
            .recv()
            .map_err(|_| TrainingError::Worker("all prefetch workers have exited".into()))?
    }

    /// Stop the workers and wait for them.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // Workers blocked on a full queue see the closed channel.
        self.receiver.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl<B: Backend> Iterator for PrefetchLoader<B> {
    type Item = Result<TrainingPair<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.as_ref()?.recv().ok()
    }
}

impl<B: Backend> Drop for PrefetchLoader<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
