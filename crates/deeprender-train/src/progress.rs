//! Progress tracking and callbacks for training runs.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

/// Progress information reported after each epoch.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Epochs completed so far.
    pub epoch: usize,
    pub total_epochs: Option<usize>,
    /// Mean total loss over the epoch.
    pub loss: f64,
    pub elapsed: Duration,
    pub estimated_remaining: Option<Duration>,
    pub learning_rate: f64,
    /// Mean of each loss term over the epoch.
    pub metrics: Vec<(String, f64)>,
}

impl ProgressInfo {
    pub fn new(epoch: usize, total_epochs: Option<usize>, loss: f64, elapsed: Duration, learning_rate: f64) -> Self {
        Self {
            epoch,
            total_epochs,
            loss,
            elapsed,
            estimated_remaining: None,
            learning_rate,
            metrics: Vec::new(),
        }
    }

    /// Calculate progress percentage.
    pub fn progress_percent(&self) -> Option<f64> {
        self.total_epochs
            .filter(|&total| total > 0)
            .map(|total| (self.epoch as f64 / total as f64) * 100.0)
    }

    /// Estimate the remaining time from the mean epoch duration.
    pub fn calculate_remaining(&mut self, epochs_this_run: usize) {
        if let Some(total) = self.total_epochs {
            if epochs_this_run > 0 {
                let per_epoch = self.elapsed.as_secs_f64() / epochs_this_run as f64;
                let remaining = total.saturating_sub(self.epoch);
                self.estimated_remaining = Some(Duration::from_secs_f64(per_epoch * remaining as f64));
            }
        }
    }

    pub fn add_metric(&mut self, name: impl Into<String>, value: f64) {
        self.metrics.push((name.into(), value));
    }
}

/// Receives training progress.
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, info: &ProgressInfo);

    fn on_start(&self) {}

    fn on_complete(&self, _info: &ProgressInfo) {}

    fn on_error(&self, _error: &str) {}
}

/// Logs progress through `tracing`.
#[derive(Debug, Clone)]
pub struct ConsoleProgressCallback {
    /// Log every this many epochs.
    pub log_interval: usize,
}

impl Default for ConsoleProgressCallback {
    fn default() -> Self {
        Self { log_interval: 1 }
    }
}

impl ConsoleProgressCallback {
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
        }
    }
}

impl ProgressCallback for ConsoleProgressCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        if info.epoch % self.log_interval != 0 && info.total_epochs != Some(info.epoch) {
            return;
        }
        let remaining = info
            .estimated_remaining
            .map(|d| format!("{:.0}s", d.as_secs_f64()))
            .unwrap_or_else(|| "N/A".to_string());

        tracing::info!(
            "Epoch {}/{} ({:.1}%) | Loss: {:.6} | LR: {:.2e} | Elapsed: {:.1}s | ETA: {}",
            info.epoch,
            info.total_epochs.map(|n| n.to_string()).unwrap_or_else(|| "?".to_string()),
            info.progress_percent().unwrap_or(0.0),
            info.loss,
            info.learning_rate,
            info.elapsed.as_secs_f64(),
            remaining
        );
        for (name, value) in &info.metrics {
            tracing::debug!("  {}: {:.6e}", name, value);
        }
    }

    fn on_start(&self) {
        tracing::info!("Training started");
    }

    fn on_complete(&self, info: &ProgressInfo) {
        tracing::info!(
            "Training finished after {} epochs in {:.1}s, final loss {:.6}",
            info.epoch,
            info.elapsed.as_secs_f64(),
            info.loss
        );
    }

    fn on_error(&self, error: &str) {
        tracing::error!("Training failed: {}", error);
    }
}

/// Terminal progress bar over epochs.
#[derive(Debug, Clone)]
pub struct ProgressBarCallback {
    bar: ProgressBar,
}

impl ProgressBarCallback {
    pub fn new(total_epochs: usize) -> Self {
        let bar = ProgressBar::new(total_epochs as u64);
        let style = ProgressStyle::with_template("{bar:40} {pos}/{len} epochs [{elapsed_precise}<{eta_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        Self { bar }
    }

    /// Bar that draws nowhere.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl ProgressCallback for ProgressBarCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        self.bar.set_position(info.epoch as u64);
        self.bar.set_message(format!("loss {:.4e}", info.loss));
    }

    fn on_complete(&self, info: &ProgressInfo) {
        self.bar.finish_with_message(format!("loss {:.4e}", info.loss));
    }

    fn on_error(&self, error: &str) {
        self.bar.abandon_with_message(error.to_string());
    }
}

/// Records every report.
#[derive(Debug, Clone, Default)]
pub struct HistoryCallback {
    history: Arc<Mutex<Vec<ProgressInfo>>>,
}

impl HistoryCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_history(&self) -> Vec<ProgressInfo> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ProgressInfo>> {
        self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ProgressCallback for HistoryCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        self.lock().push(info.clone());
    }
}

/// Appends one JSON object per epoch to a file.
#[derive(Debug)]
pub struct JsonLinesCallback {
    file: Mutex<File>,
}

impl JsonLinesCallback {
    /// Open `path` for appending, creating it if needed.
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }
}

impl ProgressCallback for JsonLinesCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        let mut record = serde_json::Map::new();
        record.insert("epoch".into(), json!(info.epoch));
        record.insert("loss".into(), json!(info.loss));
        record.insert("learning_rate".into(), json!(info.learning_rate));
        record.insert("elapsed_secs".into(), json!(info.elapsed.as_secs_f64()));
        for (name, value) in &info.metrics {
            record.insert(name.clone(), json!(value));
        }

        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = writeln!(file, "{}", serde_json::Value::Object(record)) {
            tracing::warn!("Failed to append training statistics: {}", e);
        }
    }
}

/// Fans progress out to registered callbacks.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    callbacks: Vec<Arc<dyn ProgressCallback>>,
    start: Option<Instant>,
    first_epoch: usize,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_callback(&mut self, callback: Arc<dyn ProgressCallback>) {
        self.callbacks.push(callback);
    }

    /// Start timing; `first_epoch` is where a resumed run picks up.
    pub fn start(&mut self, first_epoch: usize) {
        self.start = Some(Instant::now());
        self.first_epoch = first_epoch;
        for callback in &self.callbacks {
            callback.on_start();
        }
    }

    fn elapsed(&self) -> Duration {
        self.start.map(|t| t.elapsed()).unwrap_or(Duration::ZERO)
    }

    /// Report a finished epoch.
    pub fn update(
        &self,
        epoch: usize,
        total_epochs: Option<usize>,
        loss: f64,
        learning_rate: f64,
        metrics: Vec<(String, f64)>,
    ) {
        let mut info = ProgressInfo::new(epoch, total_epochs, loss, self.elapsed(), learning_rate);
        info.metrics = metrics;
        info.calculate_remaining(epoch.saturating_sub(self.first_epoch));

        for callback in &self.callbacks {
            callback.on_progress(&info);
        }
    }

    pub fn complete(&self, epoch: usize, final_loss: f64, learning_rate: f64) {
        let info = ProgressInfo::new(epoch, Some(epoch), final_loss, self.elapsed(), learning_rate);
        for callback in &self.callbacks {
            callback.on_complete(&info);
        }
    }

    pub fn error(&self, error: &str) {
        for callback in &self.callbacks {
            callback.on_error(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_info() {
        let info = ProgressInfo::new(10, Some(100), 0.5, Duration::from_secs(10), 0.01);
        assert_eq!(info.epoch, 10);
        assert_eq!(info.progress_percent(), Some(10.0));
        assert_eq!(ProgressInfo::new(0, Some(0), 0.5, Duration::ZERO, 0.01).progress_percent(), None);
    }

    #[test]
    fn test_remaining_uses_this_run_only() {
        // Resumed at epoch 90, ten epochs in ten seconds, ten to go.
        let mut info = ProgressInfo::new(100, Some(110), 0.5, Duration::from_secs(10), 0.01);
        info.calculate_remaining(10);
        assert_eq!(info.estimated_remaining, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_history_callback() {
        let callback = HistoryCallback::new();
        callback.on_progress(&ProgressInfo::new(1, Some(10), 0.5, Duration::ZERO, 0.01));
        callback.on_progress(&ProgressInfo::new(2, Some(10), 0.4, Duration::ZERO, 0.01));

        let history = callback.get_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].epoch, 2);
        callback.clear();
        assert!(callback.get_history().is_empty());
    }

    #[test]
    fn test_progress_tracker() {
        let history = Arc::new(HistoryCallback::new());
        let bar = Arc::new(ProgressBarCallback::hidden());
        let mut tracker = ProgressTracker::new();
        tracker.add_callback(history.clone());
        tracker.add_callback(bar.clone());
        tracker.add_callback(Arc::new(ConsoleProgressCallback::default()));

        tracker.start(0);
        tracker.update(1, Some(2), 0.5, 1e-4, vec![("total_variation".into(), 3.0)]);
        tracker.update(2, Some(2), 0.4, 1e-4, Vec::new());
        tracker.complete(2, 0.4, 1e-4);

        let history = history.get_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].metrics[0].1, 3.0);
        assert_eq!(bar.position(), 2);
    }

    #[test]
    fn test_json_lines_callback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.jsonl");
        let callback = JsonLinesCallback::create(&path).unwrap();

        let mut info = ProgressInfo::new(1, Some(5), 0.25, Duration::from_secs(2), 2e-4);
        info.add_metric("texture/conv1_1", 1.5);
        callback.on_progress(&info);
        info.epoch = 2;
        callback.on_progress(&info);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["epoch"], 2);
        assert_eq!(lines[0]["texture/conv1_1"], 1.5);
    }
}
