use std::sync::Mutex;
use tracing::info;

/// Observer of a running pass. Purely observational; nothing it does can
/// change the result.
pub trait Progress: Send + Sync {
    /// Called at pass boundaries
    fn message(&self, _message: &str) {}

    /// Called every 100 rows and once at completion, with a value in `0.0..=1.0`
    fn fraction(&self, _fraction: f32) {}
}

/// Discards every notification
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl Progress for NoProgress {}

/// Forwards messages to the `tracing` subscriber
#[derive(Clone, Copy, Debug, Default)]
pub struct LogProgress;

impl Progress for LogProgress {
    fn message(&self, message: &str) {
        info!("{}", message);
    }

    fn fraction(&self, fraction: f32) {
        tracing::debug!(percent = (fraction * 100.0).round() as u32, "progress");
    }
}

/// Keeps every notification, for inspection in tests and callers that poll
#[derive(Debug, Default)]
pub struct RecordedProgress {
    pub messages: Mutex<Vec<String>>,
    pub fractions: Mutex<Vec<f32>>,
}

impl Progress for RecordedProgress {
    fn message(&self, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_owned());
        }
    }

    fn fraction(&self, fraction: f32) {
        if let Ok(mut fractions) = self.fractions.lock() {
            fractions.push(fraction);
        }
    }
}

/// Reports the fraction of `done` rows out of `total`
pub(crate) fn report_rows(progress: &dyn Progress, done: u32, total: u32) {
    let fraction = if total == 0 { 1.0 } else { done as f32 / total as f32 };
    progress.fraction(fraction.clamp(0.0, 1.0));
}
