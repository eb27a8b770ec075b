use tracing::info;

/// Write-only progress channel from a generation session to whoever owns the
/// job record. Implementations must not block and must not fail.
pub trait ProgressSink: Send + Sync {
  fn update(&self, percent: u8, label: &str);
}

/// Progress reported through the log only, for CLI runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
  fn update(&self, percent: u8, label: &str) {
    info!("[{:>3}%] {}", percent.min(100), label);
  }
}

impl<F> ProgressSink for F
where
  F: Fn(u8, &str) + Send + Sync,
{
  fn update(&self, percent: u8, label: &str) {
    self(percent, label)
  }
}
