//! Progress reporting for multi-target runs.

use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;

/// Receives dispatch progress. Calls arrive from the collecting task only.
pub trait ProgressObserver: Send + Sync {
    fn start(&self, total: u64, message: &str);

    /// One target finished, whatever its outcome.
    fn advance(&self);

    fn finish(&self);
}

/// Terminal progress bar.
#[derive(Debug, Default)]
pub struct TerminalProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressObserver for TerminalProgress {
    fn start(&self, total: u64, message: &str) {
        let bar = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{msg} [{bar:40.green/white}] {pos}/{len} ({elapsed})")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.set_message(message.to_string());
        *self.bar.lock() = Some(bar);
    }

    fn advance(&self) {
        if let Some(bar) = self.bar.lock().as_ref() {
            bar.inc(1);
        }
    }

    fn finish(&self) {
        if let Some(bar) = self.bar.lock().take() {
            bar.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_lifecycle() {
        let progress = TerminalProgress::new();
        progress.advance();
        progress.start(3, "Running tcp");
        progress.advance();
        progress.advance();
        assert_eq!(progress.bar.lock().as_ref().map(|b| b.position()), Some(2));
        progress.finish();
        assert!(progress.bar.lock().is_none());
    }
}
