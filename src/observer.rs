//! Progress reporting hooks.
//!
//! Workers and the orchestrator report through [`ProgressObserver`] so the same
//! download code can drive an indicatif bar in the foreground or plain log
//! lines when running detached. Observers are purely observational: none of
//! the methods can fail.
use indicatif::{ProgressBar, ProgressStyle};

pub trait ProgressObserver: Send + Sync {
    /// Called once the file name and size are known.
    fn begin(&self, _filename: &str, _total_bytes: u64) {}
    /// Shows a short status message.
    fn message(&self, msg: String);
    /// Adds `bytes` to the running total.
    fn inc(&self, bytes: u64);
    /// Marks the download as finished.
    fn finish(&self);
}

/// Renders progress with an indicatif bar.
pub struct ConsoleObserver {
    pub pb: ProgressBar,
}

impl ConsoleObserver {
    /// A bar that stays empty until the download reports its size.
    pub fn new() -> Self {
        let pb = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template(
            "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
        ) {
            pb.set_style(style.progress_chars("=>-"));
        }
        ConsoleObserver { pb }
    }
}

impl Default for ConsoleObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for ConsoleObserver {
    fn begin(&self, filename: &str, total_bytes: u64) {
        self.pb.set_length(total_bytes);
        self.pb.set_message(filename.to_string());
    }

    fn message(&self, msg: String) {
        self.pb.set_message(msg);
    }

    fn inc(&self, bytes: u64) {
        self.pb.inc(bytes);
    }

    fn finish(&self) {
        self.pb.finish_with_message("Done!");
    }
}

/// Sends messages to the log and ignores byte counts; used when detached.
#[derive(Debug, Default)]
pub struct LogObserver;

impl ProgressObserver for LogObserver {
    fn begin(&self, filename: &str, total_bytes: u64) {
        tracing::info!("Saving {} bytes as {}", total_bytes, filename);
    }

    fn message(&self, msg: String) {
        tracing::info!("{msg}");
    }

    fn inc(&self, _bytes: u64) {}

    fn finish(&self) {
        tracing::info!("Download finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_observer_counts_bytes() {
        let observer = ConsoleObserver {
            pb: ProgressBar::hidden(),
        };
        observer.begin("file.bin", 100);
        assert_eq!(observer.pb.length(), Some(100));

        observer.inc(10);
        observer.inc(15);
        observer.message("Retrying failed chunks...".into());

        assert_eq!(observer.pb.position(), 25);
        assert_eq!(observer.pb.message(), "Retrying failed chunks...");
    }
}
