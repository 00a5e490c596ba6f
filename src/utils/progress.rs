//! Progress tracking for a harvest run.
//!
//! # Usage
//!
//! ```ignore
//! use citation_harvester::utils::ProgressReporter;
//!
//! let reporter = ProgressReporter::new("Extracting articles", links.len());
//! // from any worker:
//! reporter.succeeded();
//! reporter.failed();
//! reporter.finish();
//! ```

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Progress reporter with optional terminal output
///
/// Quiet reporters still count outcomes; they just never draw. Clones share
/// the same counters and bar.
#[derive(Clone)]
pub struct ProgressReporter {
    name: String,
    total: usize,
    succeeded: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
    start_time: Instant,
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a reporter that draws a bar on stderr
    ///
    /// - `name`: Description of the operation
    /// - `total`: Total number of units of work
    pub fn new(name: &str, total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "{msg}: {bar:40.cyan/blue} {pos}/{len} ({percent}%) [{elapsed_precise}]",
        ) {
            bar.set_style(style.progress_chars("█▓▒░ "));
        }
        bar.set_message(name.to_string());
        bar.enable_steady_tick(Duration::from_millis(200));

        Self::with_bar(name, total, bar)
    }

    /// Create a quiet reporter that doesn't output anything
    pub fn quiet(name: &str, total: usize) -> Self {
        Self::with_bar(name, total, ProgressBar::hidden())
    }

    fn with_bar(name: &str, total: usize, bar: ProgressBar) -> Self {
        Self {
            name: name.to_string(),
            total,
            succeeded: Arc::new(AtomicUsize::new(0)),
            failed: Arc::new(AtomicUsize::new(0)),
            start_time: Instant::now(),
            bar,
        }
    }

    /// One unit finished successfully
    pub fn succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::SeqCst);
        self.bar.inc(1);
    }

    /// One unit failed permanently
    pub fn failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.bar.inc(1);
    }

    /// Print a line above the bar without garbling it
    pub fn println(&self, line: impl AsRef<str>) {
        self.bar.println(line);
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
        tracing::debug!(
            "{}: {}/{} done ({} failed) in {:.1}s",
            self.name,
            self.current(),
            self.total,
            self.failed_count(),
            self.start_time.elapsed().as_secs_f64()
        );
    }

    /// Units finished so far, failures included
    pub fn current(&self) -> usize {
        self.succeeded_count() + self.failed_count()
    }

    pub fn succeeded_count(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst)
    }

    pub fn failed_count(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn is_done(&self) -> bool {
        self.current() >= self.total
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("name", &self.name)
            .field("total", &self.total)
            .field("succeeded", &self.succeeded_count())
            .field("failed", &self.failed_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_reporter_counts() {
        let reporter = ProgressReporter::quiet("test", 3);
        reporter.succeeded();
        reporter.failed();
        assert_eq!(reporter.current(), 2);
        assert_eq!(reporter.succeeded_count(), 1);
        assert_eq!(reporter.failed_count(), 1);
        assert!(!reporter.is_done());

        reporter.succeeded();
        assert!(reporter.is_done());
    }

    #[test]
    fn test_clones_share_counters() {
        let reporter = ProgressReporter::quiet("test", 10);
        let clone = reporter.clone();
        clone.succeeded();
        assert_eq!(reporter.succeeded_count(), 1);
    }

    #[test]
    fn test_zero_total_is_done() {
        let reporter = ProgressReporter::quiet("test", 0);
        assert!(reporter.is_done());
        reporter.finish();
    }
}
