//! Progress of the long phases of a run
//!
//! Tree loading and the commit write-back tick a [`ProgressHandle`]; the
//! binary draws it with indicatif, tests and benches count or ignore it.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::debug;

const BAR_TEMPLATE: &str = "{prefix:>24.bold} [{wide_bar:.cyan/blue}] {human_pos}/{human_len} ({per_sec}, {eta} left)";

/// Ticks of one phase, shared by every worker of that phase
pub trait ProgressHandle: Send + Sync {
    fn inc(&self, n: u64);
    fn finish(&self);
}

/// Opens one handle per phase
pub trait ProgressReporter: Send + Sync {
    fn start(&self, phase: &str, total: u64) -> Arc<dyn ProgressHandle>;
}

/// Bars on stderr when `show`, silence otherwise
pub fn reporter(show: bool) -> Box<dyn ProgressReporter> {
    if show {
        Box::new(IndicatifProgress)
    } else {
        Box::new(NoopProgress)
    }
}

pub struct IndicatifProgress;

impl ProgressReporter for IndicatifProgress {
    fn start(&self, phase: &str, total: u64) -> Arc<dyn ProgressHandle> {
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr())
            .with_style(style)
            .with_prefix(phase.to_string());
        Arc::new(PhaseBar {
            bar,
            phase: phase.to_string(),
            started: Instant::now(),
        })
    }
}

struct PhaseBar {
    bar: ProgressBar,
    phase: String,
    started: Instant,
}

impl ProgressHandle for PhaseBar {
    fn inc(&self, n: u64) {
        self.bar.inc(n);
    }

    fn finish(&self) {
        debug!(
            phase = %self.phase,
            done = self.bar.position(),
            elapsed = ?self.started.elapsed(),
            "phase progress finished"
        );
        self.bar.finish_and_clear();
    }
}

pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn start(&self, _phase: &str, _total: u64) -> Arc<dyn ProgressHandle> {
        Arc::new(NoopHandle)
    }
}

struct NoopHandle;

impl ProgressHandle for NoopHandle {
    fn inc(&self, _n: u64) {}
    fn finish(&self) {}
}

/// Tallies ticks across every phase it opens
#[derive(Debug, Default)]
pub struct CountingProgress {
    ticks: Arc<AtomicU64>,
}

impl CountingProgress {
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl ProgressReporter for CountingProgress {
    fn start(&self, _phase: &str, _total: u64) -> Arc<dyn ProgressHandle> {
        Arc::new(CountingHandle(self.ticks.clone()))
    }
}

struct CountingHandle(Arc<AtomicU64>);

impl ProgressHandle for CountingHandle {
    fn inc(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    fn finish(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting_progress_sums_phases() {
        let progress = CountingProgress::default();
        let trees = progress.start("Loading trees", 3);
        trees.inc(2);
        trees.inc(1);
        trees.finish();
        progress.start("Writing shadow database", 5).inc(5);
        assert_eq!(progress.ticks(), 8);
    }
}
