//! Run configuration.

use std::str::FromStr;

/// Tuning knobs for a sync or verify run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Tree loader workers. `None` uses the repository's fetch budget.
    pub tree_workers: Option<usize>,
    /// Capacity of every bounded handoff queue (tree dispatch, Deliver → Materialize).
    pub queue_capacity: usize,
    /// Mismatches kept as examples in a verify report.
    pub max_reported_mismatches: usize,
    /// Rows per multi-row INSERT (further capped by SQLite's bind limit).
    pub insert_batch_size: usize,
    /// Show indicatif progress bars.
    pub show_progress: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tree_workers: None,
            queue_capacity: 1024,
            max_reported_mismatches: 20,
            insert_batch_size: 5000,
            show_progress: false,
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by `SHADOWSYNC_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Overlay `SHADOWSYNC_*` environment variables onto `self`.
    pub fn with_env(self) -> Self {
        self.with_lookup(|key| std::env::var(key).ok())
    }

    fn with_lookup(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = self;
        if let Some(workers) = parse_var::<usize>(&lookup, "SHADOWSYNC_TREE_WORKERS") {
            config.tree_workers = Some(workers.max(1));
        }
        if let Some(capacity) = parse_var::<usize>(&lookup, "SHADOWSYNC_QUEUE_CAPACITY") {
            config.queue_capacity = capacity.max(1);
        }
        if let Some(max) = parse_var(&lookup, "SHADOWSYNC_MAX_MISMATCHES") {
            config.max_reported_mismatches = max;
        }
        if let Some(progress) = parse_var(&lookup, "SHADOWSYNC_PROGRESS") {
            config.show_progress = progress;
        }
        config
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}
