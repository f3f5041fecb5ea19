//! Error types for a sync or verify run.

use thiserror::Error;

/// Format a list of offending ids for display, capping at MAX_DISPLAYED to keep
/// messages usable against large repositories.
pub fn format_capped<T: std::fmt::Display>(items: &[T]) -> String {
    const MAX_DISPLAYED: usize = 5;
    let shown: Vec<String> = items
        .iter()
        .take(MAX_DISPLAYED)
        .map(|item| item.to_string())
        .collect();
    if items.len() <= MAX_DISPLAYED {
        format!("[{}]", shown.join(", "))
    } else {
        format!(
            "[{}] (and {} more)",
            shown.join(", "),
            items.len() - MAX_DISPLAYED
        )
    }
}

/// Fatal errors of a sync run. Any of these aborts the run and rolls back.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A blob or tree reference cannot be resolved, a tree does not parse,
    /// or a content hash has the wrong length.
    #[error("repository corruption: {0}")]
    RepositoryCorruption(String),

    /// A stored foreign key cannot be resolved through the back-pointer maps,
    /// or a stored row contradicts its content-addressed source.
    #[error("shadow database corruption: {0}")]
    ShadowCorruption(String),

    #[error("repository backend error: {0:#}")]
    Backend(#[source] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Observed by a stage after another stage of the same run failed.
    #[error("sync run cancelled")]
    Cancelled,

    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl SyncError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

/// Keep the first meaningful error of a fan-in: a real failure replaces a
/// `Cancelled` that merely reports it.
pub(crate) fn keep_first(slot: &mut Option<SyncError>, err: SyncError) {
    match slot {
        None => *slot = Some(err),
        Some(existing) if existing.is_cancelled() && !err.is_cancelled() => *slot = Some(err),
        Some(_) => {}
    }
}
