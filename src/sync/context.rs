use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::repository::scanner::IdRegistry;

/// State scoped to one sync or verify run.
///
/// Created at run start and dropped at run end; nothing in it outlives the
/// run. The registry is the only structure mutated by several workers.
#[derive(Debug)]
pub struct RunContext {
    pub registry: Arc<IdRegistry>,
    /// Tripped by the first failing stage; every stage checks it at its handoffs
    pub cancel: CancellationToken,
    pub config: SyncConfig,
}

impl RunContext {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            registry: Arc::new(IdRegistry::new()),
            cancel: CancellationToken::new(),
            config,
        }
    }

    pub fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancel.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Cancel the run if `result` is a real failure
    pub fn observe<T>(&self, result: SyncResult<T>) -> SyncResult<T> {
        if let Err(e) = &result {
            if !e.is_cancelled() {
                self.cancel.cancel();
            }
        }
        result
    }
}
