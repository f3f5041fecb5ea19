//! Shadow store trait for persistence abstraction
//!
//! Decouples reconciliation from the database implementation.

use crate::error::SyncResult;
use crate::repository::scanner::{IdRegistry, ProgressReporter};

use super::shadow::ShadowTables;

/// Persistence layer for the shadow tables
#[allow(async_fn_in_trait)]
pub trait ShadowStore {
    /// Read all nine tables in dependency order, resolving stored foreign
    /// keys into logical keys
    async fn load_shadow(&self, registry: &IdRegistry) -> SyncResult<ShadowTables>;

    /// Persist the reconciled tables atomically: either every change of the
    /// run lands or none does
    async fn commit_shadow(
        &self,
        tables: &ShadowTables,
        registry: &IdRegistry,
        batch_size: usize,
        progress: &dyn ProgressReporter,
    ) -> SyncResult<()>;
}
