//! Database implementation of ShadowStore

use crate::error::SyncResult;
use crate::repository::Database;
use crate::repository::scanner::{IdRegistry, ProgressReporter};

use super::shadow::ShadowTables;
use super::store::ShadowStore;

impl ShadowStore for Database {
    async fn load_shadow(&self, registry: &IdRegistry) -> SyncResult<ShadowTables> {
        let mut tables = ShadowTables::default();

        let packfiles = self.load_table(&tables, registry).await?;
        tables.packfiles = packfiles;
        let index_repo = self.load_table(&tables, registry).await?;
        tables.index_repo = index_repo;
        let names = self.load_table(&tables, registry).await?;
        tables.names = names;
        let snapshots = self.load_table(&tables, registry).await?;
        tables.snapshots = snapshots;
        let meta_dir = self.load_table(&tables, registry).await?;
        tables.meta_dir = meta_dir;
        let idd_file = self.load_table(&tables, registry).await?;
        tables.idd_file = idd_file;
        let contents = self.load_table(&tables, registry).await?;
        tables.contents = contents;
        let fullname = self.load_table(&tables, registry).await?;
        tables.fullname = fullname;
        let dir_path_id = self.load_table(&tables, registry).await?;
        tables.dir_path_id = dir_path_id;

        Ok(tables)
    }

    async fn commit_shadow(
        &self,
        tables: &ShadowTables,
        registry: &IdRegistry,
        batch_size: usize,
        progress: &dyn ProgressReporter,
    ) -> SyncResult<()> {
        Database::commit_shadow(self, tables, registry, batch_size, progress).await
    }
}
