//! Shadow database synchronization
//!
//! # Architecture
//!
//! - **context**: run-scoped registry, cancellation token and configuration
//! - **rows**: the nine table row types and their SQL mapping
//! - **shadow**: in-memory working copy of the tables with back-pointer maps
//! - **reconcile**: generic Deliver/Materialize pipeline, one run per table
//! - **store**: persistence seam, implemented by `Database` in **db_store**
//! - **verify**: read-only comparison of the tables with a fresh graph
//! - **Synchronizer**: orchestrates a sync or verify run

mod context;
mod db_store;
mod reconcile;
mod rows;
mod shadow;
mod store;
mod verify;

pub use context::RunContext;
pub use reconcile::{Reconcilable, link, link_blob, reconcile};
pub use rows::{
    ContentRow, DirPathRow, FileRow, IndexRow, MetaDirRow, NameRow, PackRow, PathRow, ShadowRow, SnapshotRow,
    SqlValue,
};
pub use shadow::{Newcomers, ShadowEntry, ShadowTable, ShadowTables, Status, TableCounts};
pub use store::ShadowStore;
pub use verify::{Mismatch, MismatchKind, TableCheck, VerifyReport, verify_tables};

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::model::RepositoryGraph;
use crate::repository::RepositorySource;
use crate::repository::scanner::{GraphScanner, reporter};

/// What a sync run changed, per table in dependency order
#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub tables: Vec<TableCounts>,
    pub elapsed: Duration,
}

impl SyncSummary {
    pub fn table(&self, name: &str) -> Option<&TableCounts> {
        self.tables.iter().find(|t| t.table == name)
    }

    pub fn inserted(&self) -> usize {
        self.tables.iter().map(|t| t.inserted).sum()
    }

    pub fn updated(&self) -> usize {
        self.tables.iter().map(|t| t.updated).sum()
    }

    pub fn deleted(&self) -> usize {
        self.tables.iter().map(|t| t.deleted).sum()
    }

    pub fn unchanged(&self) -> usize {
        self.tables.iter().map(|t| t.unchanged).sum()
    }

    pub fn is_noop(&self) -> bool {
        self.tables.iter().all(|t| t.changes() == 0)
    }
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for counts in &self.tables {
            writeln!(f, "{counts}")?;
        }
        write!(
            f,
            "{} inserted, {} updated, {} deleted in {:.2?}",
            self.inserted(),
            self.updated(),
            self.deleted(),
            self.elapsed
        )
    }
}

/// Mirrors one repository into one shadow store
pub struct Synchronizer<'a, S: ShadowStore> {
    repo: Arc<dyn RepositorySource>,
    store: &'a S,
    config: SyncConfig,
}

impl<'a, S: ShadowStore> Synchronizer<'a, S> {
    pub fn new(repo: Arc<dyn RepositorySource>, store: &'a S, config: SyncConfig) -> Self {
        Self { repo, store, config }
    }

    /// Bring the shadow tables in line with the repository.
    ///
    /// Either every change lands in one transaction or nothing is written.
    pub async fn sync(&self) -> SyncResult<SyncSummary> {
        let start = Instant::now();
        let ctx = RunContext::new(self.config.clone());
        let (graph, mut tables) = self.load(&ctx).await?;

        reconcile_all(&ctx, &graph, &mut tables).await?;
        let mut summary = SyncSummary {
            tables: tables.counts(),
            elapsed: Duration::ZERO,
        };

        if !summary.is_noop() {
            tables.absorb_newcomers();
            let progress = reporter(ctx.config.show_progress);
            self.store
                .commit_shadow(&tables, &ctx.registry, ctx.config.insert_batch_size, progress.as_ref())
                .await?;
        }

        summary.elapsed = start.elapsed();
        info!(
            inserted = summary.inserted(),
            updated = summary.updated(),
            deleted = summary.deleted(),
            unchanged = summary.unchanged(),
            elapsed = ?summary.elapsed,
            "sync finished"
        );
        Ok(summary)
    }

    /// Compare the stored tables with a freshly built graph; writes nothing
    pub async fn verify(&self) -> SyncResult<VerifyReport> {
        let ctx = RunContext::new(self.config.clone());
        let (graph, tables) = self.load(&ctx).await?;
        let report = verify_tables(&graph, &tables, &ctx.registry, ctx.config.max_reported_mismatches);
        info!(
            consistent = report.consistent,
            mismatches = report.total_mismatches,
            "verify finished"
        );
        Ok(report)
    }

    /// Build the graph and read the shadow tables concurrently
    async fn load(&self, ctx: &RunContext) -> SyncResult<(RepositoryGraph, ShadowTables)> {
        let scanner = GraphScanner::new(ctx);
        tokio::try_join!(
            async { ctx.observe(scanner.scan(self.repo.clone()).await) },
            async { ctx.observe(self.store.load_shadow(&ctx.registry).await) },
        )
    }
}

/// Reconcile the nine tables in dependency order
pub async fn reconcile_all(ctx: &RunContext, graph: &RepositoryGraph, tables: &mut ShadowTables) -> SyncResult<()> {
    let registry = ctx.registry.as_ref();

    reconcile(ctx, graph, &mut tables.packfiles, |_| Ok(Some(()))).await?;

    reconcile(ctx, graph, &mut tables.index_repo, |row: &IndexRow| {
        Ok(Some(link(&tables.packfiles, &row.pack)?))
    })
    .await?;

    reconcile(ctx, graph, &mut tables.names, |_| Ok(Some(()))).await?;
    reconcile(ctx, graph, &mut tables.snapshots, |_| Ok(Some(()))).await?;

    reconcile(ctx, graph, &mut tables.meta_dir, |row: &MetaDirRow| {
        let Some(dir) = link_blob(&tables.index_repo, registry, row.dir)? else {
            return Ok(None);
        };
        Ok(Some((link(&tables.snapshots, &row.snapshot)?, dir)))
    })
    .await?;

    reconcile(ctx, graph, &mut tables.idd_file, |row: &FileRow| {
        let Some(dir) = link_blob(&tables.index_repo, registry, row.dir)? else {
            return Ok(None);
        };
        Ok(Some((dir, link(&tables.names, &row.name)?)))
    })
    .await?;

    reconcile(ctx, graph, &mut tables.contents, |row: &ContentRow| {
        let Some(blob) = link_blob(&tables.index_repo, registry, row.blob)? else {
            return Ok(None);
        };
        Ok(Some((link(&tables.idd_file, &(row.dir, row.name.clone()))?, blob)))
    })
    .await?;

    reconcile(ctx, graph, &mut tables.fullname, |_| Ok(Some(()))).await?;

    reconcile(ctx, graph, &mut tables.dir_path_id, |row: &DirPathRow| {
        let Some(dir) = link_blob(&tables.index_repo, registry, row.dir)? else {
            return Ok(None);
        };
        Ok(Some((dir, link(&tables.fullname, &row.path)?)))
    })
    .await?;

    Ok(())
}
