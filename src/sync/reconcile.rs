//! Per-table reconciliation pipeline
//!
//! Two cooperating stages run per table. *Deliver* walks the rows the graph
//! implies, promotes rows already stored and forwards each missing key once.
//! *Materialize* receives the forwarded rows over a bounded channel and hands
//! out primary keys in arrival order, so the keys of one run form a gap-free
//! ascending range starting at the table's high-water mark.

use rustc_hash::FxHashSet;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::model::{IntId, RepositoryGraph};
use crate::repository::scanner::IdRegistry;

use super::context::RunContext;
use super::rows::{IndexRow, ShadowRow};
use super::shadow::{ShadowTable, Status};

/// A table whose expected contents follow from the repository graph
pub trait Reconcilable: ShadowRow {
    /// Rows the graph implies; may repeat a key
    fn expected(graph: &RepositoryGraph) -> impl Iterator<Item = Self> + '_;
}

/// Reconcile one table against the graph.
///
/// `link` resolves the parent keys of a row; `Ok(None)` drops the row, which
/// is how references to the empty tree are absorbed.
pub async fn reconcile<R, F>(
    ctx: &RunContext,
    graph: &RepositoryGraph,
    table: &mut ShadowTable<R>,
    link: F,
) -> SyncResult<()>
where
    R: Reconcilable,
    F: Fn(&R) -> SyncResult<Option<R::Links>>,
{
    ctx.check_cancelled()?;
    let start = Instant::now();
    let cancel = &ctx.cancel;
    let ShadowTable {
        rows,
        newcomers,
        next_pk,
        ..
    } = &mut *table;
    let (tx, mut rx) = mpsc::channel::<(R::Links, R)>(ctx.config.queue_capacity.max(1));

    let deliver = async move {
        let mut sent: FxHashSet<R::Key> = FxHashSet::default();
        for row in R::expected(graph) {
            let key = row.key();

            if let Some(entry) = rows.get_mut(&key) {
                if entry.status != Status::DeleteCandidate {
                    continue;
                }
                let Some(links) = link(&row)? else {
                    continue;
                };
                if entry.row == row && entry.links == links {
                    entry.status = Status::Ok;
                } else if row.updates(&entry.row) {
                    entry.row = row;
                    entry.links = links;
                    entry.status = Status::Update;
                } else {
                    return Err(SyncError::ShadowCorruption(format!(
                        "{}: row {} for {key:?} is {:?}, expected {row:?}",
                        R::TABLE,
                        entry.pk,
                        entry.row
                    )));
                }
                continue;
            }

            if !sent.insert(key) {
                continue;
            }
            let Some(links) = link(&row)? else {
                continue;
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                delivered = tx.send((links, row)) => {
                    if delivered.is_err() {
                        return Err(SyncError::Cancelled);
                    }
                }
            }
        }
        Ok::<(), SyncError>(())
    };

    let materialize = async move {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                next = rx.recv() => next,
            };
            let Some((links, row)) = next else {
                return Ok(());
            };
            newcomers.push(*next_pk, links, row);
            *next_pk += 1;
        }
    };

    ctx.observe(tokio::try_join!(deliver, materialize))?;

    let counts = table.counts();
    debug!(
        table = R::TABLE,
        unchanged = counts.unchanged,
        new = counts.inserted,
        updated = counts.updated,
        stale = counts.deleted,
        elapsed = ?start.elapsed(),
        "table reconciled"
    );
    Ok(())
}

/// Primary key of a parent row, which must exist by the time children are
/// reconciled
pub fn link<P: ShadowRow>(parent: &ShadowTable<P>, key: &P::Key) -> SyncResult<i64> {
    parent.pk_of(key).ok_or_else(|| {
        SyncError::RepositoryCorruption(format!("no {} row for {key:?}", P::TABLE))
    })
}

/// Primary key of an indexed blob; `None` for the empty tree, which never
/// gets a row
pub fn link_blob(index: &ShadowTable<IndexRow>, registry: &IdRegistry, blob: IntId) -> SyncResult<Option<i64>> {
    if blob.is_empty_tree() {
        return Ok(None);
    }
    index.pk_of(&blob).map(Some).ok_or_else(|| {
        SyncError::RepositoryCorruption(format!(
            "blob {} is referenced but not indexed",
            registry.resolve(blob)
        ))
    })
}
