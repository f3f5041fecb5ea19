//! In-memory image of the shadow database
//!
//! Each table is indexed by logical key and carries a back-pointer map from
//! primary key to logical key. Rows the reconciler creates wait in
//! [`Newcomers`] until commit, when they are absorbed as `New` rows.

use rustc_hash::FxHashMap;
use std::fmt;

use crate::error::{SyncError, SyncResult};
use crate::util::format_count;

use super::rows::{
    ContentRow, DirPathRow, FileRow, IndexRow, MetaDirRow, NameRow, PackRow, PathRow, ShadowRow, SnapshotRow,
};

/// Disposition of a row after reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Loaded from the database and not yet seen in the graph
    DeleteCandidate,
    Ok,
    New,
    Update,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShadowEntry<R: ShadowRow> {
    pub pk: i64,
    pub links: R::Links,
    pub row: R,
    pub status: Status,
}

/// Rows created during reconciliation, in primary-key order
pub struct Newcomers<R: ShadowRow> {
    entries: Vec<ShadowEntry<R>>,
    pks: FxHashMap<R::Key, i64>,
}

impl<R: ShadowRow> Default for Newcomers<R> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            pks: FxHashMap::default(),
        }
    }
}

impl<R: ShadowRow> Newcomers<R> {
    pub fn push(&mut self, pk: i64, links: R::Links, row: R) {
        self.pks.insert(row.key(), pk);
        self.entries.push(ShadowEntry {
            pk,
            links,
            row,
            status: Status::New,
        });
    }

    pub fn pk_of(&self, key: &R::Key) -> Option<i64> {
        self.pks.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShadowEntry<R>> {
        self.entries.iter()
    }
}

/// Row counts of one table after reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableCounts {
    pub table: &'static str,
    pub unchanged: usize,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl TableCounts {
    pub fn changes(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

impl fmt::Display for TableCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<12} unchanged {:>10}  inserted {:>10}  updated {:>10}  deleted {:>10}",
            self.table,
            format_count(self.unchanged),
            format_count(self.inserted),
            format_count(self.updated),
            format_count(self.deleted)
        )
    }
}

pub struct ShadowTable<R: ShadowRow> {
    pub(crate) rows: FxHashMap<R::Key, ShadowEntry<R>>,
    pub(crate) by_pk: FxHashMap<i64, R::Key>,
    pub(crate) newcomers: Newcomers<R>,
    /// Next primary key to hand out; never reused within the database
    pub(crate) next_pk: i64,
}

impl<R: ShadowRow> Default for ShadowTable<R> {
    fn default() -> Self {
        Self {
            rows: FxHashMap::default(),
            by_pk: FxHashMap::default(),
            newcomers: Newcomers::default(),
            next_pk: 1,
        }
    }
}

impl<R: ShadowRow> ShadowTable<R> {
    /// Register a row read from the database
    pub fn insert_loaded(&mut self, pk: i64, links: R::Links, row: R) -> SyncResult<()> {
        let key = row.key();
        if self.rows.contains_key(&key) {
            return Err(SyncError::ShadowCorruption(format!(
                "{}: logical key {key:?} stored twice (second copy has id {pk})",
                R::TABLE
            )));
        }
        if self.by_pk.insert(pk, key.clone()).is_some() {
            return Err(SyncError::ShadowCorruption(format!("{}: id {pk} stored twice", R::TABLE)));
        }
        self.next_pk = self.next_pk.max(pk + 1);
        self.rows.insert(
            key,
            ShadowEntry {
                pk,
                links,
                row,
                status: Status::DeleteCandidate,
            },
        );
        Ok(())
    }

    /// Raise the next key to a persisted high-water mark
    pub fn seed_next_pk(&mut self, high_water: Option<i64>) {
        if let Some(mark) = high_water {
            self.next_pk = self.next_pk.max(mark);
        }
    }

    pub fn key_of(&self, pk: i64) -> Option<&R::Key> {
        self.by_pk.get(&pk)
    }

    /// Primary key of a row, loaded or created during this run
    pub fn pk_of(&self, key: &R::Key) -> Option<i64> {
        self.rows
            .get(key)
            .map(|entry| entry.pk)
            .or_else(|| self.newcomers.pk_of(key))
    }

    pub fn get(&self, key: &R::Key) -> Option<&ShadowEntry<R>> {
        self.rows.get(key)
    }

    pub fn next_pk(&self) -> i64 {
        self.next_pk
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn newcomers(&self) -> &Newcomers<R> {
        &self.newcomers
    }

    pub fn with_status(&self, status: Status) -> impl Iterator<Item = &ShadowEntry<R>> {
        self.rows.values().filter(move |entry| entry.status == status)
    }

    /// Move newcomers into the table proper as `New` rows
    pub fn absorb_newcomers(&mut self) {
        let newcomers = std::mem::take(&mut self.newcomers);
        for entry in newcomers.entries {
            let key = entry.row.key();
            self.by_pk.insert(entry.pk, key.clone());
            self.rows.insert(key, entry);
        }
    }

    pub fn counts(&self) -> TableCounts {
        let mut counts = TableCounts {
            table: R::TABLE,
            inserted: self.newcomers.len(),
            ..TableCounts::default()
        };
        for entry in self.rows.values() {
            match entry.status {
                Status::Ok => counts.unchanged += 1,
                Status::New => counts.inserted += 1,
                Status::Update => counts.updated += 1,
                Status::DeleteCandidate => counts.deleted += 1,
            }
        }
        counts
    }
}

/// The nine shadow tables, fields in dependency order
#[derive(Default)]
pub struct ShadowTables {
    pub packfiles: ShadowTable<PackRow>,
    pub index_repo: ShadowTable<IndexRow>,
    pub names: ShadowTable<NameRow>,
    pub snapshots: ShadowTable<SnapshotRow>,
    pub meta_dir: ShadowTable<MetaDirRow>,
    pub idd_file: ShadowTable<FileRow>,
    pub contents: ShadowTable<ContentRow>,
    pub fullname: ShadowTable<PathRow>,
    pub dir_path_id: ShadowTable<DirPathRow>,
}

impl ShadowTables {
    pub fn counts(&self) -> Vec<TableCounts> {
        vec![
            self.packfiles.counts(),
            self.index_repo.counts(),
            self.names.counts(),
            self.snapshots.counts(),
            self.meta_dir.counts(),
            self.idd_file.counts(),
            self.contents.counts(),
            self.fullname.counts(),
            self.dir_path_id.counts(),
        ]
    }

    pub fn absorb_newcomers(&mut self) {
        self.packfiles.absorb_newcomers();
        self.index_repo.absorb_newcomers();
        self.names.absorb_newcomers();
        self.snapshots.absorb_newcomers();
        self.meta_dir.absorb_newcomers();
        self.idd_file.absorb_newcomers();
        self.contents.absorb_newcomers();
        self.fullname.absorb_newcomers();
        self.dir_path_id.absorb_newcomers();
    }

    /// `(table, next primary key)` for every table
    pub fn high_water_marks(&self) -> [(&'static str, i64); 9] {
        [
            (PackRow::TABLE, self.packfiles.next_pk),
            (IndexRow::TABLE, self.index_repo.next_pk),
            (NameRow::TABLE, self.names.next_pk),
            (SnapshotRow::TABLE, self.snapshots.next_pk),
            (MetaDirRow::TABLE, self.meta_dir.next_pk),
            (FileRow::TABLE, self.idd_file.next_pk),
            (ContentRow::TABLE, self.contents.next_pk),
            (PathRow::TABLE, self.fullname.next_pk),
            (DirPathRow::TABLE, self.dir_path_id.next_pk),
        ]
    }
}
