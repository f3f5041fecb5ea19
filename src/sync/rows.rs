//! Row types of the nine shadow tables
//!
//! Every row is held in domain terms (compact ids, names, paths). The stored
//! integer foreign keys travel alongside as `Links` and are resolved through
//! the back-pointer maps of the parent tables when a table is read.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::fmt;
use std::hash::Hash;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::{SyncError, SyncResult};
use crate::model::{BlobKind, EntryKind, IntId, RepositoryGraph};
use crate::repository::scanner::IdRegistry;

use super::reconcile::Reconcilable;
use super::shadow::{ShadowTable, ShadowTables};

/// A value bound into an INSERT or UPDATE
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(i64),
    Text(String),
}

/// Persistence contract of one shadow table
pub trait ShadowRow: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Logical key, unique within the table
    type Key: Clone + Eq + Hash + fmt::Debug + Send + Sync;
    /// Primary keys of the parent rows this row points at
    type Links: Copy + PartialEq + fmt::Debug + Send + Sync;

    const TABLE: &'static str;
    /// Columns after `id`, in the order `encode` produces them
    const COLUMNS: &'static [&'static str];
    /// Columns rewritten by an UPDATE, in the order `encode_update` produces them
    const UPDATE_COLUMNS: &'static [&'static str] = &[];

    fn key(&self) -> Self::Key;

    /// Build a row from its stored form; parents must already be loaded
    fn decode(row: &SqliteRow, tables: &ShadowTables, registry: &IdRegistry) -> SyncResult<(Self::Links, Self)>;

    fn encode(&self, links: &Self::Links, registry: &IdRegistry) -> SyncResult<Vec<SqlValue>>;

    fn encode_update(&self, _links: &Self::Links) -> SyncResult<Vec<SqlValue>> {
        Ok(Vec::new())
    }

    /// Whether `stored` may be rewritten into `self` through `UPDATE_COLUMNS`
    fn updates(&self, _stored: &Self) -> bool {
        !Self::UPDATE_COLUMNS.is_empty()
    }

    /// Human-readable key for diagnostics
    fn describe(&self, _registry: &IdRegistry) -> String {
        format!("{:?}", self.key())
    }
}

fn corrupt(table: &str, detail: impl fmt::Display) -> SyncError {
    SyncError::ShadowCorruption(format!("{table}: {detail}"))
}

fn decode_id(row: &SqliteRow, column: &str, table: &str, registry: &IdRegistry) -> SyncResult<IntId> {
    let hex_str: String = row.try_get(column)?;
    registry
        .intern_hex(&hex_str)
        .map_err(|e| corrupt(table, format!("column {column}: {e}")))
}

fn decode_u64(row: &SqliteRow, column: &str, table: &str) -> SyncResult<u64> {
    let value: i64 = row.try_get(column)?;
    u64::try_from(value).map_err(|_| corrupt(table, format!("column {column} is negative ({value})")))
}

fn encode_u64(value: u64) -> SyncResult<SqlValue> {
    i64::try_from(value)
        .map(SqlValue::Int)
        .map_err(|_| SyncError::RepositoryCorruption(format!("value {value} does not fit a database integer")))
}

/// Follow a stored foreign key through the parent's back-pointer map
fn parent_key<P: ShadowRow>(parent: &ShadowTable<P>, row: &SqliteRow, column: &str, table: &str) -> SyncResult<(i64, P::Key)> {
    let pk: i64 = row.try_get(column)?;
    let key = parent.key_of(pk).cloned().ok_or_else(|| {
        corrupt(table, format!("column {column} points at missing {} row {pk}", P::TABLE))
    })?;
    Ok((pk, key))
}

fn hex(registry: &IdRegistry, id: IntId) -> SqlValue {
    SqlValue::Text(registry.resolve(id).to_hex())
}

fn short(registry: &IdRegistry, id: IntId) -> String {
    registry.resolve(id).short()
}

// ---- packfiles ----

#[derive(Debug, Clone, PartialEq)]
pub struct PackRow {
    pub pack: IntId,
}

impl ShadowRow for PackRow {
    type Key = IntId;
    type Links = ();

    const TABLE: &'static str = "packfiles";
    const COLUMNS: &'static [&'static str] = &["packfile_id"];

    fn key(&self) -> IntId {
        self.pack
    }

    fn decode(row: &SqliteRow, _tables: &ShadowTables, registry: &IdRegistry) -> SyncResult<((), Self)> {
        let pack = decode_id(row, "packfile_id", Self::TABLE, registry)?;
        Ok(((), Self { pack }))
    }

    fn encode(&self, _links: &(), registry: &IdRegistry) -> SyncResult<Vec<SqlValue>> {
        Ok(vec![hex(registry, self.pack)])
    }

    fn describe(&self, registry: &IdRegistry) -> String {
        format!("pack {}", short(registry, self.pack))
    }
}

impl Reconcilable for PackRow {
    fn expected(graph: &RepositoryGraph) -> impl Iterator<Item = Self> + '_ {
        graph
            .blobs
            .iter()
            .filter(|(blob, _)| !blob.is_empty_tree())
            .map(|(_, info)| PackRow { pack: info.pack })
    }
}

// ---- index_repo ----

#[derive(Debug, Clone, PartialEq)]
pub struct IndexRow {
    pub blob: IntId,
    pub kind: BlobKind,
    pub length: u64,
    pub uncompressed_length: u64,
    pub pack: IntId,
}

impl ShadowRow for IndexRow {
    type Key = IntId;
    /// packfiles.id
    type Links = i64;

    const TABLE: &'static str = "index_repo";
    const COLUMNS: &'static [&'static str] = &["idd", "blob_type", "size", "uncompressed_size", "id_pack_id"];
    const UPDATE_COLUMNS: &'static [&'static str] = &["size", "uncompressed_size", "id_pack_id"];

    fn key(&self) -> IntId {
        self.blob
    }

    fn decode(row: &SqliteRow, tables: &ShadowTables, registry: &IdRegistry) -> SyncResult<(i64, Self)> {
        let blob = decode_id(row, "idd", Self::TABLE, registry)?;
        let kind_str: String = row.try_get("blob_type")?;
        let kind = BlobKind::parse(&kind_str)
            .ok_or_else(|| corrupt(Self::TABLE, format!("unknown blob type {kind_str:?}")))?;
        let (pack_pk, pack) = parent_key(&tables.packfiles, row, "id_pack_id", Self::TABLE)?;
        Ok((
            pack_pk,
            Self {
                blob,
                kind,
                length: decode_u64(row, "size", Self::TABLE)?,
                uncompressed_length: decode_u64(row, "uncompressed_size", Self::TABLE)?,
                pack,
            },
        ))
    }

    fn encode(&self, pack_pk: &i64, registry: &IdRegistry) -> SyncResult<Vec<SqlValue>> {
        Ok(vec![
            hex(registry, self.blob),
            SqlValue::Text(self.kind.as_str().to_string()),
            encode_u64(self.length)?,
            encode_u64(self.uncompressed_length)?,
            SqlValue::Int(*pack_pk),
        ])
    }

    fn describe(&self, registry: &IdRegistry) -> String {
        format!("{} blob {}", self.kind.as_str(), short(registry, self.blob))
    }

    fn encode_update(&self, pack_pk: &i64) -> SyncResult<Vec<SqlValue>> {
        Ok(vec![
            encode_u64(self.length)?,
            encode_u64(self.uncompressed_length)?,
            SqlValue::Int(*pack_pk),
        ])
    }

    /// A blob keeps its type; only its sizes and owning pack move
    fn updates(&self, stored: &Self) -> bool {
        self.kind == stored.kind
    }
}

impl Reconcilable for IndexRow {
    fn expected(graph: &RepositoryGraph) -> impl Iterator<Item = Self> + '_ {
        graph
            .blobs
            .iter()
            .filter(|(blob, _)| !blob.is_empty_tree())
            .map(|(blob, info)| IndexRow {
                blob: *blob,
                kind: info.kind,
                length: info.length,
                uncompressed_length: info.uncompressed_length,
                pack: info.pack,
            })
    }
}

// ---- names ----

#[derive(Debug, Clone, PartialEq)]
pub struct NameRow {
    pub name: String,
}

impl ShadowRow for NameRow {
    type Key = String;
    type Links = ();

    const TABLE: &'static str = "names";
    const COLUMNS: &'static [&'static str] = &["name"];

    fn key(&self) -> String {
        self.name.clone()
    }

    fn decode(row: &SqliteRow, _tables: &ShadowTables, _registry: &IdRegistry) -> SyncResult<((), Self)> {
        Ok(((), Self { name: row.try_get("name")? }))
    }

    fn encode(&self, _links: &(), _registry: &IdRegistry) -> SyncResult<Vec<SqlValue>> {
        Ok(vec![SqlValue::Text(self.name.clone())])
    }
}

impl Reconcilable for NameRow {
    fn expected(graph: &RepositoryGraph) -> impl Iterator<Item = Self> + '_ {
        graph
            .directories
            .values()
            .flatten()
            .map(|e| NameRow { name: e.name.clone() })
    }
}

// ---- snapshots ----

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRow {
    pub snapshot: IntId,
    pub time: OffsetDateTime,
    pub hostname: String,
    pub paths: Vec<String>,
    pub root: IntId,
}

impl ShadowRow for SnapshotRow {
    type Key = IntId;
    type Links = ();

    const TABLE: &'static str = "snapshots";
    const COLUMNS: &'static [&'static str] =
        &["snap_id", "snap_short", "snap_time", "snap_host", "snap_paths", "snap_root"];

    fn key(&self) -> IntId {
        self.snapshot
    }

    fn decode(row: &SqliteRow, _tables: &ShadowTables, registry: &IdRegistry) -> SyncResult<((), Self)> {
        let snapshot = decode_id(row, "snap_id", Self::TABLE, registry)?;
        let time_str: String = row.try_get("snap_time")?;
        let time = OffsetDateTime::parse(&time_str, &Rfc3339)
            .map_err(|e| corrupt(Self::TABLE, format!("snap_time {time_str:?}: {e}")))?
            .to_offset(time::UtcOffset::UTC);
        let paths_json: String = row.try_get("snap_paths")?;
        let paths = serde_json::from_str(&paths_json)
            .map_err(|e| corrupt(Self::TABLE, format!("snap_paths {paths_json:?}: {e}")))?;
        Ok((
            (),
            Self {
                snapshot,
                time,
                hostname: row.try_get("snap_host")?,
                paths,
                root: decode_id(row, "snap_root", Self::TABLE, registry)?,
            },
        ))
    }

    fn encode(&self, _links: &(), registry: &IdRegistry) -> SyncResult<Vec<SqlValue>> {
        let id = registry.resolve(self.snapshot);
        let time = self.time.format(&Rfc3339).map_err(|e| {
            SyncError::RepositoryCorruption(format!("snapshot {id} has an unrepresentable time: {e}"))
        })?;
        let paths = serde_json::to_string(&self.paths).map_err(|e| {
            SyncError::RepositoryCorruption(format!("snapshot {id} paths: {e}"))
        })?;
        Ok(vec![
            SqlValue::Text(id.to_hex()),
            SqlValue::Text(id.short()),
            SqlValue::Text(time),
            SqlValue::Text(self.hostname.clone()),
            SqlValue::Text(paths),
            hex(registry, self.root),
        ])
    }

    fn describe(&self, registry: &IdRegistry) -> String {
        format!("snapshot {}", short(registry, self.snapshot))
    }
}

impl Reconcilable for SnapshotRow {
    fn expected(graph: &RepositoryGraph) -> impl Iterator<Item = Self> + '_ {
        graph.snapshots.iter().map(|s| SnapshotRow {
            snapshot: s.int_id,
            time: s.time,
            hostname: s.hostname.clone(),
            paths: s.paths.clone(),
            root: s.root,
        })
    }
}

// ---- meta_dir ----

#[derive(Debug, Clone, PartialEq)]
pub struct MetaDirRow {
    pub snapshot: IntId,
    pub dir: IntId,
}

impl ShadowRow for MetaDirRow {
    type Key = (IntId, IntId);
    /// (snapshots.id, index_repo.id)
    type Links = (i64, i64);

    const TABLE: &'static str = "meta_dir";
    const COLUMNS: &'static [&'static str] = &["id_snap_id", "id_idd"];

    fn key(&self) -> (IntId, IntId) {
        (self.snapshot, self.dir)
    }

    fn decode(row: &SqliteRow, tables: &ShadowTables, _registry: &IdRegistry) -> SyncResult<((i64, i64), Self)> {
        let (snap_pk, snapshot) = parent_key(&tables.snapshots, row, "id_snap_id", Self::TABLE)?;
        let (dir_pk, dir) = parent_key(&tables.index_repo, row, "id_idd", Self::TABLE)?;
        Ok(((snap_pk, dir_pk), Self { snapshot, dir }))
    }

    fn encode(&self, links: &(i64, i64), _registry: &IdRegistry) -> SyncResult<Vec<SqlValue>> {
        Ok(vec![SqlValue::Int(links.0), SqlValue::Int(links.1)])
    }

    fn describe(&self, registry: &IdRegistry) -> String {
        format!(
            "snapshot {} dir {}",
            short(registry, self.snapshot),
            short(registry, self.dir)
        )
    }
}

impl Reconcilable for MetaDirRow {
    fn expected(graph: &RepositoryGraph) -> impl Iterator<Item = Self> + '_ {
        graph.snapshots.iter().flat_map(move |s| {
            graph
                .closure
                .get(&s.id)
                .into_iter()
                .flatten()
                .filter(|dir| !dir.is_empty_tree())
                .map(move |dir| MetaDirRow {
                    snapshot: s.int_id,
                    dir: *dir,
                })
        })
    }
}

// ---- idd_file ----

#[derive(Debug, Clone, PartialEq)]
pub struct FileRow {
    pub dir: IntId,
    pub name: String,
    pub position: u32,
    pub kind: EntryKind,
    pub size: u64,
    pub device: u64,
    pub inode: u64,
    pub mtime: OffsetDateTime,
}

impl ShadowRow for FileRow {
    type Key = (IntId, String);
    /// (index_repo.id, names.id)
    type Links = (i64, i64);

    const TABLE: &'static str = "idd_file";
    const COLUMNS: &'static [&'static str] =
        &["id_blob", "id_name", "position", "node_type", "size", "device", "inode", "mtime"];

    fn key(&self) -> (IntId, String) {
        (self.dir, self.name.clone())
    }

    fn decode(row: &SqliteRow, tables: &ShadowTables, _registry: &IdRegistry) -> SyncResult<((i64, i64), Self)> {
        let (dir_pk, dir) = parent_key(&tables.index_repo, row, "id_blob", Self::TABLE)?;
        let (name_pk, name) = parent_key(&tables.names, row, "id_name", Self::TABLE)?;
        let kind_str: String = row.try_get("node_type")?;
        let kind = EntryKind::parse(&kind_str)
            .ok_or_else(|| corrupt(Self::TABLE, format!("unknown node type {kind_str:?}")))?;
        let position: i64 = row.try_get("position")?;
        let position = u32::try_from(position)
            .map_err(|_| corrupt(Self::TABLE, format!("position {position} out of range")))?;
        let nanos: i64 = row.try_get("mtime")?;
        let mtime = OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos))
            .map_err(|e| corrupt(Self::TABLE, format!("mtime {nanos}: {e}")))?;
        Ok((
            (dir_pk, name_pk),
            Self {
                dir,
                name,
                position,
                kind,
                size: decode_u64(row, "size", Self::TABLE)?,
                device: decode_u64(row, "device", Self::TABLE)?,
                inode: decode_u64(row, "inode", Self::TABLE)?,
                mtime,
            },
        ))
    }

    fn encode(&self, links: &(i64, i64), _registry: &IdRegistry) -> SyncResult<Vec<SqlValue>> {
        let nanos = i64::try_from(self.mtime.unix_timestamp_nanos()).map_err(|_| {
            SyncError::RepositoryCorruption(format!("mtime of {:?} is out of range", self.name))
        })?;
        Ok(vec![
            SqlValue::Int(links.0),
            SqlValue::Int(links.1),
            SqlValue::Int(i64::from(self.position)),
            SqlValue::Text(self.kind.as_str().to_string()),
            encode_u64(self.size)?,
            encode_u64(self.device)?,
            encode_u64(self.inode)?,
            SqlValue::Int(nanos),
        ])
    }

    fn describe(&self, registry: &IdRegistry) -> String {
        format!("dir {} entry {:?}", short(registry, self.dir), self.name)
    }
}

impl Reconcilable for FileRow {
    fn expected(graph: &RepositoryGraph) -> impl Iterator<Item = Self> + '_ {
        graph
            .directories
            .iter()
            .filter(|(dir, _)| !dir.is_empty_tree())
            .flat_map(|(dir, entries)| {
                entries.iter().enumerate().map(move |(position, e)| FileRow {
                    dir: *dir,
                    name: e.name.clone(),
                    position: position as u32,
                    kind: e.kind,
                    size: e.size,
                    device: e.device,
                    inode: e.inode,
                    mtime: e.mtime,
                })
            })
    }
}

// ---- contents ----

#[derive(Debug, Clone, PartialEq)]
pub struct ContentRow {
    pub dir: IntId,
    pub name: String,
    pub position: u32,
    pub blob: IntId,
}

impl ShadowRow for ContentRow {
    type Key = (IntId, String, u32);
    /// (idd_file.id, index_repo.id)
    type Links = (i64, i64);

    const TABLE: &'static str = "contents";
    const COLUMNS: &'static [&'static str] = &["id_file", "position", "id_data_idd"];

    fn key(&self) -> (IntId, String, u32) {
        (self.dir, self.name.clone(), self.position)
    }

    fn decode(row: &SqliteRow, tables: &ShadowTables, _registry: &IdRegistry) -> SyncResult<((i64, i64), Self)> {
        let (file_pk, (dir, name)) = parent_key(&tables.idd_file, row, "id_file", Self::TABLE)?;
        let (blob_pk, blob) = parent_key(&tables.index_repo, row, "id_data_idd", Self::TABLE)?;
        let position: i64 = row.try_get("position")?;
        let position = u32::try_from(position)
            .map_err(|_| corrupt(Self::TABLE, format!("position {position} out of range")))?;
        Ok(((file_pk, blob_pk), Self { dir, name, position, blob }))
    }

    fn encode(&self, links: &(i64, i64), _registry: &IdRegistry) -> SyncResult<Vec<SqlValue>> {
        Ok(vec![
            SqlValue::Int(links.0),
            SqlValue::Int(i64::from(self.position)),
            SqlValue::Int(links.1),
        ])
    }

    fn describe(&self, registry: &IdRegistry) -> String {
        format!(
            "dir {} entry {:?} position {}",
            short(registry, self.dir),
            self.name,
            self.position
        )
    }
}

impl Reconcilable for ContentRow {
    /// File content blobs in order; a directory contributes its subtree at
    /// position 0. Empty-tree targets are skipped.
    fn expected(graph: &RepositoryGraph) -> impl Iterator<Item = Self> + '_ {
        graph.directories.iter().flat_map(|(dir, entries)| {
            entries.iter().flat_map(move |e| {
                let targets: Vec<IntId> = match e.subtree {
                    Some(subtree) => vec![subtree],
                    None => e.content.clone(),
                };
                targets
                    .into_iter()
                    .enumerate()
                    .filter(|(_, blob)| !blob.is_empty_tree())
                    .map(move |(position, blob)| ContentRow {
                        dir: *dir,
                        name: e.name.clone(),
                        position: position as u32,
                        blob,
                    })
            })
        })
    }
}

// ---- fullname ----

#[derive(Debug, Clone, PartialEq)]
pub struct PathRow {
    pub path: String,
}

impl ShadowRow for PathRow {
    type Key = String;
    type Links = ();

    const TABLE: &'static str = "fullname";
    const COLUMNS: &'static [&'static str] = &["pathname"];

    fn key(&self) -> String {
        self.path.clone()
    }

    fn decode(row: &SqliteRow, _tables: &ShadowTables, _registry: &IdRegistry) -> SyncResult<((), Self)> {
        Ok(((), Self { path: row.try_get("pathname")? }))
    }

    fn encode(&self, _links: &(), _registry: &IdRegistry) -> SyncResult<Vec<SqlValue>> {
        Ok(vec![SqlValue::Text(self.path.clone())])
    }
}

impl Reconcilable for PathRow {
    fn expected(graph: &RepositoryGraph) -> impl Iterator<Item = Self> + '_ {
        graph
            .paths
            .iter()
            .filter(|(dir, _)| !dir.is_empty_tree())
            .map(|(_, path)| PathRow { path: path.clone() })
    }
}

// ---- dir_path_id ----

#[derive(Debug, Clone, PartialEq)]
pub struct DirPathRow {
    pub dir: IntId,
    pub path: String,
}

impl ShadowRow for DirPathRow {
    type Key = (IntId, String);
    /// (index_repo.id, fullname.id)
    type Links = (i64, i64);

    const TABLE: &'static str = "dir_path_id";
    const COLUMNS: &'static [&'static str] = &["id_idd", "id_pathname"];

    fn key(&self) -> (IntId, String) {
        (self.dir, self.path.clone())
    }

    fn decode(row: &SqliteRow, tables: &ShadowTables, _registry: &IdRegistry) -> SyncResult<((i64, i64), Self)> {
        let (dir_pk, dir) = parent_key(&tables.index_repo, row, "id_idd", Self::TABLE)?;
        let (path_pk, path) = parent_key(&tables.fullname, row, "id_pathname", Self::TABLE)?;
        Ok(((dir_pk, path_pk), Self { dir, path }))
    }

    fn encode(&self, links: &(i64, i64), _registry: &IdRegistry) -> SyncResult<Vec<SqlValue>> {
        Ok(vec![SqlValue::Int(links.0), SqlValue::Int(links.1)])
    }

    fn describe(&self, registry: &IdRegistry) -> String {
        format!("dir {} at {:?}", short(registry, self.dir), self.path)
    }
}

impl Reconcilable for DirPathRow {
    fn expected(graph: &RepositoryGraph) -> impl Iterator<Item = Self> + '_ {
        graph
            .paths
            .iter()
            .filter(|(dir, _)| !dir.is_empty_tree())
            .map(|(dir, path)| DirPathRow {
                dir: *dir,
                path: path.clone(),
            })
    }
}
