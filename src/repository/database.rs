use sqlx::query_builder::Separated;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, QueryBuilder, Row, Sqlite, Transaction};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::repository::scanner::{IdRegistry, ProgressHandle, ProgressReporter};
use crate::sync::{ShadowEntry, ShadowRow, ShadowTable, ShadowTables, SqlValue, Status};

use super::SCHEMA_VERSION;

/// SQLite caps host parameters per statement at 32766
const SQLITE_MAX_BINDS: usize = 32_000;

const HIGH_WATER_PREFIX: &str = "next_id:";

/// Tables in dependency order; dropped in reverse
const TABLES: [&str; 9] = [
    "packfiles",
    "index_repo",
    "names",
    "snapshots",
    "meta_dir",
    "idd_file",
    "contents",
    "fullname",
    "dir_path_id",
];

const SCHEMA: [&str; 9] = [
    "CREATE TABLE IF NOT EXISTS packfiles (
        id INTEGER PRIMARY KEY,
        packfile_id TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS index_repo (
        id INTEGER PRIMARY KEY,
        idd TEXT NOT NULL UNIQUE,
        blob_type TEXT NOT NULL,
        size INTEGER NOT NULL,
        uncompressed_size INTEGER NOT NULL,
        id_pack_id INTEGER NOT NULL REFERENCES packfiles(id)
    )",
    "CREATE TABLE IF NOT EXISTS names (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS snapshots (
        id INTEGER PRIMARY KEY,
        snap_id TEXT NOT NULL UNIQUE,
        snap_short TEXT NOT NULL,
        snap_time TEXT NOT NULL,
        snap_host TEXT NOT NULL,
        snap_paths TEXT NOT NULL,
        snap_root TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS meta_dir (
        id INTEGER PRIMARY KEY,
        id_snap_id INTEGER NOT NULL REFERENCES snapshots(id),
        id_idd INTEGER NOT NULL REFERENCES index_repo(id),
        UNIQUE (id_snap_id, id_idd)
    )",
    "CREATE TABLE IF NOT EXISTS idd_file (
        id INTEGER PRIMARY KEY,
        id_blob INTEGER NOT NULL REFERENCES index_repo(id),
        id_name INTEGER NOT NULL REFERENCES names(id),
        position INTEGER NOT NULL,
        node_type TEXT NOT NULL,
        size INTEGER NOT NULL,
        device INTEGER NOT NULL,
        inode INTEGER NOT NULL,
        mtime INTEGER NOT NULL,
        UNIQUE (id_blob, id_name)
    )",
    "CREATE TABLE IF NOT EXISTS contents (
        id INTEGER PRIMARY KEY,
        id_file INTEGER NOT NULL REFERENCES idd_file(id),
        position INTEGER NOT NULL,
        id_data_idd INTEGER NOT NULL REFERENCES index_repo(id),
        UNIQUE (id_file, position)
    )",
    "CREATE TABLE IF NOT EXISTS fullname (
        id INTEGER PRIMARY KEY,
        pathname TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS dir_path_id (
        id INTEGER PRIMARY KEY,
        id_idd INTEGER NOT NULL REFERENCES index_repo(id),
        id_pathname INTEGER NOT NULL REFERENCES fullname(id),
        UNIQUE (id_idd, id_pathname)
    )",
];

/// The shadow database
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Open (or create) the database file; `:memory:` gives a private in-memory database
    pub async fn new(db_path: &str) -> SyncResult<Self> {
        // PRAGMAs are applied to every connection; foreign keys are on by default
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", db_path))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("temp_store", "MEMORY")
            .pragma("cache_size", "-64000"); // 64MB cache

        // One long-lived connection: an in-memory database lives only as long as it does
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Initialize database schema, returns true if schema was rebuilt
    pub async fn init_schema(&self) -> SyncResult<bool> {
        // Create metadata table first (needed to check version)
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let stored_version = self.get_metadata("schema_version").await?;
        let needs_rebuild = stored_version.as_deref() != Some(SCHEMA_VERSION);

        if needs_rebuild {
            if let Some(old) = &stored_version {
                warn!(from = %old, to = SCHEMA_VERSION, "schema version changed, rebuilding shadow database");
            }
            for table in TABLES.iter().rev() {
                sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
                    .execute(&self.pool)
                    .await?;
            }
            sqlx::query("DELETE FROM metadata").execute(&self.pool).await?;
        }

        for ddl in SCHEMA {
            sqlx::query(ddl).execute(&self.pool).await?;
        }

        if needs_rebuild {
            self.set_metadata("schema_version", SCHEMA_VERSION).await?;
        }

        Ok(needs_rebuild)
    }

    /// Get metadata value by key
    pub async fn get_metadata(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(sqlx::query("SELECT value FROM metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.get("value")))
    }

    /// Set metadata value
    pub async fn set_metadata(&self, key: &str, value: &str) -> SyncResult<()> {
        sqlx::query("INSERT OR REPLACE INTO metadata (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Persisted next primary key of `table`, if one was ever committed
    pub async fn high_water_mark(&self, table: &str) -> SyncResult<Option<i64>> {
        let Some(value) = self.get_metadata(&format!("{HIGH_WATER_PREFIX}{table}")).await? else {
            return Ok(None);
        };
        value.parse().map(Some).map_err(|_| {
            SyncError::ShadowCorruption(format!("{table}: high-water mark {value:?} is not an integer"))
        })
    }

    pub async fn count_rows(&self, table: &str) -> SyncResult<i64> {
        if !TABLES.contains(&table) {
            return Err(SyncError::ShadowCorruption(format!("unknown table {table:?}")));
        }
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Read one table; its parent tables must already be in `tables`
    pub async fn load_table<R: ShadowRow>(
        &self,
        tables: &ShadowTables,
        registry: &IdRegistry,
    ) -> SyncResult<ShadowTable<R>> {
        let sql = format!("SELECT id, {} FROM {} ORDER BY id", R::COLUMNS.join(", "), R::TABLE);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut table = ShadowTable::default();
        for row in &rows {
            let pk: i64 = row.try_get("id")?;
            let (links, value) = R::decode(row, tables, registry)?;
            table.insert_loaded(pk, links, value)?;
        }
        table.seed_next_pk(self.high_water_mark(R::TABLE).await?);
        debug!(table = R::TABLE, rows = table.len(), next_id = table.next_pk(), "shadow table loaded");
        Ok(table)
    }

    /// Write every change of a reconciled run in ONE transaction.
    ///
    /// Inserts go in dependency order, deletes in reverse, and the per-table
    /// high-water marks are stored last. Any failure rolls everything back.
    pub async fn commit_shadow(
        &self,
        tables: &ShadowTables,
        registry: &IdRegistry,
        batch_size: usize,
        progress: &dyn ProgressReporter,
    ) -> SyncResult<()> {
        let changes: usize = tables.counts().iter().map(|c| c.changes()).sum();
        let pb = progress.start("Writing shadow database", changes as u64);
        let pb = pb.as_ref();
        let mut tx = self.pool.begin().await?;

        insert_new(&mut tx, &tables.packfiles, registry, batch_size, pb).await?;
        insert_new(&mut tx, &tables.index_repo, registry, batch_size, pb).await?;
        insert_new(&mut tx, &tables.names, registry, batch_size, pb).await?;
        insert_new(&mut tx, &tables.snapshots, registry, batch_size, pb).await?;
        insert_new(&mut tx, &tables.meta_dir, registry, batch_size, pb).await?;
        insert_new(&mut tx, &tables.idd_file, registry, batch_size, pb).await?;
        insert_new(&mut tx, &tables.contents, registry, batch_size, pb).await?;
        insert_new(&mut tx, &tables.fullname, registry, batch_size, pb).await?;
        insert_new(&mut tx, &tables.dir_path_id, registry, batch_size, pb).await?;

        // index_repo is the only table with updatable columns
        update_changed(&mut tx, &tables.index_repo, pb).await?;

        delete_stale(&mut tx, &tables.dir_path_id, batch_size, pb).await?;
        delete_stale(&mut tx, &tables.fullname, batch_size, pb).await?;
        delete_stale(&mut tx, &tables.contents, batch_size, pb).await?;
        delete_stale(&mut tx, &tables.idd_file, batch_size, pb).await?;
        delete_stale(&mut tx, &tables.meta_dir, batch_size, pb).await?;
        delete_stale(&mut tx, &tables.snapshots, batch_size, pb).await?;
        delete_stale(&mut tx, &tables.names, batch_size, pb).await?;
        delete_stale(&mut tx, &tables.index_repo, batch_size, pb).await?;
        delete_stale(&mut tx, &tables.packfiles, batch_size, pb).await?;

        for (table, next) in tables.high_water_marks() {
            sqlx::query("INSERT OR REPLACE INTO metadata (key, value) VALUES (?, ?)")
                .bind(format!("{HIGH_WATER_PREFIX}{table}"))
                .bind(next.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        pb.finish();
        Ok(())
    }

    /// Get a reference to the connection pool for direct queries
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

fn bind_value(row: &mut Separated<'_, '_, Sqlite, &'static str>, value: &SqlValue) {
    match value {
        SqlValue::Int(v) => {
            row.push_bind(*v);
        }
        SqlValue::Text(s) => {
            row.push_bind(s.clone());
        }
    }
}

async fn insert_new<R: ShadowRow>(
    tx: &mut Transaction<'_, Sqlite>,
    table: &ShadowTable<R>,
    registry: &IdRegistry,
    batch_size: usize,
    progress: &dyn ProgressHandle,
) -> SyncResult<()> {
    let mut fresh: Vec<&ShadowEntry<R>> = table.with_status(Status::New).collect();
    if fresh.is_empty() {
        return Ok(());
    }
    fresh.sort_unstable_by_key(|entry| entry.pk);

    let encoded = fresh
        .iter()
        .map(|entry| Ok((entry.pk, entry.row.encode(&entry.links, registry)?)))
        .collect::<SyncResult<Vec<_>>>()?;

    let per_batch = batch_size.min(SQLITE_MAX_BINDS / (R::COLUMNS.len() + 1)).max(1);
    let header = format!("INSERT INTO {} (id, {}) ", R::TABLE, R::COLUMNS.join(", "));
    for chunk in encoded.chunks(per_batch) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(header.as_str());
        qb.push_values(chunk, |mut row, (pk, values)| {
            row.push_bind(*pk);
            for value in values {
                bind_value(&mut row, value);
            }
        });
        qb.build().execute(&mut **tx).await?;
        progress.inc(chunk.len() as u64);
    }
    Ok(())
}

async fn update_changed<R: ShadowRow>(
    tx: &mut Transaction<'_, Sqlite>,
    table: &ShadowTable<R>,
    progress: &dyn ProgressHandle,
) -> SyncResult<()> {
    for entry in table.with_status(Status::Update) {
        let values = entry.row.encode_update(&entry.links)?;
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!("UPDATE {} SET ", R::TABLE));
        let mut set = qb.separated(", ");
        for (column, value) in R::UPDATE_COLUMNS.iter().zip(values) {
            set.push(format!("{column} = "));
            match value {
                SqlValue::Int(v) => set.push_bind_unseparated(v),
                SqlValue::Text(s) => set.push_bind_unseparated(s),
            };
        }
        qb.push(" WHERE id = ");
        qb.push_bind(entry.pk);
        qb.build().execute(&mut **tx).await?;
        progress.inc(1);
    }
    Ok(())
}

async fn delete_stale<R: ShadowRow>(
    tx: &mut Transaction<'_, Sqlite>,
    table: &ShadowTable<R>,
    batch_size: usize,
    progress: &dyn ProgressHandle,
) -> SyncResult<()> {
    let mut stale: Vec<i64> = table
        .with_status(Status::DeleteCandidate)
        .map(|entry| entry.pk)
        .collect();
    stale.sort_unstable();

    for chunk in stale.chunks(batch_size.clamp(1, SQLITE_MAX_BINDS)) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!("DELETE FROM {} WHERE id IN (", R::TABLE));
        let mut ids = qb.separated(", ");
        for pk in chunk {
            ids.push_bind(*pk);
        }
        ids.push_unseparated(")");
        qb.build().execute(&mut **tx).await?;
        progress.inc(chunk.len() as u64);
    }
    Ok(())
}
