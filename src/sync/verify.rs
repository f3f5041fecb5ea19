//! Read-only consistency check of the shadow database against a freshly
//! built graph

use rustc_hash::FxHashMap;
use std::fmt;

use crate::model::RepositoryGraph;
use crate::repository::scanner::IdRegistry;

use super::reconcile::Reconcilable;
use super::shadow::{ShadowTable, ShadowTables};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MismatchKind {
    OnlyInDatabase,
    OnlyInGraph,
    /// Same key, different non-key columns
    Differs,
}

impl fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MismatchKind::OnlyInDatabase => "only in database",
            MismatchKind::OnlyInGraph => "only in graph",
            MismatchKind::Differs => "differs",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub table: &'static str,
    pub kind: MismatchKind,
    pub row: String,
    /// Stored and expected rows, for `Differs`
    pub detail: Option<String>,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {}", self.table, self.row, self.kind)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

/// Rows checked in one table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableCheck {
    pub table: &'static str,
    pub expected: usize,
    pub stored: usize,
    pub mismatches: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    /// From the full comparison, not from the capped examples
    pub consistent: bool,
    pub total_mismatches: usize,
    pub tables: Vec<TableCheck>,
    /// At most `max_reported` examples
    pub examples: Vec<Mismatch>,
    max_reported: usize,
}

impl VerifyReport {
    fn new(max_reported: usize) -> Self {
        Self {
            consistent: true,
            total_mismatches: 0,
            tables: Vec::new(),
            examples: Vec::new(),
            max_reported,
        }
    }

    fn record(&mut self, mismatch: Mismatch) {
        self.consistent = false;
        self.total_mismatches += 1;
        if self.examples.len() < self.max_reported {
            self.examples.push(mismatch);
        }
    }

    /// Reported examples of `kind` in `table`
    pub fn examples_of(&self, table: &str, kind: MismatchKind) -> usize {
        self.examples
            .iter()
            .filter(|m| m.table == table && m.kind == kind)
            .count()
    }

    pub fn table(&self, table: &str) -> Option<&TableCheck> {
        self.tables.iter().find(|t| t.table == table)
    }
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.consistent {
            return write!(f, "shadow database is consistent");
        }
        writeln!(f, "{} mismatches", self.total_mismatches)?;
        for mismatch in &self.examples {
            writeln!(f, "  {mismatch}")?;
        }
        let hidden = self.total_mismatches - self.examples.len();
        if hidden > 0 {
            writeln!(f, "  (and {hidden} more)")?;
        }
        Ok(())
    }
}

/// Compare every table with the rows the graph implies
pub fn verify_tables(
    graph: &RepositoryGraph,
    tables: &ShadowTables,
    registry: &IdRegistry,
    max_reported: usize,
) -> VerifyReport {
    let mut report = VerifyReport::new(max_reported);
    verify_table(graph, &tables.packfiles, registry, &mut report);
    verify_table(graph, &tables.index_repo, registry, &mut report);
    verify_table(graph, &tables.names, registry, &mut report);
    verify_table(graph, &tables.snapshots, registry, &mut report);
    verify_table(graph, &tables.meta_dir, registry, &mut report);
    verify_table(graph, &tables.idd_file, registry, &mut report);
    verify_table(graph, &tables.contents, registry, &mut report);
    verify_table(graph, &tables.fullname, registry, &mut report);
    verify_table(graph, &tables.dir_path_id, registry, &mut report);
    report
}

fn verify_table<R: Reconcilable>(
    graph: &RepositoryGraph,
    table: &ShadowTable<R>,
    registry: &IdRegistry,
    report: &mut VerifyReport,
) {
    let mut expected: FxHashMap<R::Key, R> = FxHashMap::default();
    for row in R::expected(graph) {
        expected.entry(row.key()).or_insert(row);
    }

    let before = report.total_mismatches;
    for (key, row) in &expected {
        match table.get(key) {
            None => report.record(Mismatch {
                table: R::TABLE,
                kind: MismatchKind::OnlyInGraph,
                row: row.describe(registry),
                detail: None,
            }),
            Some(entry) if entry.row != *row => report.record(Mismatch {
                table: R::TABLE,
                kind: MismatchKind::Differs,
                row: row.describe(registry),
                detail: Some(format!("stored {:?}, expected {row:?}", entry.row)),
            }),
            Some(_) => {}
        }
    }
    for (key, entry) in &table.rows {
        if !expected.contains_key(key) {
            report.record(Mismatch {
                table: R::TABLE,
                kind: MismatchKind::OnlyInDatabase,
                row: entry.row.describe(registry),
                detail: None,
            });
        }
    }

    report.tables.push(TableCheck {
        table: R::TABLE,
        expected: expected.len(),
        stored: table.len(),
        mismatches: report.total_mismatches - before,
    });
}
