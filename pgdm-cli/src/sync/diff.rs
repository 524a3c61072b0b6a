//! Reconciliation of a snapshot against the rows a source currently owns
//!
//! [`diff`] is pure: it takes both row sets and partitions them into inserts,
//! updates, deletes and conflicts. [`ReconciliationEngine`] fetches the
//! inputs from the database and runs the revision check first.

use std::collections::{HashMap, HashSet};

use crate::config::{TableConfig, TableConfigSet};
use crate::db::Database;
use crate::error::{Result, SyncError};

use super::{Row, Snapshot, Source};

/// A stored row and the snapshot row replacing it
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePair {
    pub old: Row,
    pub new: Row,
}

/// A snapshot row that cannot be classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// Key not owned by the source
    UnknownPrimaryKey(String),
    /// Key already seen earlier in the same snapshot
    DuplicatePrimaryKey(String),
}

impl Conflict {
    pub fn key(&self) -> &str {
        match self {
            Conflict::UnknownPrimaryKey(key) | Conflict::DuplicatePrimaryKey(key) => key,
        }
    }

    fn into_error(self, column: &str) -> SyncError {
        match self {
            Conflict::UnknownPrimaryKey(value) => SyncError::UnknownPrimaryKey {
                column: column.to_string(),
                value,
            },
            Conflict::DuplicatePrimaryKey(value) => SyncError::DuplicatePrimaryKey {
                column: column.to_string(),
                value,
            },
        }
    }
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Conflict::UnknownPrimaryKey(key) => write!(f, "unknown primary key {}", key),
            Conflict::DuplicatePrimaryKey(key) => write!(f, "duplicate primary key {}", key),
        }
    }
}

/// Partition of a snapshot against the stored rows of its source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffResult {
    pub primary_key: String,
    /// Snapshot rows with an empty key, in snapshot order
    pub to_insert: Vec<Row>,
    /// Changed rows, in snapshot order
    pub to_update: Vec<UpdatePair>,
    /// Stored rows absent from the snapshot, in stored order
    pub to_delete: Vec<Row>,
    pub conflicts: Vec<Conflict>,
}

impl DiffResult {
    /// Number of rows that would change
    pub fn total_changes(&self) -> usize {
        self.to_insert.len() + self.to_update.len() + self.to_delete.len()
    }

    /// True when applying would change nothing
    pub fn is_empty(&self) -> bool {
        self.total_changes() == 0
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Fail on the first conflict; the diff must not be applied otherwise
    pub fn ensure_no_conflicts(&self) -> Result<()> {
        match self.conflicts.first() {
            Some(conflict) => Err(conflict.clone().into_error(&self.primary_key)),
            None => Ok(()),
        }
    }

    /// Primary-key values of the rows to delete
    pub fn delete_keys(&self) -> Vec<String> {
        self.to_delete
            .iter()
            .map(|row| row.normalized(&self.primary_key))
            .collect()
    }
}

/// Check a snapshot revision against the stored one.
///
/// An untagged snapshot (`None`) passes; replace semantics do not carry a
/// revision.
pub fn check_revision(stored: u64, snapshot: Option<u64>) -> Result<()> {
    match snapshot {
        Some(snapshot) if snapshot != stored => {
            Err(SyncError::RevisionConflict { stored, snapshot })
        }
        _ => Ok(()),
    }
}

/// Partition `incoming` against `current` by normalized primary key.
///
/// The first snapshot row with a given key is classified; later rows with
/// the same key are reported as [`Conflict::DuplicatePrimaryKey`].
pub fn diff(
    current: &[Row],
    incoming: &[Row],
    primary_key: &str,
    stored_revision: u64,
    snapshot_revision: Option<u64>,
) -> Result<DiffResult> {
    check_revision(stored_revision, snapshot_revision)?;

    let index: HashMap<String, &Row> = current
        .iter()
        .map(|row| (row.normalized(primary_key), row))
        .collect();

    let mut result = DiffResult {
        primary_key: primary_key.to_string(),
        ..Default::default()
    };
    let mut seen: HashSet<String> = HashSet::new();

    for row in incoming {
        let key = row.normalized(primary_key);

        if key.is_empty() {
            result.to_insert.push(row.clone());
            continue;
        }

        if !seen.insert(key.clone()) {
            result.conflicts.push(Conflict::DuplicatePrimaryKey(key));
            continue;
        }

        match index.get(&key) {
            None => result.conflicts.push(Conflict::UnknownPrimaryKey(key)),
            Some(stored) if !stored.same_content(row) => {
                result.to_update.push(UpdatePair {
                    old: (*stored).clone(),
                    new: row.clone(),
                });
            }
            Some(_) => {}
        }
    }

    result.to_delete = current
        .iter()
        .filter(|row| !seen.contains(&row.normalized(primary_key)))
        .cloned()
        .collect();

    log::info!(
        "Diff complete: {} insert, {} update, {} delete, {} conflict",
        result.to_insert.len(),
        result.to_update.len(),
        result.to_delete.len(),
        result.conflicts.len()
    );

    Ok(result)
}

/// Everything needed to plan an update of one source
#[derive(Debug, Clone)]
pub struct UpdateAnalysis {
    pub source: Source,
    pub table: TableConfig,
    /// Rows the source owned when the analysis ran
    pub current: Vec<Row>,
    pub diff: DiffResult,
}

/// Compares snapshots with the database
pub struct ReconciliationEngine<'a> {
    tables: &'a TableConfigSet,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(tables: &'a TableConfigSet) -> Self {
        Self { tables }
    }

    /// Look up a registered source
    pub async fn source<D: Database + ?Sized>(&self, db: &mut D, name: &str) -> Result<Source> {
        db.fetch_source(name)
            .await?
            .ok_or_else(|| SyncError::UnknownSource(name.to_string()))
    }

    /// Rows the source currently owns
    pub async fn current_rows<D: Database + ?Sized>(
        &self,
        db: &mut D,
        source: &Source,
    ) -> Result<Vec<Row>> {
        let stored = db.fetch_rows(source).await?;
        log::debug!(
            "Fetched {} stored row(s) for source {}",
            stored.rows.len(),
            source.name
        );
        Ok(stored.rows)
    }

    /// Diff a snapshot against the stored rows of `source_name`.
    ///
    /// The revision is checked before any row is fetched.
    pub async fn analyze<D: Database + ?Sized>(
        &self,
        db: &mut D,
        source_name: &str,
        snapshot: &Snapshot,
    ) -> Result<UpdateAnalysis> {
        let source = self.source(db, source_name).await?;
        check_revision(source.revision, snapshot.revision)?;

        let table = self.tables.for_target(&source.target)?.clone();
        let current = self.current_rows(db, &source).await?;

        let diff = diff(
            &current,
            &snapshot.rows,
            &table.primary_key,
            source.revision,
            snapshot.revision,
        )?;

        Ok(UpdateAnalysis {
            source,
            table,
            current,
            diff,
        })
    }
}
