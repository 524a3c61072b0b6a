//! Source operations: insert, update, replace, delete, export, list and
//! bulk-import ordering
//!
//! Each write goes through the same pipeline: look up the source and its
//! table config, build a statement plan, apply it in one transaction.

use crate::config::TableConfigSet;
use crate::db::Database;
use crate::error::{Result, SyncError};

use super::apply::{ApplyOptions, ApplyOutcome, TransactionalApplier};
use super::diff::{check_revision, ReconciliationEngine, UpdateAnalysis};
use super::graph::DependencyGraph;
use super::plan::{build_delete_plan, build_insert_plan, build_replace_plan, build_update_plan};
use super::progress::ProgressSink;
use super::registry::like_pattern;
use super::row::tagged_header;
use super::{Row, Snapshot, Source};

/// Stored rows of one source ready to be written to a file
#[derive(Debug, Clone, PartialEq)]
pub struct SourceExport {
    pub source: Source,
    /// Primary key first, tagged with the current revision
    pub headers: Vec<String>,
    /// Normalized values, one record per row
    pub records: Vec<Vec<String>>,
}

/// A source and the rows a delete would remove
#[derive(Debug, Clone)]
pub struct DeletePreview {
    pub source: Source,
    pub rows: Vec<Row>,
}

pub struct SyncService<'a> {
    tables: &'a TableConfigSet,
    batch_size: usize,
    applier: TransactionalApplier,
}

impl<'a> SyncService<'a> {
    pub fn new(tables: &'a TableConfigSet, batch_size: usize, options: ApplyOptions) -> Self {
        Self {
            tables,
            batch_size: batch_size.max(1),
            applier: TransactionalApplier::new(options),
        }
    }

    pub fn engine(&self) -> ReconciliationEngine<'a> {
        ReconciliationEngine::new(self.tables)
    }

    /// Register `name` as a new source of `target` and insert its rows
    pub async fn insert<D: Database + ?Sized>(
        &self,
        db: &mut D,
        name: &str,
        target: &str,
        snapshot: &Snapshot,
        progress: &dyn ProgressSink,
    ) -> Result<ApplyOutcome> {
        if db.fetch_source(name).await?.is_some() {
            return Err(SyncError::SourceAlreadyExists(name.to_string()));
        }

        let primary_key = self
            .tables
            .for_target(target)
            .ok()
            .map(|config| config.primary_key.as_str());
        let source = Source::new(name, target, snapshot.revision.unwrap_or(0));

        log::info!("Inserting {} row(s) from {} into {}", snapshot.len(), name, target);
        let plan = build_insert_plan(
            &source,
            primary_key,
            &snapshot.rows,
            snapshot.revision.is_some(),
            self.batch_size,
        );
        self.applier
            .apply(db, &plan, progress)
            .await?
            .ensure_committed(target)
    }

    /// Diff a snapshot against its source without writing anything
    pub async fn analyze_update<D: Database + ?Sized>(
        &self,
        db: &mut D,
        name: &str,
        snapshot: &Snapshot,
    ) -> Result<UpdateAnalysis> {
        self.engine().analyze(db, name, snapshot).await
    }

    /// Apply an analysis; refused when the diff has conflicts
    pub async fn apply_update<D: Database + ?Sized>(
        &self,
        db: &mut D,
        analysis: &UpdateAnalysis,
        progress: &dyn ProgressSink,
    ) -> Result<ApplyOutcome> {
        analysis.diff.ensure_no_conflicts()?;

        let plan = build_update_plan(
            &analysis.source,
            &analysis.table,
            &analysis.diff,
            self.batch_size,
        );
        self.applier
            .apply(db, &plan, progress)
            .await?
            .ensure_committed(&analysis.source.target)
    }

    pub async fn update<D: Database + ?Sized>(
        &self,
        db: &mut D,
        name: &str,
        snapshot: &Snapshot,
        progress: &dyn ProgressSink,
    ) -> Result<ApplyOutcome> {
        let analysis = self.analyze_update(db, name, snapshot).await?;
        self.apply_update(db, &analysis, progress).await
    }

    /// Replace every row of an existing source with the snapshot.
    ///
    /// A tagged snapshot must match the stored revision.
    pub async fn replace<D: Database + ?Sized>(
        &self,
        db: &mut D,
        name: &str,
        snapshot: &Snapshot,
        progress: &dyn ProgressSink,
    ) -> Result<ApplyOutcome> {
        let engine = self.engine();
        let source = engine.source(db, name).await?;
        check_revision(source.revision, snapshot.revision)?;

        let table = self.tables.for_target(&source.target)?;
        let current = engine.current_rows(db, &source).await?;

        log::info!(
            "Replacing {} row(s) of {} with {} row(s)",
            current.len(),
            name,
            snapshot.len()
        );
        let plan = build_replace_plan(&source, table, &current, &snapshot.rows, self.batch_size);
        self.applier
            .apply(db, &plan, progress)
            .await?
            .ensure_committed(&source.target)
    }

    /// Rows that deleting `name` would remove
    pub async fn delete_preview<D: Database + ?Sized>(
        &self,
        db: &mut D,
        name: &str,
    ) -> Result<DeletePreview> {
        let engine = self.engine();
        let source = engine.source(db, name).await?;
        let rows = engine.current_rows(db, &source).await?;
        Ok(DeletePreview { source, rows })
    }

    /// Remove a source and every row it owns
    pub async fn delete<D: Database + ?Sized>(
        &self,
        db: &mut D,
        name: &str,
        progress: &dyn ProgressSink,
    ) -> Result<ApplyOutcome> {
        let preview = self.delete_preview(db, name).await?;
        let table = self.tables.for_target(&preview.source.target)?;

        log::info!("Deleting {} row(s) of {}", preview.rows.len(), name);
        let plan = build_delete_plan(&preview.source, table, &preview.rows, self.batch_size);
        self.applier
            .apply(db, &plan, progress)
            .await?
            .ensure_committed(&preview.source.target)
    }

    /// Stored rows of a source, tagged with its revision.
    ///
    /// Values are normalized, so importing an unmodified export changes
    /// nothing.
    pub async fn export<D: Database + ?Sized>(&self, db: &mut D, name: &str) -> Result<SourceExport> {
        let source = self.engine().source(db, name).await?;
        let table = self.tables.for_target(&source.target)?;
        let stored = db.fetch_rows(&source).await?;

        let primary_key = table.primary_key.as_str();
        let mut columns: Vec<String> = vec![primary_key.to_string()];
        columns.extend(stored.columns.into_iter().filter(|c| c != primary_key));

        let mut headers = columns.clone();
        headers[0] = tagged_header(primary_key, source.revision);

        let records = stored
            .rows
            .iter()
            .map(|row| columns.iter().map(|column| row.normalized(column)).collect())
            .collect();

        Ok(SourceExport {
            source,
            headers,
            records,
        })
    }

    /// Sources matching `*` wildcard patterns on name and target
    pub async fn list<D: Database + ?Sized>(
        &self,
        db: &mut D,
        source_pattern: Option<&str>,
        target_pattern: Option<&str>,
    ) -> Result<Vec<Source>> {
        Ok(db
            .list_sources(&like_pattern(source_pattern), &like_pattern(target_pattern))
            .await?)
    }

    /// Order import targets so that referenced tables are loaded first.
    ///
    /// Targets are mapped to their backing tables before resolving; targets
    /// sharing a table keep their input order.
    pub async fn import_order<D: Database + ?Sized>(
        &self,
        db: &mut D,
        targets: &[String],
        registry_table: &str,
    ) -> Result<Vec<String>> {
        let tables: Vec<String> = targets
            .iter()
            .map(|target| self.tables.backing_table(target).to_string())
            .collect();

        let order = DependencyGraph::load(db, &tables, registry_table)
            .await?
            .resolve()?;

        let mut ordered: Vec<(usize, &String)> = targets
            .iter()
            .zip(&tables)
            .map(|(target, table)| {
                let position = order.iter().position(|t| t == table).unwrap_or(usize::MAX);
                (position, target)
            })
            .collect();
        ordered.sort_by_key(|(position, _)| *position);

        Ok(ordered.into_iter().map(|(_, target)| target.clone()).collect())
    }
}
