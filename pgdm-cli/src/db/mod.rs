//! Storage seams used by the sync core
//!
//! The reconciliation engine, applier and dependency resolver only talk to the
//! database through these traits:
//!
//! - [`Session`] - transaction boundaries and statement execution
//! - [`SourceStore`] - source registry reads and current-row fetches
//! - [`Catalog`] - foreign-key and table config lookups
//!
//! [`postgres::PgDatabase`] implements all three on a single connection.

pub mod postgres;
pub mod sql;

#[cfg(test)]
pub mod memory;

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::config::{TableConfigOverride, TableConfigRecord, TableConfigSet};
use crate::error::{DbError, Result};
use crate::sync::{Row, Source, Statement};

pub use postgres::PgDatabase;

/// Transaction boundaries and statement execution on one connection
#[async_trait]
pub trait Session: Send {
    async fn begin(&mut self) -> std::result::Result<(), DbError>;
    async fn commit(&mut self) -> std::result::Result<(), DbError>;
    async fn rollback(&mut self) -> std::result::Result<(), DbError>;

    async fn savepoint(&mut self, name: &str) -> std::result::Result<(), DbError>;
    async fn rollback_to_savepoint(&mut self, name: &str) -> std::result::Result<(), DbError>;
    async fn release_savepoint(&mut self, name: &str) -> std::result::Result<(), DbError>;

    /// Execute one statement, returning the number of affected rows
    async fn execute(&mut self, statement: &Statement) -> std::result::Result<u64, DbError>;
}

/// Rows currently stored for one source, source column removed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredRows {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Read access to the source registry and the rows each source owns
#[async_trait]
pub trait SourceStore: Send {
    async fn fetch_source(&mut self, name: &str) -> std::result::Result<Option<Source>, DbError>;

    /// Sources whose name and target match SQL `LIKE` patterns
    async fn list_sources(
        &mut self,
        name_pattern: &str,
        target_pattern: &str,
    ) -> std::result::Result<Vec<Source>, DbError>;

    /// All rows of the source's target tagged with the source name
    async fn fetch_rows(&mut self, source: &Source) -> std::result::Result<StoredRows, DbError>;
}

/// Read-only schema metadata
#[async_trait]
pub trait Catalog: Send {
    /// Distinct tables referenced by the foreign keys of `table`
    async fn referenced_tables(&mut self, table: &str)
    -> std::result::Result<BTreeSet<String>, DbError>;

    /// Raw table config store contents
    async fn table_config_entries(
        &mut self,
    ) -> std::result::Result<(Vec<TableConfigRecord>, Vec<TableConfigOverride>), DbError>;
}

/// Everything the sync core needs from one connection
pub trait Database: Session + SourceStore + Catalog {}

impl<T: Session + SourceStore + Catalog + ?Sized> Database for T {}

/// Load the table config set once for a session
pub async fn load_table_configs<C: Catalog + ?Sized>(catalog: &mut C) -> Result<TableConfigSet> {
    let (records, overrides) = catalog.table_config_entries().await?;
    log::debug!(
        "Loaded {} table config(s) and {} override(s)",
        records.len(),
        overrides.len()
    );
    TableConfigSet::from_records(records, overrides)
}
