//! Per-target table metadata
//!
//! Loaded once per session from the table config store and passed by
//! reference into the engine and applier. Nothing mutates it afterwards.

use std::collections::HashMap;
use std::str::FromStr;

use crate::error::{Result, SyncError};

/// Override key naming a custom delete column
pub const DELETE_COLUMN_KEY: &str = "delete_column";
/// Override key naming how the custom delete column is matched
pub const DELETE_COLUMN_TYPE_KEY: &str = "delete_column_type";

/// What the values of the delete column are matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteColumnType {
    /// Row identifiers: rows are removed by primary-key value
    #[default]
    Id,
    /// The source name: a whole source is removed with a single predicate
    Name,
}

impl FromStr for DeleteColumnType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "id" => Ok(DeleteColumnType::Id),
            "name" => Ok(DeleteColumnType::Name),
            other => Err(format!("unknown delete column type '{}', expected id or name", other)),
        }
    }
}

/// Metadata for one target table or view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    /// Backing table
    pub table: String,
    /// Table or view sources are written to
    pub target: String,
    pub primary_key: String,
    /// Deletes act on `target` instead of the backing table
    pub delete_target_is_view: bool,
    pub custom_delete_column: Option<String>,
    pub custom_delete_column_type: Option<DeleteColumnType>,
}

impl TableConfig {
    /// Config for a plain table that is its own target
    pub fn new(table: impl Into<String>, primary_key: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            target: table.clone(),
            table,
            primary_key: primary_key.into(),
            delete_target_is_view: false,
            custom_delete_column: None,
            custom_delete_column_type: None,
        }
    }

    /// Config for a view backed by `table`
    pub fn for_view(
        table: impl Into<String>,
        view: impl Into<String>,
        primary_key: impl Into<String>,
    ) -> Self {
        Self {
            target: view.into(),
            ..Self::new(table, primary_key)
        }
    }

    /// Relation delete statements run against
    pub fn delete_relation(&self) -> &str {
        if self.delete_target_is_view {
            &self.target
        } else {
            &self.table
        }
    }

    /// Column delete statements filter on
    pub fn delete_column(&self) -> &str {
        self.custom_delete_column
            .as_deref()
            .unwrap_or(&self.primary_key)
    }

    pub fn delete_column_type(&self) -> DeleteColumnType {
        self.custom_delete_column_type.unwrap_or_default()
    }

    /// Column used when deleting individual rows.
    ///
    /// A name-typed delete column cannot single out rows, so row deletes fall
    /// back to the primary key.
    pub fn row_delete_column(&self) -> &str {
        match self.delete_column_type() {
            DeleteColumnType::Id => self.delete_column(),
            DeleteColumnType::Name => &self.primary_key,
        }
    }
}

/// One row of the table config store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfigRecord {
    pub name: String,
    pub target: String,
    pub primary_key: String,
    pub delete_target_is_view: bool,
}

/// One keyed override from the table config store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfigOverride {
    /// Table or target name the override applies to
    pub table: String,
    pub key: String,
    pub value: String,
}

/// All table configs, keyed by target
#[derive(Debug, Clone, Default)]
pub struct TableConfigSet {
    by_target: HashMap<String, TableConfig>,
}

impl TableConfigSet {
    pub fn new(configs: impl IntoIterator<Item = TableConfig>) -> Self {
        Self {
            by_target: configs
                .into_iter()
                .map(|config| (config.target.clone(), config))
                .collect(),
        }
    }

    /// Build from store rows, applying overrides
    pub fn from_records(
        records: Vec<TableConfigRecord>,
        overrides: Vec<TableConfigOverride>,
    ) -> Result<Self> {
        let mut configs: Vec<TableConfig> = records
            .into_iter()
            .map(|record| TableConfig {
                table: record.name,
                target: record.target,
                primary_key: record.primary_key,
                delete_target_is_view: record.delete_target_is_view,
                custom_delete_column: None,
                custom_delete_column_type: None,
            })
            .collect();

        for entry in overrides {
            let matched: Vec<&mut TableConfig> = configs
                .iter_mut()
                .filter(|c| c.table == entry.table || c.target == entry.table)
                .collect();
            if matched.is_empty() {
                log::warn!(
                    "Ignoring table config override '{}' for unknown table {}",
                    entry.key,
                    entry.table
                );
                continue;
            }

            for config in matched {
                match entry.key.as_str() {
                    DELETE_COLUMN_KEY => {
                        config.custom_delete_column = Some(entry.value.clone());
                    }
                    DELETE_COLUMN_TYPE_KEY => {
                        let kind = entry.value.parse::<DeleteColumnType>().map_err(|reason| {
                            SyncError::InvalidTableConfig {
                                table: entry.table.clone(),
                                reason,
                            }
                        })?;
                        config.custom_delete_column_type = Some(kind);
                    }
                    other => {
                        log::debug!("Ignoring unknown table config key '{}' for {}", other, entry.table);
                    }
                }
            }
        }

        Ok(Self::new(configs))
    }

    /// Config for a target table or view
    pub fn for_target(&self, target: &str) -> Result<&TableConfig> {
        self.by_target
            .get(target)
            .ok_or_else(|| SyncError::UnknownTableConfig(target.to_string()))
    }

    /// Backing table of a target, or the target itself when it is not configured
    pub fn backing_table<'a>(&'a self, target: &'a str) -> &'a str {
        self.by_target
            .get(target)
            .map(|config| config.table.as_str())
            .unwrap_or(target)
    }

    pub fn len(&self) -> usize {
        self.by_target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_target.is_empty()
    }
}
