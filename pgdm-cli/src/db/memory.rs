//! In-memory database used by the sync core tests
//!
//! Mirrors the parts of PostgreSQL behaviour the core relies on: statement
//! atomicity, transactions with savepoints, serial primary keys, views that
//! write through to one table, and a source registry.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use regex::Regex;

use crate::config::{TableConfigOverride, TableConfigRecord};
use crate::error::DbError;
use crate::sync::{Row, Source, Statement, StatementOp, Value};

use super::{Catalog, Session, SourceStore, StoredRows};

const SOURCE_COLUMN: &str = "source_name";

#[derive(Debug, Clone)]
struct MemTable {
    primary_key: String,
    columns: Vec<String>,
    rows: Vec<Row>,
    next_id: i64,
}

#[derive(Debug, Clone, Default)]
struct State {
    tables: HashMap<String, MemTable>,
    sources: BTreeMap<String, Source>,
}

#[derive(Debug, Default)]
pub struct MemoryDatabase {
    state: State,
    views: HashMap<String, String>,
    foreign_keys: HashMap<String, BTreeSet<String>>,
    table_configs: Vec<TableConfigRecord>,
    overrides: Vec<TableConfigOverride>,
    transaction: Option<State>,
    savepoints: Vec<(String, State)>,
    fail_value: Option<String>,
    disconnect_after: Option<usize>,
    executed: Vec<StatementOp>,
    row_fetches: usize,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table with a serial primary key and a source column
    pub fn create_table(&mut self, name: &str, primary_key: &str, columns: &[&str]) {
        let mut columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        columns.push(SOURCE_COLUMN.to_string());
        self.state.tables.insert(
            name.to_string(),
            MemTable {
                primary_key: primary_key.to_string(),
                columns,
                rows: Vec::new(),
                next_id: 1,
            },
        );
    }

    /// Create a view writing through to `table`
    pub fn create_view(&mut self, view: &str, table: &str) {
        self.views.insert(view.to_string(), table.to_string());
    }

    pub fn add_foreign_key(&mut self, table: &str, references: &str) {
        self.foreign_keys
            .entry(table.to_string())
            .or_default()
            .insert(references.to_string());
    }

    pub fn add_table_config(&mut self, table: &str, target: &str, primary_key: &str, view: bool) {
        self.table_configs.push(TableConfigRecord {
            name: table.to_string(),
            target: target.to_string(),
            primary_key: primary_key.to_string(),
            delete_target_is_view: view,
        });
    }

    pub fn add_table_override(&mut self, table: &str, key: &str, value: &str) {
        self.overrides.push(TableConfigOverride {
            table: table.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    pub fn register_source(&mut self, name: &str, target: &str, revision: u64) {
        self.state
            .sources
            .insert(name.to_string(), Source::new(name, target, revision));
    }

    /// Store a row owned by `source`, assigning a key when none is given
    pub fn seed_row<K, V, I>(&mut self, relation: &str, source: &str, pairs: I)
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut row = Row::from_pairs(pairs);
        row.set(SOURCE_COLUMN, source);
        let table_name = self.resolve(relation).to_string();
        if let Some(table) = self.state.tables.get_mut(&table_name) {
            assign_key(table, &mut row);
            table.rows.push(row);
        }
    }

    /// Reject any statement carrying this normalized value
    pub fn fail_on_value(&mut self, value: &str) {
        self.fail_value = Some(value.to_string());
    }

    /// Drop the connection after `count` executed statements
    pub fn disconnect_after(&mut self, count: usize) {
        self.disconnect_after = Some(count);
    }

    /// Committed and uncommitted rows of a table, source column included
    pub fn rows(&self, relation: &str) -> Vec<Row> {
        self.state
            .tables
            .get(self.resolve(relation))
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn source(&self, name: &str) -> Option<Source> {
        self.state.sources.get(name).cloned()
    }

    pub fn executed(&self) -> &[StatementOp] {
        &self.executed
    }

    /// Number of row fetches served
    pub fn row_fetches(&self) -> usize {
        self.row_fetches
    }

    fn resolve<'a>(&'a self, relation: &'a str) -> &'a str {
        self.views.get(relation).map(String::as_str).unwrap_or(relation)
    }

    fn table_mut(&mut self, relation: &str) -> Result<&mut MemTable, DbError> {
        let name = self.resolve(relation).to_string();
        self.state.tables.get_mut(&name).ok_or_else(|| {
            DbError::statement(format!("relation \"{}\" does not exist", relation)).with_code("42P01")
        })
    }

    fn check_values<'v>(&self, values: impl IntoIterator<Item = &'v Value>) -> Result<(), DbError> {
        let Some(fail) = &self.fail_value else {
            return Ok(());
        };
        if values.into_iter().any(|v| &v.normalized() == fail) {
            return Err(DbError::statement(format!("invalid input value \"{}\"", fail))
                .with_code("22P02"));
        }
        Ok(())
    }

    fn run(&mut self, op: &StatementOp) -> Result<u64, DbError> {
        match op {
            StatementOp::InsertRows {
                relation,
                source_name,
                columns,
                rows,
            } => {
                self.check_values(rows.iter().flatten())?;
                let table = self.table_mut(relation)?;
                if let Some(unknown) = columns.iter().find(|c| !table.columns.contains(*c)) {
                    return Err(DbError::statement(format!(
                        "column \"{}\" of relation \"{}\" does not exist",
                        unknown, relation
                    ))
                    .with_code("42703"));
                }

                for values in rows {
                    let mut row = Row::from_pairs(columns.iter().cloned().zip(values.iter().cloned()));
                    row.set(SOURCE_COLUMN, source_name.as_str());
                    assign_key(table, &mut row);

                    let key = row.normalized(&table.primary_key);
                    if table
                        .rows
                        .iter()
                        .any(|r| r.normalized(&table.primary_key) == key)
                    {
                        return Err(DbError::statement(format!(
                            "duplicate key value violates unique constraint \"{}_pkey\"",
                            relation
                        ))
                        .with_code("23505")
                        .with_detail(format!("Key ({})=({}) already exists.", table.primary_key, key)));
                    }
                    table.rows.push(row);
                }
                Ok(rows.len() as u64)
            }
            StatementOp::UpdateRow {
                relation,
                key_column,
                key,
                assignments,
            } => {
                self.check_values(assignments.iter().map(|(_, v)| v))?;
                let table = self.table_mut(relation)?;
                let key = key.normalized();
                let mut affected = 0;
                for row in table.rows.iter_mut().filter(|r| r.normalized(key_column) == key) {
                    for (column, value) in assignments {
                        row.set(column.as_str(), value.clone());
                    }
                    affected += 1;
                }
                Ok(affected)
            }
            StatementOp::DeleteKeys {
                relation,
                column,
                keys,
            } => {
                self.check_values(keys.iter())?;
                let keys: HashSet<String> = keys.iter().map(Value::normalized).collect();
                let table = self.table_mut(relation)?;
                let before = table.rows.len();
                table.rows.retain(|r| !keys.contains(&r.normalized(column)));
                Ok((before - table.rows.len()) as u64)
            }
            StatementOp::DeleteSourceRows {
                relation,
                column,
                source_name,
            } => {
                let table = self.table_mut(relation)?;
                let before = table.rows.len();
                table.rows.retain(|r| &r.normalized(column) != source_name);
                Ok((before - table.rows.len()) as u64)
            }
            StatementOp::RegisterSource(source) => {
                if self.state.sources.contains_key(&source.name) {
                    return Err(DbError::statement(
                        "duplicate key value violates unique constraint \"source_pkey\"",
                    )
                    .with_code("23505"));
                }
                self.state.sources.insert(source.name.clone(), source.clone());
                Ok(1)
            }
            StatementOp::BumpRevision { name } => match self.state.sources.get_mut(name) {
                Some(source) => {
                    source.revision += 1;
                    Ok(1)
                }
                None => Ok(0),
            },
            StatementOp::RemoveSource { name } => {
                Ok(self.state.sources.remove(name).map_or(0, |_| 1))
            }
        }
    }
}

/// Fill in a serial key when the row has none, and keep the sequence ahead
fn assign_key(table: &mut MemTable, row: &mut Row) {
    let key = row.normalized(&table.primary_key);
    if key.is_empty() {
        row.set(table.primary_key.as_str(), Value::Int(table.next_id));
        table.next_id += 1;
    } else if let Ok(id) = key.parse::<i64>() {
        table.next_id = table.next_id.max(id + 1);
    }
}

/// SQL `LIKE` with `%` and `_` wildcards
fn like_matches(pattern: &str, text: &str) -> bool {
    let mut expr = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).map(|re| re.is_match(text)).unwrap_or(false)
}

#[async_trait]
impl Session for MemoryDatabase {
    async fn begin(&mut self) -> Result<(), DbError> {
        if self.transaction.is_some() {
            return Err(DbError::statement("there is already a transaction in progress"));
        }
        self.transaction = Some(self.state.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        self.transaction = None;
        self.savepoints.clear();
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        if let Some(state) = self.transaction.take() {
            self.state = state;
        }
        self.savepoints.clear();
        Ok(())
    }

    async fn savepoint(&mut self, name: &str) -> Result<(), DbError> {
        self.savepoints.push((name.to_string(), self.state.clone()));
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), DbError> {
        let index = self
            .savepoints
            .iter()
            .rposition(|(n, _)| n == name)
            .ok_or_else(|| DbError::statement(format!("savepoint \"{}\" does not exist", name)))?;
        self.savepoints.truncate(index + 1);
        self.state = self.savepoints[index].1.clone();
        Ok(())
    }

    async fn release_savepoint(&mut self, name: &str) -> Result<(), DbError> {
        if let Some(index) = self.savepoints.iter().rposition(|(n, _)| n == name) {
            self.savepoints.truncate(index);
        }
        Ok(())
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64, DbError> {
        if let Some(limit) = self.disconnect_after {
            if self.executed.len() >= limit {
                return Err(DbError::connection("connection reset by peer"));
            }
        }
        self.executed.push(statement.op.clone());

        let before = self.state.clone();
        let result = self.run(&statement.op);
        if result.is_err() {
            self.state = before;
        }
        result
    }
}

#[async_trait]
impl SourceStore for MemoryDatabase {
    async fn fetch_source(&mut self, name: &str) -> Result<Option<Source>, DbError> {
        Ok(self.state.sources.get(name).cloned())
    }

    async fn list_sources(
        &mut self,
        name_pattern: &str,
        target_pattern: &str,
    ) -> Result<Vec<Source>, DbError> {
        Ok(self
            .state
            .sources
            .values()
            .filter(|s| like_matches(name_pattern, &s.name) && like_matches(target_pattern, &s.target))
            .cloned()
            .collect())
    }

    async fn fetch_rows(&mut self, source: &Source) -> Result<StoredRows, DbError> {
        self.row_fetches += 1;
        let table = self
            .state
            .tables
            .get(self.resolve(&source.target))
            .ok_or_else(|| {
                DbError::statement(format!("relation \"{}\" does not exist", source.target))
            })?;

        let columns = table
            .columns
            .iter()
            .filter(|c| *c != SOURCE_COLUMN)
            .cloned()
            .collect::<Vec<_>>();
        let rows = table
            .rows
            .iter()
            .filter(|r| r.normalized(SOURCE_COLUMN) == source.name)
            .map(|r| {
                Row::from_pairs(
                    columns
                        .iter()
                        .map(|c| (c.clone(), r.get(c).cloned().unwrap_or_default())),
                )
            })
            .collect();

        Ok(StoredRows { columns, rows })
    }
}

#[async_trait]
impl Catalog for MemoryDatabase {
    async fn referenced_tables(&mut self, table: &str) -> Result<BTreeSet<String>, DbError> {
        Ok(self.foreign_keys.get(table).cloned().unwrap_or_default())
    }

    async fn table_config_entries(
        &mut self,
    ) -> Result<(Vec<TableConfigRecord>, Vec<TableConfigOverride>), DbError> {
        Ok((self.table_configs.clone(), self.overrides.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_matches() {
        assert!(like_matches("%", "anything"));
        assert!(like_matches("plant%", "plants.2024"));
        assert!(like_matches("pl_nt", "plant"));
        assert!(!like_matches("plant", "plants"));
        assert!(like_matches("a.b", "a.b"));
        assert!(!like_matches("a.b", "axb"));
    }

    #[tokio::test]
    async fn test_rollback_restores_state() {
        let mut db = MemoryDatabase::new();
        db.create_table("plant", "id", &["id", "name"]);

        db.begin().await.unwrap();
        db.seed_row("plant", "plants", [("name", "a")]);
        db.rollback().await.unwrap();

        assert!(db.rows("plant").is_empty());
    }

    #[tokio::test]
    async fn test_view_writes_through() {
        let mut db = MemoryDatabase::new();
        db.create_table("plant", "id", &["id", "name"]);
        db.create_view("plant_view", "plant");
        db.seed_row("plant_view", "plants", [("name", "a")]);

        assert_eq!(db.rows("plant").len(), 1);
        assert_eq!(db.rows("plant")[0].get("id"), Some(&Value::Int(1)));
    }
}
