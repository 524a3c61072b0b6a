//! Statement plans
//!
//! Converts a diff (or a whole snapshot) into an ordered list of statements
//! for one source. Plans are pure data; rendering to SQL happens in
//! [`crate::db::sql`] and execution in [`super::apply`].
//!
//! Statement order inside a plan:
//! - update: updates, inserts, deletes, revision bump
//! - replace: delete all source rows, inserts, revision bump
//! - insert: register source, inserts, revision bump (tagged snapshots only)
//! - delete: delete all source rows, unregister source

use crate::config::{DeleteColumnType, TableConfig};
use crate::error::{DbError, StatementFailure};

use super::diff::DiffResult;
use super::{OperationKind, Row, Source, Value};

/// What a statement does
#[derive(Debug, Clone, PartialEq)]
pub enum StatementOp {
    /// Multi-row insert; every row is tagged with `source_name`
    InsertRows {
        relation: String,
        source_name: String,
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    /// Update one row by key
    UpdateRow {
        relation: String,
        key_column: String,
        key: Value,
        assignments: Vec<(String, Value)>,
    },
    /// Delete rows whose `column` is one of `keys`
    DeleteKeys {
        relation: String,
        column: String,
        keys: Vec<Value>,
    },
    /// Delete every row whose `column` equals the source name
    DeleteSourceRows {
        relation: String,
        column: String,
        source_name: String,
    },
    /// Add a registry row
    RegisterSource(Source),
    /// Increment the stored revision by one
    BumpRevision { name: String },
    /// Remove a registry row
    RemoveSource { name: String },
}

impl StatementOp {
    /// Row operation performed, `None` for registry statements
    pub fn kind(&self) -> Option<OperationKind> {
        match self {
            StatementOp::InsertRows { .. } => Some(OperationKind::Insert),
            StatementOp::UpdateRow { .. } => Some(OperationKind::Update),
            StatementOp::DeleteKeys { .. } | StatementOp::DeleteSourceRows { .. } => {
                Some(OperationKind::Delete)
            }
            StatementOp::RegisterSource(_)
            | StatementOp::BumpRevision { .. }
            | StatementOp::RemoveSource { .. } => None,
        }
    }
}

/// A statement plus the context needed to report its failure
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub op: StatementOp,
    /// Relation (or registry entry) named in error reports
    pub table: String,
    /// Ordinal of the first row within its operation kind
    pub first_row: usize,
    pub row_count: usize,
    /// Primary-key values carried by the statement, when known
    pub keys: Vec<String>,
}

impl Statement {
    fn registry(op: StatementOp, name: &str) -> Self {
        Self {
            op,
            table: format!("source {}", name),
            first_row: 0,
            row_count: 0,
            keys: Vec::new(),
        }
    }

    pub fn kind(&self) -> Option<OperationKind> {
        self.op.kind()
    }

    /// Statements that count towards progress
    pub fn touches_rows(&self) -> bool {
        self.kind().is_some() && self.row_count > 0
    }

    /// Attach this statement's context to a database error
    pub fn failure(&self, error: DbError) -> StatementFailure {
        StatementFailure {
            table: self.table.clone(),
            operation: self.kind(),
            first_row: self.first_row,
            row_count: self.row_count,
            keys: self.keys.clone(),
            error,
        }
    }
}

/// Ordered statements for one source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementPlan {
    /// Source the plan belongs to
    pub source: String,
    pub statements: Vec<Statement>,
}

impl StatementPlan {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            statements: Vec::new(),
        }
    }

    pub fn push(&mut self, statement: Statement) {
        self.statements.push(statement);
    }

    pub fn extend(&mut self, statements: impl IntoIterator<Item = Statement>) {
        self.statements.extend(statements);
    }

    /// Rows touched by all statements, used as the progress total
    pub fn total_rows(&self) -> usize {
        self.statements
            .iter()
            .filter(|s| s.touches_rows())
            .map(|s| s.row_count)
            .sum()
    }

    /// Rows touched by statements of one kind
    pub fn rows_for(&self, kind: OperationKind) -> usize {
        self.statements
            .iter()
            .filter(|s| s.kind() == Some(kind))
            .map(|s| s.row_count)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Plan for registering a new source and inserting its rows.
///
/// The registry row is written at `source.revision`; a tagged snapshot is
/// bumped once more at the end.
pub fn build_insert_plan(
    source: &Source,
    primary_key: Option<&str>,
    rows: &[Row],
    tagged: bool,
    batch_size: usize,
) -> StatementPlan {
    let mut plan = StatementPlan::new(&source.name);
    plan.push(Statement::registry(
        StatementOp::RegisterSource(source.clone()),
        &source.name,
    ));
    plan.extend(insert_statements(
        &source.target,
        &source.name,
        rows,
        primary_key,
        batch_size,
    ));
    if tagged {
        plan.push(bump_revision(source));
    }
    plan
}

/// Plan applying a diff: updates, then inserts, then deletes, then the bump
pub fn build_update_plan(
    source: &Source,
    table: &TableConfig,
    diff: &DiffResult,
    batch_size: usize,
) -> StatementPlan {
    let mut plan = StatementPlan::new(&source.name);
    let primary_key = diff.primary_key.as_str();

    for (ordinal, pair) in diff.to_update.iter().enumerate() {
        let key = pair.new.get(primary_key).cloned().unwrap_or_default();
        // Only changed columns; exported timestamps carry just the day
        let assignments = pair
            .new
            .iter()
            .filter(|(column, _)| *column != primary_key)
            .filter(|(column, value)| match pair.old.get(column) {
                Some(old) => !old.matches(value),
                None => !value.is_empty(),
            })
            .map(|(column, value)| (column.to_string(), value.clone()))
            .collect();

        plan.push(Statement {
            table: source.target.clone(),
            first_row: ordinal,
            row_count: 1,
            keys: vec![key.normalized()],
            op: StatementOp::UpdateRow {
                relation: source.target.clone(),
                key_column: primary_key.to_string(),
                key,
                assignments,
            },
        });
    }

    plan.extend(insert_statements(
        &source.target,
        &source.name,
        &diff.to_insert,
        Some(primary_key),
        batch_size,
    ));

    plan.extend(delete_key_statements(
        table.delete_relation(),
        table.row_delete_column(),
        &diff.to_delete,
        primary_key,
        batch_size,
    ));

    plan.push(bump_revision(source));
    plan
}

/// Plan replacing every row of a source with `incoming`
pub fn build_replace_plan(
    source: &Source,
    table: &TableConfig,
    current: &[Row],
    incoming: &[Row],
    batch_size: usize,
) -> StatementPlan {
    let mut plan = StatementPlan::new(&source.name);
    plan.extend(source_delete_statements(source, table, current, batch_size));
    plan.extend(insert_statements(
        &source.target,
        &source.name,
        incoming,
        Some(&table.primary_key),
        batch_size,
    ));
    plan.push(bump_revision(source));
    plan
}

/// Plan removing a source and every row it owns
pub fn build_delete_plan(
    source: &Source,
    table: &TableConfig,
    current: &[Row],
    batch_size: usize,
) -> StatementPlan {
    let mut plan = StatementPlan::new(&source.name);
    plan.extend(source_delete_statements(source, table, current, batch_size));
    plan.push(Statement::registry(
        StatementOp::RemoveSource {
            name: source.name.clone(),
        },
        &source.name,
    ));
    plan
}

fn bump_revision(source: &Source) -> Statement {
    Statement::registry(
        StatementOp::BumpRevision {
            name: source.name.clone(),
        },
        &source.name,
    )
}

/// Multi-row inserts of at most `batch_size` rows each.
///
/// A batch uses the union of its rows' columns in first-seen order; missing
/// values are null. When every row of a batch has an empty primary key the
/// key column is left out so the database assigns it.
pub fn insert_statements(
    relation: &str,
    source_name: &str,
    rows: &[Row],
    primary_key: Option<&str>,
    batch_size: usize,
) -> Vec<Statement> {
    rows.chunks(batch_size.max(1))
        .enumerate()
        .map(|(batch, chunk)| {
            let omit_key = primary_key
                .filter(|key| chunk.iter().all(|row| row.normalized(key).is_empty()));

            let mut columns: Vec<String> = Vec::new();
            for row in chunk {
                for column in row.columns() {
                    if Some(column) != omit_key && !columns.iter().any(|c| c == column) {
                        columns.push(column.to_string());
                    }
                }
            }

            let values = chunk
                .iter()
                .map(|row| {
                    columns
                        .iter()
                        .map(|column| row.get(column).cloned().unwrap_or_default())
                        .collect()
                })
                .collect();

            let keys = match (primary_key, omit_key) {
                (Some(key), None) => chunk.iter().map(|row| row.normalized(key)).collect(),
                _ => Vec::new(),
            };

            Statement {
                table: relation.to_string(),
                first_row: batch * batch_size.max(1),
                row_count: chunk.len(),
                keys,
                op: StatementOp::InsertRows {
                    relation: relation.to_string(),
                    source_name: source_name.to_string(),
                    columns,
                    rows: values,
                },
            }
        })
        .collect()
}

/// Batched deletes of `rows` by their primary-key values
fn delete_key_statements(
    relation: &str,
    column: &str,
    rows: &[Row],
    primary_key: &str,
    batch_size: usize,
) -> Vec<Statement> {
    rows.chunks(batch_size.max(1))
        .enumerate()
        .map(|(batch, chunk)| {
            let keys: Vec<Value> = chunk
                .iter()
                .map(|row| row.get(primary_key).cloned().unwrap_or_default())
                .collect();

            Statement {
                table: relation.to_string(),
                first_row: batch * batch_size.max(1),
                row_count: chunk.len(),
                keys: keys.iter().map(Value::normalized).collect(),
                op: StatementOp::DeleteKeys {
                    relation: relation.to_string(),
                    column: column.to_string(),
                    keys,
                },
            }
        })
        .collect()
}

/// Statements removing every row a source owns.
///
/// A name-typed delete column removes the whole source with one predicate;
/// otherwise the stored rows are deleted by key.
pub fn source_delete_statements(
    source: &Source,
    table: &TableConfig,
    current: &[Row],
    batch_size: usize,
) -> Vec<Statement> {
    match table.delete_column_type() {
        DeleteColumnType::Name => vec![Statement {
            table: table.delete_relation().to_string(),
            first_row: 0,
            row_count: current.len(),
            keys: Vec::new(),
            op: StatementOp::DeleteSourceRows {
                relation: table.delete_relation().to_string(),
                column: table.delete_column().to_string(),
                source_name: source.name.clone(),
            },
        }],
        DeleteColumnType::Id => delete_key_statements(
            table.delete_relation(),
            table.delete_column(),
            current,
            &table.primary_key,
            batch_size,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeleteColumnType, TableConfig};
    use crate::sync::diff::diff;

    fn stored(id: i64, name: &str) -> Row {
        Row::from_pairs([("id", Value::Int(id)), ("name", Value::from(name))])
    }

    fn incoming(id: &str, name: &str) -> Row {
        Row::from_pairs([("id", id), ("name", name)])
    }

    fn kinds(plan: &StatementPlan) -> Vec<&'static str> {
        plan.statements
            .iter()
            .map(|s| match &s.op {
                StatementOp::InsertRows { .. } => "insert",
                StatementOp::UpdateRow { .. } => "update",
                StatementOp::DeleteKeys { .. } => "delete",
                StatementOp::DeleteSourceRows { .. } => "delete_source",
                StatementOp::RegisterSource(_) => "register",
                StatementOp::BumpRevision { .. } => "bump",
                StatementOp::RemoveSource { .. } => "remove",
            })
            .collect()
    }

    #[test]
    fn test_update_assigns_changed_columns_only() {
        let planted = chrono::NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        let source = Source::new("plants", "plant", 0);
        let table = TableConfig::new("plant", "id");
        let current = vec![Row::from_pairs([
            ("id", Value::Int(1)),
            ("name", Value::from("oak")),
            ("planted", Value::DateTime(planted)),
            ("height", Value::Numeric("2.50".into())),
        ])];
        let rows = vec![Row::from_pairs([
            ("id", "1"),
            ("name", "elm"),
            ("planted", "2024-03-01"),
            ("height", "2.5"),
        ])];
        let diff = diff(&current, &rows, "id", 0, Some(0)).unwrap();

        let plan = build_update_plan(&source, &table, &diff, 100);

        let StatementOp::UpdateRow { assignments, .. } = &plan.statements[0].op else {
            panic!("expected update");
        };
        assert_eq!(assignments, &vec![("name".to_string(), Value::from("elm"))]);
    }

    #[test]
    fn test_update_plan_order() {
        let source = Source::new("plants", "plant", 1);
        let table = TableConfig::new("plant", "id");
        let current = vec![stored(1, "a"), stored(2, "b")];
        let rows = vec![incoming("1", "A"), incoming("", "c")];
        let diff = diff(&current, &rows, "id", 1, Some(1)).unwrap();

        let plan = build_update_plan(&source, &table, &diff, 100);

        assert_eq!(kinds(&plan), vec!["update", "insert", "delete", "bump"]);
        assert_eq!(plan.total_rows(), 3);

        let StatementOp::UpdateRow {
            key, assignments, ..
        } = &plan.statements[0].op
        else {
            panic!("expected update");
        };
        assert_eq!(key, &Value::from("1"));
        assert_eq!(assignments, &vec![("name".to_string(), Value::from("A"))]);

        // Inserted rows let the database assign the key
        let StatementOp::InsertRows { columns, .. } = &plan.statements[1].op else {
            panic!("expected insert");
        };
        assert_eq!(columns, &vec!["name".to_string()]);

        let StatementOp::DeleteKeys { keys, column, .. } = &plan.statements[2].op else {
            panic!("expected delete");
        };
        assert_eq!(column, "id");
        assert_eq!(keys, &vec![Value::Int(2)]);
    }

    #[test]
    fn test_inserts_are_batched() {
        let rows: Vec<Row> = (0..250)
            .map(|i| Row::from_pairs([("name", format!("row {}", i))]))
            .collect();

        let statements = insert_statements("plant", "plants", &rows, Some("id"), 100);

        assert_eq!(statements.len(), 3);
        assert_eq!(statements[0].row_count, 100);
        assert_eq!(statements[2].row_count, 50);
        assert_eq!(statements[2].first_row, 200);
    }

    #[test]
    fn test_insert_batch_uses_column_union() {
        let rows = vec![
            Row::from_pairs([("id", "1"), ("name", "a")]),
            Row::from_pairs([("id", "2"), ("note", "x")]),
        ];

        let statements = insert_statements("plant", "plants", &rows, Some("id"), 10);
        let StatementOp::InsertRows { columns, rows, .. } = &statements[0].op else {
            panic!("expected insert");
        };

        assert_eq!(columns, &vec!["id", "name", "note"]);
        assert_eq!(rows[1], vec![Value::from("2"), Value::Null, Value::from("x")]);
        assert_eq!(statements[0].keys, vec!["1", "2"]);
    }

    #[test]
    fn test_insert_plan_bumps_tagged_snapshots_only() {
        let source = Source::new("plants", "plant", 3);
        let rows = vec![incoming("1", "a")];

        let tagged = build_insert_plan(&source, Some("id"), &rows, true, 100);
        assert_eq!(kinds(&tagged), vec!["register", "insert", "bump"]);

        let untagged = build_insert_plan(&source, Some("id"), &rows, false, 100);
        assert_eq!(kinds(&untagged), vec!["register", "insert"]);
    }

    #[test]
    fn test_replace_plan_by_name_uses_one_delete() {
        let source = Source::new("plants", "plant_view", 2);
        let mut table = TableConfig::for_view("plant", "plant_view", "id");
        table.custom_delete_column = Some("source_name".into());
        table.custom_delete_column_type = Some(DeleteColumnType::Name);

        let current = vec![stored(1, "a"), stored(2, "b")];
        let plan = build_replace_plan(&source, &table, &current, &[incoming("1", "a")], 100);

        assert_eq!(kinds(&plan), vec!["delete_source", "insert", "bump"]);
        assert_eq!(
            plan.statements[0].op,
            StatementOp::DeleteSourceRows {
                relation: "plant".into(),
                column: "source_name".into(),
                source_name: "plants".into(),
            }
        );
        assert_eq!(plan.statements[0].row_count, 2);
    }

    #[test]
    fn test_delete_plan_by_id() {
        let source = Source::new("plants", "plant", 0);
        let table = TableConfig::new("plant", "id");
        let current = vec![stored(1, "a"), stored(2, "b")];

        let plan = build_delete_plan(&source, &table, &current, 1);

        assert_eq!(kinds(&plan), vec!["delete", "delete", "remove"]);
        assert_eq!(plan.rows_for(OperationKind::Delete), 2);
        assert_eq!(plan.statements[1].keys, vec!["2"]);
        assert_eq!(plan.statements[1].first_row, 1);
    }

    #[test]
    fn test_failure_carries_context() {
        let statements = insert_statements(
            "plant",
            "plants",
            &[incoming("7", "a")],
            Some("id"),
            100,
        );
        let failure = statements[0].failure(DbError::statement("boom"));

        assert_eq!(failure.operation, Some(OperationKind::Insert));
        assert_eq!(failure.keys, vec!["7"]);
        assert_eq!(failure.to_string(), "insert on plant failed for row 1 (keys: 7): boom");
    }
}
