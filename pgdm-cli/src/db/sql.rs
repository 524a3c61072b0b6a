//! SQL rendering for statement plans
//!
//! Every value is bound as text and cast to the column's type with
//! `$n::<udt>`, so rows read from CSV can be written to any column type the
//! server knows how to parse.

use crate::config::SchemaConfig;
use crate::sync::{StatementOp, Value};

/// Column name and PostgreSQL type (`udt_name`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub udt: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, udt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            udt: udt.into(),
        }
    }
}

/// SQL text plus its text parameters; `None` binds NULL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedStatement {
    pub sql: String,
    pub params: Vec<Option<String>>,
}

/// Quote an identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Parameter placeholders with type casts
struct Params<'a> {
    columns: &'a [ColumnInfo],
    values: Vec<Option<String>>,
}

impl<'a> Params<'a> {
    fn new(columns: &'a [ColumnInfo]) -> Self {
        Self {
            columns,
            values: Vec::new(),
        }
    }

    /// Bind a value for `column`, returning its placeholder
    fn typed(&mut self, column: &str, value: &Value) -> String {
        self.values.push(value.to_sql_text());
        let placeholder = format!("${}", self.values.len());
        match self.columns.iter().find(|c| c.name == column) {
            Some(info) => format!("{}::{}", placeholder, quote_ident(&info.udt)),
            None => placeholder,
        }
    }

    fn text(&mut self, value: &str) -> String {
        self.values.push(Some(value.to_string()));
        format!("${}", self.values.len())
    }

    fn finish(self, sql: String) -> RenderedStatement {
        RenderedStatement {
            sql,
            params: self.values,
        }
    }
}

/// Render one statement.
///
/// `columns` describes the relation the statement writes to; registry
/// statements ignore it.
pub fn render(op: &StatementOp, schema: &SchemaConfig, columns: &[ColumnInfo]) -> RenderedStatement {
    let mut params = Params::new(columns);
    let registry = quote_ident(&schema.registry_table);

    let sql = match op {
        StatementOp::InsertRows {
            relation,
            source_name,
            columns: insert_columns,
            rows,
        } => {
            // An explicit source column in the snapshot is overridden
            let kept: Vec<usize> = (0..insert_columns.len())
                .filter(|&i| insert_columns[i] != schema.source_column)
                .collect();

            let mut names: Vec<String> = kept.iter().map(|&i| quote_ident(&insert_columns[i])).collect();
            names.push(quote_ident(&schema.source_column));

            let tuples: Vec<String> = rows
                .iter()
                .map(|row| {
                    let mut placeholders: Vec<String> = kept
                        .iter()
                        .map(|&i| {
                            let value = row.get(i).cloned().unwrap_or_default();
                            params.typed(&insert_columns[i], &value)
                        })
                        .collect();
                    placeholders.push(params.text(source_name));
                    format!("({})", placeholders.join(", "))
                })
                .collect();

            format!(
                "INSERT INTO {} ({}) VALUES {}",
                quote_ident(relation),
                names.join(", "),
                tuples.join(", ")
            )
        }
        StatementOp::UpdateRow {
            relation,
            key_column,
            key,
            assignments,
        } => {
            let mut sets: Vec<String> = assignments
                .iter()
                .map(|(column, value)| {
                    format!("{} = {}", quote_ident(column), params.typed(column, value))
                })
                .collect();
            if sets.is_empty() {
                sets.push(format!("{0} = {0}", quote_ident(key_column)));
            }
            let key = params.typed(key_column, key);

            format!(
                "UPDATE {} SET {} WHERE {} = {}",
                quote_ident(relation),
                sets.join(", "),
                quote_ident(key_column),
                key
            )
        }
        StatementOp::DeleteKeys {
            relation,
            column,
            keys,
        } => {
            let placeholders: Vec<String> = keys.iter().map(|k| params.typed(column, k)).collect();
            format!(
                "DELETE FROM {} WHERE {} IN ({})",
                quote_ident(relation),
                quote_ident(column),
                placeholders.join(", ")
            )
        }
        StatementOp::DeleteSourceRows {
            relation,
            column,
            source_name,
        } => {
            let name = params.text(source_name);
            format!(
                "DELETE FROM {} WHERE {} = {}",
                quote_ident(relation),
                quote_ident(column),
                name
            )
        }
        StatementOp::RegisterSource(source) => {
            let name = params.text(&source.name);
            let target = params.text(&source.target);
            let revision = params.text(&source.revision.to_string());
            format!(
                "INSERT INTO {} (name, target, revision) VALUES ({}, {}, {}::bigint)",
                registry, name, target, revision
            )
        }
        StatementOp::BumpRevision { name } => {
            let name = params.text(name);
            format!(
                "UPDATE {} SET revision = revision + 1 WHERE name = {}",
                registry, name
            )
        }
        StatementOp::RemoveSource { name } => {
            let name = params.text(name);
            format!("DELETE FROM {} WHERE name = {}", registry, name)
        }
    };

    params.finish(sql)
}

/// How a column is read back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnDecode {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Date,
    Timestamp,
    TimestampTz,
    Text,
}

impl ColumnDecode {
    pub fn for_udt(udt: &str) -> Self {
        match udt {
            "bool" => ColumnDecode::Bool,
            "int2" => ColumnDecode::Int2,
            "int4" => ColumnDecode::Int4,
            "int8" => ColumnDecode::Int8,
            "float4" => ColumnDecode::Float4,
            "float8" => ColumnDecode::Float8,
            "numeric" => ColumnDecode::Numeric,
            "date" => ColumnDecode::Date,
            "timestamp" => ColumnDecode::Timestamp,
            "timestamptz" => ColumnDecode::TimestampTz,
            _ => ColumnDecode::Text,
        }
    }

    /// Whether the column has to be selected as `::text`
    fn as_text(self) -> bool {
        matches!(self, ColumnDecode::Numeric | ColumnDecode::Text)
    }
}

/// `SELECT` for the rows of one source, source column excluded
pub fn select_rows(relation: &str, columns: &[ColumnInfo], source_column: &str) -> String {
    let selected: Vec<String> = columns
        .iter()
        .filter(|c| c.name != source_column)
        .map(|c| {
            let ident = quote_ident(&c.name);
            if ColumnDecode::for_udt(&c.udt).as_text() {
                format!("{0}::text AS {0}", ident)
            } else {
                ident
            }
        })
        .collect();

    format!(
        "SELECT {} FROM {} WHERE {} = $1",
        selected.join(", "),
        quote_ident(relation),
        quote_ident(source_column)
    )
}
