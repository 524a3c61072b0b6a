//! Rows and snapshots

use once_cell::sync::Lazy;
use regex::Regex;

use super::Value;

/// Revision tag carried by the first header of an exported snapshot, e.g. `id:r4`
static REVISION_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<column>.*):r(?P<revision>\d+)$").expect("valid regex"));

/// Ordered mapping from column name to value
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    fields: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row from column/value pairs, keeping their order
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut row = Row::new();
        for (column, value) in pairs {
            row.set(column, value);
        }
        row
    }

    /// Get a value by column name
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Set a column, replacing the value in place if the column already exists
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((column, value)),
        }
    }

    /// Normalized value of a column; missing columns normalize like null
    pub fn normalized(&self, column: &str) -> String {
        self.get(column).map(Value::normalized).unwrap_or_default()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field-wise equality after normalization (see [`Value::matches`]).
    ///
    /// Columns present on only one side compare against the empty string.
    pub fn same_content(&self, other: &Row) -> bool {
        self.columns()
            .chain(other.columns())
            .all(|column| match (self.get(column), other.get(column)) {
                (Some(mine), Some(theirs)) => mine.matches(theirs),
                (Some(value), None) | (None, Some(value)) => value.is_empty(),
                (None, None) => true,
            })
    }
}

/// An ordered set of rows presented for reconciliation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    /// Column names with the revision tag stripped
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Revision the snapshot was exported at; `None` means a full replacement
    pub revision: Option<u64>,
}

impl Snapshot {
    /// Build a snapshot from a header and raw records.
    ///
    /// A first header of the form `<column>:r<revision>` sets the revision and
    /// is renamed to `<column>`. Records shorter than the header are padded
    /// with nulls.
    pub fn from_records<I>(headers: Vec<String>, records: I) -> Self
    where
        I: IntoIterator<Item = Vec<Value>>,
    {
        let (columns, revision) = parse_headers(headers);

        let rows = records
            .into_iter()
            .map(|record| {
                let mut values = record.into_iter();
                Row::from_pairs(
                    columns
                        .iter()
                        .map(|column| (column.clone(), values.next().unwrap_or_default())),
                )
            })
            .collect();

        Snapshot {
            columns,
            rows,
            revision,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Split the revision tag off the first header
pub fn parse_headers(mut headers: Vec<String>) -> (Vec<String>, Option<u64>) {
    let Some(first) = headers.first() else {
        return (headers, None);
    };
    let Some(caps) = REVISION_TAG.captures(first) else {
        return (headers, None);
    };

    let revision = caps["revision"].parse::<u64>().ok();
    if revision.is_some() {
        headers[0] = caps["column"].to_string();
    }
    (headers, revision)
}

/// Header for the primary-key column of an export at `revision`
pub fn tagged_header(column: &str, revision: u64) -> String {
    format!("{}:r{}", column, revision)
}
