//! Workbook snapshots
//!
//! One sheet of an XLSX file is one snapshot. The first row is the header.

use std::path::Path;

use anyhow::{Context, Result};
use calamine::{Data, Reader, Xlsx, open_workbook};
use chrono::Timelike;

use crate::sync::{Snapshot, Value};

/// Convert a cell to a [`Value`]
fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Int(i) => Value::Int(*i),
        Data::Float(f) => {
            // Whole numbers are stored as floats by most spreadsheet tools
            if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                Value::Int(*f as i64)
            } else {
                Value::Float(*f)
            }
        }
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(dt) if dt.time().num_seconds_from_midnight() == 0 && dt.time().nanosecond() == 0 => {
                Value::Date(dt.date())
            }
            Some(dt) => Value::DateTime(dt),
            None => Value::String(dt.to_string()),
        },
        Data::DateTimeIso(s) => Value::String(s.clone()),
        Data::DurationIso(s) => Value::String(s.clone()),
        Data::Error(_) => Value::Null,
    }
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

/// Read one sheet, the first when `sheet` is `None`.
///
/// Returns the sheet name actually read along with the snapshot.
pub fn read_snapshot(path: &Path, sheet: Option<&str>) -> Result<(String, Snapshot)> {
    let mut workbook: Xlsx<_> = open_workbook(path)
        .with_context(|| format!("Failed to open Excel file: {}", path.display()))?;

    let sheet_name = match sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .with_context(|| format!("Workbook has no sheets: {}", path.display()))?,
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .with_context(|| format!("Failed to read sheet: {}", sheet_name))?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .map(|header| header.iter().map(header_text).collect())
        .unwrap_or_default();

    let records: Vec<Vec<Value>> = rows
        .map(|row| row.iter().map(cell_to_value).collect::<Vec<_>>())
        // Skip fully empty rows
        .filter(|values| values.iter().any(|v| !v.is_empty()))
        .collect();

    log::debug!(
        "Read {} row(s) from sheet '{}' of {}",
        records.len(),
        sheet_name,
        path.display()
    );
    Ok((sheet_name, Snapshot::from_records(headers, records)))
}
