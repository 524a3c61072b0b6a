//! CSV snapshots

use std::path::Path;

use anyhow::{Context, Result};

use crate::sync::{Snapshot, SourceExport, Value};

/// Read a CSV file; every cell is kept as text
pub fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;

    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("Failed to read CSV header: {}", path.display()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut records = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record
            .with_context(|| format!("Failed to read row {} of {}", idx + 2, path.display()))?;
        records.push(record.iter().map(Value::from).collect::<Vec<_>>());
    }

    log::debug!("Read {} row(s) from {}", records.len(), path.display());
    Ok(Snapshot::from_records(headers, records))
}

/// Write an export, creating parent folders as needed
pub fn write_export(path: &Path, export: &SourceExport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create folder: {}", parent.display()))?;
    }

    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;

    wtr.write_record(&export.headers)
        .context("Failed to write CSV header")?;
    for record in &export.records {
        wtr.write_record(record)
            .with_context(|| format!("Failed to write row to {}", path.display()))?;
    }
    wtr.flush().context("Failed to flush CSV writer")?;

    log::info!("CSV file exported to: {}", path.display());
    Ok(())
}
