//! Snapshot files
//!
//! Snapshots are read from CSV files or from one sheet of an XLSX workbook and
//! exported as CSV. `export --all` writes one folder per target which
//! `import-fs` reads back.

pub mod csv;
pub mod xlsx;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::sync::{Snapshot, source_name};

/// Supported snapshot file types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Csv,
    Xlsx,
}

impl SnapshotFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "csv" => Ok(SnapshotFormat::Csv),
            "xlsx" => Ok(SnapshotFormat::Xlsx),
            other => bail!(
                "Unsupported file type .{}. Supported types are: xlsx, csv",
                other
            ),
        }
    }
}

/// A snapshot and the source name derived from its file
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    pub source: String,
    pub snapshot: Snapshot,
}

/// Read a snapshot from a CSV file or a workbook sheet.
///
/// Workbooks default to their first sheet; the source name then includes the
/// sheet name.
pub fn read_snapshot(path: &Path, sheet: Option<&str>) -> Result<SnapshotFile> {
    if !path.exists() {
        bail!("Unknown file: {}", path.display());
    }

    match SnapshotFormat::from_path(path)? {
        SnapshotFormat::Csv => {
            if sheet.is_some() {
                log::warn!("Ignoring sheet for CSV file {}", path.display());
            }
            Ok(SnapshotFile {
                source: source_name(path, None),
                snapshot: self::csv::read_snapshot(path)?,
            })
        }
        SnapshotFormat::Xlsx => {
            let (sheet, snapshot) = xlsx::read_snapshot(path, sheet)?;
            Ok(SnapshotFile {
                source: source_name(path, Some(&sheet)),
                snapshot,
            })
        }
    }
}

/// `<folder>/<target>/<source>.csv`
pub fn export_path(folder: &Path, target: &str, source: &str) -> PathBuf {
    folder.join(target).join(format!("{}.csv", source))
}

/// Target folders of an export and the CSV files inside each, sorted by name
pub fn discover_import(folder: &Path) -> Result<Vec<(String, Vec<PathBuf>)>> {
    let entries = std::fs::read_dir(folder)
        .with_context(|| format!("Failed to read folder: {}", folder.display()))?;

    let mut targets = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let target = entry.file_name().to_string_lossy().into_owned();

        let mut files: Vec<PathBuf> = std::fs::read_dir(entry.path())
            .with_context(|| format!("Failed to read folder: {}", entry.path().display()))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
            })
            .collect();
        files.sort();

        if files.is_empty() {
            log::debug!("Skipping empty folder {}", target);
            continue;
        }
        targets.push((target, files));
    }

    targets.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            SnapshotFormat::from_path(Path::new("a.CSV")).unwrap(),
            SnapshotFormat::Csv
        );
        assert_eq!(
            SnapshotFormat::from_path(Path::new("a.xlsx")).unwrap(),
            SnapshotFormat::Xlsx
        );
        assert!(SnapshotFormat::from_path(Path::new("a.txt")).is_err());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_snapshot(&dir.path().join("nope.csv"), None);
        assert!(result.unwrap_err().to_string().contains("Unknown file"));
    }

    #[test]
    fn test_read_csv_snapshot_names_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plants.csv");
        std::fs::write(&path, "id:r2,name\n1,oak\n").unwrap();

        let file = read_snapshot(&path, None).unwrap();
        assert_eq!(file.source, "plants");
        assert_eq!(file.snapshot.revision, Some(2));
    }

    #[test]
    fn test_discover_import() {
        let dir = tempfile::tempdir().unwrap();
        for (target, source) in [("plant", "b"), ("plant", "a"), ("orders", "o")] {
            let path = export_path(dir.path(), target, source);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, "id\n").unwrap();
        }
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();
        std::fs::write(dir.path().join("stray.csv"), "id\n").unwrap();

        let found = discover_import(dir.path()).unwrap();

        let targets: Vec<&str> = found.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(targets, vec!["orders", "plant"]);
        let files: Vec<String> = found[1]
            .1
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files, vec!["a.csv", "b.csv"]);
    }
}
