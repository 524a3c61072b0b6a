//! Source registry records

use std::path::Path;

/// A named snapshot bound to one target table or view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub name: String,
    pub target: String,
    pub revision: u64,
}

impl Source {
    pub fn new(name: impl Into<String>, target: impl Into<String>, revision: u64) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            revision,
        }
    }
}

/// Source name for a file: the file stem, plus `.<sheet>` for workbook sheets
pub fn source_name(path: &Path, sheet: Option<&str>) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    match sheet {
        Some(sheet) => format!("{}.{}", stem, sheet),
        None => stem,
    }
}

/// Translate a `*` wildcard pattern into a SQL `LIKE` pattern
pub fn like_pattern(pattern: Option<&str>) -> String {
    pattern.unwrap_or("*").replace('*', "%")
}
