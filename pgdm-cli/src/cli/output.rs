//! Terminal output helpers

use anyhow::{Context, Result};
use colored::*;
use dialoguer::Confirm;

use crate::error::{DbError, SyncError};
use crate::sync::Row;

/// Ask for confirmation unless `assume_yes` is set; defaults to no
pub fn confirm(prompt: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}

/// The database error behind an error chain, if any
fn database_error(err: &anyhow::Error) -> Option<&DbError> {
    err.chain().find_map(|cause| {
        if let Some(db) = cause.downcast_ref::<DbError>() {
            return Some(db);
        }
        match cause.downcast_ref::<SyncError>()? {
            SyncError::Database(db) => Some(db),
            SyncError::Statement(failure) => Some(&failure.error),
            SyncError::ApplyFailed { errors, .. } => errors.first().map(|f| &f.error),
            _ => None,
        }
    })
}

/// Render an error as ERROR / DETAILS / WHERE blocks
pub fn format_error(err: &anyhow::Error) -> String {
    let mut message = format!("{:#}", err);

    if let Some(SyncError::ApplyFailed { errors, .. }) =
        err.chain().find_map(|c| c.downcast_ref::<SyncError>())
    {
        for failure in errors {
            message.push_str(&format!("\n  - {}", failure));
        }
    }

    let db = database_error(err);
    let detail = db.and_then(|e| e.detail.as_deref()).unwrap_or("NA");
    let location = db.and_then(|e| e.location.as_deref()).unwrap_or("NA");

    format!(
        "{}\n{}\n\n{}\n{}\n\n{}\n{}\n",
        "ERROR:".red().bold(),
        message,
        "DETAILS:".bold(),
        detail,
        "WHERE:".bold(),
        location
    )
}

pub fn print_error(err: &anyhow::Error) {
    eprintln!();
    eprintln!("{}", format_error(err));
}

/// Rows as CSV-like lines, header first
pub fn format_rows(rows: &[Row]) -> String {
    let Some(first) = rows.first() else {
        return String::new();
    };

    let columns: Vec<&str> = first.columns().collect();
    let mut lines = vec![columns.join(",")];
    for row in rows {
        let values: Vec<String> = columns.iter().map(|c| row.normalized(c)).collect();
        lines.push(values.join(","));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatementFailure;
    use crate::sync::OperationKind;

    #[test]
    fn test_format_error_includes_database_detail() {
        colored::control::set_override(false);
        let failure = StatementFailure {
            table: "orders".into(),
            operation: Some(OperationKind::Insert),
            first_row: 0,
            row_count: 1,
            keys: vec![],
            error: DbError {
                location: Some("SQL statement".into()),
                ..DbError::statement("insert violates foreign key")
                    .with_code("23503")
                    .with_detail("Key (customer_id)=(9) is not present.")
            },
        };
        let err = anyhow::Error::from(SyncError::Statement(failure));

        let text = format_error(&err);

        assert!(text.contains("ERROR:\ninsert on orders failed for row 1"));
        assert!(text.contains("DETAILS:\nKey (customer_id)=(9) is not present."));
        assert!(text.contains("WHERE:\nSQL statement"));
    }

    #[test]
    fn test_format_error_without_database_error() {
        colored::control::set_override(false);
        let err = anyhow::Error::from(SyncError::UnknownSource("plants".into()));

        let text = format_error(&err);
        assert!(text.contains("unknown source: plants"));
        assert!(text.contains("DETAILS:\nNA"));
    }

    #[test]
    fn test_format_rows() {
        let rows = vec![
            Row::from_pairs([("id", "1"), ("name", "oak")]),
            Row::from_pairs([("id", "2"), ("name", "")]),
        ];
        assert_eq!(format_rows(&rows), "id,name\n1,oak\n2,");
        assert_eq!(format_rows(&[]), "");
    }
}
