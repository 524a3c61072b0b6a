//! Error types for source synchronization
//!
//! `SyncError` is the taxonomy returned by the reconciliation engine, the
//! transactional applier and the dependency resolver. Database failures keep
//! the server's code, detail and location so callers can render a complete
//! diagnostic without going back to the database.

use std::fmt;

use thiserror::Error;

use crate::sync::OperationKind;

/// Convenient alias for results returned by the sync core.
pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// No registry row exists for the given source name.
    #[error("unknown source: {0}")]
    UnknownSource(String),

    /// An insert was attempted for a source name that is already registered.
    #[error("source already exists: {0}")]
    SourceAlreadyExists(String),

    /// The snapshot was exported at a different revision than the one stored.
    #[error(
        "invalid revision: snapshot is at r{snapshot}, database is at r{stored}; \
         the snapshot is stale, re-export the source and retry"
    )]
    RevisionConflict { stored: u64, snapshot: u64 },

    /// An incoming row references a key that the source does not own.
    #[error("unknown {column} {value}")]
    UnknownPrimaryKey { column: String, value: String },

    /// The same key appears more than once in one snapshot.
    #[error("duplicate {column} {value} in snapshot")]
    DuplicatePrimaryKey { column: String, value: String },

    /// No primary key / target mapping is registered for a table or view.
    #[error("unknown table {0}: register its primary key in the table config")]
    UnknownTableConfig(String),

    /// A table config override could not be interpreted.
    #[error("invalid table config for {table}: {reason}")]
    InvalidTableConfig { table: String, reason: String },

    /// Foreign keys form a cycle; the path starts and ends with the same table.
    #[error("circular dependency detected: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// A single statement failed.
    #[error(transparent)]
    Statement(#[from] StatementFailure),

    /// A transaction was rolled back because one or more statements failed.
    #[error("{} statement(s) failed on {table}; transaction rolled back", .errors.len())]
    ApplyFailed {
        table: String,
        errors: Vec<StatementFailure>,
    },

    /// Connection level failure outside of a single statement.
    #[error("database error: {0}")]
    Database(#[from] DbError),
}

/// Whether a database error came from the server rejecting a statement or
/// from the connection itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    Statement,
    Connection,
}

/// Error reported by the storage layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbError {
    pub kind: DbErrorKind,
    pub message: String,
    /// SQLSTATE code, when the server sent one
    pub code: Option<String>,
    pub detail: Option<String>,
    /// Server-side location (the `WHERE` field of a PostgreSQL error)
    pub location: Option<String>,
}

impl DbError {
    /// Error raised by the server for one statement
    pub fn statement(message: impl Into<String>) -> Self {
        Self {
            kind: DbErrorKind::Statement,
            message: message.into(),
            code: None,
            detail: None,
            location: None,
        }
    }

    /// Error raised by the transport
    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            kind: DbErrorKind::Connection,
            ..Self::statement(message)
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn is_connection(&self) -> bool {
        self.kind == DbErrorKind::Connection
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} [{}]", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for DbError {}

impl From<sqlx::Error> for DbError {
    fn from(error: sqlx::Error) -> Self {
        let Some(db_error) = error.as_database_error() else {
            let transport = matches!(
                error,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::Protocol(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            );
            // Decode, encode and lookup failures belong to the statement
            return if transport {
                DbError::connection(error.to_string())
            } else {
                DbError::statement(error.to_string())
            };
        };

        let mut converted = DbError::statement(db_error.message());
        if let Some(code) = db_error.code() {
            converted.code = Some(code.into_owned());
        }
        if let Some(pg) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
            converted.detail = pg.detail().map(str::to_string);
            converted.location = pg.r#where().map(str::to_string);
        }
        converted
    }
}

/// One failed statement together with the rows it was carrying.
#[derive(Debug, Clone, Error)]
pub struct StatementFailure {
    pub table: String,
    pub operation: Option<OperationKind>,
    /// Zero-based ordinal of the first row in the batch
    pub first_row: usize,
    pub row_count: usize,
    /// Primary-key values of the affected rows, when they are known
    pub keys: Vec<String>,
    #[source]
    pub error: DbError,
}

impl fmt::Display for StatementFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {} failed for {}{}: {}",
            self.operation_label(),
            self.table,
            self.row_label(),
            self.key_label(),
            self.error
        )
    }
}

impl StatementFailure {
    fn operation_label(&self) -> String {
        match self.operation {
            Some(kind) => kind.to_string(),
            None => "registry update".to_string(),
        }
    }

    fn row_label(&self) -> String {
        match self.row_count {
            0 => "source registry".to_string(),
            1 => format!("row {}", self.first_row + 1),
            n => format!("rows {}-{}", self.first_row + 1, self.first_row + n),
        }
    }

    fn key_label(&self) -> String {
        const SHOWN: usize = 10;

        if self.keys.is_empty() {
            return String::new();
        }
        let mut shown: Vec<&str> = self.keys.iter().take(SHOWN).map(String::as_str).collect();
        if self.keys.len() > SHOWN {
            shown.push("...");
        }
        format!(" (keys: {})", shown.join(", "))
    }
}
