//! pgdm keeps PostgreSQL tables in sync with revision-tagged spreadsheet
//! snapshots.
//!
//! Every snapshot is registered as a named source bound to one table or view.
//! Exported files carry the source revision in their primary-key header, and
//! an edited export is reconciled against the stored rows before anything is
//! written.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod io;
pub mod sync;

pub use error::{DbError, StatementFailure, SyncError};
