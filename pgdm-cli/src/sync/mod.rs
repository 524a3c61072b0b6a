//! Source synchronization core
//!
//! - [`diff`] - reconciliation of snapshots against stored rows
//! - [`plan`] - statement plans built from a diff or a whole snapshot
//! - [`apply`] - transactional execution of plans
//! - [`graph`] - foreign-key ordering for bulk imports
//! - [`service`] - the source operations built on top of them

pub mod apply;
pub mod diff;
pub mod graph;
pub mod plan;
pub mod progress;
pub mod registry;
pub mod row;
pub mod service;
pub mod value;

pub use apply::{ApplyMode, ApplyOptions, ApplyOutcome, TransactionalApplier};
pub use diff::{Conflict, DiffResult, ReconciliationEngine, UpdateAnalysis, UpdatePair, diff};
pub use graph::{DependencyGraph, DependencyNode};
pub use plan::{Statement, StatementOp, StatementPlan};
pub use progress::{NoProgress, OperationKind, ProgressEvent, ProgressSink};
pub use registry::{Source, like_pattern, source_name};
pub use row::{Row, Snapshot, tagged_header};
pub use service::{DeletePreview, SourceExport, SyncService};
pub use value::Value;
