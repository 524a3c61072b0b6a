//! Progress notifications emitted while a statement plan is applied

use tokio::sync::mpsc::UnboundedSender;

/// Kind of row operation a statement performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Insert => write!(f, "insert"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Delete => write!(f, "delete"),
        }
    }
}

/// Event emitted by the applier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    Start {
        total: usize,
    },
    /// Sent after every statement that touched rows, in completion order
    Update {
        current: usize,
        total: usize,
        kind: OperationKind,
    },
    End,
}

/// Receiver of progress events.
///
/// Called synchronously from the apply loop, so implementations must return
/// immediately and must never fail the apply.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Sink that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Forward events over an unbounded channel; a closed receiver is ignored.
impl ProgressSink for UnboundedSender<ProgressEvent> {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.send(event);
    }
}
