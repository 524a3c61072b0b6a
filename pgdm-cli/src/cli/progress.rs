//! Terminal progress for apply runs
//!
//! The applier emits events into an unbounded channel; a background task
//! drives a progress bar from them so the apply loop never waits on the
//! terminal.

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::sync::ProgressEvent;

const TEMPLATE: &str = "{prefix:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}";

pub struct ProgressPrinter {
    tx: UnboundedSender<ProgressEvent>,
    handle: JoinHandle<()>,
}

fn create_bar(label: String) -> ProgressBar {
    let pb = ProgressBar::new(0);
    match ProgressStyle::with_template(TEMPLATE) {
        Ok(style) => pb.set_style(style.progress_chars("=> ")),
        Err(e) => log::debug!("Invalid progress template: {}", e),
    }
    pb.set_prefix(label);
    pb
}

/// Apply events to `pb` until the channel closes
async fn drive(pb: ProgressBar, mut rx: UnboundedReceiver<ProgressEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::Start { total } => {
                pb.set_length(total as u64);
                pb.set_position(0);
            }
            ProgressEvent::Update {
                current,
                total,
                kind,
            } => {
                pb.set_length(total as u64);
                pb.set_position(current as u64);
                pb.set_message(kind.to_string());
            }
            ProgressEvent::End => pb.finish(),
        }
    }
}

impl ProgressPrinter {
    pub fn spawn(label: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(drive(create_bar(label.into()), rx));
        Self { tx, handle }
    }

    pub fn sink(&self) -> &UnboundedSender<ProgressEvent> {
        &self.tx
    }

    /// Wait until every event has been drawn
    pub async fn finish(self) {
        drop(self.tx);
        if let Err(e) = self.handle.await {
            log::debug!("Progress printer stopped: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{OperationKind, ProgressSink};

    #[tokio::test]
    async fn test_events_drive_the_bar() {
        let pb = ProgressBar::hidden();
        let (tx, rx) = mpsc::unbounded_channel();

        tx.emit(ProgressEvent::Start { total: 5 });
        tx.emit(ProgressEvent::Update {
            current: 3,
            total: 5,
            kind: OperationKind::Update,
        });
        tx.emit(ProgressEvent::End);
        drop(tx);

        drive(pb.clone(), rx).await;

        assert_eq!(pb.length(), Some(5));
        assert_eq!(pb.position(), 3);
        assert_eq!(pb.message(), "update");
        assert!(pb.is_finished());
    }
}
