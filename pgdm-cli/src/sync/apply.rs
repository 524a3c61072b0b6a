//! Transactional execution of statement plans
//!
//! A plan is applied inside one transaction: either every statement commits
//! or none does. In [`ApplyMode::CollectAll`] each statement runs under its
//! own savepoint so later statements still execute after a failure and every
//! error is reported; the transaction is rolled back all the same.

use crate::config::ApplyConfig;
use crate::db::Session;
use crate::error::{DbError, Result, StatementFailure, SyncError};

use super::plan::StatementPlan;
use super::progress::{ProgressEvent, ProgressSink};

/// What to do after a statement fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplyMode {
    /// Stop at the first failure
    #[default]
    FailFast,
    /// Keep executing to collect every failure
    CollectAll,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    pub mode: ApplyMode,
}

impl From<&ApplyConfig> for ApplyOptions {
    fn from(config: &ApplyConfig) -> Self {
        Self {
            mode: if config.continue_on_error {
                ApplyMode::CollectAll
            } else {
                ApplyMode::FailFast
            },
        }
    }
}

/// Result of applying one plan
#[derive(Debug, Clone, Default)]
pub struct ApplyOutcome {
    pub committed: bool,
    /// Rows touched by successful statements
    pub rows_processed: usize,
    pub statements_executed: usize,
    pub errors: Vec<StatementFailure>,
}

impl ApplyOutcome {
    /// Turn a rolled-back outcome into an error
    pub fn ensure_committed(mut self, table: &str) -> Result<Self> {
        if self.committed {
            return Ok(self);
        }
        if self.errors.len() == 1 {
            if let Some(failure) = self.errors.pop() {
                return Err(SyncError::Statement(failure));
            }
        }
        Err(SyncError::ApplyFailed {
            table: table.to_string(),
            errors: self.errors,
        })
    }
}

/// Executes statement plans atomically
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionalApplier {
    options: ApplyOptions,
}

impl TransactionalApplier {
    pub fn new(options: ApplyOptions) -> Self {
        Self { options }
    }

    /// Apply `plan` in one transaction.
    ///
    /// Statement failures are returned in the outcome with the transaction
    /// rolled back. Connection failures roll back on a best-effort basis and
    /// are returned as [`SyncError::Database`].
    pub async fn apply<S: Session + ?Sized>(
        &self,
        db: &mut S,
        plan: &StatementPlan,
        progress: &dyn ProgressSink,
    ) -> Result<ApplyOutcome> {
        let total = plan.total_rows();
        progress.emit(ProgressEvent::Start { total });

        let result = self.run(db, plan, progress, total).await;

        progress.emit(ProgressEvent::End);
        result
    }

    async fn run<S: Session + ?Sized>(
        &self,
        db: &mut S,
        plan: &StatementPlan,
        progress: &dyn ProgressSink,
        total: usize,
    ) -> Result<ApplyOutcome> {
        log::info!(
            "Applying {} statement(s) for {} ({} row(s))",
            plan.len(),
            plan.source,
            total
        );
        db.begin().await?;

        let mut outcome = ApplyOutcome::default();

        for (index, statement) in plan.statements.iter().enumerate() {
            let executed = match self.options.mode {
                ApplyMode::FailFast => db.execute(statement).await,
                ApplyMode::CollectAll => {
                    let savepoint = format!("pgdm_statement_{}", index);
                    if let Err(error) = db.savepoint(&savepoint).await {
                        return Err(abort(db, error).await);
                    }
                    let executed = db.execute(statement).await;
                    let finished = match &executed {
                        Ok(_) => db.release_savepoint(&savepoint).await,
                        Err(error) if error.is_connection() => Ok(()),
                        Err(_) => db.rollback_to_savepoint(&savepoint).await,
                    };
                    if let Err(error) = finished {
                        return Err(abort(db, error).await);
                    }
                    executed
                }
            };

            match executed {
                Ok(affected) => {
                    log::debug!(
                        "Statement {}/{} on {} affected {} row(s)",
                        index + 1,
                        plan.len(),
                        statement.table,
                        affected
                    );
                    outcome.statements_executed += 1;
                    if let (true, Some(kind)) = (statement.touches_rows(), statement.kind()) {
                        outcome.rows_processed += statement.row_count;
                        progress.emit(ProgressEvent::Update {
                            current: outcome.rows_processed,
                            total,
                            kind,
                        });
                    }
                }
                Err(error) if error.is_connection() => {
                    return Err(abort(db, error).await);
                }
                Err(error) => {
                    let failure = statement.failure(error);
                    log::warn!("{}", failure);
                    outcome.errors.push(failure);
                    if self.options.mode == ApplyMode::FailFast {
                        break;
                    }
                }
            }
        }

        if outcome.errors.is_empty() {
            db.commit().await?;
            outcome.committed = true;
            log::info!(
                "Committed {}: {} row(s) in {} statement(s)",
                plan.source,
                outcome.rows_processed,
                outcome.statements_executed
            );
        } else {
            db.rollback().await?;
            log::error!(
                "Rolled back {}: {} statement(s) failed",
                plan.source,
                outcome.errors.len()
            );
        }

        Ok(outcome)
    }
}

/// Best-effort rollback after a connection failure
async fn abort<S: Session + ?Sized>(db: &mut S, error: DbError) -> SyncError {
    if let Err(rollback_error) = db.rollback().await {
        log::warn!("Rollback after connection failure also failed: {}", rollback_error);
    }
    SyncError::Database(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryDatabase;
    use crate::sync::plan::{build_insert_plan, insert_statements};
    use crate::sync::{OperationKind, Row, Source};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<ProgressEvent>>,
    }

    impl ProgressSink for Recorder {
        fn emit(&self, event: ProgressEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl Recorder {
        fn events(&self) -> Vec<ProgressEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    fn rows(names: &[&str]) -> Vec<Row> {
        names.iter().map(|n| Row::from_pairs([("name", *n)])).collect()
    }

    fn database() -> MemoryDatabase {
        let mut db = MemoryDatabase::new();
        db.create_table("plant", "id", &["id", "name"]);
        db
    }

    #[tokio::test]
    async fn test_commit_and_progress() {
        let mut db = database();
        let source = Source::new("plants", "plant", 0);
        let plan = build_insert_plan(&source, Some("id"), &rows(&["a", "b", "c"]), true, 2);
        let recorder = Recorder::default();

        let outcome = TransactionalApplier::default()
            .apply(&mut db, &plan, &recorder)
            .await
            .unwrap();

        assert!(outcome.committed);
        assert_eq!(outcome.rows_processed, 3);
        assert_eq!(outcome.statements_executed, 4);
        assert_eq!(db.rows("plant").len(), 3);
        assert_eq!(db.source("plants").map(|s| s.revision), Some(1));

        assert_eq!(
            recorder.events(),
            vec![
                ProgressEvent::Start { total: 3 },
                ProgressEvent::Update {
                    current: 2,
                    total: 3,
                    kind: OperationKind::Insert
                },
                ProgressEvent::Update {
                    current: 3,
                    total: 3,
                    kind: OperationKind::Insert
                },
                ProgressEvent::End,
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_rolls_back_everything() {
        let mut db = database();
        db.fail_on_value("boom");
        let source = Source::new("plants", "plant", 0);
        let plan = build_insert_plan(&source, Some("id"), &rows(&["a", "b", "boom", "d"]), false, 1);
        let recorder = Recorder::default();

        let outcome = TransactionalApplier::default()
            .apply(&mut db, &plan, &recorder)
            .await
            .unwrap();

        assert!(!outcome.committed);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].first_row, 2);
        assert!(db.rows("plant").is_empty());
        assert!(db.source("plants").is_none());
        assert_eq!(recorder.events().last(), Some(&ProgressEvent::End));

        assert!(matches!(
            outcome.ensure_committed("plant"),
            Err(SyncError::Statement(failure)) if failure.operation == Some(OperationKind::Insert)
        ));
    }

    #[tokio::test]
    async fn test_collect_all_reports_every_failure_and_still_rolls_back() {
        let mut db = database();
        db.fail_on_value("boom");
        let source = Source::new("plants", "plant", 0);
        let plan = build_insert_plan(
            &source,
            Some("id"),
            &rows(&["boom", "ok", "boom"]),
            false,
            1,
        );

        let outcome = TransactionalApplier::new(ApplyOptions {
            mode: ApplyMode::CollectAll,
        })
        .apply(&mut db, &plan, &crate::sync::NoProgress)
        .await
        .unwrap();

        assert!(!outcome.committed);
        assert_eq!(outcome.errors.len(), 2);
        assert_eq!(outcome.statements_executed, 2);
        assert!(db.rows("plant").is_empty());
        assert!(db.source("plants").is_none());

        assert!(matches!(
            outcome.ensure_committed("plant"),
            Err(SyncError::ApplyFailed { errors, .. }) if errors.len() == 2
        ));
    }

    #[tokio::test]
    async fn test_connection_failure_is_an_error() {
        let mut db = database();
        db.disconnect_after(1);
        let mut plan = StatementPlan::new("plants");
        plan.extend(insert_statements("plant", "plants", &rows(&["a", "b"]), None, 1));

        let result = TransactionalApplier::default()
            .apply(&mut db, &plan, &crate::sync::NoProgress)
            .await;

        assert!(matches!(result, Err(SyncError::Database(e)) if e.is_connection()));
        assert!(db.rows("plant").is_empty());
    }

    #[test]
    fn test_options_from_config() {
        let config = ApplyConfig {
            batch_size: 10,
            continue_on_error: true,
        };
        assert_eq!(ApplyOptions::from(&config).mode, ApplyMode::CollectAll);
        assert_eq!(
            ApplyOptions::from(&ApplyConfig::default()).mode,
            ApplyMode::FailFast
        );
    }
}
