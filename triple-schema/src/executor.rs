//! Phased execution of the generated SQL documents.
//!
//! Documents run in [`Phase`] order, each inside its own transaction. A
//! failing statement rolls its phase back and stops the run; later phases
//! are not attempted. Writes are never retried.

use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::error::{Result, SchemaError};
use crate::logging::{truncate_field, LogConfig};
use crate::sql::{Phase, SqlDocument, SqlDocuments};
use crate::store::CancelToken;
use crate::{log_sql, perf_debug};

/// Transactional SQL connection the documents are applied through.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn begin(&self) -> Result<()>;

    /// Executes one statement, returning the affected row count when known.
    async fn execute(&self, sql: &str) -> Result<u64>;

    async fn commit(&self) -> Result<()>;

    async fn rollback(&self) -> Result<()>;
}

/// Outcome of one committed phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub statements: usize,
    pub rows_affected: u64,
    pub duration_ms: u64,
}

/// Runs [`SqlDocuments`] phase by phase.
pub struct PhaseExecutor<'a> {
    executor: &'a dyn SqlExecutor,
    cancel: CancelToken,
    log_config: LogConfig,
}

impl<'a> PhaseExecutor<'a> {
    pub fn new(executor: &'a dyn SqlExecutor, cancel: CancelToken) -> Self {
        Self {
            executor,
            cancel,
            log_config: LogConfig::default(),
        }
    }

    pub fn with_log_config(mut self, log_config: LogConfig) -> Self {
        self.log_config = log_config;
        self
    }

    /// Runs every phase in order. Stops at the first failed or cancelled phase.
    #[instrument(skip_all, fields(statements = documents.total_statements()))]
    pub async fn run(&self, documents: &SqlDocuments) -> Result<Vec<PhaseReport>> {
        let mut reports = Vec::with_capacity(Phase::ALL.len());
        for document in documents.in_order() {
            reports.push(self.run_phase(document).await?);
        }
        info!(phases = reports.len(), "All phases committed");
        Ok(reports)
    }

    /// Runs one document in a transaction.
    #[instrument(skip_all, fields(phase = %document.phase, statements = document.len()))]
    pub async fn run_phase(&self, document: &SqlDocument) -> Result<PhaseReport> {
        let phase = document.phase;
        self.cancel.check(phase.as_str())?;
        let started = Instant::now();

        self.executor.begin().await?;
        let mut rows_affected = 0;
        for (index, statement) in document.statements.iter().enumerate() {
            if self.cancel.is_cancelled() {
                self.abort(phase).await;
                warn!(%phase, statement_index = index, "Phase cancelled, rolled back");
                return Err(SchemaError::Cancelled(format!(
                    "{phase} phase before statement {index}"
                )));
            }

            let sql = statement.to_string();
            log_sql!(
                self.log_config,
                statement_index = index,
                sql = %truncate_field(&sql, self.log_config.max_field_length),
                "Executing statement"
            );
            match self.executor.execute(&sql).await {
                Ok(rows) => {
                    rows_affected += rows;
                    perf_debug!(
                        self.log_config,
                        statement_index = index,
                        kind = statement.kind(),
                        table = %statement.target_table(),
                        rows,
                        "Statement done"
                    );
                }
                Err(err) => {
                    self.abort(phase).await;
                    error!(
                        %phase,
                        statement_index = index,
                        kind = statement.kind(),
                        table = %statement.target_table(),
                        error = %err,
                        "Statement failed, phase rolled back"
                    );
                    return Err(SchemaError::PhaseFailed {
                        phase: phase.to_string(),
                        statement_index: index,
                        message: err.to_string(),
                    });
                }
            }
        }

        if let Err(err) = self.executor.commit().await {
            self.abort(phase).await;
            return Err(SchemaError::PhaseFailed {
                phase: phase.to_string(),
                statement_index: document.len(),
                message: format!("commit failed: {err}"),
            });
        }

        let report = PhaseReport {
            phase,
            statements: document.len(),
            rows_affected,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            %phase,
            statements = report.statements,
            rows_affected,
            duration_ms = report.duration_ms,
            "Phase committed"
        );
        Ok(report)
    }

    async fn abort(&self, phase: Phase) {
        if let Err(err) = self.executor.rollback().await {
            error!(%phase, error = %err, "Rollback failed");
        }
    }
}

/// A call received by [`RecordingExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Begin,
    Execute(String),
    Commit,
    Rollback,
}

/// Dry-run executor that records every call.
///
/// Optionally fails the statement containing a given text, or cancels a
/// token after a number of statements.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<RecordedCall>>,
    fail_on: Option<String>,
    cancel_after: Option<(usize, CancelToken)>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every statement whose text contains `needle`.
    pub fn failing_on(mut self, needle: impl Into<String>) -> Self {
        self.fail_on = Some(needle.into());
        self
    }

    /// Cancels `token` once `statements` statements have executed.
    pub fn cancelling_after(mut self, statements: usize, token: CancelToken) -> Self {
        self.cancel_after = Some((statements, token));
        self
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    /// Statements that were executed, whether later committed or not.
    pub async fn executed(&self) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                RecordedCall::Execute(sql) => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl SqlExecutor for RecordingExecutor {
    async fn begin(&self) -> Result<()> {
        self.calls.lock().await.push(RecordedCall::Begin);
        Ok(())
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        if let Some(needle) = &self.fail_on {
            if sql.contains(needle.as_str()) {
                return Err(SchemaError::internal(format!(
                    "injected failure on statement containing '{needle}'"
                )));
            }
        }
        let mut calls = self.calls.lock().await;
        calls.push(RecordedCall::Execute(sql.to_string()));
        if let Some((after, token)) = &self.cancel_after {
            let executed = calls
                .iter()
                .filter(|call| matches!(call, RecordedCall::Execute(_)))
                .count();
            if executed >= *after {
                token.cancel();
            }
        }
        Ok(0)
    }

    async fn commit(&self) -> Result<()> {
        self.calls.lock().await.push(RecordedCall::Commit);
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.calls.lock().await.push(RecordedCall::Rollback);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{DropTable, Ident, Statement};

    fn drop_table(table: &str) -> Statement {
        Statement::DropTable(DropTable {
            name: Ident::new(table).unwrap(),
            cascade: true,
        })
    }

    fn documents() -> SqlDocuments {
        let mut docs = SqlDocuments::default();
        docs.schema.extend([drop_table("ct_a"), drop_table("ct_b")]);
        docs.population.push(drop_table("ct_c"));
        docs.indexes.push(drop_table("ct_d"));
        docs
    }

    #[tokio::test]
    async fn test_runs_phases_in_order() {
        let recorder = RecordingExecutor::new();
        let reports = PhaseExecutor::new(&recorder, CancelToken::new())
            .run(&documents())
            .await
            .unwrap();
        let phases: Vec<Phase> = reports.iter().map(|r| r.phase).collect();
        assert_eq!(phases, Phase::ALL.to_vec());
        assert_eq!(reports[0].statements, 2);
        assert_eq!(reports[2].statements, 0);

        let calls = recorder.calls().await;
        assert_eq!(calls.first(), Some(&RecordedCall::Begin));
        assert_eq!(calls.iter().filter(|c| **c == RecordedCall::Commit).count(), 4);
        assert!(!calls.contains(&RecordedCall::Rollback));
    }

    #[tokio::test]
    async fn test_failure_rolls_back_and_stops() {
        let recorder = RecordingExecutor::new().failing_on("ct_c");
        let err = PhaseExecutor::new(&recorder, CancelToken::new())
            .run(&documents())
            .await
            .unwrap_err();
        match err {
            SchemaError::PhaseFailed {
                phase,
                statement_index,
                ..
            } => {
                assert_eq!(phase, "population");
                assert_eq!(statement_index, 0);
            }
            other => panic!("unexpected error {other}"),
        }
        let calls = recorder.calls().await;
        assert_eq!(calls.last(), Some(&RecordedCall::Rollback));
        // Only the schema phase committed; indexes never started.
        assert_eq!(calls.iter().filter(|c| **c == RecordedCall::Commit).count(), 1);
        assert!(!recorder.executed().await.iter().any(|sql| sql.contains("ct_d")));
    }

    #[tokio::test]
    async fn test_cancellation_between_statements() {
        let token = CancelToken::new();
        let recorder = RecordingExecutor::new().cancelling_after(1, token.clone());
        let err = PhaseExecutor::new(&recorder, token)
            .run(&documents())
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaError::Cancelled(_)));
        assert_eq!(recorder.executed().await.len(), 1);
        assert_eq!(
            recorder.calls().await.last(),
            Some(&RecordedCall::Rollback)
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let token = CancelToken::new();
        token.cancel();
        let recorder = RecordingExecutor::new();
        let err = PhaseExecutor::new(&recorder, token)
            .run(&documents())
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaError::Cancelled(_)));
        assert!(recorder.calls().await.is_empty());
    }
}
