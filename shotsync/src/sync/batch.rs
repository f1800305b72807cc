use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use super::classify::ErrorCategory;
use super::ledger::Ledger;
use super::reconcile::UploadTask;
use super::remote::RemoteStore;
use super::report::now_rfc3339;
use super::retry::{RetryController, TaskOutcome};

pub const DEFAULT_PACING: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileOutcome {
    pub filename: String,
    pub success: bool,
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
}

impl FileOutcome {
    fn from_task(task: &UploadTask, outcome: TaskOutcome, elapsed: Duration) -> Self {
        let elapsed_ms = elapsed.as_millis() as u64;
        match outcome.result {
            Ok(done) => Self {
                filename: task.filename().to_string(),
                success: true,
                action: done.action(),
                category: None,
                error: None,
                attempts: outcome.attempts,
                elapsed_ms,
                remote_id: done.remote_id().map(str::to_string),
            },
            Err(failure) => Self {
                filename: task.filename().to_string(),
                success: false,
                action: "failed",
                category: Some(failure.category),
                error: Some(failure.message),
                attempts: outcome.attempts,
                elapsed_ms,
                remote_id: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Percent of tasks that succeeded; 100 for an empty batch.
    pub success_rate: f64,
    pub started_at: String,
    pub finished_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub outcomes: Vec<FileOutcome>,
    pub summary: BatchSummary,
}

impl ExecutionReport {
    fn new(outcomes: Vec<FileOutcome>, started_at: String) -> Self {
        let total = outcomes.len();
        let successful = outcomes.iter().filter(|o| o.success).count();
        let success_rate = if total == 0 {
            100.0
        } else {
            successful as f64 * 100.0 / total as f64
        };
        Self {
            outcomes,
            summary: BatchSummary {
                total,
                successful,
                failed: total - successful,
                success_rate,
                started_at,
                finished_at: now_rfc3339(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.summary.failed == 0
    }
}

/// Drives the task list one upload at a time.
pub struct BatchRunner<S> {
    controller: RetryController<S>,
    pacing: Duration,
}

impl<S: RemoteStore> BatchRunner<S> {
    pub fn new(controller: RetryController<S>) -> Self {
        Self {
            controller,
            pacing: DEFAULT_PACING,
        }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub async fn run(&self, tasks: Vec<UploadTask>, ledger: &mut Ledger) -> ExecutionReport {
        let started_at = now_rfc3339();
        let total = tasks.len();
        let mut outcomes = Vec::with_capacity(total);

        for (index, mut task) in tasks.into_iter().enumerate() {
            if index > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
            info!(
                filename = %task.filename(),
                position = index + 1,
                total,
                "processing file"
            );

            let started = Instant::now();
            let outcome = self.controller.execute_with_retry(&mut task, ledger).await;
            let file_outcome = FileOutcome::from_task(&task, outcome, started.elapsed());

            // Persist after every attempt so an interrupted batch resumes
            // at the next file.
            if let Err(err) = ledger.save() {
                warn!(path = %ledger.path().display(), error = %err, "failed to save ledger");
            }
            outcomes.push(file_outcome);
        }

        let report = ExecutionReport::new(outcomes, started_at);
        let summary = &report.summary;
        if report.is_success() {
            info!(
                total = summary.total,
                successful = summary.successful,
                failed = summary.failed,
                success_rate = summary.success_rate,
                "batch finished"
            );
        } else {
            warn!(
                total = summary.total,
                successful = summary.successful,
                failed = summary.failed,
                success_rate = summary.success_rate,
                "batch finished with failures"
            );
        }
        report
    }
}
