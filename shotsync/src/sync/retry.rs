use tracing::{info, warn};

use super::backoff::Backoff;
use super::classify::ErrorCategory;
use super::executor::{UploadExecutor, UploadOutcome};
use super::ledger::Ledger;
use super::reconcile::UploadTask;
use super::remote::RemoteStore;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Result of a single attempt, already classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    Success(UploadOutcome),
    RetryableFailure {
        category: ErrorCategory,
        message: String,
    },
    FatalFailure {
        category: ErrorCategory,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub category: ErrorCategory,
    pub message: String,
    /// False when a non-retryable error ended the task early.
    pub exhausted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub attempts: u32,
    pub result: Result<UploadOutcome, TaskFailure>,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct RetryController<S> {
    executor: UploadExecutor<S>,
    max_attempts: u32,
    backoff: Backoff,
}

impl<S: RemoteStore> RetryController<S> {
    pub fn new(executor: UploadExecutor<S>) -> Self {
        Self {
            executor,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::standard(),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn attempt(&self, task: &UploadTask, ledger: &mut Ledger) -> AttemptResult {
        match self.executor.upload(task, ledger).await {
            Ok(outcome) => AttemptResult::Success(outcome),
            Err(err) => {
                let class = err.classification();
                let message = err.to_string();
                if class.retryable {
                    AttemptResult::RetryableFailure {
                        category: class.category,
                        message,
                    }
                } else {
                    AttemptResult::FatalFailure {
                        category: class.category,
                        message,
                    }
                }
            }
        }
    }

    /// Runs attempts until success, a fatal failure, or `max_attempts`
    /// retryable failures. Sleeps between retries only.
    pub async fn execute_with_retry(
        &self,
        task: &mut UploadTask,
        ledger: &mut Ledger,
    ) -> TaskOutcome {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            task.attempts = attempt;

            let (category, message) = match self.attempt(task, ledger).await {
                AttemptResult::Success(outcome) => {
                    return TaskOutcome {
                        attempts: attempt,
                        result: Ok(outcome),
                    };
                }
                AttemptResult::FatalFailure { category, message } => {
                    task.last_error = Some(category);
                    warn!(
                        filename = %task.filename(),
                        attempt,
                        %category,
                        error = %message,
                        "upload failed with a non-retryable error"
                    );
                    return TaskOutcome {
                        attempts: attempt,
                        result: Err(TaskFailure {
                            category,
                            message,
                            exhausted: false,
                        }),
                    };
                }
                AttemptResult::RetryableFailure { category, message } => (category, message),
            };

            task.last_error = Some(category);
            if attempt >= self.max_attempts {
                warn!(
                    filename = %task.filename(),
                    attempts = attempt,
                    %category,
                    error = %message,
                    "upload failed, retries exhausted"
                );
                return TaskOutcome {
                    attempts: attempt,
                    result: Err(TaskFailure {
                        category,
                        message,
                        exhausted: true,
                    }),
                };
            }

            let delay = self.backoff.delay(attempt - 1);
            info!(
                filename = %task.filename(),
                attempt,
                max_attempts = self.max_attempts,
                %category,
                error = %message,
                delay_ms = delay.as_millis() as u64,
                "upload failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
