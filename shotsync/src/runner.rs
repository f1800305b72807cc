use std::io;

use thiserror::Error;
use tracing::{info, warn};

use crate::auth::{self, AuthError};
use crate::config::SyncConfig;
use crate::preview;
use crate::sync::backoff::Backoff;
use crate::sync::batch::{BatchRunner, ExecutionReport};
use crate::sync::executor::UploadExecutor;
use crate::sync::ledger::Ledger;
use crate::sync::local::{LocalScanError, LocalScanner};
use crate::sync::reconcile::{self, ReconcileSummary};
use crate::sync::remote::{DriveStore, RemoteScanError, RemoteScanner, RemoteStore};
use crate::sync::report::{ReportLog, RunLog, RunRecord, RunStatus};
use crate::sync::retry::RetryController;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),
    #[error("listing the destination folder failed: {0}")]
    RemoteScan(#[from] RemoteScanError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Auto,
    Interactive { assume_yes: bool },
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Auto => "auto",
            RunMode::Interactive { .. } => "interactive",
        }
    }
}

/// Asks the user whether the previewed uploads should go ahead.
pub trait Prompt: Send + Sync {
    fn confirm(&self, preview: &str) -> io::Result<bool>;
}

pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn confirm(&self, preview: &str) -> io::Result<bool> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        io::Write::write_all(&mut out, preview.as_bytes())?;
        preview::confirm(io::stdin().lock(), out)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub mode: RunMode,
    pub status: RunStatus,
    pub reconcile: ReconcileSummary,
    pub report: Option<ExecutionReport>,
}

impl RunSummary {
    pub fn files(&self) -> usize {
        self.report.as_ref().map_or(0, |r| r.summary.total)
    }

    pub fn is_success(&self) -> bool {
        self.status != RunStatus::PartialFailure
    }
}

/// Resolves credentials and builds the Drive-backed store. A failure is
/// recorded in the run log before it is returned.
pub async fn connect(config: &SyncConfig, mode: RunMode) -> Result<DriveStore, RunError> {
    let attempt = async {
        let token = auth::resolve_access_token(config).await?;
        auth::build_drive_client(config.api_base_url.as_deref(), &token)
            .map_err(AuthError::Probe)
    };
    match attempt.await {
        Ok(client) => Ok(DriveStore::new(client)),
        Err(err) => {
            let err = RunError::from(err);
            record_failure(&RunLog::new(config.run_log_path()), mode, &err);
            Err(err)
        }
    }
}

pub struct Runner<S> {
    config: SyncConfig,
    store: S,
    backoff: Backoff,
    prompt: Box<dyn Prompt>,
    run_log: RunLog,
    report_log: ReportLog,
}

impl<S: RemoteStore + Clone> Runner<S> {
    pub fn new(config: SyncConfig, store: S) -> Self {
        let run_log = RunLog::new(config.run_log_path());
        let report_log = ReportLog::new(config.report_path());
        Self {
            config,
            store,
            backoff: Backoff::standard(),
            prompt: Box::new(TerminalPrompt),
            run_log,
            report_log,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_prompt(mut self, prompt: impl Prompt + 'static) -> Self {
        self.prompt = Box::new(prompt);
        self
    }

    pub async fn run(&self, mode: RunMode) -> Result<RunSummary, RunError> {
        match self.run_inner(mode).await {
            Ok(summary) => {
                self.run_log.append(RunRecord {
                    mode: mode.as_str().to_string(),
                    status: summary.status,
                    files: summary.files(),
                    error: None,
                });
                Ok(summary)
            }
            Err(err) => {
                record_failure(&self.run_log, mode, &err);
                Err(err)
            }
        }
    }

    async fn run_inner(&self, mode: RunMode) -> Result<RunSummary, RunError> {
        info!(
            mode = mode.as_str(),
            local_dir = %self.config.local_dir.display(),
            folder_id = %self.config.folder_id,
            "starting run"
        );

        let remote = RemoteScanner::new(self.store.clone(), self.config.folder_id.clone())
            .scan()
            .await?;

        let scanner = LocalScanner::new(self.config.extension.clone());
        let local = match scanner.scan(&self.config.local_dir) {
            Ok(local) => local,
            Err(LocalScanError::MissingDirectory(dir)) => {
                warn!(dir = %dir.display(), "local directory does not exist");
                Vec::new()
            }
            Err(err) => {
                warn!(error = %err, "local directory could not be read");
                Vec::new()
            }
        };

        let tasks = reconcile::diff(&local, &remote);
        let summary = reconcile::summarize(&local, &remote, &tasks);
        let finished = |status| RunSummary {
            mode,
            status,
            reconcile: summary,
            report: None,
        };

        if local.is_empty() {
            info!(extension = %scanner.extension(), "no local files to upload");
            return Ok(finished(RunStatus::NothingToDo));
        }
        if tasks.is_empty() {
            info!("every local file is already in the destination folder");
            return Ok(finished(RunStatus::NothingToDo));
        }

        if let RunMode::Interactive { assume_yes } = mode {
            let text = preview::render_preview(&tasks, &summary, &self.config.folder_id);
            let approved = if assume_yes {
                print!("{text}");
                true
            } else {
                self.prompt.confirm(&text).unwrap_or_else(|err| {
                    warn!(error = %err, "could not read confirmation");
                    false
                })
            };
            if !approved {
                info!("upload cancelled by user");
                return Ok(finished(RunStatus::Cancelled));
            }
        }

        let mut ledger = Ledger::load(self.config.ledger_path());
        let executor = UploadExecutor::new(self.store.clone(), self.config.folder_id.clone());
        let controller = RetryController::new(executor)
            .with_max_attempts(self.config.max_attempts)
            .with_backoff(self.backoff.clone());
        let report = BatchRunner::new(controller)
            .with_pacing(self.config.pacing)
            .run(tasks, &mut ledger)
            .await;
        self.report_log.append(&report);

        let status = if report.is_success() {
            RunStatus::Success
        } else {
            RunStatus::PartialFailure
        };
        Ok(RunSummary {
            mode,
            status,
            reconcile: summary,
            report: Some(report),
        })
    }
}

fn record_failure(run_log: &RunLog, mode: RunMode, err: &RunError) {
    warn!(mode = mode.as_str(), error = %err, "run failed");
    run_log.append(RunRecord {
        mode: mode.as_str().to_string(),
        status: RunStatus::Failed,
        files: 0,
        error: Some(err.to_string()),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::remote::StoreError;
    use crate::sync::test_support::FakeStore;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};

    struct FixedPrompt {
        answer: bool,
        shown: Arc<AtomicUsize>,
    }

    impl Prompt for FixedPrompt {
        fn confirm(&self, preview: &str) -> io::Result<bool> {
            assert!(preview.contains("Destination folder: folder"));
            self.shown.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer)
        }
    }

    fn config(root: &Path) -> SyncConfig {
        SyncConfig {
            local_dir: root.join("shots"),
            folder_id: "folder".into(),
            extension: "jpg".into(),
            state_dir: root.join("state"),
            max_attempts: 3,
            pacing: Duration::ZERO,
            access_token: None,
            client_id: None,
            client_secret: None,
            oauth_timeout: Duration::from_secs(1),
            api_base_url: None,
            oauth_base_url: None,
        }
    }

    fn setup(files: &[&str]) -> (TempDir, SyncConfig) {
        let root = tempdir().unwrap();
        let config = config(root.path());
        std::fs::create_dir_all(&config.local_dir).unwrap();
        for name in files {
            std::fs::write(config.local_dir.join(name), name.as_bytes()).unwrap();
        }
        (root, config)
    }

    fn runner(config: &SyncConfig, store: &FakeStore) -> Runner<FakeStore> {
        Runner::new(config.clone(), store.clone()).with_backoff(Backoff::none())
    }

    fn run_log(config: &SyncConfig) -> String {
        std::fs::read_to_string(config.run_log_path()).unwrap()
    }

    #[tokio::test]
    async fn auto_run_uploads_and_writes_both_sinks() {
        let (_root, config) = setup(&["a.jpg", "b.jpg", "notes.txt"]);
        let store = FakeStore::default().with_existing("a.jpg");

        let summary = runner(&config, &store).run(RunMode::Auto).await.unwrap();

        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(summary.files(), 1);
        assert_eq!(summary.reconcile.local, 2);
        assert_eq!(store.create_calls(), 1);
        assert!(run_log(&config).contains("\tmode=auto\tstatus=success\tfiles=1"));
        let report = std::fs::read_to_string(config.report_path()).unwrap();
        assert_eq!(report.lines().count(), 1);
        assert!(Ledger::load(config.ledger_path()).get("b.jpg").is_some());
    }

    #[tokio::test]
    async fn missing_local_directory_is_nothing_to_do() {
        let root = tempdir().unwrap();
        let config = config(root.path());
        let store = FakeStore::default();

        let summary = runner(&config, &store).run(RunMode::Auto).await.unwrap();

        assert_eq!(summary.status, RunStatus::NothingToDo);
        assert_eq!(summary.files(), 0);
        assert!(run_log(&config).contains("status=nothing_to_do\tfiles=0"));
        assert!(!config.report_path().exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dangling_local_entry_does_not_fail_the_run() {
        let (_root, config) = setup(&["a.jpg"]);
        std::os::unix::fs::symlink(
            config.local_dir.join("vanished.jpg"),
            config.local_dir.join("b.jpg"),
        )
        .unwrap();
        let store = FakeStore::default();

        let summary = runner(&config, &store).run(RunMode::Auto).await.unwrap();

        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(summary.reconcile.local, 1);
        assert_eq!(store.create_calls(), 1);
        assert!(run_log(&config).contains("status=success\tfiles=1"));
    }

    #[tokio::test]
    async fn nothing_missing_completes_without_uploads() {
        let (_root, config) = setup(&["a.jpg"]);
        let store = FakeStore::default().with_existing("a.jpg");

        let summary = runner(&config, &store).run(RunMode::Auto).await.unwrap();

        assert_eq!(summary.status, RunStatus::NothingToDo);
        assert_eq!(store.create_calls(), 0);
        assert_eq!(store.exists_calls(), 0);
    }

    #[tokio::test]
    async fn remote_scan_failure_is_fatal_and_logged() {
        let (_root, config) = setup(&["a.jpg"]);
        let store = FakeStore::default().with_list_error(StoreError::new("connection refused"));

        let err = runner(&config, &store)
            .run(RunMode::Auto)
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::RemoteScan(_)));
        assert_eq!(store.create_calls(), 0);
        let log = run_log(&config);
        assert!(log.contains("status=failed\tfiles=0\terror="));
        assert!(log.contains("connection refused"));
    }

    #[tokio::test]
    async fn declined_preview_uploads_nothing() {
        let (_root, config) = setup(&["a.jpg"]);
        let store = FakeStore::default();
        let shown = Arc::new(AtomicUsize::new(0));

        let summary = runner(&config, &store)
            .with_prompt(FixedPrompt {
                answer: false,
                shown: shown.clone(),
            })
            .run(RunMode::Interactive { assume_yes: false })
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::Cancelled);
        assert_eq!(shown.load(Ordering::SeqCst), 1);
        assert_eq!(store.create_calls(), 0);
        assert!(run_log(&config).contains("mode=interactive\tstatus=cancelled"));
    }

    #[tokio::test]
    async fn approved_preview_runs_the_batch() {
        let (_root, config) = setup(&["a.jpg", "b.jpg"]);
        let store = FakeStore::default();
        let shown = Arc::new(AtomicUsize::new(0));

        let summary = runner(&config, &store)
            .with_prompt(FixedPrompt {
                answer: true,
                shown: shown.clone(),
            })
            .run(RunMode::Interactive { assume_yes: false })
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(store.create_calls(), 2);
    }

    #[tokio::test]
    async fn assume_yes_skips_the_prompt() {
        let (_root, config) = setup(&["a.jpg"]);
        let store = FakeStore::default();
        let shown = Arc::new(AtomicUsize::new(0));

        runner(&config, &store)
            .with_prompt(FixedPrompt {
                answer: false,
                shown: shown.clone(),
            })
            .run(RunMode::Interactive { assume_yes: true })
            .await
            .unwrap();

        assert_eq!(shown.load(Ordering::SeqCst), 0);
        assert_eq!(store.create_calls(), 1);
    }

    #[tokio::test]
    async fn failed_uploads_make_a_partial_failure() {
        let (_root, config) = setup(&["a.jpg"]);
        let store = FakeStore::default().always_failing_creates(StoreError::with_category(
            "storage quota",
            crate::sync::classify::ErrorCategory::Quota,
        ));

        let summary = runner(&config, &store).run(RunMode::Auto).await.unwrap();

        assert_eq!(summary.status, RunStatus::PartialFailure);
        assert!(!summary.is_success());
        assert_eq!(store.create_calls(), 1);
        assert!(run_log(&config).contains("status=partial_failure\tfiles=1"));
    }

    #[tokio::test]
    async fn connect_failure_is_recorded_as_authentication_error() {
        let root = tempdir().unwrap();
        let config = config(root.path());

        let Err(err) = connect(&config, RunMode::Auto).await else {
            panic!("connect should fail without credentials");
        };

        assert!(matches!(
            err,
            RunError::Authentication(AuthError::MissingClientCredentials)
        ));
        assert!(run_log(&config).contains("status=failed"));
    }
}
