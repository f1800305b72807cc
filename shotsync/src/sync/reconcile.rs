use tracing::{debug, info};

use super::classify::ErrorCategory;
use super::local::{LocalFileRecord, sort_oldest_first};
use super::remote::RemoteInventory;

/// One file that still has to reach the destination folder.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadTask {
    pub file: LocalFileRecord,
    pub attempts: u32,
    pub last_error: Option<ErrorCategory>,
}

impl UploadTask {
    pub fn new(file: LocalFileRecord) -> Self {
        Self {
            file,
            attempts: 0,
            last_error: None,
        }
    }

    pub fn filename(&self) -> &str {
        &self.file.filename
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub local: usize,
    pub remote: usize,
    pub missing: usize,
    pub missing_bytes: u64,
}

/// Local files whose name is absent remotely, oldest first.
///
/// Names present on both sides count as synchronized; nothing beyond
/// existence is compared.
pub fn diff(local: &[LocalFileRecord], remote: &RemoteInventory) -> Vec<UploadTask> {
    let mut missing: Vec<LocalFileRecord> = local
        .iter()
        .filter(|file| {
            let present = remote.contains(&file.filename);
            debug!(filename = %file.filename, present, "compared with remote folder");
            !present
        })
        .cloned()
        .collect();
    sort_oldest_first(&mut missing);
    missing.into_iter().map(UploadTask::new).collect()
}

pub fn summarize(
    local: &[LocalFileRecord],
    remote: &RemoteInventory,
    tasks: &[UploadTask],
) -> ReconcileSummary {
    let summary = ReconcileSummary {
        local: local.len(),
        remote: remote.len(),
        missing: tasks.len(),
        missing_bytes: tasks.iter().map(|t| t.file.size).sum(),
    };
    info!(
        local = summary.local,
        remote = summary.remote,
        missing = summary.missing,
        "reconciliation finished"
    );
    summary
}
