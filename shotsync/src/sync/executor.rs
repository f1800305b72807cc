use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use super::classify::{Classification, ErrorCategory, classify};
use super::ledger::Ledger;
use super::reconcile::UploadTask;
use super::remote::{RemoteStore, StoreError};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("remote store error: {0}")]
    Store(#[from] StoreError),
    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl UploadError {
    pub fn classification(&self) -> Classification {
        match self {
            UploadError::Store(err) => classify(&err.message, err.category),
            UploadError::ReadFile { source, .. } if source.kind() == io::ErrorKind::NotFound => {
                ErrorCategory::FileSystem.into()
            }
            UploadError::ReadFile { .. } => classify(&self.to_string(), None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded { id: String },
    /// The remote folder already had an object with this name.
    AlreadyPresent,
    /// The ledger already covers this modification time.
    SkippedLedger,
}

impl UploadOutcome {
    pub fn action(&self) -> &'static str {
        match self {
            UploadOutcome::Uploaded { .. } => "uploaded",
            UploadOutcome::AlreadyPresent => "already_present",
            UploadOutcome::SkippedLedger => "skipped_ledger",
        }
    }

    pub fn remote_id(&self) -> Option<&str> {
        match self {
            UploadOutcome::Uploaded { id } => Some(id),
            _ => None,
        }
    }
}

/// Performs one upload attempt for a task.
pub struct UploadExecutor<S> {
    store: S,
    folder_id: String,
}

impl<S: RemoteStore> UploadExecutor<S> {
    pub fn new(store: S, folder_id: impl Into<String>) -> Self {
        Self {
            store,
            folder_id: folder_id.into(),
        }
    }

    /// Issues at most one remote write; the ledger is updated on every success.
    pub async fn upload(
        &self,
        task: &UploadTask,
        ledger: &mut Ledger,
    ) -> Result<UploadOutcome, UploadError> {
        let file = &task.file;

        if ledger.is_uploaded(&file.filename, file.modified) {
            debug!(filename = %file.filename, "ledger already covers this version");
            return Ok(UploadOutcome::SkippedLedger);
        }

        if self
            .store
            .query_exists(&self.folder_id, &file.filename)
            .await?
        {
            info!(filename = %file.filename, "already in remote folder, recording");
            ledger.record(&file.filename, file.modified);
            return Ok(UploadOutcome::AlreadyPresent);
        }

        let content = tokio::fs::read(&file.path)
            .await
            .map_err(|source| UploadError::ReadFile {
                path: file.path.clone(),
                source,
            })?;
        let id = self
            .store
            .create_object(
                &file.filename,
                &self.folder_id,
                content,
                mime_type_for(&file.path),
            )
            .await?;
        ledger.record(&file.filename, file.modified);
        info!(filename = %file.filename, id = %id, "uploaded");
        Ok(UploadOutcome::Uploaded { id })
    }
}

pub fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}
