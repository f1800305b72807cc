use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use gdrive_core::{ApiErrorClass, DriveClient, DriveError, DriveFile, INVENTORY_FIELDS};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::classify::ErrorCategory;

/// Failure reported by a [`RemoteStore`]. `category` is set when the
/// transport could tell what went wrong; otherwise classification falls back
/// to the message text.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StoreError {
    pub message: String,
    pub category: Option<ErrorCategory>,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            category: None,
        }
    }

    pub fn with_category(message: impl Into<String>, category: ErrorCategory) -> Self {
        Self {
            message: message.into(),
            category: Some(category),
        }
    }
}

impl From<DriveError> for StoreError {
    fn from(err: DriveError) -> Self {
        let category = err.classification().and_then(|class| match class {
            ApiErrorClass::Auth => Some(ErrorCategory::Authentication),
            ApiErrorClass::Quota => Some(ErrorCategory::Quota),
            ApiErrorClass::RateLimit => Some(ErrorCategory::RateLimit),
            ApiErrorClass::Network => Some(ErrorCategory::Network),
            ApiErrorClass::Transient => Some(ErrorCategory::Server),
            ApiErrorClass::Permanent => None,
        });
        Self {
            message: err.to_string(),
            category,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObjectRecord {
    pub name: String,
    pub id: String,
    pub created_time: Option<String>,
    pub size: Option<u64>,
}

impl From<DriveFile> for RemoteObjectRecord {
    fn from(file: DriveFile) -> Self {
        let size = file.size_bytes();
        Self {
            name: file.name,
            id: file.id,
            created_time: file.created_time,
            size,
        }
    }
}

/// The three calls the engine needs from the object store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// All non-trashed objects whose parent is `parent_id`.
    async fn list_objects(&self, parent_id: &str) -> Result<Vec<RemoteObjectRecord>, StoreError>;

    async fn create_object(
        &self,
        name: &str,
        parent_id: &str,
        content: Vec<u8>,
        mime_type: &str,
    ) -> Result<String, StoreError>;

    async fn query_exists(&self, parent_id: &str, name: &str) -> Result<bool, StoreError>;
}

#[async_trait]
impl<S: RemoteStore + ?Sized> RemoteStore for Arc<S> {
    async fn list_objects(&self, parent_id: &str) -> Result<Vec<RemoteObjectRecord>, StoreError> {
        (**self).list_objects(parent_id).await
    }

    async fn create_object(
        &self,
        name: &str,
        parent_id: &str,
        content: Vec<u8>,
        mime_type: &str,
    ) -> Result<String, StoreError> {
        (**self)
            .create_object(name, parent_id, content, mime_type)
            .await
    }

    async fn query_exists(&self, parent_id: &str, name: &str) -> Result<bool, StoreError> {
        (**self).query_exists(parent_id, name).await
    }
}

/// [`RemoteStore`] backed by the Drive REST API.
#[derive(Clone)]
pub struct DriveStore {
    client: DriveClient,
}

impl DriveStore {
    pub fn new(client: DriveClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteStore for DriveStore {
    async fn list_objects(&self, parent_id: &str) -> Result<Vec<RemoteObjectRecord>, StoreError> {
        let files = self
            .client
            .list_folder_all(parent_id, INVENTORY_FIELDS)
            .await?;
        Ok(files.into_iter().map(RemoteObjectRecord::from).collect())
    }

    async fn create_object(
        &self,
        name: &str,
        parent_id: &str,
        content: Vec<u8>,
        mime_type: &str,
    ) -> Result<String, StoreError> {
        let created = self
            .client
            .create_file(name, parent_id, content, mime_type)
            .await?;
        Ok(created.id)
    }

    async fn query_exists(&self, parent_id: &str, name: &str) -> Result<bool, StoreError> {
        Ok(self.client.find_by_name(parent_id, name).await?.is_some())
    }
}

#[derive(Debug, Error)]
#[error("remote folder scan failed: {0}")]
pub struct RemoteScanError(#[from] pub StoreError);

/// Snapshot of the destination folder keyed by object name.
#[derive(Debug, Clone, Default)]
pub struct RemoteInventory {
    by_name: HashMap<String, RemoteObjectRecord>,
}

impl RemoteInventory {
    /// On duplicate names the first record is kept.
    pub fn from_records(records: impl IntoIterator<Item = RemoteObjectRecord>) -> Self {
        let mut by_name = HashMap::new();
        for record in records {
            by_name.entry(record.name.clone()).or_insert(record);
        }
        Self { by_name }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&RemoteObjectRecord> {
        self.by_name.get(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

pub struct RemoteScanner<S> {
    store: S,
    folder_id: String,
}

impl<S: RemoteStore> RemoteScanner<S> {
    pub fn new(store: S, folder_id: impl Into<String>) -> Self {
        Self {
            store,
            folder_id: folder_id.into(),
        }
    }

    pub async fn scan(&self) -> Result<RemoteInventory, RemoteScanError> {
        let records = match self.store.list_objects(&self.folder_id).await {
            Ok(records) => records,
            Err(err) => {
                warn!(folder_id = %self.folder_id, error = %err, "remote folder scan failed");
                return Err(err.into());
            }
        };
        for record in &records {
            debug!(
                name = %record.name,
                id = %record.id,
                size_mb = format_args!("{:.2}", megabytes(record.size.unwrap_or(0))),
                "remote object"
            );
        }
        let listed = records.len();
        let inventory = RemoteInventory::from_records(records);
        info!(
            folder_id = %self.folder_id,
            listed,
            unique_names = inventory.len(),
            "remote folder scanned"
        );
        Ok(inventory)
    }
}

pub(crate) fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
