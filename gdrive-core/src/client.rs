use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";
const FOLDER_PAGE_SIZE: u32 = 1000;
const MULTIPART_BOUNDARY: &str = "shotsync-multipart-boundary";

/// Fields requested when listing a folder for reconciliation.
pub const INVENTORY_FIELDS: &[&str] = &["name", "id", "createdTime", "size"];

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("metadata encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    Quota,
    RateLimit,
    Network,
    Transient,
    Permanent,
}

#[derive(Clone)]
pub struct DriveClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl DriveClient {
    pub fn new(token: impl Into<String>) -> Result<Self, DriveError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, DriveError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token: token.into(),
        })
    }

    pub async fn get_about(&self) -> Result<About, DriveError> {
        let mut url = self.endpoint("/drive/v3/about")?;
        url.query_pairs_mut()
            .append_pair("fields", "user(displayName,emailAddress),storageQuota");
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn list_folder(
        &self,
        parent_id: &str,
        page_token: Option<&str>,
        fields: &[&str],
    ) -> Result<FileList, DriveError> {
        let mut url = self.endpoint("/drive/v3/files")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("q", &folder_query(parent_id));
            query.append_pair("pageSize", &FOLDER_PAGE_SIZE.to_string());
            query.append_pair("fields", &list_fields(fields));
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn list_folder_all(
        &self,
        parent_id: &str,
        fields: &[&str],
    ) -> Result<Vec<DriveFile>, DriveError> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .list_folder(parent_id, page_token.as_deref(), fields)
                .await?;
            files.extend(page.files);
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }
        Ok(files)
    }

    pub async fn find_by_name(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<Option<DriveFile>, DriveError> {
        let mut url = self.endpoint("/drive/v3/files")?;
        url.query_pairs_mut()
            .append_pair(
                "q",
                &format!(
                    "name = '{}' and {}",
                    escape_query_value(name),
                    folder_query(parent_id)
                ),
            )
            .append_pair("pageSize", "1")
            .append_pair("fields", "files(id,name)");
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let page: FileList = Self::handle_response(response).await?;
        Ok(page.files.into_iter().next())
    }

    pub async fn create_file(
        &self,
        name: &str,
        parent_id: &str,
        content: Vec<u8>,
        mime_type: &str,
    ) -> Result<DriveFile, DriveError> {
        let mut url = self.endpoint("/upload/drive/v3/files")?;
        url.query_pairs_mut()
            .append_pair("uploadType", "multipart")
            .append_pair("fields", "id,name");
        let metadata = NewFile {
            name,
            parents: [parent_id],
        };
        let body = multipart_related_body(&serde_json::to_vec(&metadata)?, &content, mime_type);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .header(
                "Content-Type",
                format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(body)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    fn endpoint(&self, path: &str) -> Result<Url, DriveError> {
        Ok(self.base_url.join(path)?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, DriveError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DriveError::Api { status, body })
        }
    }
}

impl DriveError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            DriveError::Api { status, body } => Some(classify_api_status(*status, body)),
            DriveError::Request(err) if err.is_timeout() || err.is_connect() => {
                Some(ApiErrorClass::Network)
            }
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            Some(ApiErrorClass::RateLimit | ApiErrorClass::Network | ApiErrorClass::Transient)
        )
    }
}

fn classify_api_status(status: StatusCode, body: &str) -> ApiErrorClass {
    if status == StatusCode::UNAUTHORIZED {
        ApiErrorClass::Auth
    } else if status == StatusCode::FORBIDDEN {
        // Drive reports quota and per-user throttling as 403 with a reason.
        if body.contains("storageQuotaExceeded") {
            ApiErrorClass::Quota
        } else if body.contains("rateLimitExceeded") || body.contains("userRateLimitExceeded") {
            ApiErrorClass::RateLimit
        } else {
            ApiErrorClass::Auth
        }
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

fn folder_query(parent_id: &str) -> String {
    format!(
        "'{}' in parents and trashed = false",
        escape_query_value(parent_id)
    )
}

fn list_fields(fields: &[&str]) -> String {
    let fields = if fields.is_empty() {
        INVENTORY_FIELDS
    } else {
        fields
    };
    format!("nextPageToken,files({})", fields.join(","))
}

fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn multipart_related_body(metadata: &[u8], content: &[u8], mime_type: &str) -> Vec<u8> {
    let mut body = Vec::with_capacity(metadata.len() + content.len() + 256);
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Type: {mime_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    body
}

#[derive(Debug, Serialize)]
struct NewFile<'a> {
    name: &'a str,
    parents: [&'a str; 1],
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created_time: Option<String>,
    /// Drive encodes int64 values as decimal strings.
    #[serde(default)]
    pub size: Option<String>,
}

impl DriveFile {
    pub fn size_bytes(&self) -> Option<u64> {
        self.size.as_deref().and_then(|raw| raw.parse().ok())
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct About {
    #[serde(default)]
    pub user: Option<DriveUser>,
    #[serde(default)]
    pub storage_quota: Option<StorageQuota>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveUser {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email_address: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageQuota {
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default)]
    pub usage: Option<String>,
}
