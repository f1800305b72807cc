mod client;
mod oauth;

pub use client::{
    About, ApiErrorClass, DriveClient, DriveError, DriveFile, DriveUser, FileList,
    INVENTORY_FIELDS, StorageQuota,
};
pub use oauth::{DRIVE_SCOPE, OAuthClient, OAuthError, OAuthToken};
pub use reqwest::StatusCode;
