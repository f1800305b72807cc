use std::io;
use std::path::{Path, PathBuf};

use gdrive_core::OAuthToken;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sync::ledger::write_atomically_with;

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("failed to access token file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("token file {path} is not valid JSON: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthState {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl OAuthState {
    pub fn from_oauth_token(token: &OAuthToken) -> Self {
        Self {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: token
                .expires_in
                .map(|secs| now_unix().saturating_add(secs as i64)),
            scope: token.scope.clone(),
            token_type: Some(token.token_type.clone()),
        }
    }
}

/// OAuth state persisted as a JSON file in the state directory.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<OAuthState>, TokenStoreError> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(TokenStoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|source| TokenStoreError::Decode {
                path: self.path.clone(),
                source,
            })
    }

    pub fn save(&self, state: &OAuthState) -> Result<(), TokenStoreError> {
        let payload = serde_json::to_vec_pretty(state).map_err(|source| TokenStoreError::Decode {
            path: self.path.clone(),
            source,
        })?;
        write_atomically_with(&self.path, &payload, private_file())
            .map_err(|source| self.io_error(source))
    }

    /// Returns whether a token file was present.
    pub fn delete(&self) -> Result<bool, TokenStoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn io_error(&self, source: io::Error) -> TokenStoreError {
        TokenStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// The token file is readable by its owner only, from the moment it exists.
fn private_file() -> std::fs::OpenOptions {
    #[allow(unused_mut)]
    let mut options = std::fs::OpenOptions::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
}

pub(crate) fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_state() -> OAuthState {
        OAuthState {
            access_token: "ya29.token".into(),
            refresh_token: Some("1//refresh".into()),
            expires_at: Some(1_700_000_000),
            scope: Some(gdrive_core::DRIVE_SCOPE.into()),
            token_type: Some("Bearer".into()),
        }
    }

    #[test]
    fn missing_file_means_no_state() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        assert_eq!(store.load().unwrap(), None);
        assert!(!store.delete().unwrap());
    }

    #[test]
    fn saved_state_is_loaded_back() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("nested/token.json"));

        store.save(&sample_state()).unwrap();

        assert_eq!(store.load().unwrap(), Some(sample_state()));
        assert!(store.delete().unwrap());
        assert_eq!(store.load().unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn token_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        store.save(&sample_state()).unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn stale_readable_files_do_not_leak_the_new_token() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let target = dir.path().join("token.json");
        let leftover = dir.path().join("token.json.tmp");
        for path in [&target, &leftover] {
            std::fs::write(path, b"{}").unwrap();
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)).unwrap();
        }
        let store = TokenStore::new(&target);

        store.save(&sample_state()).unwrap();

        let mode = std::fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!leftover.exists());
        assert_eq!(store.load().unwrap(), Some(sample_state()));
    }

    #[test]
    fn garbage_file_is_a_decode_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, b"not json").unwrap();
        let err = TokenStore::new(path).load().unwrap_err();
        assert!(matches!(err, TokenStoreError::Decode { .. }));
    }

    #[test]
    fn state_from_token_computes_expiry() {
        let token = OAuthToken {
            access_token: "a".into(),
            token_type: "Bearer".into(),
            expires_in: Some(3599),
            refresh_token: None,
            scope: None,
        };
        let before = now_unix();
        let state = OAuthState::from_oauth_token(&token);
        let expires_at = state.expires_at.unwrap();
        assert!(expires_at >= before + 3599);
        assert!(expires_at <= now_unix() + 3599);
        assert_eq!(state.token_type.as_deref(), Some("Bearer"));
    }
}
