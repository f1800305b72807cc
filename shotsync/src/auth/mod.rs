mod oauth_flow;
mod token_provider;
mod token_store;

pub use oauth_flow::{OAuthFlow, OAuthFlowError};
pub use token_provider::{TokenProvider, TokenProviderError};
pub use token_store::{OAuthState, TokenStore, TokenStoreError};

use gdrive_core::{About, ApiErrorClass, DriveClient, DriveError, OAuthClient};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::SyncConfig;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no stored token and SHOTSYNC_CLIENT_ID / SHOTSYNC_CLIENT_SECRET are not set")]
    MissingClientCredentials,
    #[error(transparent)]
    Store(#[from] TokenStoreError),
    #[error(transparent)]
    Provider(#[from] TokenProviderError),
    #[error("sign-in failed: {0}")]
    Flow(#[from] OAuthFlowError),
    #[error("invalid oauth configuration: {0}")]
    Config(#[from] gdrive_core::OAuthError),
    #[error("token check against Drive failed: {0}")]
    Probe(#[from] DriveError),
}

/// Produces a usable access token for this run.
///
/// `SHOTSYNC_TOKEN` wins outright. Otherwise the stored state is used
/// (refreshed when close to expiry), and without one the browser sign-in
/// runs. The token is checked against the `about` endpoint, refreshing once
/// on an authentication failure, and the resulting state is saved.
pub async fn resolve_access_token(config: &SyncConfig) -> Result<String, AuthError> {
    if let Some(token) = &config.access_token {
        debug!("using access token from environment");
        return Ok(token.clone());
    }

    let store = TokenStore::new(config.token_path());
    let oauth_client = oauth_client_for(config)?;
    let state = match store.load()? {
        Some(state) => state,
        None => {
            let client = oauth_client
                .clone()
                .ok_or(AuthError::MissingClientCredentials)?;
            let token = OAuthFlow::new(client, config.oauth_timeout)
                .authenticate()
                .await?;
            let state = OAuthState::from_oauth_token(&token);
            store.save(&state)?;
            state
        }
    };

    let mut provider = TokenProvider::new(state, oauth_client);
    let about = fetch_about_with_refresh(&mut provider, config.api_base_url.as_deref()).await?;
    if let Some(user) = about.user.as_ref() {
        info!(
            user = user.email_address.as_deref().unwrap_or("unknown"),
            "authenticated with Google Drive"
        );
    }
    store.save(provider.state())?;
    Ok(provider.state().access_token.clone())
}

/// Removes the stored token; returns whether one existed.
pub fn logout(token_path: impl Into<std::path::PathBuf>) -> Result<bool, TokenStoreError> {
    TokenStore::new(token_path).delete()
}

pub fn build_drive_client(base_url: Option<&str>, token: &str) -> Result<DriveClient, DriveError> {
    match base_url {
        Some(url) => DriveClient::with_base_url(url, token),
        None => DriveClient::new(token),
    }
}

fn oauth_client_for(config: &SyncConfig) -> Result<Option<OAuthClient>, AuthError> {
    let (Some(client_id), Some(client_secret)) = (&config.client_id, &config.client_secret) else {
        return Ok(None);
    };
    let client = match config.oauth_base_url.as_deref() {
        Some(url) => OAuthClient::with_base_url(url, client_id, client_secret)?,
        None => OAuthClient::new(client_id, client_secret)?,
    };
    Ok(Some(client))
}

async fn fetch_about_with_refresh(
    provider: &mut TokenProvider,
    base_url: Option<&str>,
) -> Result<About, AuthError> {
    let token = provider.valid_access_token().await?;
    let client = build_drive_client(base_url, &token)?;
    match client.get_about().await {
        Ok(about) => Ok(about),
        Err(err) if matches!(err.classification(), Some(ApiErrorClass::Auth)) => {
            debug!(error = %err, "access token rejected, refreshing");
            let refreshed = provider.refresh_now().await?;
            let retry_client = build_drive_client(base_url, &refreshed)?;
            Ok(retry_client.get_about().await?)
        }
        Err(err) => Err(err.into()),
    }
}
