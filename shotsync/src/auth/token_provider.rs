use std::time::Duration;

use gdrive_core::{OAuthClient, OAuthToken};
use thiserror::Error;
use tracing::debug;

use super::token_store::{OAuthState, now_unix};

/// Refresh this long before Google's stated expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum TokenProviderError {
    #[error("stored token expired and SHOTSYNC_CLIENT_ID / SHOTSYNC_CLIENT_SECRET are not set")]
    NoClientCredentials,
    #[error("stored token expired and carries no refresh token; sign in again")]
    NoRefreshToken,
    #[error("token refresh rejected: {0}")]
    Refresh(#[from] gdrive_core::OAuthError),
}

/// Hands out the access token of a stored sign-in, renewing it through the
/// refresh grant when it is about to expire or Drive rejects it.
pub struct TokenProvider {
    state: OAuthState,
    oauth_client: Option<OAuthClient>,
    margin: Duration,
}

impl TokenProvider {
    pub fn new(state: OAuthState, oauth_client: Option<OAuthClient>) -> Self {
        Self {
            state,
            oauth_client,
            margin: REFRESH_MARGIN,
        }
    }

    pub fn state(&self) -> &OAuthState {
        &self.state
    }

    /// The access token, renewed first when it expires within the margin.
    /// A state without an expiry is taken as valid.
    pub async fn valid_access_token(&mut self) -> Result<String, TokenProviderError> {
        if expires_within(&self.state, self.margin, now_unix()) {
            self.renew().await?;
        }
        Ok(self.state.access_token.clone())
    }

    /// Renews regardless of the recorded expiry.
    pub async fn refresh_now(&mut self) -> Result<String, TokenProviderError> {
        self.renew().await?;
        Ok(self.state.access_token.clone())
    }

    async fn renew(&mut self) -> Result<(), TokenProviderError> {
        let Some(refresh_token) = self.state.refresh_token.as_deref() else {
            return Err(TokenProviderError::NoRefreshToken);
        };
        let Some(client) = self.oauth_client.as_ref() else {
            return Err(TokenProviderError::NoClientCredentials);
        };
        debug!("renewing Google access token");
        let token = client.refresh_token(refresh_token, None).await?;
        merge_refreshed(&mut self.state, &token);
        Ok(())
    }
}

fn expires_within(state: &OAuthState, margin: Duration, now: i64) -> bool {
    state
        .expires_at
        .is_some_and(|at| at <= now.saturating_add(margin.as_secs() as i64))
}

/// Google omits the refresh token (and often the scope) from a refresh
/// response; the stored ones stay valid.
fn merge_refreshed(state: &mut OAuthState, token: &OAuthToken) {
    let fresh = OAuthState::from_oauth_token(token);
    state.access_token = fresh.access_token;
    state.expires_at = fresh.expires_at;
    if fresh.refresh_token.is_some() {
        state.refresh_token = fresh.refresh_token;
    }
    if fresh.scope.is_some() {
        state.scope = fresh.scope;
    }
    if fresh.token_type.is_some() {
        state.token_type = fresh.token_type;
    }
}
