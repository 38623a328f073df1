//! Bearer token management for the Taiga API.
//!
//! Taiga issues a short-lived auth token and a longer-lived refresh token on
//! login. The cache hands out the auth token while it is valid, refreshes it
//! when only the refresh token is still valid, and logs in again otherwise.
//! All of this happens under one async lock so concurrent callers that find
//! the token expired wait for a single refresh instead of each issuing one.

use std::fmt;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::error::TrackerError;
use crate::models::{AuthResponse, LoginRequest, RefreshRequest};

/// How long an auth token is trusted after it was issued.
pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// How long a refresh token is trusted after login.
pub const REFRESH_TOKEN_TTL: Duration = Duration::from_secs(8 * 24 * 60 * 60);

#[derive(Clone)]
pub(crate) struct Credential {
    pub(crate) access_token: String,
    pub(crate) access_expires_at: Instant,
    pub(crate) refresh_token: Option<String>,
    pub(crate) refresh_expires_at: Instant,
}

/// Process-wide token cache. Cheap to share behind an `Arc`.
pub struct CredentialCache {
    http: reqwest::Client,
    api_base: String,
    username: String,
    password: String,
    state: Mutex<Option<Credential>>,
}

impl fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCache")
            .field("api_base", &self.api_base)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl CredentialCache {
    pub fn new(
        http: reqwest::Client,
        api_base: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            username: username.into(),
            password: password.into(),
            state: Mutex::new(None),
        }
    }

    /// Get a valid auth token, refreshing or logging in if necessary.
    ///
    /// On failure the cached credential is left as it was, so the next call
    /// retries from the same point.
    pub async fn token(&self) -> Result<String, TrackerError> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let refresh_token = match state.as_ref() {
            Some(cred) if cred.access_expires_at > now => {
                return Ok(cred.access_token.clone());
            }
            Some(cred) if cred.refresh_expires_at > now => cred.refresh_token.clone(),
            _ => None,
        };

        if let Some(refresh_token) = refresh_token {
            let access_token = self.refresh(&refresh_token).await?;
            if let Some(cred) = state.as_mut() {
                cred.access_token = access_token.clone();
                cred.access_expires_at = Instant::now() + ACCESS_TOKEN_TTL;
            }
            return Ok(access_token);
        }

        let cred = self.login().await?;
        let access_token = cred.access_token.clone();
        *state = Some(cred);
        Ok(access_token)
    }

    async fn login(&self) -> Result<Credential, TrackerError> {
        debug!("logging in to Taiga as {}", self.username);
        let body = LoginRequest {
            kind: "normal",
            username: &self.username,
            password: &self.password,
        };
        let response = self.post_auth("auth", &body).await?;
        let issued_at = Instant::now();
        Ok(Credential {
            access_token: response.auth_token,
            access_expires_at: issued_at + ACCESS_TOKEN_TTL,
            refresh_token: response.refresh,
            refresh_expires_at: issued_at + REFRESH_TOKEN_TTL,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<String, TrackerError> {
        debug!("refreshing Taiga auth token");
        let body = RefreshRequest {
            refresh: refresh_token,
        };
        let response = self.post_auth("auth/refresh", &body).await?;
        Ok(response.auth_token)
    }

    async fn post_auth<B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<AuthResponse, TrackerError> {
        let url = format!("{}/{}", self.api_base, path);
        let response = self.http.post(url).json(body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Taiga {} request failed: {}", path, status);
            return Err(TrackerError::Auth(format!("HTTP {}: {}", status, body)));
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    #[cfg(test)]
    pub(crate) async fn seed(&self, credential: Credential) {
        *self.state.lock().await = Some(credential);
    }

    #[cfg(test)]
    pub(crate) async fn is_empty(&self) -> bool {
        self.state.lock().await.is_none()
    }
}
