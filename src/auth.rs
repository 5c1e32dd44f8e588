//! Authentication context for the ads API
//!
//! The context is constructed explicitly from config and passed to the
//! client; there is no hidden global authenticator instance. Bearer mode
//! returns the configured token as-is. OAuth mode exchanges the refresh
//! token for an access token and caches it until shortly before expiry.

use crate::config::{OAuthCredentials, TapConfig};
use crate::error::{SyncError, SyncResult};
use crate::types::SensitiveString;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

/// Seconds subtracted from the reported token lifetime before re-refreshing
const EXPIRY_SKEW_SECS: i64 = 60;

/// Credential material for the remote API
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Static bearer token
    Bearer { token: SensitiveString },
    /// OAuth refresh-token grant
    OAuth(OAuthCredentials),
}

#[derive(Debug)]
struct CachedToken {
    token: SensitiveString,
    expires_at: DateTime<Utc>,
}

/// Explicitly constructed, explicitly passed authentication context
pub struct AuthContext {
    credentials: Credentials,
    token_endpoint: String,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    1800
}

impl AuthContext {
    /// Build an auth context from config. OAuth credentials take precedence
    /// over a static token when both are present.
    pub fn from_config(config: &TapConfig, http: reqwest::Client) -> SyncResult<Self> {
        let credentials = if let Some(oauth) = &config.oauth_credentials {
            Credentials::OAuth(oauth.clone())
        } else if let Some(token) = &config.access_token {
            Credentials::Bearer {
                token: token.clone(),
            }
        } else {
            return Err(SyncError::Auth(
                "no access_token or oauth_credentials configured".to_string(),
            ));
        };

        Ok(Self {
            credentials,
            token_endpoint: config.token_endpoint.clone(),
            http,
            cached: Mutex::new(None),
        })
    }

    /// Create a bearer-only context (mainly for tests)
    pub fn bearer(token: impl Into<SensitiveString>) -> Self {
        Self {
            credentials: Credentials::Bearer {
                token: token.into(),
            },
            token_endpoint: String::new(),
            http: reqwest::Client::new(),
            cached: Mutex::new(None),
        }
    }

    /// Return a valid bearer token, refreshing via the token endpoint when
    /// the cached one is missing or about to expire.
    pub async fn bearer_token(&self) -> SyncResult<String> {
        match &self.credentials {
            Credentials::Bearer { token } => Ok(token.expose_secret().to_string()),
            Credentials::OAuth(oauth) => {
                let mut cached = self.cached.lock().await;
                if let Some(entry) = cached.as_ref() {
                    if entry.expires_at > Utc::now() {
                        return Ok(entry.token.expose_secret().to_string());
                    }
                }
                let (token, expires_at) = self.refresh(oauth).await?;
                let value = token.expose_secret().to_string();
                *cached = Some(CachedToken { token, expires_at });
                Ok(value)
            }
        }
    }

    async fn refresh(
        &self,
        oauth: &OAuthCredentials,
    ) -> SyncResult<(SensitiveString, DateTime<Utc>)> {
        debug!(endpoint = %self.token_endpoint, "refreshing access token");

        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", oauth.client_id.as_str()),
            ("client_secret", oauth.client_secret.expose_secret()),
            ("refresh_token", oauth.refresh_token.expose_secret()),
        ];

        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| SyncError::Auth(format!("token refresh request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Auth(format!(
                "token refresh returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Auth(format!("unparseable token response: {}", e)))?;

        let lifetime = Duration::seconds((token.expires_in - EXPIRY_SKEW_SECS).max(0));
        Ok((SensitiveString::new(token.access_token), Utc::now() + lifetime))
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("credentials", &self.credentials)
            .field("token_endpoint", &self.token_endpoint)
            .finish()
    }
}
