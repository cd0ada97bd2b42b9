// SPDX-License-Identifier: MIT OR Apache-2.0
//! OAuth token management.
//!
//! The long-lived refresh token lives behind [`CredentialStore`]; access
//! tokens are cached in memory and renewed with a five-minute expiry skew.
//! The cache lock is held across the refresh call, which is exactly the
//! single-flight behaviour wanted under concurrent access.

use crate::api::BooksError;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

/// Renew this far before the reported expiry.
const EXPIRY_SKEW_MINUTES: i64 = 5;

/// Where the refresh token comes from.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// The current refresh token.
    async fn refresh_token(&self) -> Result<String, BooksError>;
}

/// Fixed credentials, for tests and simple deployments.
pub struct StaticCredentials {
    refresh_token: String,
}

impl StaticCredentials {
    /// Wrap a refresh token.
    pub fn new(refresh_token: impl Into<String>) -> Self {
        Self {
            refresh_token: refresh_token.into(),
        }
    }
}

#[async_trait]
impl CredentialStore for StaticCredentials {
    async fn refresh_token(&self) -> Result<String, BooksError> {
        Ok(self.refresh_token.clone())
    }
}

/// OAuth endpoint configuration.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Token endpoint URL.
    pub token_url: String,
    /// Client identifier.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// In-memory access-token cache with single-flight refresh.
pub struct TokenCache {
    config: OAuthConfig,
    credentials: Box<dyn CredentialStore>,
    client: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    /// Build a cache over the given endpoint and credential store.
    pub fn new(config: OAuthConfig, credentials: Box<dyn CredentialStore>) -> Self {
        Self {
            config,
            credentials,
            client: reqwest::Client::new(),
            cached: Mutex::new(None),
        }
    }

    /// A valid access token, refreshed when the cached one is near expiry.
    ///
    /// Concurrent callers coalesce on the cache lock: exactly one performs
    /// the refresh, the rest read its result.
    pub async fn access_token(&self) -> Result<String, BooksError> {
        let mut guard = self.cached.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > Utc::now() {
                return Ok(cached.token.clone());
            }
        }

        let refreshed = self.refresh().await?;
        let token = refreshed.token.clone();
        *guard = Some(refreshed);
        Ok(token)
    }

    /// Drop the cached token (after a 401) so the next call refreshes.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn refresh(&self) -> Result<CachedToken, BooksError> {
        let refresh_token = self.credentials.refresh_token().await?;
        debug!(token_url = %self.config.token_url, "refreshing access token");

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| BooksError::Auth {
                reason: format!("token request failed: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(BooksError::Auth {
                reason: format!("token endpoint returned {}", response.status()),
            });
        }

        let body: TokenResponse = response.json().await.map_err(|e| BooksError::Auth {
            reason: format!("token response decode failed: {e}"),
        })?;

        Ok(CachedToken {
            token: body.access_token,
            expires_at: Utc::now() + ChronoDuration::seconds(body.expires_in)
                - ChronoDuration::minutes(EXPIRY_SKEW_MINUTES),
        })
    }
}
