// Bearer-token acquisition for upstream accounts.
//
// The dispatcher only knows the TokenProvider seam; the production
// implementation refreshes through the Kiro desktop-auth endpoint and writes
// refreshed credentials back through the pool.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::auth::config::{kiro_refresh_url, TOKEN_REFRESH_THRESHOLD};
use crate::proxy::pool::{AccountPool, SelectedAccount};

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("refresh token is not set")]
    MissingRefreshToken,

    #[error("refresh response does not contain accessToken")]
    MissingAccessToken,

    #[error("refresh endpoint returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl TokenError {
    /// Persistent failures invalidate the account; transient ones do not.
    pub fn is_persistent(&self) -> bool {
        match self {
            TokenError::MissingRefreshToken => true,
            TokenError::Http { status, .. } => matches!(status, 400 | 401 | 403),
            _ => false,
        }
    }
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A bearer token valid for the selected account, refreshing if needed.
    async fn ensure_valid_token(&self, account: &SelectedAccount) -> Result<String, TokenError>;
}

/// Response from the Kiro Desktop Auth refresh endpoint.
#[derive(Debug, Clone, Deserialize)]
struct KiroRefreshResponse {
    #[serde(rename = "accessToken")]
    access_token: Option<String>,
    #[serde(rename = "refreshToken")]
    refresh_token: Option<String>,
    #[serde(rename = "expiresIn")]
    expires_in: Option<i64>,
    #[serde(rename = "profileArn")]
    profile_arn: Option<String>,
}

pub struct KiroTokenProvider {
    pool: Arc<AccountPool>,
    client: reqwest::Client,
    region: String,
    /// Per-account refresh lock, so only one refresh is in flight per account.
    refresh_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl KiroTokenProvider {
    pub fn new(pool: Arc<AccountPool>, client: reqwest::Client, region: String) -> Self {
        Self {
            pool,
            client,
            region,
            refresh_locks: DashMap::new(),
        }
    }

    async fn refresh(&self, account: &SelectedAccount) -> Result<String, TokenError> {
        let lock = self
            .refresh_locks
            .entry(account.id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Another request may have refreshed while we waited on the lock.
        let credentials = self
            .pool
            .credentials_of(&account.id)
            .unwrap_or_else(|| account.credentials.clone());
        if let Some(token) = fresh_access_token(&credentials) {
            return Ok(token);
        }

        let refresh_token = credentials
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or(TokenError::MissingRefreshToken)?;
        let region = credentials
            .region
            .clone()
            .unwrap_or_else(|| self.region.clone());

        let response = self
            .client
            .post(kiro_refresh_url(&region))
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TokenError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: KiroRefreshResponse = response.json().await?;
        let access_token = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(TokenError::MissingAccessToken)?;

        let mut updated = credentials;
        updated.access_token = Some(access_token.clone());
        updated.expires_at =
            Some(chrono::Utc::now().timestamp() + parsed.expires_in.unwrap_or(3600));
        if let Some(rt) = parsed.refresh_token {
            updated.refresh_token = Some(rt);
        }
        if parsed.profile_arn.is_some() {
            updated.profile_arn = parsed.profile_arn;
        }
        self.pool.update_credentials(&account.id, updated);

        info!("Refreshed token for account {}", account.id);
        Ok(access_token)
    }
}

#[async_trait]
impl TokenProvider for KiroTokenProvider {
    async fn ensure_valid_token(&self, account: &SelectedAccount) -> Result<String, TokenError> {
        if let Some(token) = fresh_access_token(&account.credentials) {
            return Ok(token);
        }
        self.refresh(account).await
    }
}

/// The stored access token, if it is still comfortably inside its lifetime.
fn fresh_access_token(credentials: &crate::models::AccountCredentials) -> Option<String> {
    let token = credentials.access_token.as_ref().filter(|t| !t.is_empty())?;
    let expires_at = credentials.expires_at?;
    if expires_at > chrono::Utc::now().timestamp() + TOKEN_REFRESH_THRESHOLD {
        Some(token.clone())
    } else {
        None
    }
}
