// Usage-limit probe against the Kiro subscription surface.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::auth::config::kiro_q_host;
use crate::auth::TokenProvider;
use crate::models::{AccountStatus, AccountUsage};
use crate::proxy::pool::{AccountPool, SelectedAccount};

/// How often account usage snapshots are refreshed.
pub const USAGE_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageLimitsResponse {
    #[serde(default)]
    usage_limit: f64,
    #[serde(default)]
    current_usage: f64,
    #[serde(default)]
    user_email: Option<String>,
    #[serde(default)]
    subscription_type: Option<String>,
    #[serde(default)]
    next_reset: Option<String>,
}

/// Query the account's usage limits with a valid bearer token.
pub async fn check_usage_limits(
    client: &reqwest::Client,
    token: &str,
    region: &str,
) -> Result<AccountUsage, String> {
    let url = format!("{}/getUsageLimits", kiro_q_host(region));
    let response = client
        .get(&url)
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| format!("usage probe failed: {e}"))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(format!("usage probe returned {status}: {body}"));
    }

    let parsed: UsageLimitsResponse = response
        .json()
        .await
        .map_err(|e| format!("usage probe returned malformed body: {e}"))?;

    Ok(AccountUsage {
        usage_limit: parsed.usage_limit,
        current_usage: parsed.current_usage,
        available: parsed.current_usage < parsed.usage_limit,
        user_email: parsed.user_email,
        subscription_type: parsed.subscription_type,
        next_reset: parsed.next_reset,
        last_updated: chrono::Utc::now().timestamp(),
    })
}

/// Periodically probe every active account and store the snapshot on the
/// pool. Probe failures only warn; the account keeps its previous snapshot.
pub fn spawn_usage_refresh(
    pool: Arc<AccountPool>,
    tokens: Arc<dyn TokenProvider>,
    client: reqwest::Client,
    region: String,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(USAGE_REFRESH_INTERVAL);
        loop {
            ticker.tick().await;
            for account in pool.snapshot() {
                if account.status != AccountStatus::Active {
                    continue;
                }
                let selected = SelectedAccount {
                    id: account.id.clone(),
                    name: account.name.clone(),
                    credentials: account.credentials.clone(),
                };
                let token = match tokens.ensure_valid_token(&selected).await {
                    Ok(token) => token,
                    Err(e) => {
                        warn!("Usage probe skipped for {}: {}", account.id, e);
                        continue;
                    }
                };
                let account_region = account
                    .credentials
                    .region
                    .clone()
                    .unwrap_or_else(|| region.clone());
                match check_usage_limits(&client, &token, &account_region).await {
                    Ok(usage) => {
                        debug!(
                            "Usage for {}: {}/{}",
                            account.id, usage.current_usage, usage.usage_limit
                        );
                        pool.update_usage(&account.id, usage);
                    }
                    Err(e) => warn!("Usage probe failed for {}: {}", account.id, e),
                }
            }
        }
    });
}
