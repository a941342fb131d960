use serde::{Deserialize, Serialize};

/// Account lifecycle status.
///
/// - `Active`: eligible for selection.
/// - `Cooldown`: rate-limited; returns to `Active` after the cooldown interval.
/// - `Invalid`: credentials are permanently broken; never selected.
/// - `Disabled`: turned off by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Cooldown,
    Invalid,
    Disabled,
}

/// Upstream credential blob. The pool treats this as opaque; only the token
/// provider and the dispatcher (machine id, profile ARN) read into it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountCredentials {
    #[serde(rename = "refreshToken")]
    pub refresh_token: Option<String>,
    #[serde(rename = "accessToken")]
    pub access_token: Option<String>,
    #[serde(rename = "expiresAt")]
    pub expires_at: Option<i64>,
    #[serde(rename = "profileArn")]
    pub profile_arn: Option<String>,
    #[serde(rename = "machineId")]
    pub machine_id: Option<String>,
    pub region: Option<String>,
}

/// Usage snapshot reported by the usage probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountUsage {
    pub usage_limit: f64,
    pub current_usage: f64,
    pub available: bool,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub subscription_type: Option<String>,
    #[serde(default)]
    pub next_reset: Option<String>,
    #[serde(default)]
    pub last_updated: i64,
}

/// One entry of the account roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub credentials: AccountCredentials,
    pub status: AccountStatus,
    #[serde(default)]
    pub request_count: u64,
    #[serde(default)]
    pub error_count: u64,
    pub created_at: i64,
    pub last_used_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<AccountUsage>,
}

impl Account {
    pub fn new(id: String, name: String, credentials: AccountCredentials) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id,
            name,
            credentials,
            status: AccountStatus::Active,
            request_count: 0,
            error_count: 0,
            created_at: now,
            last_used_at: now,
            usage: None,
        }
    }

    pub fn touch(&mut self) {
        self.last_used_at = chrono::Utc::now().timestamp();
    }
}
