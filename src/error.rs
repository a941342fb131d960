use thiserror::Error;

/// Gateway-level error taxonomy.
///
/// Translation errors (`UnsupportedModel`, `EmptyMessages`) are raised before
/// any account is touched; everything else happens during dispatch and leaves
/// a request-log row behind.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    #[error("request contains no messages")]
    EmptyMessages,

    #[error("no active account available")]
    NoAccountAvailable,

    #[error("token acquisition failed for account {account_id}: {message}")]
    Token {
        account_id: String,
        message: String,
        /// A persistent failure (revoked refresh token) invalidates the account.
        persistent: bool,
    },

    #[error("upstream returned status {status}")]
    Upstream {
        status: u16,
        body: String,
        /// Bounded structural trace of the request envelope, safe to log.
        summary: serde_json::Value,
    },

    #[error("transport failure: {0}")]
    Transport(String),
}

impl GatewayError {
    /// HTTP status the client-facing surface should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            GatewayError::UnsupportedModel(_) | GatewayError::EmptyMessages => 400,
            GatewayError::NoAccountAvailable => 503,
            GatewayError::Token { .. } => 502,
            GatewayError::Upstream { status, .. } => {
                if *status >= 400 && *status < 600 {
                    *status
                } else {
                    502
                }
            }
            GatewayError::Transport(_) => 502,
        }
    }

    /// Whether the upstream signalled throttling (drives the cooldown transition).
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, GatewayError::Upstream { status: 429, .. })
    }
}
