// Anthropic-compatible error response formatting.
// All error responses follow: {"type": "error", "error": {"type": "<type>", "message": "<msg>"}}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnthropicErrorType {
    InvalidRequestError,
    AuthenticationError,
    RateLimitError,
    ApiError,
    OverloadedError,
}

impl AnthropicErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequestError => "invalid_request_error",
            Self::AuthenticationError => "authentication_error",
            Self::RateLimitError => "rate_limit_error",
            Self::ApiError => "api_error",
            Self::OverloadedError => "overloaded_error",
        }
    }
}

/// Build an Anthropic-format error response with the given HTTP status,
/// error type, and message.
pub fn error_response(
    status: StatusCode,
    error_type: AnthropicErrorType,
    message: &str,
) -> Response {
    let body = json!({
        "type": "error",
        "error": {
            "type": error_type.as_str(),
            "message": message
        }
    });
    (status, Json(body)).into_response()
}

/// Map a gateway error onto the client-facing response.
pub fn gateway_error_response(err: &GatewayError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::BAD_GATEWAY);
    let error_type = match err {
        GatewayError::UnsupportedModel(_) | GatewayError::EmptyMessages => {
            AnthropicErrorType::InvalidRequestError
        }
        GatewayError::NoAccountAvailable => AnthropicErrorType::OverloadedError,
        GatewayError::Token { .. } => AnthropicErrorType::AuthenticationError,
        GatewayError::Upstream { status: 429, .. } => AnthropicErrorType::RateLimitError,
        GatewayError::Upstream { .. } | GatewayError::Transport(_) => {
            AnthropicErrorType::ApiError
        }
    };
    error_response(status, error_type, &err.to_string())
}
