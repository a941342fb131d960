// Anthropic-compatible HTTP surface.
//
// POST /v1/messages translates and dispatches, then relays the upstream byte
// stream verbatim; the per-request tool-name map travels in a response header
// for the downstream decoder. Response re-encoding is out of scope here.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Json, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::models::claude::ClaudeRequest;
use crate::proxy::dispatcher::Dispatcher;
use crate::proxy::errors::{error_response, gateway_error_response, AnthropicErrorType};
use crate::proxy::model_mapper::ModelMapper;

/// Response header carrying the original → sanitized tool-name map.
pub const TOOL_NAMES_HEADER: &str = "x-kiro-tool-names";

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub mapper: Arc<ModelMapper>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/messages", post(handle_messages))
        .route("/v1/models", get(handle_list_models))
        .route("/health", get(handle_health))
        .with_state(state)
}

fn new_trace_id() -> String {
    rand::Rng::sample_iter(rand::thread_rng(), &rand::distributions::Alphanumeric)
        .take(6)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

pub async fn handle_messages(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let trace_id = new_trace_id();

    let request: ClaudeRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                AnthropicErrorType::InvalidRequestError,
                &format!("Invalid request body: {}", e),
            );
        }
    };

    info!(
        "[{}] Claude request | Model: {} | Messages: {} | Tools: {}",
        trace_id,
        request.model,
        request.messages.len(),
        request.tools.as_ref().map(|t| t.len()).unwrap_or(0)
    );

    match state.dispatcher.dispatch(&request, &trace_id).await {
        Ok(outcome) => {
            info!(
                "[{}] Relaying upstream stream | Account: {}",
                trace_id, outcome.account_name
            );

            let content_type = outcome
                .response
                .headers()
                .get(header::CONTENT_TYPE)
                .cloned()
                .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));

            let mut builder = Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, content_type)
                .header("x-kiro-account", sanitize_header(&outcome.account_name));
            if let Ok(names) = HeaderValue::from_str(
                &serde_json::to_string(&outcome.tool_names).unwrap_or_default(),
            ) {
                builder = builder.header(TOOL_NAMES_HEADER, names);
            }

            builder
                .body(Body::from_stream(outcome.response.bytes_stream()))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Err(err) => {
            warn!("[{}] Dispatch failed: {}", trace_id, err);
            gateway_error_response(&err)
        }
    }
}

fn sanitize_header(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static("unknown"))
}

pub async fn handle_list_models(State(state): State<AppState>) -> impl IntoResponse {
    let data: Vec<_> = state
        .mapper
        .known_labels()
        .into_iter()
        .map(|id| {
            json!({
                "id": id,
                "object": "model",
                "owned_by": "kiro-gateway"
            })
        })
        .collect();

    Json(json!({
        "object": "list",
        "data": data
    }))
}

pub async fn handle_health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_ids_are_short_and_lowercase() {
        let id = new_trace_id();
        assert_eq!(id.len(), 6);
        assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn header_sanitizer_falls_back() {
        assert_eq!(sanitize_header("account-1").to_str().unwrap(), "account-1");
        assert_eq!(sanitize_header("bad\nname").to_str().unwrap(), "unknown");
    }

    #[tokio::test]
    async fn health_endpoint_answers() {
        let resp = handle_health().await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
