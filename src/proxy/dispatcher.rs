// Upstream dispatch: binds a translated request to a pool account, builds the
// Kiro headers, issues the streaming POST, and maps failures back onto pool
// transitions and the request log.
//
// On success the caller receives the raw response handle plus the tool-name
// map; the body is relayed verbatim downstream.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::config::{
    kiro_q_host, kiro_q_host_header, machine_id_or_random, AWS_SDK_UA,
};
use crate::auth::TokenProvider;
use crate::error::GatewayError;
use crate::models::claude::ClaudeRequest;
use crate::modules::request_log::{LogRow, RequestLog};
use crate::proxy::model_mapper::ModelMapper;
use crate::proxy::pool::{AccountPool, SelectedAccount};
use crate::proxy::summary::summarize;
use crate::proxy::translator::translate;

/// Build the shared upstream HTTP client. An optional proxy URL routes all
/// upstream traffic; no overall request timeout is imposed here.
pub fn build_http_client(proxy_url: Option<&str>) -> Result<reqwest::Client, String> {
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(10)
        .connect_timeout(Duration::from_secs(30));

    if let Some(proxy_url) = proxy_url {
        if !proxy_url.is_empty() {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| format!("invalid proxy URL: {e}"))?;
            builder = builder.proxy(proxy);
        }
    }

    builder.build().map_err(|e| e.to_string())
}

fn build_upstream_headers(
    token: &str,
    region: &str,
    kiro_version: &str,
    machine_id: &str,
) -> reqwest::header::HeaderMap {
    let mut headers = reqwest::header::HeaderMap::new();

    headers.insert(
        reqwest::header::CONTENT_TYPE,
        "application/json".parse().unwrap(),
    );
    headers.insert(
        reqwest::header::AUTHORIZATION,
        format!("Bearer {}", token).parse().unwrap(),
    );
    headers.insert(
        reqwest::header::HOST,
        kiro_q_host_header(region).parse().unwrap(),
    );
    headers.insert("x-amzn-codewhisperer-optout", "true".parse().unwrap());
    headers.insert("x-amzn-kiro-agent-mode", "vibe".parse().unwrap());
    headers.insert(
        "x-amz-user-agent",
        format!("{AWS_SDK_UA} KiroIDE-{kiro_version}-{machine_id}")
            .parse()
            .unwrap(),
    );
    headers.insert(
        reqwest::header::USER_AGENT,
        format!(
            "{AWS_SDK_UA} ua/2.1 os/windows lang/js md/nodejs#20.0.0 api/codewhispererstreaming#1.0.27 m/E KiroIDE-{kiro_version}-{machine_id}"
        )
        .parse()
        .unwrap(),
    );
    headers.insert(
        "amz-sdk-invocation-id",
        Uuid::new_v4().to_string().parse().unwrap(),
    );
    headers.insert("amz-sdk-request", "attempt=1; max=3".parse().unwrap());
    headers.insert(reqwest::header::CONNECTION, "close".parse().unwrap());

    headers
}

/// Successful dispatch: the upstream response handle plus everything the
/// downstream decoder needs.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub response: reqwest::Response,
    pub tool_names: HashMap<String, String>,
    pub account_id: String,
    pub account_name: String,
}

pub struct Dispatcher {
    pool: Arc<AccountPool>,
    tokens: Arc<dyn TokenProvider>,
    mapper: Arc<ModelMapper>,
    request_log: Option<Arc<RequestLog>>,
    client: reqwest::Client,
    region: String,
    kiro_version: String,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: Arc<AccountPool>,
        tokens: Arc<dyn TokenProvider>,
        mapper: Arc<ModelMapper>,
        request_log: Option<Arc<RequestLog>>,
        client: reqwest::Client,
        region: String,
        kiro_version: String,
    ) -> Self {
        Self {
            pool,
            tokens,
            mapper,
            request_log,
            client,
            region,
            kiro_version,
        }
    }

    pub async fn dispatch(
        &self,
        request: &ClaudeRequest,
        trace_id: &str,
    ) -> Result<DispatchOutcome, GatewayError> {
        let started = Instant::now();

        // Translation failures happen before any account work and leave no
        // log row behind.
        let translated = translate(request, &self.mapper)?;
        let mapped_model = translated
            .envelope
            .conversation_state
            .current_message
            .user_input_message
            .model_id
            .clone();

        let account = match self.pool.select_account() {
            Ok(account) => account,
            Err(err) => {
                warn!("[{}] No account available for dispatch", trace_id);
                self.log_failure(request, None, &mapped_model, &err, started);
                return Err(err);
            }
        };

        // I/O from here on; the pool lock is long released.
        let token = match self.tokens.ensure_valid_token(&account).await {
            Ok(token) => token,
            Err(e) => {
                if e.is_persistent() {
                    warn!(
                        "[{}] Persistent token failure, invalidating account {}",
                        trace_id, account.id
                    );
                    self.pool.mark_invalid(&account.id);
                }
                let err = GatewayError::Token {
                    account_id: account.id.clone(),
                    message: e.to_string(),
                    persistent: e.is_persistent(),
                };
                self.log_failure(request, Some(&account), &mapped_model, &err, started);
                return Err(err);
            }
        };

        let mut envelope = translated.envelope;
        envelope.profile_arn = account.credentials.profile_arn.clone();

        let region = account
            .credentials
            .region
            .clone()
            .unwrap_or_else(|| self.region.clone());
        let machine_id = machine_id_or_random(account.credentials.machine_id.as_deref());
        let headers = build_upstream_headers(&token, &region, &self.kiro_version, &machine_id);
        let url = format!("{}/generateAssistantResponse", kiro_q_host(&region));

        info!(
            "[{}] Dispatching to Kiro | Account: {} | Region: {} | Model: {}",
            trace_id, account.name, region, mapped_model
        );

        let sent = self
            .client
            .post(&url)
            .headers(headers)
            .json(&envelope)
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                self.pool.record_error(&account.id);
                error!("[{}] Upstream transport failure: {}", trace_id, e);
                let err = GatewayError::Transport(e.to_string());
                self.log_failure(request, Some(&account), &mapped_model, &err, started);
                return Err(err);
            }
        };

        let status = response.status();
        if status.is_success() {
            self.insert_log(LogRow {
                timestamp: chrono::Utc::now().timestamp(),
                account_id: Some(account.id.clone()),
                account_name: Some(account.name.clone()),
                model: request.model.clone(),
                mapped_model: Some(mapped_model),
                success: true,
                status_code: Some(status.as_u16()),
                error: None,
                duration_ms: started.elapsed().as_millis() as i64,
            });
            return Ok(DispatchOutcome {
                response,
                tool_names: translated.tool_names,
                account_id: account.id,
                account_name: account.name,
            });
        }

        let status = status.as_u16();
        let body = response.text().await.unwrap_or_default();
        let summary = summarize(&serde_json::to_value(&envelope).unwrap_or(Value::Null));
        error!(
            "[{}] Upstream error {} | request shape: {}",
            trace_id, status, summary
        );

        let err = GatewayError::Upstream {
            status,
            body,
            summary,
        };
        if err.is_rate_limit() {
            self.pool.record_rate_limit(&account.id);
        } else {
            self.pool.record_error(&account.id);
        }
        self.log_failure(request, Some(&account), &mapped_model, &err, started);
        Err(err)
    }

    fn log_failure(
        &self,
        request: &ClaudeRequest,
        account: Option<&SelectedAccount>,
        mapped_model: &str,
        err: &GatewayError,
        started: Instant,
    ) {
        let status_code = match err {
            GatewayError::Upstream { status, .. } => Some(*status),
            _ => None,
        };
        self.insert_log(LogRow {
            timestamp: chrono::Utc::now().timestamp(),
            account_id: account.map(|a| a.id.clone()),
            account_name: account.map(|a| a.name.clone()),
            model: request.model.clone(),
            mapped_model: Some(mapped_model.to_string()),
            success: false,
            status_code,
            error: Some(err.to_string()),
            duration_ms: started.elapsed().as_millis() as i64,
        });
    }

    /// Telemetry must not block the dispatch path; the insert runs on the
    /// blocking pool and failures only warn.
    fn insert_log(&self, row: LogRow) {
        if let Some(log) = &self.request_log {
            let log = Arc::clone(log);
            tokio::task::spawn_blocking(move || {
                if let Err(e) = log.insert(&row) {
                    warn!("Failed to insert request log row: {}", e);
                }
            });
        }
    }
}
