//! Telemetry module for logging and tracing setup

use crate::config::ServerConfig;
use std::env;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Primary log filter (RUST_LOG env var)
    pub log_filter: String,
    /// Fallback log level if RUST_LOG not set
    pub default_level: String,
    /// Request ID header name (default: "x-request-id")
    pub request_id_header: String,
    /// Log format ("human" or "json")
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Human,
    Json,
}

impl TelemetryConfig {
    /// RUST_LOG wins; otherwise LOG_LEVEL, then the configured level
    pub fn with_server_config(server_config: &ServerConfig) -> Self {
        let default_level =
            env::var("LOG_LEVEL").unwrap_or_else(|_| server_config.log_level.clone());
        Self::from_env_with_defaults(default_level)
    }

    fn from_env_with_defaults(default_level: String) -> Self {
        Self {
            log_filter: env::var("RUST_LOG").unwrap_or_default(),
            default_level,
            request_id_header: env::var("LOG_REQUEST_ID_HEADER")
                .unwrap_or_else(|_| "x-request-id".to_string()),
            log_format: parse_log_format(&env::var("LOG_FORMAT").unwrap_or_default()),
        }
    }

    /// Filter directive actually handed to `EnvFilter`
    pub fn effective_filter(&self) -> &str {
        if self.log_filter.is_empty() {
            &self.default_level
        } else {
            &self.log_filter
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::from_env_with_defaults(env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()))
    }
}

fn parse_log_format(s: &str) -> LogFormat {
    match s.to_lowercase().as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Human,
    }
}

/// Initialize logging
///
/// Safe to call multiple times - will only initialize once.
pub fn init_logging(config: &TelemetryConfig) {
    // Check if a global subscriber is already set (e.g., from tests)
    if tracing::dispatcher::has_been_set() {
        tracing::debug!("tracing subscriber already initialized, skipping");
        return;
    }

    let filter = EnvFilter::try_new(config.effective_filter())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Human => tracing_subscriber::fmt::layer().compact().boxed(),
    };

    // try_init: another thread may have set the subscriber since the check above
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

/// Request ID from the configured header, falling back to common trace headers
pub fn extract_request_id(
    headers: &axum::http::HeaderMap,
    config: &TelemetryConfig,
) -> Option<String> {
    [
        config.request_id_header.as_str(),
        "x-amzn-trace-id",
        "x-trace-id",
    ]
    .into_iter()
    .find_map(|name| headers.get(name)?.to_str().ok().map(str::to_string))
}

/// Top-level span for one API request. `entity` is the job id, dispute id or
/// address the request is about.
pub fn create_request_span(
    operation: &str,
    request_id: Option<&str>,
    entity: Option<&str>,
) -> tracing::Span {
    tracing::info_span!(
        "request",
        operation = operation,
        request_id = request_id,
        entity = entity,
        error_code = tracing::field::Empty,
    )
}

pub fn set_span_error_code(span: &tracing::Span, error_code: &str) {
    span.record("error_code", error_code);
}
