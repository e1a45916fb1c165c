//! HTTP route handlers and router configuration

mod accounts;
mod admin;
mod disputes;
mod jobs;
mod reputation;
mod roles;

use crate::error::{Result, ServerError};
use crate::state::AppState;
use crate::telemetry::{create_request_span, extract_request_id, set_span_error_code};
use axum::http::HeaderMap;
use axum::{
    routing::{delete, get},
    Json, Router,
};
use escrowlens_core::{Address, CacheScope};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;

/// Build the main application router
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        // Health check
        .route("/health", get(admin::health))
        // Admin endpoints
        .route("/v1/stats", get(admin::stats))
        .route("/v1/cache", delete(admin::clear_all))
        // Jobs
        .route("/v1/jobs", get(jobs::list))
        .route("/v1/jobs/cache", delete(jobs::clear_cache))
        .route("/v1/jobs/:id", get(jobs::detail))
        .route(
            "/v1/jobs/:id/milestones/:milestone_id/preflight/:action",
            get(jobs::preflight),
        )
        // Disputes
        .route("/v1/disputes/cache", delete(disputes::clear_cache))
        .route("/v1/disputes/:id", get(disputes::detail))
        .route(
            "/v1/disputes/reviewers/:address/load",
            get(disputes::reviewer_load),
        )
        // Roles
        .route("/v1/roles/cache", delete(roles::clear_cache))
        .route("/v1/roles/:address", get(roles::summary))
        // Accounts
        .route("/v1/accounts/:address/jobs", get(accounts::jobs))
        .route("/v1/accounts/:address/disputes", get(accounts::disputes))
        // Reputation
        .route("/v1/reputation/cache", delete(reputation::clear_cache))
        .route("/v1/reputation/:address", get(reputation::score))
        .with_state(state.clone());

    router = router.layer(TraceLayer::new_for_http());

    if state.config.cors_enabled {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
}

/// `{"success": true, ...body}`
#[derive(Serialize)]
pub struct Success<T> {
    pub success: bool,
    #[serde(flatten)]
    pub body: T,
}

pub fn success<T: Serialize>(body: T) -> Json<Success<T>> {
    Json(Success {
        success: true,
        body,
    })
}

/// Body of a cache-clearing response
#[derive(Serialize)]
pub struct Cleared {
    pub cleared: Vec<CacheScope>,
}

fn clear_scope(state: &AppState, scope: CacheScope) -> Json<Success<Cleared>> {
    state.caches.clear(scope);
    success(Cleared {
        cleared: vec![scope],
    })
}

/// Run a handler body inside a request span and record the error type on
/// failure.
async fn traced<T, F>(
    state: &AppState,
    headers: &HeaderMap,
    operation: &'static str,
    entity: Option<&str>,
    body: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let request_id = extract_request_id(headers, &state.telemetry_config);
    let span = create_request_span(operation, request_id.as_deref(), entity);
    let result = body.instrument(span.clone()).await;
    if let Err(ref e) = result {
        set_span_error_code(&span, e.error_type());
    }
    result
}

fn parse_id(raw: &str, what: &str) -> Result<u64> {
    raw.parse::<u64>()
        .map_err(|_| ServerError::bad_request(format!("{what} must be an unsigned integer, got {raw:?}")))
}

fn parse_address(raw: &str) -> Result<Address> {
    Address::parse(raw).map_err(|e| ServerError::bad_request(format!("invalid address: {e}")))
}
