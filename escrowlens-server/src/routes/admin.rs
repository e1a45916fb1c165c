//! Admin endpoints: /health, /v1/stats, /v1/cache

use super::{success, Cleared, Success};
use crate::state::{AppState, CacheReport};
use axum::extract::State;
use axum::Json;
use escrowlens_core::CacheScope;
use serde::Serialize;
use std::sync::Arc;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Health check endpoint
///
/// GET /health
pub async fn health() -> Json<HealthResponse> {
    tracing::debug!("health check requested");
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Server statistics response
#[derive(Serialize)]
pub struct StatsResponse {
    /// Server uptime in seconds
    pub uptime_secs: u64,
    pub version: &'static str,
    pub contract_address: String,
    pub quorum_policy: String,
    pub cache: CacheReport,
}

/// Server statistics endpoint
///
/// GET /v1/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<Success<StatsResponse>> {
    let span = tracing::info_span!("stats");
    let _guard = span.enter();

    tracing::info!("server stats requested");

    success(StatsResponse {
        uptime_secs: state.uptime_secs(),
        version: env!("CARGO_PKG_VERSION"),
        contract_address: state.contract.address().to_string(),
        quorum_policy: state.quorum.to_string(),
        cache: state.caches.report(),
    })
}

/// Clear every cache scope
///
/// DELETE /v1/cache
pub async fn clear_all(State(state): State<Arc<AppState>>) -> Json<Success<Cleared>> {
    state.caches.clear_all();
    success(Cleared {
        cleared: CacheScope::ALL.to_vec(),
    })
}
