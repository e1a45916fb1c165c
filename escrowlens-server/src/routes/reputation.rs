//! Reputation endpoints

use super::{clear_scope, parse_address, success, traced, Cleared, Success};
use crate::error::Result;
use crate::query::{self, ReputationView};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use escrowlens_core::CacheScope;
use std::sync::Arc;

/// GET /v1/reputation/:address
pub async fn score(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Success<ReputationView>>> {
    traced(&state, &headers, "reputation:get", Some(&address), async {
        let address = parse_address(&address)?;
        let view = query::reputation(&state, &address).await?;
        tracing::info!(%address, value = view.value, source = ?view.source, "reputation served");
        Ok(success(view))
    })
    .await
}

/// DELETE /v1/reputation/cache
pub async fn clear_cache(State(state): State<Arc<AppState>>) -> Json<Success<Cleared>> {
    clear_scope(&state, CacheScope::Reputation)
}
