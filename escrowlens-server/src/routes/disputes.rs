//! Dispute endpoints: detail, reviewer load, cache clear

use super::{clear_scope, parse_address, parse_id, success, traced, Cleared, Success};
use crate::error::Result;
use crate::query;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use escrowlens_core::{Address, CacheScope, DisputeView};
use serde::Serialize;
use std::sync::Arc;

/// Dispute detail with vote tally
///
/// GET /v1/disputes/:id
pub async fn detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Success<DisputeView>>> {
    traced(&state, &headers, "dispute:detail", Some(&id), async {
        let dispute_id = parse_id(&id, "dispute id")?;
        let view = query::dispute_detail(&state, dispute_id).await?;
        tracing::info!(
            dispute_id,
            votes = view.tally.votes_cast,
            quorum = view.tally.quorum,
            "dispute served"
        );
        Ok(success(view))
    })
    .await
}

#[derive(Serialize)]
pub struct ReviewerLoad {
    pub address: Address,
    pub load: u64,
}

/// GET /v1/disputes/reviewers/:address/load
pub async fn reviewer_load(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Success<ReviewerLoad>>> {
    traced(&state, &headers, "dispute:reviewer_load", Some(&address), async {
        let reviewer = parse_address(&address)?;
        let load = query::reviewer_load(&state, &reviewer).await?;
        Ok(success(ReviewerLoad {
            address: reviewer,
            load,
        }))
    })
    .await
}

/// DELETE /v1/disputes/cache
pub async fn clear_cache(State(state): State<Arc<AppState>>) -> Json<Success<Cleared>> {
    clear_scope(&state, CacheScope::Dispute)
}
