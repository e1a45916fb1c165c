//! Role endpoints

use super::{clear_scope, parse_address, success, traced, Cleared, Success};
use crate::error::{Result, ServerError};
use crate::query::{self, RoleKind, RoleSummary};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use escrowlens_core::CacheScope;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct RoleParams {
    /// 1 freelancer, 2 poster, 3 reviewer
    pub role_kind: Option<u8>,
}

/// GET /v1/roles/:address?role_kind=N
pub async fn summary(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Query(params): Query<RoleParams>,
    headers: HeaderMap,
) -> Result<Json<Success<RoleSummary>>> {
    traced(&state, &headers, "role:summary", Some(&address), async {
        let address = parse_address(&address)?;
        let role_kind = params
            .role_kind
            .map(|k| {
                RoleKind::from_u8(k).ok_or_else(|| {
                    ServerError::bad_request(format!("role_kind must be 1, 2 or 3, got {k}"))
                })
            })
            .transpose()?;
        let roles = query::roles(&state, &address, role_kind).await?;
        Ok(success(roles))
    })
    .await
}

/// DELETE /v1/roles/cache
pub async fn clear_cache(State(state): State<Arc<AppState>>) -> Json<Success<Cleared>> {
    clear_scope(&state, CacheScope::Role)
}
