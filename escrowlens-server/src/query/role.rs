//! Role flags and role profile pointers.

use crate::error::QueryError;
use crate::state::AppState;
use escrowlens_core::decode::{decode_optional_bool, decode_text_payload};
use escrowlens_core::{Address, CacheKey, CacheScope, ContentPointer};
use escrowlens_ledger::ViewRequest;
use serde::Serialize;
use serde_json::json;

/// Role whose profile pointer `get_cid` returns. The discriminants are the
/// contract's `u8` role kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    Freelancer = 1,
    Poster = 2,
    Reviewer = 3,
}

impl RoleKind {
    pub fn from_u8(kind: u8) -> Option<Self> {
        match kind {
            1 => Some(RoleKind::Freelancer),
            2 => Some(RoleKind::Poster),
            3 => Some(RoleKind::Reviewer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleSummary {
    pub address: Address,
    pub freelancer: bool,
    pub poster: bool,
    pub reviewer: bool,
    pub has_proof: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_kind: Option<RoleKind>,
    /// Profile pointer for `role_kind`, if one is registered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<ContentPointer>,
}

pub async fn roles(
    state: &AppState,
    address: &Address,
    role_kind: Option<RoleKind>,
) -> Result<RoleSummary, QueryError> {
    let action = match role_kind {
        Some(kind) => format!("kind{}", kind as u8),
        None => "flags".to_string(),
    };
    let key = CacheKey::new(CacheScope::Role, address.as_str()).with_action(action);

    let summary = state
        .caches
        .roles
        .get_or_fetch(&key, || async move {
            let (freelancer, poster, reviewer, has_proof, cid) = tokio::try_join!(
                role_flag(state, "has_freelancer", address),
                role_flag(state, "has_poster", address),
                role_flag(state, "has_reviewer", address),
                role_flag(state, "has_proof", address),
                profile_cid(state, address, role_kind),
            )?;
            Ok(Some(RoleSummary {
                address: address.clone(),
                freelancer,
                poster,
                reviewer,
                has_proof,
                role_kind,
                cid,
            }))
        })
        .await?;
    summary.ok_or_else(|| QueryError::NotFound(format!("roles for {address}")))
}

async fn role_flag(state: &AppState, function: &str, address: &Address) -> Result<bool, QueryError> {
    let request = ViewRequest::new(state.contract.function("role", function))
        .arg("address", json!(address.as_str()));
    let values = state.ledger.view(&request).await?;
    Ok(values
        .first()
        .and_then(|v| decode_optional_bool(v, function))
        .unwrap_or(false))
}

async fn profile_cid(
    state: &AppState,
    address: &Address,
    role_kind: Option<RoleKind>,
) -> Result<Option<ContentPointer>, QueryError> {
    let Some(kind) = role_kind else {
        return Ok(None);
    };
    let request = ViewRequest::new(state.contract.function("role", "get_cid"))
        .arg("address", json!(address.as_str()))
        .arg("u8", json!(kind as u8));
    let values = state.ledger.view(&request).await?;
    Ok(values
        .first()
        .and_then(|v| decode_text_payload(v, "get_cid"))
        .map(ContentPointer::new))
}
