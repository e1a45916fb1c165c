//! Dispute detail and reviewer load.

use super::store::dispute_store;
use crate::error::QueryError;
use crate::state::AppState;
use escrowlens_core::decode::decode_u64;
use escrowlens_core::dispute::check_invariants;
use escrowlens_core::{decode_dispute, derive_dispute, Address, CacheKey, CacheScope, DisputeView};
use escrowlens_ledger::TableItemRequest;
use serde_json::json;

pub async fn dispute_detail(state: &AppState, dispute_id: u64) -> Result<DisputeView, QueryError> {
    let key = CacheKey::new(CacheScope::Dispute, dispute_id.to_string()).with_action("details");
    state
        .caches
        .disputes
        .get_or_fetch(&key, || async move {
            let store = dispute_store(state).await?;
            let request = TableItemRequest::new(
                "u64",
                state.contract.dispute_value_type(),
                json!(dispute_id),
            );
            let Some(item) = state.ledger.table_item(&store.table, &request).await? else {
                return Ok(None);
            };
            let dispute = decode_dispute(dispute_id, &item);
            check_invariants(&dispute)?;
            Ok(Some(derive_dispute(&dispute, state.quorum)))
        })
        .await?
        .ok_or_else(|| QueryError::NotFound(format!("dispute {dispute_id}")))
}

/// Open disputes currently assigned to `reviewer`. No table entry means 0.
pub async fn reviewer_load(state: &AppState, reviewer: &Address) -> Result<u64, QueryError> {
    let key = CacheKey::new(CacheScope::Dispute, reviewer.as_str()).with_action("reviewer_load");
    let load = state
        .caches
        .reviewer_loads
        .get_or_fetch(&key, || async move {
            let store = dispute_store(state).await?;
            let handle = store
                .reviewer_load
                .ok_or_else(|| QueryError::StoreMissing("dispute::DisputeStore (reviewer_load)".into()))?;
            let request = TableItemRequest::new("address", "u64", json!(reviewer.as_str()));
            let item = state.ledger.table_item(&handle, &request).await?;
            Ok(Some(
                item.map(|v| decode_u64(&v, "reviewer_load")).unwrap_or(0),
            ))
        })
        .await?;
    Ok(load.unwrap_or(0))
}
