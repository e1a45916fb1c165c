//! Contract store resources and the table handles they carry.

use crate::error::QueryError;
use crate::state::AppState;
use escrowlens_core::{CacheKey, CacheScope};
use escrowlens_ledger::contract::{
    DISPUTE_STORE, ESCROW_STORE, REVIEWER_LOAD_HANDLE_PATH, TABLE_HANDLE_PATH,
};
use escrowlens_ledger::extract_handle;
use serde_json::Value;

/// Handles read from a store resource. Handles never change once the store
/// exists, so these live under the long resource TTL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreHandles {
    pub table: String,
    pub reviewer_load: Option<String>,
}

pub async fn escrow_store(state: &AppState) -> Result<StoreHandles, QueryError> {
    load_store(state, ESCROW_STORE, false).await
}

pub async fn dispute_store(state: &AppState) -> Result<StoreHandles, QueryError> {
    load_store(state, DISPUTE_STORE, true).await
}

async fn load_store(
    state: &AppState,
    resource: &'static str,
    with_reviewer_load: bool,
) -> Result<StoreHandles, QueryError> {
    let key = CacheKey::new(CacheScope::Resource, resource);
    let handles = state
        .caches
        .stores
        .get_or_fetch(&key, || async move {
            let resource_type = state.contract.qualified(resource);
            let data = state
                .ledger
                .account_resource(state.contract.address(), &resource_type)
                .await?;
            // A deployed contract always has its stores; absence is a
            // misconfigured address, not a missing entity.
            let data = data.ok_or_else(|| QueryError::StoreMissing(resource.to_string()))?;
            handles_from(&data, resource, with_reviewer_load).map(Some)
        })
        .await?;
    handles.ok_or_else(|| QueryError::StoreMissing(resource.to_string()))
}

fn handles_from(
    data: &Value,
    resource: &str,
    with_reviewer_load: bool,
) -> Result<StoreHandles, QueryError> {
    let table = extract_handle(data, TABLE_HANDLE_PATH)
        .ok_or_else(|| QueryError::StoreMissing(format!("{resource} (table handle)")))?;
    let reviewer_load = if with_reviewer_load {
        extract_handle(data, REVIEWER_LOAD_HANDLE_PATH)
    } else {
        None
    };
    Ok(StoreHandles {
        table,
        reviewer_load,
    })
}
