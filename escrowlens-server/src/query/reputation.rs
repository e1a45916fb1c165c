//! Reputation score with event fallback.

use super::events::event_stream;
use crate::error::QueryError;
use crate::state::AppState;
use escrowlens_core::decode::decode_u64;
use escrowlens_core::events::latest_reputation;
use escrowlens_core::{Address, CacheKey, CacheScope, EventStream};
use escrowlens_ledger::ViewRequest;
use serde::Serialize;
use serde_json::json;

/// Where a reputation value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReputationSource {
    /// `reputation::get` view
    View,
    /// Newest `reputation_changed_events` record
    Event,
    /// Neither knew the address
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReputationView {
    pub address: Address,
    pub value: u64,
    pub source: ReputationSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
}

/// Reputation of `address`. When the node rejects the view call (4xx, e.g.
/// an account the reputation module has never seen), the newest change
/// event stands in.
pub async fn reputation(state: &AppState, address: &Address) -> Result<ReputationView, QueryError> {
    let key = CacheKey::new(CacheScope::Reputation, address.as_str());
    let view = state
        .caches
        .reputation
        .get_or_fetch(&key, || async move {
            let request = ViewRequest::new(state.contract.function("reputation", "get"))
                .arg("address", json!(address.as_str()));

            match state.ledger.view(&request).await {
                Ok(values) => Ok(Some(ReputationView {
                    address: address.clone(),
                    value: values
                        .first()
                        .map(|v| decode_u64(v, "reputation"))
                        .unwrap_or(0),
                    source: ReputationSource::View,
                    sequence_number: None,
                })),
                Err(e) if e.is_rejection() => {
                    tracing::debug!(%address, error = %e, "reputation view rejected, reading events");
                    let events = event_stream(state, EventStream::ReputationChanged).await?;
                    Ok(Some(match latest_reputation(&events, address) {
                        Some(change) => ReputationView {
                            address: address.clone(),
                            value: change.new_value,
                            source: ReputationSource::Event,
                            sequence_number: Some(change.sequence_number),
                        },
                        None => ReputationView {
                            address: address.clone(),
                            value: 0,
                            source: ReputationSource::Default,
                            sequence_number: None,
                        },
                    }))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await?;
    view.ok_or_else(|| QueryError::NotFound(format!("reputation for {address}")))
}
