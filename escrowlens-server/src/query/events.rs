//! Cached event streams and per-job history.

use crate::error::QueryError;
use crate::state::AppState;
use escrowlens_core::{CacheKey, CacheScope, EventStream, JobHistory, LedgerEvent};
use futures::future::join_all;
use std::sync::Arc;

/// All records of one contract event stream, up to the configured limit.
pub async fn event_stream(
    state: &AppState,
    stream: EventStream,
) -> Result<Arc<Vec<LedgerEvent>>, QueryError> {
    let key = CacheKey::new(CacheScope::Events, stream.field_name());
    let events = state
        .caches
        .events
        .get_or_fetch(&key, || async move {
            let handle = state.contract.qualified(stream.store().resource_path());
            let raw = state
                .ledger
                .events(
                    state.contract.address(),
                    &handle,
                    stream.field_name(),
                    state.config.event_limit,
                )
                .await?;
            Ok(Some(Arc::new(LedgerEvent::parse_all(&raw))))
        })
        .await?;
    Ok(events.unwrap_or_default())
}

/// Event history of one job. Streams are read concurrently; a stream that
/// fails to load is skipped with a warning and the job derives from the
/// snapshot plus whatever history did load.
pub async fn job_history(state: &AppState, job_id: u64) -> JobHistory {
    let reads = EventStream::JOB_HISTORY
        .iter()
        .map(|&stream| async move { (stream, event_stream(state, stream).await) });

    let mut history = JobHistory::new(job_id);
    for (stream, result) in join_all(reads).await {
        match result {
            Ok(events) => history.ingest(stream, &events),
            Err(e) => {
                tracing::warn!(job_id, stream = stream.field_name(), error = %e, "event stream unavailable");
            }
        }
    }
    history
}
