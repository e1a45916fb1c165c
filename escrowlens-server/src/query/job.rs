//! Job detail and job list.

use super::events::{event_stream, job_history};
use super::store::escrow_store;
use crate::error::QueryError;
use crate::state::AppState;
use escrowlens_core::events::created_job_ids;
use escrowlens_core::job_state::check_invariants;
use escrowlens_core::{decode_job, derive_job, CacheKey, CacheScope, EventStream, JobView};
use escrowlens_ledger::TableItemRequest;
use futures::{StreamExt, TryStreamExt};
use serde_json::json;

/// Derived view of one job, from cache or the ledger.
pub async fn job_detail(state: &AppState, job_id: u64) -> Result<JobView, QueryError> {
    let key = CacheKey::new(CacheScope::Job, job_id.to_string()).with_action("details");
    state
        .caches
        .jobs
        .get_or_fetch(&key, || fetch_job(state, job_id))
        .await?
        .ok_or_else(|| QueryError::NotFound(format!("job {job_id}")))
}

async fn fetch_job(state: &AppState, job_id: u64) -> Result<Option<JobView>, QueryError> {
    // History does not need the table handle; only the item read waits on it.
    let snapshot_read = async {
        let store = escrow_store(state).await?;
        let request = TableItemRequest::new("u64", state.contract.job_value_type(), json!(job_id));
        Ok::<_, QueryError>(state.ledger.table_item(&store.table, &request).await?)
    };
    let (item, history) = tokio::join!(snapshot_read, job_history(state, job_id));
    let Some(item) = item? else {
        tracing::debug!(job_id, "job not in table");
        return Ok(None);
    };

    let snapshot = decode_job(job_id, &item);
    let view = derive_job(&snapshot, &history, state.clock.now_secs());
    check_invariants(&view, &history)?;

    if view.state != snapshot.state {
        tracing::debug!(
            job_id,
            stored = %snapshot.state,
            effective = %view.state,
            source = ?view.state_source,
            "job state overridden by events"
        );
    }
    Ok(Some(view))
}

/// Newest `limit` jobs announced by creation events, newest first.
///
/// Ids that are not (yet) in the job table are skipped, and so are jobs
/// whose derivation broke an invariant (already logged). A failed ledger
/// read fails the whole list so the caller can retry.
pub async fn list_jobs(state: &AppState, limit: usize) -> Result<Vec<JobView>, QueryError> {
    let created = event_stream(state, EventStream::JobCreated).await?;
    let ids: Vec<u64> = created_job_ids(&created).into_iter().take(limit).collect();

    let results: Vec<Option<JobView>> = futures::stream::iter(ids)
        .map(|id| listed_job(state, id))
        .buffer_unordered(state.config.list_concurrency.max(1))
        .try_collect()
        .await?;

    let mut jobs: Vec<JobView> = results.into_iter().flatten().collect();
    jobs.sort_unstable_by(|a, b| b.id.cmp(&a.id));
    Ok(jobs)
}

/// [`job_detail`] for list pages: a missing job or a broken invariant drops
/// the entry instead of failing the page.
pub(crate) async fn listed_job(state: &AppState, job_id: u64) -> Result<Option<JobView>, QueryError> {
    match job_detail(state, job_id).await {
        Ok(view) => Ok(Some(view)),
        Err(QueryError::NotFound(_)) => Ok(None),
        Err(QueryError::Invariant(violation)) => {
            tracing::warn!(job_id, %violation, "skipping job in list");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
