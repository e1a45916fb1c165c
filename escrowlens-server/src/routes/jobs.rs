//! Job endpoints: detail, list, milestone action preflight, cache clear

use super::{clear_scope, parse_id, success, traced, Cleared, Success};
use crate::error::{Result, ServerError};
use crate::query;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use escrowlens_core::{check_action, CacheScope, JobView, MilestoneAction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_LIST_LIMIT: usize = 100;

/// Job detail
///
/// GET /v1/jobs/:id
pub async fn detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Success<JobView>>> {
    traced(&state, &headers, "job:detail", Some(&id), async {
        let job_id = parse_id(&id, "job id")?;
        let view = query::job_detail(&state, job_id).await?;
        tracing::info!(job_id, state = %view.state, "job served");
        Ok(success(view))
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct JobList {
    pub count: usize,
    pub jobs: Vec<JobView>,
}

/// Newest jobs first
///
/// GET /v1/jobs?limit=N
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
) -> Result<Json<Success<JobList>>> {
    traced(&state, &headers, "job:list", None, async {
        let limit = match params.limit {
            None => DEFAULT_LIST_LIMIT,
            Some(0) => return Err(ServerError::bad_request("limit must be at least 1")),
            Some(n) => n.min(MAX_LIST_LIMIT),
        };
        let jobs = query::list_jobs(&state, limit).await?;
        tracing::info!(limit, count = jobs.len(), "job list served");
        Ok(success(JobList {
            count: jobs.len(),
            jobs,
        }))
    })
    .await
}

#[derive(Serialize)]
pub struct PreflightResponse {
    pub job_id: u64,
    pub milestone_id: u64,
    pub action: MilestoneAction,
    pub allowed: bool,
}

/// Check a milestone action against the derived job before a transaction
/// is signed. 409 with the reason when the action would be rejected.
///
/// GET /v1/jobs/:id/milestones/:milestone_id/preflight/:action
pub async fn preflight(
    State(state): State<Arc<AppState>>,
    Path((id, milestone, action)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Json<Success<PreflightResponse>>> {
    traced(&state, &headers, "job:preflight", Some(&id), async {
        let job_id = parse_id(&id, "job id")?;
        let milestone_id = parse_id(&milestone, "milestone id")?;
        let action: MilestoneAction = action
            .parse()
            .map_err(|e: String| ServerError::bad_request(e))?;

        let view = query::job_detail(&state, job_id).await?;
        check_action(&view, milestone_id, action, state.clock.now_secs())?;

        Ok(success(PreflightResponse {
            job_id,
            milestone_id,
            action,
            allowed: true,
        }))
    })
    .await
}

/// DELETE /v1/jobs/cache
pub async fn clear_cache(State(state): State<Arc<AppState>>) -> Json<Success<Cleared>> {
    clear_scope(&state, CacheScope::Job)
}
