//! Account endpoints: job history per side, disputes an account is party to

use super::{parse_address, success, traced, Success};
use crate::error::{Result, ServerError};
use crate::query::{self, AccountDispute, AccountJob, AccountSide};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct JobsParams {
    /// `poster` (default) or `freelancer`
    pub role: Option<String>,
}

#[derive(Serialize)]
pub struct AccountJobs {
    pub role: AccountSide,
    pub count: usize,
    pub jobs: Vec<AccountJob>,
}

/// GET /v1/accounts/:address/jobs?role=poster|freelancer
pub async fn jobs(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Query(params): Query<JobsParams>,
    headers: HeaderMap,
) -> Result<Json<Success<AccountJobs>>> {
    traced(&state, &headers, "account:jobs", Some(&address), async {
        let address = parse_address(&address)?;
        let role = match params.role.as_deref() {
            None => AccountSide::Poster,
            Some(raw) => raw.parse::<AccountSide>().map_err(|e: String| ServerError::bad_request(e))?,
        };
        let jobs = query::account_jobs(&state, &address, role).await?;
        tracing::info!(%address, ?role, count = jobs.len(), "account jobs served");
        Ok(success(AccountJobs {
            role,
            count: jobs.len(),
            jobs,
        }))
    })
    .await
}

#[derive(Serialize)]
pub struct AccountDisputes {
    pub count: usize,
    pub disputes: Vec<AccountDispute>,
}

/// GET /v1/accounts/:address/disputes
pub async fn disputes(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Success<AccountDisputes>>> {
    traced(&state, &headers, "account:disputes", Some(&address), async {
        let address = parse_address(&address)?;
        let disputes = query::account_disputes(&state, &address).await?;
        tracing::info!(%address, count = disputes.len(), "account disputes served");
        Ok(success(AccountDisputes {
            count: disputes.len(),
            disputes,
        }))
    })
    .await
}
