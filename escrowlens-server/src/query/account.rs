//! Per-account views: the disputes an account is party to, and the jobs it
//! posted or applied to.
//!
//! Both are joins over cached event streams plus the cached job and dispute
//! pipelines, so the lists themselves are not cached.

use super::dispute::dispute_detail;
use super::events::event_stream;
use super::job::listed_job;
use crate::error::QueryError;
use crate::state::AppState;
use escrowlens_core::events::{
    applications_by, job_posters, jobs_posted_by, resolutions_by_dispute, DisputeOpened,
    DisputeResolved,
};
use escrowlens_core::{Address, DisputeView, EventStream, JobView};
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;

/// Which side of its jobs an account history is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountSide {
    Poster,
    Freelancer,
}

impl FromStr for AccountSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "poster" => Ok(AccountSide::Poster),
            "freelancer" => Ok(AccountSide::Freelancer),
            other => Err(format!("role must be poster or freelancer, got {other:?}")),
        }
    }
}

/// One dispute the account opened or is a party to.
#[derive(Debug, Clone, Serialize)]
pub struct AccountDispute {
    pub dispute_id: u64,
    pub job_id: u64,
    pub milestone_id: u64,
    pub opened_by: Option<Address>,
    pub opened_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_is_freelancer: Option<bool>,
    pub dispute: DisputeView,
}

/// One job in an account's history.
#[derive(Debug, Clone, Serialize)]
pub struct AccountJob {
    /// Newest application by the account (freelancer side only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<u64>,
    /// The account is the job's poster, hired freelancer or pending
    /// applicant. False for applications that were passed over.
    pub selected: bool,
    pub job: JobView,
}

/// Disputes where `account` is the job's poster, the opener or the job's
/// freelancer, newest opened first.
///
/// Disputes whose job has no creation event are skipped, as are disputes
/// missing from the table.
pub async fn account_disputes(
    state: &AppState,
    account: &Address,
) -> Result<Vec<AccountDispute>, QueryError> {
    let (created, opened, resolved) = tokio::try_join!(
        event_stream(state, EventStream::JobCreated),
        event_stream(state, EventStream::DisputeOpened),
        event_stream(state, EventStream::DisputeResolved),
    )?;
    let posters = &job_posters(&created);
    let resolutions = &resolutions_by_dispute(&resolved);

    let opened: Vec<DisputeOpened> = opened.iter().filter_map(DisputeOpened::from_event).collect();
    let results: Vec<Option<AccountDispute>> = futures::stream::iter(opened)
        .map(|o| account_dispute(state, account, posters, resolutions, o))
        .buffer_unordered(state.config.list_concurrency.max(1))
        .try_collect()
        .await?;

    let mut disputes: Vec<AccountDispute> = results.into_iter().flatten().collect();
    disputes.sort_unstable_by(|a, b| {
        (b.opened_at, b.dispute_id).cmp(&(a.opened_at, a.dispute_id))
    });
    Ok(disputes)
}

async fn account_dispute(
    state: &AppState,
    account: &Address,
    posters: &HashMap<u64, Address>,
    resolutions: &HashMap<u64, DisputeResolved>,
    opened: DisputeOpened,
) -> Result<Option<AccountDispute>, QueryError> {
    let Some(poster) = posters.get(&opened.job_id) else {
        return Ok(None);
    };
    let involved = poster == account
        || opened.opened_by.as_ref() == Some(account)
        || is_freelancer_of(state, opened.job_id, account).await?;
    if !involved {
        return Ok(None);
    }

    let dispute = match dispute_detail(state, opened.dispute_id).await {
        Ok(d) => d,
        Err(QueryError::NotFound(_)) => return Ok(None),
        Err(QueryError::Invariant(violation)) => {
            tracing::warn!(dispute_id = opened.dispute_id, %violation, "skipping dispute in list");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    let resolution = resolutions.get(&opened.dispute_id);
    Ok(Some(AccountDispute {
        dispute_id: opened.dispute_id,
        job_id: opened.job_id,
        milestone_id: opened.milestone_id,
        opened_by: opened.opened_by,
        opened_at: opened.opened_at,
        resolved_at: resolution.map(|r| r.resolved_at),
        winner_is_freelancer: resolution.and_then(|r| r.winner_is_freelancer),
        dispute,
    }))
}

async fn is_freelancer_of(
    state: &AppState,
    job_id: u64,
    account: &Address,
) -> Result<bool, QueryError> {
    let job = listed_job(state, job_id).await?;
    Ok(job.is_some_and(|j| j.freelancer.as_ref() == Some(account)))
}

/// Jobs `account` posted, or applied to, newest job first.
pub async fn account_jobs(
    state: &AppState,
    account: &Address,
    side: AccountSide,
) -> Result<Vec<AccountJob>, QueryError> {
    let entries: Vec<(u64, Option<u64>)> = match side {
        AccountSide::Poster => {
            let created = event_stream(state, EventStream::JobCreated).await?;
            jobs_posted_by(&created, account)
                .into_iter()
                .map(|id| (id, None))
                .collect()
        }
        AccountSide::Freelancer => {
            let applied = event_stream(state, EventStream::JobApplied).await?;
            applications_by(&applied, account)
                .into_iter()
                .map(|(id, at)| (id, Some(at)))
                .collect()
        }
    };

    let results: Vec<Option<AccountJob>> = futures::stream::iter(entries)
        .map(|(job_id, applied_at)| account_job(state, account, side, job_id, applied_at))
        .buffer_unordered(state.config.list_concurrency.max(1))
        .try_collect()
        .await?;

    let mut jobs: Vec<AccountJob> = results.into_iter().flatten().collect();
    jobs.sort_unstable_by(|a, b| b.job.id.cmp(&a.job.id));
    Ok(jobs)
}

async fn account_job(
    state: &AppState,
    account: &Address,
    side: AccountSide,
    job_id: u64,
    applied_at: Option<u64>,
) -> Result<Option<AccountJob>, QueryError> {
    let Some(job) = listed_job(state, job_id).await? else {
        return Ok(None);
    };
    let selected = match side {
        AccountSide::Poster => true,
        AccountSide::Freelancer => {
            job.freelancer.as_ref() == Some(account)
                || job.pending_freelancer.as_ref() == Some(account)
        }
    };
    Ok(Some(AccountJob {
        applied_at,
        selected,
        job,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_parses_lowercase_names() {
        assert_eq!("poster".parse::<AccountSide>(), Ok(AccountSide::Poster));
        assert_eq!("freelancer".parse::<AccountSide>(), Ok(AccountSide::Freelancer));
        assert!("reviewer".parse::<AccountSide>().is_err());
    }
}
