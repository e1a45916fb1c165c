//! Effective job and milestone state.
//!
//! A table read can race with event indexing: the snapshot may already
//! show a transition whose event is not yet visible, or an event may be
//! newer than the snapshot that was read. The deriver takes both as
//! independent inputs. Each rule below names which input wins on conflict
//! and [`StateSource`] records the winner:
//!
//! 1. terminal or disputed snapshot: snapshot
//! 2. poster claim-timeout newer than the latest application: reopen to
//!    `Posted` with no freelancer
//! 3. application newer than every state change: `PendingApproval`
//! 4. approval (`PendingApproval -> InProgress`) after the application:
//!    `InProgress`; rejection (`PendingApproval -> Posted`) after it:
//!    `Posted`. With both, approval wins only when strictly later. Either
//!    one is ignored once a newer state change supersedes it.
//! 5. otherwise: snapshot
//!
//! Pure: the only clock is the `now` argument.

use crate::address::Address;
use crate::error::{ActionError, InvariantViolation};
use crate::events::{ClaimTimeout, JobHistory, JobStateChanged};
use crate::model::{ContentPointer, Job, JobState, Milestone, MilestoneStatus};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Which input decided the effective job state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateSource {
    Snapshot,
    Application,
    Approval,
    Rejection,
    ClaimTimeout,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Resolution {
    state: JobState,
    freelancer: Option<Address>,
    pending_freelancer: Option<Address>,
    source: StateSource,
}

fn resolve_state(snapshot: &Job, history: &JobHistory) -> Resolution {
    let from_snapshot = || Resolution {
        state: snapshot.state,
        freelancer: snapshot.freelancer.clone(),
        pending_freelancer: snapshot.pending_freelancer.clone(),
        source: StateSource::Snapshot,
    };

    if snapshot.state.is_terminal() || snapshot.state == JobState::Disputed {
        return Resolution {
            pending_freelancer: None,
            ..from_snapshot()
        };
    }

    let application = history.latest_application();
    let applied_at = application.map_or(0, |a| a.applied_at);

    if let Some(claim) = history.latest_claim_timeout() {
        let by_poster = claim.claimed_by.is_some() && claim.claimed_by == snapshot.poster;
        if by_poster && claim.claimed_at > applied_at {
            return Resolution {
                state: JobState::Posted,
                freelancer: None,
                pending_freelancer: None,
                source: StateSource::ClaimTimeout,
            };
        }
    }

    let Some(application) = application else {
        return from_snapshot();
    };

    let newest_change = history.latest_state_change().map(|c| c.changed_at);
    if newest_change.map_or(true, |changed_at| applied_at > changed_at) {
        return Resolution {
            state: JobState::PendingApproval,
            freelancer: None,
            pending_freelancer: Some(application.freelancer.clone()),
            source: StateSource::Application,
        };
    }

    // A decision only counts while no later state change superseded it.
    let newest_at = newest_change.unwrap_or(0);
    let approval = unless_superseded(
        history.latest_transition_after(
            JobState::PendingApproval,
            JobState::InProgress,
            applied_at,
        ),
        newest_at,
    );
    let rejection = unless_superseded(
        history.latest_transition_after(JobState::PendingApproval, JobState::Posted, applied_at),
        newest_at,
    );

    match (approval, rejection) {
        (Some(a), Some(r)) if a.changed_at <= r.changed_at => Resolution {
            state: JobState::Posted,
            freelancer: None,
            pending_freelancer: None,
            source: StateSource::Rejection,
        },
        (Some(_), _) => Resolution {
            state: JobState::InProgress,
            freelancer: snapshot
                .freelancer
                .clone()
                .or_else(|| Some(application.freelancer.clone())),
            pending_freelancer: None,
            source: StateSource::Approval,
        },
        (None, Some(_)) => Resolution {
            state: JobState::Posted,
            freelancer: None,
            pending_freelancer: None,
            source: StateSource::Rejection,
        },
        (None, None) => from_snapshot(),
    }
}

fn unless_superseded(change: Option<&JobStateChanged>, newest_at: u64) -> Option<&JobStateChanged> {
    change.filter(|c| c.changed_at >= newest_at)
}

/// Local eligibility of each milestone action at derivation time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MilestoneActions {
    pub can_submit: bool,
    pub can_confirm: bool,
    pub can_reject: bool,
    pub can_open_dispute: bool,
    /// Submitted past its review deadline: the freelancer may claim
    pub freelancer_can_claim_timeout: bool,
    /// Pending past its work deadline: the poster may claim
    pub poster_can_claim_timeout: bool,
    pub review_expired: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MilestoneView {
    #[serde(flatten)]
    pub milestone: Milestone,
    pub stored_status: MilestoneStatus,
    pub actions: MilestoneActions,
    pub claim_timeout: Option<ClaimTimeout>,
}

/// Derived job as served to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JobView {
    pub id: u64,
    pub poster: Option<Address>,
    pub freelancer: Option<Address>,
    pub pending_freelancer: Option<Address>,
    pub cid: Option<ContentPointer>,
    pub state: JobState,
    pub stored_state: JobState,
    pub state_source: StateSource,
    /// Display overlay: still `Posted`, unfilled, past its apply deadline
    pub expired: bool,
    pub poster_stake: u64,
    pub freelancer_stake: u64,
    pub total_escrow: u64,
    pub apply_deadline: u64,
    pub started_at: Option<u64>,
    pub milestones: Vec<MilestoneView>,
    pub mutual_cancel_requested_by: Option<Address>,
    pub freelancer_withdraw_requested_by: Option<Address>,
    pub dispute_id: Option<u64>,
    pub dispute_winner: Option<bool>,
}

impl JobView {
    pub fn milestone(&self, id: u64) -> Option<&MilestoneView> {
        self.milestones.iter().find(|m| m.milestone.id == id)
    }
}

/// Combine a snapshot and its event history into the effective view.
pub fn derive_job(snapshot: &Job, history: &JobHistory, now: u64) -> JobView {
    let resolution = resolve_state(snapshot, history);
    let reopened = resolution.source == StateSource::ClaimTimeout;

    let mut milestones: Vec<MilestoneView> = snapshot
        .milestones
        .iter()
        .map(|m| overlay_milestone(m, history, reopened, resolution.freelancer.as_ref()))
        .collect();

    if resolution.state == JobState::InProgress {
        derive_deadlines(
            &mut milestones,
            history,
            snapshot.started_at,
            resolution.freelancer.as_ref(),
        );
    }

    let mut prior_accepted = true;
    for view in &mut milestones {
        view.actions = milestone_actions(&view.milestone, resolution.state, prior_accepted, now);
        prior_accepted &= view.milestone.status == MilestoneStatus::Accepted;
    }

    let (mutual_cancel_requested_by, freelancer_withdraw_requested_by) = if reopened {
        (None, None)
    } else {
        (
            history.latest_mutual_cancel_request().map_or_else(
                || snapshot.mutual_cancel_requested_by.clone(),
                |r| r.requested_by.clone(),
            ),
            history.latest_withdraw_request().map_or_else(
                || snapshot.freelancer_withdraw_requested_by.clone(),
                |r| r.requested_by.clone(),
            ),
        )
    };

    let expired = resolution.state == JobState::Posted
        && resolution.freelancer.is_none()
        && snapshot.apply_deadline > 0
        && snapshot.apply_deadline < now;

    JobView {
        id: snapshot.id,
        poster: snapshot.poster.clone(),
        freelancer: resolution.freelancer,
        pending_freelancer: resolution.pending_freelancer,
        cid: snapshot.cid.clone(),
        state: resolution.state,
        stored_state: snapshot.state,
        state_source: resolution.source,
        expired,
        poster_stake: snapshot.poster_stake,
        freelancer_stake: snapshot.freelancer_stake,
        total_escrow: snapshot.total_escrow,
        apply_deadline: snapshot.apply_deadline,
        started_at: snapshot.started_at,
        milestones,
        mutual_cancel_requested_by,
        freelancer_withdraw_requested_by,
        dispute_id: snapshot.dispute_id,
        dispute_winner: snapshot.dispute_winner,
    }
}

/// Apply milestone events on top of the stored milestone. Events only move
/// a milestone forward, and never straight from `Pending` to `Accepted`
/// without a recorded submission.
fn overlay_milestone(
    stored: &Milestone,
    history: &JobHistory,
    reopened: bool,
    freelancer: Option<&Address>,
) -> MilestoneView {
    let id = stored.id;
    let mut milestone = stored.clone();
    let submission = history.submission(id);
    let accepted_at = history.accepted_at(id);
    let rejected_at = history.rejected_at(id);
    let claim = history.claim_timeout(id).cloned();

    if reopened {
        if stored.status != MilestoneStatus::Accepted && accepted_at.is_none() {
            milestone.status = MilestoneStatus::Pending;
            milestone.deadline = 0;
            milestone.review_deadline = 0;
            milestone.evidence_cid = None;
        } else {
            milestone.status = MilestoneStatus::Accepted;
        }
        return MilestoneView {
            milestone,
            stored_status: stored.status,
            actions: MilestoneActions::default(),
            claim_timeout: claim,
        };
    }

    let was_submitted =
        submission.is_some() || stored.status.rank() >= MilestoneStatus::Submitted.rank();
    let claimed_by_freelancer = match (claim.as_ref().and_then(|c| c.claimed_by.as_ref()), freelancer) {
        (Some(by), Some(f)) => by == f,
        _ => false,
    };

    let from_events = if history.dispute_resolution(id).is_some() {
        Some(MilestoneStatus::Accepted)
    } else if let Some(accepted) = accepted_at {
        match rejected_at {
            Some(rejected) if rejected > accepted => Some(MilestoneStatus::Rejected),
            _ => Some(MilestoneStatus::Accepted),
        }
    } else if claimed_by_freelancer && submission.is_some() {
        Some(MilestoneStatus::Accepted)
    } else if rejected_at.is_some() {
        Some(MilestoneStatus::Rejected)
    } else if submission.is_some() {
        Some(MilestoneStatus::Submitted)
    } else {
        None
    };

    if let Some(status) = from_events {
        let forward = status.rank() > stored.status.rank();
        let legal = status != MilestoneStatus::Accepted || was_submitted;
        if forward && legal {
            milestone.status = status;
        }
    }

    if let Some(sub) = submission {
        if milestone.evidence_cid.is_none() {
            milestone.evidence_cid = sub.evidence_cid.clone();
        }
        if milestone.status == MilestoneStatus::Submitted && milestone.review_deadline == 0 {
            milestone.review_deadline = sub.submitted_at.saturating_add(milestone.review_period);
        }
    }

    MilestoneView {
        milestone,
        stored_status: stored.status,
        actions: MilestoneActions::default(),
        claim_timeout: claim,
    }
}

/// Fill work deadlines the ledger leaves at 0 until a milestone becomes
/// current. The first milestone runs from the job start; a later one runs
/// from the completion of the accepted milestone before it, or from the
/// job start when that completion was not recorded.
fn derive_deadlines(
    milestones: &mut [MilestoneView],
    history: &JobHistory,
    started_at: Option<u64>,
    freelancer: Option<&Address>,
) {
    let mut previous: Option<(u64, MilestoneStatus)> = None;
    for view in milestones.iter_mut() {
        let m = &mut view.milestone;
        if m.deadline == 0 {
            let anchor = match previous {
                None => started_at,
                Some((prev_id, MilestoneStatus::Accepted)) => {
                    completed_at(history, prev_id, freelancer).or(started_at)
                }
                Some(_) => None,
            };
            if let Some(at) = anchor {
                m.deadline = at.saturating_add(m.duration);
            }
        }
        previous = Some((m.id, m.status));
    }
}

/// When a milestone stopped being current: dispute resolution, acceptance,
/// or the submission behind a freelancer's review-timeout claim.
fn completed_at(history: &JobHistory, milestone_id: u64, freelancer: Option<&Address>) -> Option<u64> {
    history
        .dispute_resolution(milestone_id)
        .map(|r| r.resolved_at)
        .or_else(|| history.accepted_at(milestone_id))
        .or_else(|| {
            let claim = history.claim_timeout(milestone_id)?;
            let by_freelancer = claim.claimed_by.is_some() && claim.claimed_by.as_ref() == freelancer;
            if by_freelancer {
                history.submission(milestone_id).map(|s| s.submitted_at)
            } else {
                None
            }
        })
}

fn review_expired(m: &Milestone, now: u64) -> bool {
    m.status == MilestoneStatus::Submitted && m.review_deadline > 0 && now > m.review_deadline
}

fn work_deadline_passed(m: &Milestone, now: u64) -> bool {
    m.status == MilestoneStatus::Pending && m.deadline > 0 && now > m.deadline
}

fn milestone_actions(m: &Milestone, state: JobState, prior_accepted: bool, now: u64) -> MilestoneActions {
    let expired = review_expired(m, now);
    if state != JobState::InProgress {
        return MilestoneActions {
            review_expired: expired,
            ..Default::default()
        };
    }
    let reviewable = m.status == MilestoneStatus::Submitted && !expired;
    MilestoneActions {
        can_submit: m.status == MilestoneStatus::Pending && prior_accepted && !work_deadline_passed(m, now),
        can_confirm: reviewable,
        can_reject: reviewable,
        can_open_dispute: m.status == MilestoneStatus::Rejected,
        freelancer_can_claim_timeout: expired,
        poster_can_claim_timeout: work_deadline_passed(m, now),
        review_expired: expired,
    }
}

/// A milestone action a client is about to sign.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MilestoneAction {
    Submit,
    Confirm,
    Reject,
    ClaimTimeout,
    OpenDispute,
}

impl MilestoneAction {
    pub fn as_str(self) -> &'static str {
        match self {
            MilestoneAction::Submit => "submit",
            MilestoneAction::Confirm => "confirm",
            MilestoneAction::Reject => "reject",
            MilestoneAction::ClaimTimeout => "claim-timeout",
            MilestoneAction::OpenDispute => "open-dispute",
        }
    }
}

impl FromStr for MilestoneAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submit" => Ok(MilestoneAction::Submit),
            "confirm" => Ok(MilestoneAction::Confirm),
            "reject" => Ok(MilestoneAction::Reject),
            "claim-timeout" => Ok(MilestoneAction::ClaimTimeout),
            "open-dispute" => Ok(MilestoneAction::OpenDispute),
            other => Err(format!("unknown milestone action: {other}")),
        }
    }
}

impl fmt::Display for MilestoneAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn wrong_status(m: &Milestone, required: &'static str) -> ActionError {
    ActionError::WrongStatus {
        milestone_id: m.id,
        status: m.status.to_string(),
        required,
    }
}

/// Reject an action locally when the derived state already rules it out,
/// before a transaction is built and sent.
pub fn check_action(
    job: &JobView,
    milestone_id: u64,
    action: MilestoneAction,
    now: u64,
) -> Result<(), ActionError> {
    let m = &job
        .milestone(milestone_id)
        .ok_or(ActionError::UnknownMilestone {
            job_id: job.id,
            milestone_id,
        })?
        .milestone;

    if job.state != JobState::InProgress {
        return Err(ActionError::JobNotActive {
            job_id: job.id,
            state: job.state.to_string(),
        });
    }

    match action {
        MilestoneAction::Submit => match m.status {
            MilestoneStatus::Pending => Ok(()),
            _ => Err(wrong_status(m, "Pending")),
        },
        MilestoneAction::Confirm | MilestoneAction::Reject => match m.status {
            MilestoneStatus::Submitted if review_expired(m, now) => {
                Err(ActionError::ReviewDeadlineExceeded {
                    milestone_id: m.id,
                    review_deadline: m.review_deadline,
                })
            }
            MilestoneStatus::Submitted => Ok(()),
            _ => Err(wrong_status(m, "Submitted")),
        },
        MilestoneAction::ClaimTimeout => match m.status {
            MilestoneStatus::Disputed => Err(ActionError::AlreadyDisputed { milestone_id: m.id }),
            MilestoneStatus::Submitted if review_expired(m, now) => Ok(()),
            MilestoneStatus::Pending if work_deadline_passed(m, now) => Ok(()),
            MilestoneStatus::Submitted => Err(ActionError::TimeoutNotReached {
                milestone_id: m.id,
                deadline: m.review_deadline,
            }),
            MilestoneStatus::Pending => Err(ActionError::TimeoutNotReached {
                milestone_id: m.id,
                deadline: m.deadline,
            }),
            _ => Err(wrong_status(m, "Pending or Submitted")),
        },
        MilestoneAction::OpenDispute => match m.status {
            MilestoneStatus::Disputed => Err(ActionError::AlreadyDisputed { milestone_id: m.id }),
            MilestoneStatus::Rejected => Ok(()),
            _ => Err(wrong_status(m, "Rejected")),
        },
    }
}

/// Derivation invariants. A violation is a defect signal: it is logged at
/// error level and returned, never coerced.
pub fn check_invariants(job: &JobView, history: &JobHistory) -> Result<(), InvariantViolation> {
    let result = invariant_violation(job, history).map_or(Ok(()), Err);
    if let Err(ref violation) = result {
        tracing::error!(job_id = job.id, %violation, "job derivation invariant violated");
    }
    result
}

fn invariant_violation(job: &JobView, history: &JobHistory) -> Option<InvariantViolation> {
    if job.state.requires_freelancer() && job.freelancer.is_none() {
        return Some(InvariantViolation::MissingFreelancer {
            job_id: job.id,
            state: job.state.to_string(),
        });
    }

    let created = history.created.as_ref()?;
    if created.milestones_count as usize != job.milestones.len() {
        return Some(InvariantViolation::MilestoneCountMismatch {
            job_id: job.id,
            expected: created.milestones_count,
            actual: job.milestones.len(),
        });
    }

    let milestone_sum = job
        .milestones
        .iter()
        .fold(0u64, |acc, m| acc.saturating_add(m.milestone.amount));
    if created.total_amount != milestone_sum {
        return Some(InvariantViolation::EscrowMismatch {
            job_id: job.id,
            total_escrow: created.total_amount,
            milestone_sum,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{JobApplied, JobCreated, JobStateChanged, MilestoneSubmitted};

    fn addr(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    fn milestone(id: u64, status: MilestoneStatus) -> Milestone {
        Milestone {
            id,
            amount: 100,
            duration: 1_000,
            deadline: 0,
            review_period: 500,
            review_deadline: 0,
            status,
            evidence_cid: None,
        }
    }

    fn job(state: JobState) -> Job {
        Job {
            id: 1,
            poster: Some(addr("0xaa")),
            freelancer: None,
            pending_freelancer: None,
            cid: Some(ContentPointer::new("QmJob")),
            state,
            poster_stake: 10,
            freelancer_stake: 0,
            total_escrow: 200,
            apply_deadline: 1_000,
            started_at: None,
            milestones: vec![
                milestone(1, MilestoneStatus::Pending),
                milestone(2, MilestoneStatus::Pending),
            ],
            mutual_cancel_requested_by: None,
            freelancer_withdraw_requested_by: None,
            dispute_id: None,
            dispute_winner: None,
        }
    }

    fn applied(h: &mut JobHistory, who: &str, at: u64) {
        h.applications.push(JobApplied {
            freelancer: addr(who),
            applied_at: at,
        });
    }

    fn changed(h: &mut JobHistory, old: JobState, new: JobState, at: u64) {
        h.state_changes.push(JobStateChanged {
            old_state: old,
            new_state: new,
            changed_at: at,
        });
    }

    fn in_progress_job() -> Job {
        let mut j = job(JobState::InProgress);
        j.freelancer = Some(addr("0xf"));
        j
    }

    #[test]
    fn posted_without_application_stays_posted() {
        let view = derive_job(&job(JobState::Posted), &JobHistory::new(1), 500);
        assert_eq!(view.state, JobState::Posted);
        assert_eq!(view.state_source, StateSource::Snapshot);
        assert!(!view.expired);
    }

    #[test]
    fn expiry_overlay_leaves_stored_state() {
        let view = derive_job(&job(JobState::Posted), &JobHistory::new(1), 2_000);
        assert!(view.expired);
        assert_eq!(view.state, JobState::Posted);
        assert_eq!(view.stored_state, JobState::Posted);
    }

    #[test]
    fn application_newer_than_state_change_wins() {
        let mut h = JobHistory::new(1);
        changed(&mut h, JobState::PendingApproval, JobState::Posted, 100);
        applied(&mut h, "0xf", 200);
        // Snapshot has not caught up with the application yet.
        let view = derive_job(&job(JobState::Posted), &h, 300);
        assert_eq!(view.state, JobState::PendingApproval);
        assert_eq!(view.state_source, StateSource::Application);
        assert_eq!(view.pending_freelancer, Some(addr("0xf")));
        assert_eq!(view.freelancer, None);
    }

    #[test]
    fn application_without_state_change_is_pending() {
        let mut h = JobHistory::new(1);
        applied(&mut h, "0xf", 200);
        let view = derive_job(&job(JobState::Posted), &h, 300);
        assert_eq!(view.state, JobState::PendingApproval);
    }

    #[test]
    fn approval_after_application_is_in_progress() {
        let mut h = JobHistory::new(1);
        applied(&mut h, "0xf", 200);
        changed(&mut h, JobState::PendingApproval, JobState::InProgress, 250);
        let view = derive_job(&job(JobState::PendingApproval), &h, 300);
        assert_eq!(view.state, JobState::InProgress);
        assert_eq!(view.state_source, StateSource::Approval);
        assert_eq!(view.freelancer, Some(addr("0xf")));
        assert_eq!(view.pending_freelancer, None);
    }

    #[test]
    fn rejection_after_application_reposts() {
        let mut h = JobHistory::new(1);
        applied(&mut h, "0xf", 200);
        changed(&mut h, JobState::PendingApproval, JobState::Posted, 250);
        let view = derive_job(&job(JobState::PendingApproval), &h, 300);
        assert_eq!(view.state, JobState::Posted);
        assert_eq!(view.state_source, StateSource::Rejection);
        assert_eq!(view.pending_freelancer, None);
    }

    #[test]
    fn approval_wins_only_when_strictly_later() {
        let mut h = JobHistory::new(1);
        applied(&mut h, "0xf", 200);
        changed(&mut h, JobState::PendingApproval, JobState::Posted, 250);
        changed(&mut h, JobState::PendingApproval, JobState::InProgress, 250);
        let view = derive_job(&job(JobState::PendingApproval), &h, 300);
        assert_eq!(view.state, JobState::Posted);

        changed(&mut h, JobState::PendingApproval, JobState::InProgress, 260);
        let view = derive_job(&job(JobState::PendingApproval), &h, 300);
        assert_eq!(view.state, JobState::InProgress);
    }

    #[test]
    fn stale_approval_before_application_is_ignored() {
        let mut h = JobHistory::new(1);
        changed(&mut h, JobState::PendingApproval, JobState::InProgress, 100);
        changed(&mut h, JobState::InProgress, JobState::Posted, 150);
        applied(&mut h, "0xf", 140);
        let view = derive_job(&job(JobState::Posted), &h, 300);
        assert_eq!(view.state, JobState::Posted);
        assert_eq!(view.state_source, StateSource::Snapshot);

        // An approval later undone by a newer state change.
        let mut h = JobHistory::new(1);
        applied(&mut h, "0xf", 200);
        changed(&mut h, JobState::PendingApproval, JobState::InProgress, 250);
        changed(&mut h, JobState::InProgress, JobState::Posted, 600);
        let view = derive_job(&job(JobState::Posted), &h, 700);
        assert_eq!(view.state, JobState::Posted);
        assert_eq!(view.state_source, StateSource::Snapshot);
        assert_eq!(view.freelancer, None);
    }

    #[test]
    fn first_deadline_runs_from_job_start() {
        let mut snap = in_progress_job();
        snap.started_at = Some(100);
        snap.milestones[0].duration = 50;
        let view = derive_job(&snap, &JobHistory::new(1), 1_000);

        let first = &view.milestones[0];
        assert_eq!(first.milestone.deadline, 150);
        assert!(first.actions.poster_can_claim_timeout);
        assert!(!first.actions.can_submit);
        assert_eq!(check_action(&view, 1, MilestoneAction::ClaimTimeout, 1_000), Ok(()));
        // The second milestone is not current yet.
        assert_eq!(view.milestones[1].milestone.deadline, 0);
    }

    #[test]
    fn next_deadline_runs_from_previous_acceptance() {
        let mut snap = in_progress_job();
        snap.started_at = Some(100);
        snap.milestones[0].status = MilestoneStatus::Accepted;
        snap.milestones[0].deadline = 1_100;
        let mut h = JobHistory::new(1);
        h.acceptances.push((1, 400));
        let view = derive_job(&snap, &h, 500);
        assert_eq!(view.milestones[1].milestone.deadline, 1_400);
        assert!(view.milestones[1].actions.can_submit);

        // Without a recorded acceptance the job start is the anchor.
        let view = derive_job(&snap, &JobHistory::new(1), 500);
        assert_eq!(view.milestones[1].milestone.deadline, 1_100);
    }

    #[test]
    fn stored_deadline_is_kept_and_posted_jobs_get_none() {
        let mut snap = in_progress_job();
        snap.started_at = Some(100);
        snap.milestones[0].deadline = 5_000;
        let view = derive_job(&snap, &JobHistory::new(1), 500);
        assert_eq!(view.milestones[0].milestone.deadline, 5_000);

        let mut posted = job(JobState::Posted);
        posted.started_at = Some(100);
        let view = derive_job(&posted, &JobHistory::new(1), 500);
        assert_eq!(view.milestones[0].milestone.deadline, 0);
    }

    #[test]
    fn terminal_snapshot_wins_over_events() {
        let mut h = JobHistory::new(1);
        applied(&mut h, "0xf", 900);
        let mut snap = in_progress_job();
        snap.state = JobState::Completed;
        let view = derive_job(&snap, &h, 1_000);
        assert_eq!(view.state, JobState::Completed);
        assert_eq!(view.state_source, StateSource::Snapshot);
    }

    #[test]
    fn poster_claim_timeout_reopens_job() {
        let mut h = JobHistory::new(1);
        applied(&mut h, "0xf", 200);
        changed(&mut h, JobState::PendingApproval, JobState::InProgress, 250);
        h.claim_timeouts.push(ClaimTimeout {
            milestone_id: 1,
            claimed_by: Some(addr("0xaa")),
            claimed_at: 900,
            freelancer_stake_claimed: 5,
        });
        let view = derive_job(&in_progress_job(), &h, 1_000);
        assert_eq!(view.state, JobState::Posted);
        assert_eq!(view.state_source, StateSource::ClaimTimeout);
        assert_eq!(view.freelancer, None);
        assert!(view.milestones.iter().all(|m| m.milestone.status == MilestoneStatus::Pending));
        assert!(view.milestones[0].claim_timeout.is_some());
    }

    #[test]
    fn submission_event_advances_milestone_and_sets_review_deadline() {
        let mut h = JobHistory::new(1);
        h.submissions.push(MilestoneSubmitted {
            milestone_id: 1,
            evidence_cid: Some(ContentPointer::new("QmEvidence")),
            submitted_at: 400,
        });
        let view = derive_job(&in_progress_job(), &h, 450);
        let m = &view.milestones[0];
        assert_eq!(m.milestone.status, MilestoneStatus::Submitted);
        assert_eq!(m.stored_status, MilestoneStatus::Pending);
        assert_eq!(m.milestone.review_deadline, 900);
        assert!(m.actions.can_confirm);
        assert!(!m.actions.freelancer_can_claim_timeout);
    }

    #[test]
    fn acceptance_without_submission_does_not_skip_submitted() {
        let mut h = JobHistory::new(1);
        h.acceptances.push((1, 500));
        let view = derive_job(&in_progress_job(), &h, 600);
        assert_eq!(view.milestones[0].milestone.status, MilestoneStatus::Pending);
    }

    #[test]
    fn events_never_move_a_milestone_backwards() {
        let mut snap = in_progress_job();
        snap.milestones[0].status = MilestoneStatus::Accepted;
        let mut h = JobHistory::new(1);
        h.submissions.push(MilestoneSubmitted {
            milestone_id: 1,
            evidence_cid: None,
            submitted_at: 400,
        });
        let view = derive_job(&snap, &h, 600);
        assert_eq!(view.milestones[0].milestone.status, MilestoneStatus::Accepted);
        assert!(view.milestones[1].actions.can_submit);
    }

    #[test]
    fn expired_review_blocks_confirm_and_reject() {
        let mut snap = in_progress_job();
        snap.milestones[0].status = MilestoneStatus::Submitted;
        snap.milestones[0].review_deadline = 900;
        let view = derive_job(&snap, &JobHistory::new(1), 1_000);

        let m = &view.milestones[0];
        assert!(m.actions.review_expired);
        assert!(m.actions.freelancer_can_claim_timeout);
        assert!(!m.actions.can_confirm);

        for action in [MilestoneAction::Confirm, MilestoneAction::Reject] {
            let err = check_action(&view, 1, action, 1_000).unwrap_err();
            assert!(matches!(err, ActionError::ReviewDeadlineExceeded { review_deadline: 900, .. }));
            assert!(err.to_string().contains("review deadline"));
        }
        assert_eq!(check_action(&view, 1, MilestoneAction::ClaimTimeout, 1_000), Ok(()));
    }

    #[test]
    fn review_within_deadline_is_allowed() {
        let mut snap = in_progress_job();
        snap.milestones[0].status = MilestoneStatus::Submitted;
        snap.milestones[0].review_deadline = 900;
        let view = derive_job(&snap, &JobHistory::new(1), 800);
        assert_eq!(check_action(&view, 1, MilestoneAction::Confirm, 800), Ok(()));
        assert!(matches!(
            check_action(&view, 1, MilestoneAction::ClaimTimeout, 800),
            Err(ActionError::TimeoutNotReached { deadline: 900, .. })
        ));
    }

    #[test]
    fn check_action_rejects_unknown_and_inactive() {
        let view = derive_job(&in_progress_job(), &JobHistory::new(1), 10);
        assert!(matches!(
            check_action(&view, 9, MilestoneAction::Submit, 10),
            Err(ActionError::UnknownMilestone { milestone_id: 9, .. })
        ));
        let posted = derive_job(&job(JobState::Posted), &JobHistory::new(1), 10);
        assert!(matches!(
            check_action(&posted, 1, MilestoneAction::Submit, 10),
            Err(ActionError::JobNotActive { .. })
        ));
        assert!(matches!(
            check_action(&view, 1, MilestoneAction::OpenDispute, 10),
            Err(ActionError::WrongStatus { required: "Rejected", .. })
        ));
    }

    #[test]
    fn action_names_parse() {
        assert_eq!("claim-timeout".parse::<MilestoneAction>(), Ok(MilestoneAction::ClaimTimeout));
        assert!("approve".parse::<MilestoneAction>().is_err());
    }

    #[test]
    fn request_events_refresh_snapshot_requesters() {
        let mut snap = in_progress_job();
        snap.mutual_cancel_requested_by = Some(addr("0xaa"));
        let mut h = JobHistory::new(1);
        h.mutual_cancel_requests.push(crate::events::CancelRequest {
            requested_by: None,
            requested_at: 700,
            sequence_number: 4,
        });
        h.withdraw_requests.push(crate::events::CancelRequest {
            requested_by: Some(addr("0xf")),
            requested_at: 710,
            sequence_number: 5,
        });
        let view = derive_job(&snap, &h, 800);
        assert_eq!(view.mutual_cancel_requested_by, None);
        assert_eq!(view.freelancer_withdraw_requested_by, Some(addr("0xf")));
    }

    #[test]
    fn invariants() {
        let mut h = JobHistory::new(1);
        let view = derive_job(&in_progress_job(), &h, 10);
        assert_eq!(check_invariants(&view, &h), Ok(()));

        h.created = Some(JobCreated {
            job_id: 1,
            poster: Some(addr("0xaa")),
            cid: None,
            total_amount: 200,
            milestones_count: 3,
            apply_deadline: 1_000,
            created_at: 1,
        });
        assert!(matches!(
            check_invariants(&view, &h),
            Err(InvariantViolation::MilestoneCountMismatch { expected: 3, actual: 2, .. })
        ));

        if let Some(created) = h.created.as_mut() {
            created.milestones_count = 2;
            created.total_amount = 250;
        }
        assert!(matches!(
            check_invariants(&view, &h),
            Err(InvariantViolation::EscrowMismatch { milestone_sum: 200, .. })
        ));

        let mut orphan = in_progress_job();
        orphan.freelancer = None;
        let view = derive_job(&orphan, &JobHistory::new(1), 10);
        assert!(matches!(
            check_invariants(&view, &JobHistory::new(1)),
            Err(InvariantViolation::MissingFreelancer { .. })
        ));
    }
}
