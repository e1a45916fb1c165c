//! Application-level marketplace entities.
//!
//! These are the strongly-typed forms of the contract's table items. They
//! carry what the ledger stored; the effective (derived) view lives in
//! [`crate::job_state`] and [`crate::dispute`].

use crate::address::Address;
use crate::decode::VariantTag;
use serde::Serialize;
use std::fmt;

/// Opaque off-chain content identifier.
///
/// The core never interprets the pointer's format; it may be a bare CID or
/// an application-level wrapped form resolved elsewhere.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ContentPointer(String);

impl ContentPointer {
    pub fn new(raw: impl Into<String>) -> Self {
        ContentPointer(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum JobState {
    Posted,
    PendingApproval,
    InProgress,
    Completed,
    Disputed,
    Cancelled,
    CancelledByPoster,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Posted => "Posted",
            JobState::PendingApproval => "PendingApproval",
            JobState::InProgress => "InProgress",
            JobState::Completed => "Completed",
            JobState::Disputed => "Disputed",
            JobState::Cancelled => "Cancelled",
            JobState::CancelledByPoster => "CancelledByPoster",
        }
    }

    /// No further lifecycle transitions happen from these states.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Cancelled | JobState::CancelledByPoster
        )
    }

    /// States in which an approved freelancer must be present.
    pub fn requires_freelancer(self) -> bool {
        matches!(
            self,
            JobState::InProgress | JobState::Completed | JobState::Disputed
        )
    }
}

/// Fallback `Posted`: an undecodable state is shown as the initial state,
/// which exposes no actions beyond applying.
impl VariantTag for JobState {
    const KIND: &'static str = "job state";
    const FALLBACK: Self = JobState::Posted;

    fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "Posted" => JobState::Posted,
            "PendingApproval" => JobState::PendingApproval,
            "InProgress" => JobState::InProgress,
            "Completed" => JobState::Completed,
            "Disputed" => JobState::Disputed,
            "Cancelled" => JobState::Cancelled,
            "CancelledByPoster" => JobState::CancelledByPoster,
            _ => return None,
        })
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Milestone status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum MilestoneStatus {
    Pending,
    Submitted,
    Accepted,
    Rejected,
    Disputed,
}

impl MilestoneStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MilestoneStatus::Pending => "Pending",
            MilestoneStatus::Submitted => "Submitted",
            MilestoneStatus::Accepted => "Accepted",
            MilestoneStatus::Rejected => "Rejected",
            MilestoneStatus::Disputed => "Disputed",
        }
    }

    /// Position in the forward-only lifecycle. Statuses past `Submitted`
    /// share a rank; moving between them is the ledger's call.
    pub fn rank(self) -> u8 {
        match self {
            MilestoneStatus::Pending => 0,
            MilestoneStatus::Submitted => 1,
            MilestoneStatus::Accepted | MilestoneStatus::Rejected | MilestoneStatus::Disputed => 2,
        }
    }
}

/// Fallback `Pending`. `Locked` (a rejected milestone frozen while the
/// freelancer may dispute) decodes as `Rejected`.
impl VariantTag for MilestoneStatus {
    const KIND: &'static str = "milestone status";
    const FALLBACK: Self = MilestoneStatus::Pending;

    fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "Pending" => MilestoneStatus::Pending,
            "Submitted" => MilestoneStatus::Submitted,
            "Accepted" => MilestoneStatus::Accepted,
            "Rejected" | "Locked" => MilestoneStatus::Rejected,
            "Disputed" => MilestoneStatus::Disputed,
            _ => return None,
        })
    }
}

impl fmt::Display for MilestoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispute status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum DisputeStatus {
    Open,
    Voting,
    Resolved,
}

/// Fallback `Open`. Numeric discriminants `0`, `1`, `2` are accepted.
impl VariantTag for DisputeStatus {
    const KIND: &'static str = "dispute status";
    const FALLBACK: Self = DisputeStatus::Open;

    fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "Open" | "0" => DisputeStatus::Open,
            "Voting" | "1" => DisputeStatus::Voting,
            "Resolved" | "2" => DisputeStatus::Resolved,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Milestone {
    /// 1-based position within the job
    pub id: u64,
    pub amount: u64,
    pub duration: u64,
    pub deadline: u64,
    pub review_period: u64,
    pub review_deadline: u64,
    pub status: MilestoneStatus,
    pub evidence_cid: Option<ContentPointer>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Job {
    pub id: u64,
    pub poster: Option<Address>,
    /// Approved freelancer
    pub freelancer: Option<Address>,
    /// Applicant awaiting the poster's approval
    pub pending_freelancer: Option<Address>,
    pub cid: Option<ContentPointer>,
    pub state: JobState,
    pub poster_stake: u64,
    pub freelancer_stake: u64,
    pub total_escrow: u64,
    pub apply_deadline: u64,
    pub started_at: Option<u64>,
    pub milestones: Vec<Milestone>,
    pub mutual_cancel_requested_by: Option<Address>,
    pub freelancer_withdraw_requested_by: Option<Address>,
    pub dispute_id: Option<u64>,
    /// `true` when a resolved dispute favored the freelancer
    pub dispute_winner: Option<bool>,
}

impl Job {
    pub fn milestone(&self, id: u64) -> Option<&Milestone> {
        self.milestones.iter().find(|m| m.id == id)
    }
}

/// One reviewer's vote. `choice == true` favors the freelancer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Vote {
    pub reviewer: Address,
    pub choice: bool,
}

/// Who last re-drew the reviewer panel, and when.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Reselection {
    pub by: Address,
    pub at: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Dispute {
    pub id: u64,
    pub job_id: u64,
    pub milestone_id: u64,
    pub poster: Option<Address>,
    pub freelancer: Option<Address>,
    pub poster_evidence_cid: Option<ContentPointer>,
    pub freelancer_evidence_cid: Option<ContentPointer>,
    pub status: DisputeStatus,
    pub selected_reviewers: Vec<Address>,
    pub votes: Vec<Vote>,
    pub created_at: u64,
    pub last_vote_time: u64,
    pub initial_vote_deadline: u64,
    pub reselection: Option<Reselection>,
}
