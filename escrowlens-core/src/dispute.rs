//! Dispute vote tally and provisional winner.

use crate::address::Address;
use crate::error::InvariantViolation;
use crate::model::{ContentPointer, Dispute, DisputeStatus, Reselection, Vote};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// How many votes decide a dispute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "policy", content = "size", rename_all = "kebab-case")]
pub enum QuorumPolicy {
    /// Every selected reviewer must vote.
    #[default]
    AllSelected,
    /// More than half of the selected reviewers.
    Majority,
    /// A fixed number of votes regardless of panel size.
    Fixed(usize),
}

impl QuorumPolicy {
    /// Required vote count for a panel of `selected` reviewers (at least 1).
    pub fn quorum(self, selected: usize) -> usize {
        let q = match self {
            QuorumPolicy::AllSelected => selected,
            QuorumPolicy::Majority => selected / 2 + 1,
            QuorumPolicy::Fixed(n) => n,
        };
        q.max(1)
    }

    /// Build from a configured name: `all-selected`, `majority`, or `fixed`
    /// (which takes `fixed_size`).
    pub fn from_name(name: &str, fixed_size: usize) -> Result<Self, String> {
        match name {
            "all-selected" => Ok(QuorumPolicy::AllSelected),
            "majority" => Ok(QuorumPolicy::Majority),
            "fixed" if fixed_size > 0 => Ok(QuorumPolicy::Fixed(fixed_size)),
            "fixed" => Err("fixed quorum policy needs a quorum size above zero".to_string()),
            other => Err(format!("unknown quorum policy: {other}")),
        }
    }
}

impl fmt::Display for QuorumPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuorumPolicy::AllSelected => f.write_str("all-selected"),
            QuorumPolicy::Majority => f.write_str("majority"),
            QuorumPolicy::Fixed(n) => write!(f, "fixed:{n}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Freelancer,
    Poster,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub for_freelancer: usize,
    pub for_poster: usize,
    pub votes_cast: usize,
    pub quorum: usize,
    pub quorum_reached: bool,
    /// Selected reviewers who have not voted, in panel order
    pub pending_reviewers: Vec<Address>,
    /// `None` below quorum or on a tie
    pub winner: Option<Side>,
}

pub fn tally(dispute: &Dispute, policy: QuorumPolicy) -> Tally {
    let for_freelancer = dispute.votes.iter().filter(|v| v.choice).count();
    let for_poster = dispute.votes.len() - for_freelancer;
    let votes_cast = dispute.votes.len();

    let voters: HashSet<&Address> = dispute.votes.iter().map(|v| &v.reviewer).collect();
    let pending_reviewers = dispute
        .selected_reviewers
        .iter()
        .filter(|r| !voters.contains(r))
        .cloned()
        .collect();

    let quorum = policy.quorum(dispute.selected_reviewers.len());
    let quorum_reached = votes_cast >= quorum;
    let winner = if !quorum_reached {
        None
    } else if for_freelancer > for_poster {
        Some(Side::Freelancer)
    } else if for_poster > for_freelancer {
        Some(Side::Poster)
    } else {
        None
    };

    Tally {
        for_freelancer,
        for_poster,
        votes_cast,
        quorum,
        quorum_reached,
        pending_reviewers,
        winner,
    }
}

/// Vote-set invariants. Votes from outside the selected panel are only
/// logged: panels can be re-drawn after a vote lands.
pub fn check_invariants(dispute: &Dispute) -> Result<(), InvariantViolation> {
    let result = vote_violation(dispute).map_or(Ok(()), Err);
    if let Err(ref violation) = result {
        tracing::error!(dispute_id = dispute.id, %violation, "dispute invariant violated");
    }
    result
}

fn vote_violation(dispute: &Dispute) -> Option<InvariantViolation> {
    let mut seen = HashSet::new();
    for Vote { reviewer, .. } in &dispute.votes {
        if !seen.insert(reviewer) {
            return Some(InvariantViolation::DuplicateVote {
                dispute_id: dispute.id,
                reviewer: reviewer.to_string(),
            });
        }
        if !dispute.selected_reviewers.contains(reviewer) {
            tracing::warn!(
                dispute_id = dispute.id,
                reviewer = %reviewer,
                "vote from a reviewer outside the selected panel"
            );
        }
    }
    if dispute.votes.len() > dispute.selected_reviewers.len() {
        return Some(InvariantViolation::VoteOverflow {
            dispute_id: dispute.id,
            votes: dispute.votes.len(),
            reviewers: dispute.selected_reviewers.len(),
        });
    }
    None
}

/// Derived dispute as served to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DisputeView {
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
    pub tally: Tally,
}

pub fn derive_dispute(dispute: &Dispute, policy: QuorumPolicy) -> DisputeView {
    let d = dispute.clone();
    DisputeView {
        tally: tally(dispute, policy),
        id: d.id,
        job_id: d.job_id,
        milestone_id: d.milestone_id,
        poster: d.poster,
        freelancer: d.freelancer,
        poster_evidence_cid: d.poster_evidence_cid,
        freelancer_evidence_cid: d.freelancer_evidence_cid,
        status: d.status,
        selected_reviewers: d.selected_reviewers,
        votes: d.votes,
        created_at: d.created_at,
        last_vote_time: d.last_vote_time,
        initial_vote_deadline: d.initial_vote_deadline,
        reselection: d.reselection,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    fn dispute(reviewers: &[&str], votes: &[(&str, bool)]) -> Dispute {
        Dispute {
            id: 9,
            job_id: 1,
            milestone_id: 1,
            poster: Some(addr("0xaa")),
            freelancer: Some(addr("0xbb")),
            poster_evidence_cid: None,
            freelancer_evidence_cid: None,
            status: DisputeStatus::Voting,
            selected_reviewers: reviewers.iter().map(|r| addr(r)).collect(),
            votes: votes
                .iter()
                .map(|(r, choice)| Vote {
                    reviewer: addr(r),
                    choice: *choice,
                })
                .collect(),
            created_at: 0,
            last_vote_time: 0,
            initial_vote_deadline: 0,
            reselection: None,
        }
    }

    #[test]
    fn split_vote_awaits_last_reviewer() {
        let d = dispute(&["0xa", "0xb", "0xc"], &[("0xa", true), ("0xb", false)]);
        let t = tally(&d, QuorumPolicy::AllSelected);
        assert_eq!(t.for_freelancer, 1);
        assert_eq!(t.for_poster, 1);
        assert_eq!(t.quorum, 3);
        assert!(!t.quorum_reached);
        assert_eq!(t.winner, None);
        assert_eq!(t.pending_reviewers, vec![addr("0xc")]);
    }

    #[test]
    fn full_panel_decides() {
        let d = dispute(
            &["0xa", "0xb", "0xc"],
            &[("0xa", true), ("0xb", false), ("0xc", true)],
        );
        let t = tally(&d, QuorumPolicy::AllSelected);
        assert!(t.quorum_reached);
        assert_eq!(t.winner, Some(Side::Freelancer));
        assert!(t.pending_reviewers.is_empty());
    }

    #[test]
    fn tie_at_quorum_has_no_winner() {
        let d = dispute(&["0xa", "0xb", "0xc"], &[("0xa", true), ("0xb", false)]);
        let t = tally(&d, QuorumPolicy::Fixed(2));
        assert!(t.quorum_reached);
        assert_eq!(t.winner, None);
    }

    #[test]
    fn majority_policy() {
        assert_eq!(QuorumPolicy::Majority.quorum(3), 2);
        assert_eq!(QuorumPolicy::Majority.quorum(4), 3);
        assert_eq!(QuorumPolicy::AllSelected.quorum(0), 1);
        let d = dispute(&["0xa", "0xb", "0xc"], &[("0xa", false), ("0xb", false)]);
        assert_eq!(tally(&d, QuorumPolicy::Majority).winner, Some(Side::Poster));
    }

    #[test]
    fn policy_parsing() {
        assert_eq!(QuorumPolicy::from_name("majority", 0), Ok(QuorumPolicy::Majority));
        assert_eq!(QuorumPolicy::from_name("fixed", 5), Ok(QuorumPolicy::Fixed(5)));
        assert!(QuorumPolicy::from_name("fixed", 0).is_err());
        assert!(QuorumPolicy::from_name("most", 3).is_err());
        assert_eq!(QuorumPolicy::Fixed(3).to_string(), "fixed:3");
    }

    #[test]
    fn duplicate_and_overflow_votes_are_violations() {
        let dup = dispute(&["0xa", "0xb"], &[("0xa", true), ("0xa", false)]);
        assert!(matches!(
            check_invariants(&dup),
            Err(InvariantViolation::DuplicateVote { .. })
        ));

        let overflow = dispute(&["0xa"], &[("0xa", true), ("0xb", false)]);
        assert!(matches!(
            check_invariants(&overflow),
            Err(InvariantViolation::VoteOverflow { votes: 2, reviewers: 1, .. })
        ));

        let outsider = dispute(&["0xa", "0xb"], &[("0xc", true)]);
        assert_eq!(check_invariants(&outsider), Ok(()));
    }

    #[test]
    fn view_carries_tally() {
        let d = dispute(&["0xa"], &[("0xa", true)]);
        let view = derive_dispute(&d, QuorumPolicy::default());
        assert_eq!(view.tally.winner, Some(Side::Freelancer));
        assert_eq!(view.votes.len(), 1);
    }
}
