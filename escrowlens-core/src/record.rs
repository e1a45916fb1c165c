//! Table item decoding: raw `escrow::Job` / `dispute::Dispute` JSON into
//! the typed model. Total: missing or malformed fields take the decoder
//! fallbacks and are logged, they never fail the record.

use crate::decode::{
    decode_address, decode_address_list, decode_optional_address, decode_optional_bool,
    decode_optional_u64, decode_text_payload, decode_u64, decode_variant, field,
};
use crate::model::{ContentPointer, Dispute, Job, Milestone, Reselection, Vote};
use serde_json::Value;

fn pointer(value: &Value, name: &str) -> Option<ContentPointer> {
    decode_text_payload(value, name).map(ContentPointer::new)
}

/// Decode a job table item. `job_id` is the table key, used when the item
/// omits its own `id`.
pub fn decode_job(job_id: u64, item: &Value) -> Job {
    let id = match field(item, "id") {
        Value::Null => job_id,
        v => decode_u64(v, "job.id"),
    };

    let milestones = field(item, "milestones")
        .as_array()
        .map(|list| {
            list.iter()
                .enumerate()
                .map(|(idx, m)| decode_milestone(idx, m))
                .collect()
        })
        .unwrap_or_default();

    Job {
        id,
        poster: decode_address(field(item, "poster"), "job.poster"),
        freelancer: decode_optional_address(field(item, "freelancer"), "job.freelancer"),
        pending_freelancer: decode_optional_address(
            field(item, "pending_freelancer"),
            "job.pending_freelancer",
        ),
        cid: pointer(field(item, "cid"), "job.cid"),
        state: decode_variant(field(item, "state"), "job.state"),
        poster_stake: decode_u64(field(item, "poster_stake"), "job.poster_stake"),
        freelancer_stake: decode_u64(field(item, "freelancer_stake"), "job.freelancer_stake"),
        total_escrow: decode_u64(field(item, "total_escrow"), "job.total_escrow"),
        apply_deadline: decode_u64(field(item, "apply_deadline"), "job.apply_deadline"),
        started_at: decode_optional_u64(field(item, "started_at"), "job.started_at"),
        milestones,
        mutual_cancel_requested_by: decode_optional_address(
            field(item, "mutual_cancel_requested_by"),
            "job.mutual_cancel_requested_by",
        ),
        freelancer_withdraw_requested_by: decode_optional_address(
            field(item, "freelancer_withdraw_requested_by"),
            "job.freelancer_withdraw_requested_by",
        ),
        dispute_id: decode_optional_u64(field(item, "dispute_id"), "job.dispute_id"),
        dispute_winner: decode_optional_bool(field(item, "dispute_winner"), "job.dispute_winner"),
    }
}

fn decode_milestone(idx: usize, m: &Value) -> Milestone {
    // Items without an id are numbered by position, 1-based.
    let id = match field(m, "id") {
        Value::Null => idx as u64 + 1,
        v => decode_u64(v, "milestone.id"),
    };
    Milestone {
        id,
        amount: decode_u64(field(m, "amount"), "milestone.amount"),
        duration: decode_u64(field(m, "duration"), "milestone.duration"),
        deadline: decode_u64(field(m, "deadline"), "milestone.deadline"),
        review_period: decode_u64(field(m, "review_period"), "milestone.review_period"),
        review_deadline: decode_u64(field(m, "review_deadline"), "milestone.review_deadline"),
        status: decode_variant(field(m, "status"), "milestone.status"),
        evidence_cid: pointer(field(m, "evidence_cid"), "milestone.evidence_cid"),
    }
}

/// Decode a dispute table item.
pub fn decode_dispute(dispute_id: u64, item: &Value) -> Dispute {
    let id = match field(item, "id") {
        Value::Null => dispute_id,
        v => decode_u64(v, "dispute.id"),
    };

    let votes = field(item, "votes")
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|v| {
                    let reviewer = decode_address(field(v, "reviewer"), "vote.reviewer")?;
                    // Undecided until the choice reads cleanly; the reviewer
                    // stays pending in the tally.
                    let Some(choice) = decode_optional_bool(field(v, "choice"), "vote.choice")
                    else {
                        tracing::warn!(
                            dispute_id = id,
                            field = "vote.choice",
                            %reviewer,
                            "vote without a readable choice dropped"
                        );
                        return None;
                    };
                    Some(Vote { reviewer, choice })
                })
                .collect()
        })
        .unwrap_or_default();

    let reselection = decode_optional_address(
        field(item, "last_reselection_by"),
        "dispute.last_reselection_by",
    )
    .map(|by| Reselection {
        by,
        at: decode_u64(
            field(item, "last_reselection_time"),
            "dispute.last_reselection_time",
        ),
    });

    Dispute {
        id,
        job_id: decode_u64(field(item, "job_id"), "dispute.job_id"),
        milestone_id: decode_u64(field(item, "milestone_id"), "dispute.milestone_id"),
        poster: decode_address(field(item, "poster"), "dispute.poster"),
        freelancer: decode_address(field(item, "freelancer"), "dispute.freelancer"),
        poster_evidence_cid: pointer(
            field(item, "poster_evidence_cid"),
            "dispute.poster_evidence_cid",
        ),
        freelancer_evidence_cid: pointer(
            field(item, "freelancer_evidence_cid"),
            "dispute.freelancer_evidence_cid",
        ),
        status: decode_variant(field(item, "status"), "dispute.status"),
        selected_reviewers: decode_address_list(
            field(item, "selected_reviewers"),
            "dispute.selected_reviewers",
        ),
        votes,
        created_at: decode_u64(field(item, "created_at"), "dispute.created_at"),
        last_vote_time: decode_u64(field(item, "last_vote_time"), "dispute.last_vote_time"),
        initial_vote_deadline: decode_u64(
            field(item, "initial_vote_deadline"),
            "dispute.initial_vote_deadline",
        ),
        reselection,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::model::{DisputeStatus, JobState, MilestoneStatus};
    use serde_json::json;

    fn addr(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    #[test]
    fn decodes_job_item() {
        let item = json!({
            "id": "7",
            "poster": "0x00A1",
            "freelancer": {"vec": []},
            "pending_freelancer": {"vec": ["0xb2"]},
            "cid": "0x516d4a6f62",
            "state": {"__variant__": "PendingApproval"},
            "poster_stake": "100",
            "freelancer_stake": "0",
            "total_escrow": "300",
            "apply_deadline": "1700000000",
            "started_at": {"vec": []},
            "dispute_id": {"vec": []},
            "dispute_winner": {"vec": []},
            "mutual_cancel_requested_by": {"vec": ["0x0"]},
            "freelancer_withdraw_requested_by": {"vec": []},
            "milestones": [
                {"id": "1", "amount": "100", "duration": "3600", "deadline": "0",
                 "review_period": "600", "review_deadline": "0",
                 "status": {"Pending": {}}, "evidence_cid": {"vec": []}},
                {"amount": "200", "duration": "3600", "deadline": "0",
                 "review_period": "600", "review_deadline": "0",
                 "status": "Locked", "evidence_cid": {"vec": [[81, 109]]}}
            ]
        });

        let job = decode_job(7, &item);
        assert_eq!(job.id, 7);
        assert_eq!(job.poster, Some(addr("0xa1")));
        assert_eq!(job.freelancer, None);
        assert_eq!(job.pending_freelancer, Some(addr("0xb2")));
        assert_eq!(job.cid.as_ref().map(|c| c.as_str()), Some("QmJob"));
        assert_eq!(job.state, JobState::PendingApproval);
        assert_eq!(job.total_escrow, 300);
        assert_eq!(job.mutual_cancel_requested_by, None);
        assert_eq!(job.milestones.len(), 2);
        assert_eq!(job.milestones[1].id, 2);
        assert_eq!(job.milestones[1].status, MilestoneStatus::Rejected);
        assert_eq!(
            job.milestones[1].evidence_cid.as_ref().map(|c| c.as_str()),
            Some("Qm")
        );
    }

    #[test]
    fn job_item_missing_fields_take_fallbacks() {
        let job = decode_job(3, &json!({"state": 42}));
        assert_eq!(job.id, 3);
        assert_eq!(job.state, JobState::Posted);
        assert!(job.milestones.is_empty());
        assert_eq!(job.poster, None);
    }

    #[test]
    fn decodes_dispute_item() {
        let item = json!({
            "id": "4",
            "job_id": "7",
            "milestone_id": "2",
            "poster": "0xa1",
            "freelancer": "0xb2",
            "poster_evidence_cid": {"vec": ["QmP"]},
            "freelancer_evidence_cid": {"vec": []},
            "status": {"Voting": {}},
            "selected_reviewers": ["0xc1", "0xc2", "0xc3"],
            "votes": [
                {"reviewer": "0xc1", "choice": true},
                {"reviewer": "0xc2", "choice": false}
            ],
            "created_at": "100",
            "last_reselection_time": "150",
            "last_reselection_by": {"vec": ["0xa1"]},
            "last_vote_time": "200",
            "initial_vote_deadline": "400"
        });
        let d = decode_dispute(4, &item);
        assert_eq!(d.status, DisputeStatus::Voting);
        assert_eq!(d.selected_reviewers.len(), 3);
        assert_eq!(d.votes.len(), 2);
        assert!(d.votes[0].choice);
        assert_eq!(d.poster_evidence_cid.as_ref().map(|c| c.as_str()), Some("QmP"));
        assert_eq!(d.freelancer_evidence_cid, None);
        assert_eq!(
            d.reselection,
            Some(Reselection {
                by: addr("0xa1"),
                at: 150
            })
        );
    }

    #[test]
    fn vote_without_choice_is_left_undecided() {
        let item = json!({
            "job_id": "7",
            "status": "Voting",
            "selected_reviewers": ["0xc1", "0xc2", "0xc3"],
            "votes": [
                {"reviewer": "0xc1", "choice": true},
                {"reviewer": "0xc2"},
                {"reviewer": "0xc3", "choice": "maybe"}
            ]
        });
        let d = decode_dispute(5, &item);
        assert_eq!(d.votes.len(), 1);
        assert_eq!(d.votes[0].reviewer, addr("0xc1"));

        let t = crate::dispute::tally(&d, crate::dispute::QuorumPolicy::default());
        assert_eq!(t.for_freelancer, 1);
        assert_eq!(t.for_poster, 0);
        assert_eq!(t.pending_reviewers, vec![addr("0xc2"), addr("0xc3")]);
    }
}
