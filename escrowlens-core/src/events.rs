//! Contract event streams and per-job event history.
//!
//! Event records come back from the ledger as `{sequence_number, data}`
//! with every integer printed as a string. Each stream decodes into a small
//! typed struct; [`JobHistory`] gathers the records relevant to one job.

use crate::address::Address;
use crate::cache::CacheScope;
use crate::decode::{
    decode_address, decode_optional_address, decode_optional_bool, decode_text_payload,
    decode_u64, decode_variant, field, parse_u64,
};
use crate::model::{ContentPointer, JobState};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Contract resource that owns an event stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventStore {
    Escrow,
    Dispute,
    Reputation,
}

impl EventStore {
    /// `module::Resource` path within the contract
    pub fn resource_path(self) -> &'static str {
        match self {
            EventStore::Escrow => "escrow::EscrowStore",
            EventStore::Dispute => "dispute::DisputeStore",
            EventStore::Reputation => "reputation::RepStore",
        }
    }
}

/// The event streams the reconciliation layer reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStream {
    JobCreated,
    JobApplied,
    JobStateChanged,
    MilestoneSubmitted,
    MilestoneAccepted,
    MilestoneRejected,
    ClaimTimeout,
    MutualCancelRequested,
    FreelancerWithdrawRequested,
    DisputeOpened,
    DisputeResolved,
    ReputationChanged,
}

impl EventStream {
    /// Streams consulted when deriving one job.
    pub const JOB_HISTORY: [EventStream; 10] = [
        EventStream::JobCreated,
        EventStream::JobApplied,
        EventStream::JobStateChanged,
        EventStream::MilestoneSubmitted,
        EventStream::MilestoneAccepted,
        EventStream::MilestoneRejected,
        EventStream::ClaimTimeout,
        EventStream::MutualCancelRequested,
        EventStream::FreelancerWithdrawRequested,
        EventStream::DisputeResolved,
    ];

    /// Streams whose records feed entities cached under `scope`.
    pub fn feeding(scope: CacheScope) -> &'static [EventStream] {
        match scope {
            CacheScope::Job => &Self::JOB_HISTORY,
            CacheScope::Dispute => &[EventStream::DisputeOpened, EventStream::DisputeResolved],
            CacheScope::Reputation => &[EventStream::ReputationChanged],
            _ => &[],
        }
    }

    pub fn store(self) -> EventStore {
        match self {
            EventStream::DisputeOpened | EventStream::DisputeResolved => EventStore::Dispute,
            EventStream::ReputationChanged => EventStore::Reputation,
            _ => EventStore::Escrow,
        }
    }

    /// Event handle field name on the owning resource
    pub fn field_name(self) -> &'static str {
        match self {
            EventStream::JobCreated => "job_created_events",
            EventStream::JobApplied => "job_applied_events",
            EventStream::JobStateChanged => "job_state_changed_events",
            EventStream::MilestoneSubmitted => "milestone_submitted_events",
            EventStream::MilestoneAccepted => "milestone_accepted_events",
            EventStream::MilestoneRejected => "milestone_rejected_events",
            EventStream::ClaimTimeout => "claim_timeout_events",
            EventStream::MutualCancelRequested => "mutual_cancel_requested_events",
            EventStream::FreelancerWithdrawRequested => "freelancer_withdraw_requested_events",
            EventStream::DisputeOpened => "dispute_opened_events",
            EventStream::DisputeResolved => "dispute_resolved_events",
            EventStream::ReputationChanged => "reputation_changed_events",
        }
    }
}

/// One raw event record.
#[derive(Clone, Debug, PartialEq)]
pub struct LedgerEvent {
    pub sequence_number: u64,
    pub data: Value,
}

impl LedgerEvent {
    /// Parse `{sequence_number, data}`. Records without a `data` object are
    /// dropped.
    pub fn from_value(value: &Value) -> Option<Self> {
        let data = value.get("data")?;
        if !data.is_object() {
            return None;
        }
        Some(LedgerEvent {
            sequence_number: parse_u64(field(value, "sequence_number")).unwrap_or(0),
            data: data.clone(),
        })
    }

    pub fn parse_all(values: &[Value]) -> Vec<Self> {
        values.iter().filter_map(LedgerEvent::from_value).collect()
    }

    fn u64_field(&self, name: &str) -> u64 {
        decode_u64(field(&self.data, name), name)
    }

    fn job_id(&self) -> u64 {
        self.u64_field("job_id")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JobCreated {
    pub job_id: u64,
    pub poster: Option<Address>,
    pub cid: Option<ContentPointer>,
    pub total_amount: u64,
    pub milestones_count: u64,
    pub apply_deadline: u64,
    pub created_at: u64,
}

impl JobCreated {
    pub fn from_event(e: &LedgerEvent) -> Self {
        JobCreated {
            job_id: e.job_id(),
            poster: decode_address(field(&e.data, "poster"), "job_created.poster"),
            cid: decode_text_payload(field(&e.data, "cid"), "job_created.cid")
                .map(ContentPointer::new),
            total_amount: e.u64_field("total_amount"),
            milestones_count: e.u64_field("milestones_count"),
            apply_deadline: e.u64_field("apply_deadline"),
            created_at: e.u64_field("created_at"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JobApplied {
    pub freelancer: Address,
    pub applied_at: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct JobStateChanged {
    pub old_state: JobState,
    pub new_state: JobState,
    pub changed_at: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MilestoneSubmitted {
    pub milestone_id: u64,
    pub evidence_cid: Option<ContentPointer>,
    pub submitted_at: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClaimTimeout {
    pub milestone_id: u64,
    pub claimed_by: Option<Address>,
    pub claimed_at: u64,
    pub freelancer_stake_claimed: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DisputeResolved {
    pub dispute_id: u64,
    pub milestone_id: u64,
    pub winner_is_freelancer: Option<bool>,
    pub freelancer_votes: u64,
    pub poster_votes: u64,
    pub resolved_at: u64,
}

impl DisputeResolved {
    pub fn from_event(e: &LedgerEvent) -> Self {
        DisputeResolved {
            dispute_id: e.u64_field("dispute_id"),
            milestone_id: e.u64_field("milestone_id"),
            winner_is_freelancer: decode_optional_bool(
                field(&e.data, "winner_is_freelancer"),
                "dispute_resolved.winner_is_freelancer",
            ),
            freelancer_votes: e.u64_field("freelancer_votes"),
            poster_votes: e.u64_field("poster_votes"),
            resolved_at: e.u64_field("resolved_at"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DisputeOpened {
    pub dispute_id: u64,
    pub job_id: u64,
    pub milestone_id: u64,
    pub opened_by: Option<Address>,
    pub opened_at: u64,
}

impl DisputeOpened {
    /// `None` for records missing the dispute or job id.
    pub fn from_event(e: &LedgerEvent) -> Option<Self> {
        let dispute_id = e.u64_field("dispute_id");
        let job_id = e.job_id();
        if dispute_id == 0 || job_id == 0 {
            return None;
        }
        Some(DisputeOpened {
            dispute_id,
            job_id,
            milestone_id: e.u64_field("milestone_id"),
            opened_by: decode_address(field(&e.data, "opened_by"), "dispute_opened.opened_by"),
            opened_at: e.u64_field("created_at"),
        })
    }
}

/// A mutual-cancel or withdraw request. `requested_by == None` is a zero
/// address, which the contract emits when a request is withdrawn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CancelRequest {
    pub requested_by: Option<Address>,
    pub requested_at: u64,
    pub sequence_number: u64,
}

impl CancelRequest {
    fn order_key(&self) -> (u64, u64) {
        (self.requested_at, self.sequence_number)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReputationChanged {
    pub address: Address,
    pub new_value: u64,
    pub sequence_number: u64,
}

impl ReputationChanged {
    pub fn from_event(e: &LedgerEvent) -> Option<Self> {
        Some(ReputationChanged {
            address: decode_address(field(&e.data, "address"), "reputation.address")?,
            new_value: e.u64_field("new_value"),
            sequence_number: e.sequence_number,
        })
    }
}

/// Newest reputation value recorded for `address`, by sequence number.
pub fn latest_reputation(events: &[LedgerEvent], address: &Address) -> Option<ReputationChanged> {
    events
        .iter()
        .filter_map(ReputationChanged::from_event)
        .filter(|r| &r.address == address)
        .max_by_key(|r| r.sequence_number)
}

/// Job ids announced by creation events, newest first, deduplicated.
pub fn created_job_ids(events: &[LedgerEvent]) -> Vec<u64> {
    let mut ids: Vec<u64> = events.iter().map(LedgerEvent::job_id).collect();
    ids.sort_unstable_by(|a, b| b.cmp(a));
    ids.dedup();
    ids
}

/// Poster of every created job, keyed by job id.
pub fn job_posters(created: &[LedgerEvent]) -> HashMap<u64, Address> {
    created
        .iter()
        .map(JobCreated::from_event)
        .filter_map(|c| Some((c.job_id, c.poster?)))
        .collect()
}

/// Ids of jobs created by `poster`, newest first.
pub fn jobs_posted_by(created: &[LedgerEvent], poster: &Address) -> Vec<u64> {
    let mut ids: Vec<u64> = created
        .iter()
        .map(JobCreated::from_event)
        .filter(|c| c.poster.as_ref() == Some(poster))
        .map(|c| c.job_id)
        .collect();
    ids.sort_unstable_by(|a, b| b.cmp(a));
    ids.dedup();
    ids
}

/// `(job_id, applied_at)` for each job `freelancer` applied to, keeping the
/// newest application per job, newest job first.
pub fn applications_by(applied: &[LedgerEvent], freelancer: &Address) -> Vec<(u64, u64)> {
    let mut latest: HashMap<u64, u64> = HashMap::new();
    for e in applied {
        let Some(who) = decode_address(field(&e.data, "freelancer"), "job_applied.freelancer")
        else {
            continue;
        };
        if &who == freelancer {
            let at = latest.entry(e.job_id()).or_default();
            *at = (*at).max(e.u64_field("applied_at"));
        }
    }
    let mut out: Vec<(u64, u64)> = latest.into_iter().collect();
    out.sort_unstable_by(|a, b| b.0.cmp(&a.0));
    out
}

/// Newest resolution of each dispute, keyed by dispute id.
pub fn resolutions_by_dispute(resolved: &[LedgerEvent]) -> HashMap<u64, DisputeResolved> {
    let mut out: HashMap<u64, DisputeResolved> = HashMap::new();
    for r in resolved.iter().map(DisputeResolved::from_event) {
        if r.dispute_id == 0 {
            continue;
        }
        match out.get(&r.dispute_id) {
            Some(existing) if existing.resolved_at >= r.resolved_at => {}
            _ => {
                out.insert(r.dispute_id, r);
            }
        }
    }
    out
}

/// Every event recorded for one job, from the streams in
/// [`EventStream::JOB_HISTORY`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JobHistory {
    pub job_id: u64,
    pub created: Option<JobCreated>,
    pub applications: Vec<JobApplied>,
    pub state_changes: Vec<JobStateChanged>,
    pub submissions: Vec<MilestoneSubmitted>,
    /// `(milestone_id, accepted_at)`
    pub acceptances: Vec<(u64, u64)>,
    /// `(milestone_id, rejected_at)`
    pub rejections: Vec<(u64, u64)>,
    pub claim_timeouts: Vec<ClaimTimeout>,
    pub mutual_cancel_requests: Vec<CancelRequest>,
    pub withdraw_requests: Vec<CancelRequest>,
    pub dispute_resolutions: Vec<DisputeResolved>,
}

impl JobHistory {
    pub fn new(job_id: u64) -> Self {
        JobHistory {
            job_id,
            ..Default::default()
        }
    }

    /// Add the records of `stream` that belong to this job.
    pub fn ingest(&mut self, stream: EventStream, events: &[LedgerEvent]) {
        for e in events.iter().filter(|e| e.job_id() == self.job_id) {
            let d = &e.data;
            match stream {
                EventStream::JobCreated => {
                    self.created.get_or_insert_with(|| JobCreated::from_event(e));
                }
                EventStream::JobApplied => {
                    if let Some(freelancer) =
                        decode_address(field(d, "freelancer"), "job_applied.freelancer")
                    {
                        self.applications.push(JobApplied {
                            freelancer,
                            applied_at: e.u64_field("applied_at"),
                        });
                    }
                }
                EventStream::JobStateChanged => self.state_changes.push(JobStateChanged {
                    old_state: decode_variant(field(d, "old_state"), "job_state_changed.old_state"),
                    new_state: decode_variant(field(d, "new_state"), "job_state_changed.new_state"),
                    changed_at: e.u64_field("changed_at"),
                }),
                EventStream::MilestoneSubmitted => self.submissions.push(MilestoneSubmitted {
                    milestone_id: e.u64_field("milestone_id"),
                    evidence_cid: decode_text_payload(
                        field(d, "evidence_cid"),
                        "milestone_submitted.evidence_cid",
                    )
                    .map(ContentPointer::new),
                    submitted_at: e.u64_field("submitted_at"),
                }),
                EventStream::MilestoneAccepted => self
                    .acceptances
                    .push((e.u64_field("milestone_id"), e.u64_field("accepted_at"))),
                EventStream::MilestoneRejected => self
                    .rejections
                    .push((e.u64_field("milestone_id"), e.u64_field("rejected_at"))),
                EventStream::ClaimTimeout => self.claim_timeouts.push(ClaimTimeout {
                    milestone_id: e.u64_field("milestone_id"),
                    claimed_by: decode_address(field(d, "claimed_by"), "claim_timeout.claimed_by"),
                    claimed_at: e.u64_field("claimed_at"),
                    freelancer_stake_claimed: e.u64_field("freelancer_stake_claimed"),
                }),
                EventStream::MutualCancelRequested => {
                    self.mutual_cancel_requests.push(cancel_request(e))
                }
                EventStream::FreelancerWithdrawRequested => {
                    self.withdraw_requests.push(cancel_request(e))
                }
                EventStream::DisputeResolved => {
                    self.dispute_resolutions.push(DisputeResolved::from_event(e))
                }
                EventStream::DisputeOpened | EventStream::ReputationChanged => {}
            }
        }
    }

    pub fn latest_application(&self) -> Option<&JobApplied> {
        self.applications.iter().max_by_key(|a| a.applied_at)
    }

    pub fn latest_state_change(&self) -> Option<&JobStateChanged> {
        self.state_changes.iter().max_by_key(|c| c.changed_at)
    }

    /// Newest `from -> to` transition strictly after `after`.
    pub fn latest_transition_after(
        &self,
        from: JobState,
        to: JobState,
        after: u64,
    ) -> Option<&JobStateChanged> {
        self.state_changes
            .iter()
            .filter(|c| c.old_state == from && c.new_state == to && c.changed_at > after)
            .max_by_key(|c| c.changed_at)
    }

    pub fn latest_claim_timeout(&self) -> Option<&ClaimTimeout> {
        self.claim_timeouts.iter().max_by_key(|c| c.claimed_at)
    }

    pub fn latest_mutual_cancel_request(&self) -> Option<&CancelRequest> {
        self.mutual_cancel_requests
            .iter()
            .max_by_key(|r| r.order_key())
    }

    pub fn latest_withdraw_request(&self) -> Option<&CancelRequest> {
        self.withdraw_requests.iter().max_by_key(|r| r.order_key())
    }

    pub fn submission(&self, milestone_id: u64) -> Option<&MilestoneSubmitted> {
        self.submissions
            .iter()
            .filter(|s| s.milestone_id == milestone_id)
            .max_by_key(|s| s.submitted_at)
    }

    pub fn accepted_at(&self, milestone_id: u64) -> Option<u64> {
        latest_for(&self.acceptances, milestone_id)
    }

    pub fn rejected_at(&self, milestone_id: u64) -> Option<u64> {
        latest_for(&self.rejections, milestone_id)
    }

    pub fn claim_timeout(&self, milestone_id: u64) -> Option<&ClaimTimeout> {
        self.claim_timeouts
            .iter()
            .filter(|c| c.milestone_id == milestone_id)
            .max_by_key(|c| c.claimed_at)
    }

    pub fn dispute_resolution(&self, milestone_id: u64) -> Option<&DisputeResolved> {
        self.dispute_resolutions
            .iter()
            .filter(|r| r.milestone_id == milestone_id)
            .max_by_key(|r| r.resolved_at)
    }
}

fn latest_for(pairs: &[(u64, u64)], milestone_id: u64) -> Option<u64> {
    pairs
        .iter()
        .filter(|(id, _)| *id == milestone_id)
        .map(|(_, at)| *at)
        .max()
}

fn cancel_request(e: &LedgerEvent) -> CancelRequest {
    CancelRequest {
        requested_by: decode_optional_address(field(&e.data, "requested_by"), "requested_by"),
        requested_at: e.u64_field("requested_at"),
        sequence_number: e.sequence_number,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn events(values: Vec<Value>) -> Vec<LedgerEvent> {
        LedgerEvent::parse_all(&values)
    }

    #[test]
    fn parses_records_and_drops_malformed() {
        let parsed = events(vec![
            json!({"sequence_number": "3", "data": {"job_id": "1"}}),
            json!({"sequence_number": "4"}),
            json!({"sequence_number": "5", "data": "nope"}),
        ]);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].sequence_number, 3);
    }

    #[test]
    fn history_filters_by_job() {
        let applied = events(vec![
            json!({"sequence_number": "0", "data": {"job_id": "1", "freelancer": "0xa", "applied_at": "10"}}),
            json!({"sequence_number": "1", "data": {"job_id": "2", "freelancer": "0xb", "applied_at": "11"}}),
            json!({"sequence_number": "2", "data": {"job_id": "1", "freelancer": "0xc", "applied_at": "30"}}),
        ]);
        let mut h = JobHistory::new(1);
        h.ingest(EventStream::JobApplied, &applied);
        assert_eq!(h.applications.len(), 2);
        let latest = h.latest_application().unwrap();
        assert_eq!(latest.freelancer, Address::parse("0xc").unwrap());
        assert_eq!(latest.applied_at, 30);
    }

    #[test]
    fn state_transitions_after_timestamp() {
        let changes = events(vec![
            json!({"sequence_number": "0", "data": {"job_id": "1", "old_state": {"__variant__": "PendingApproval"}, "new_state": {"__variant__": "InProgress"}, "changed_at": "5"}}),
            json!({"sequence_number": "1", "data": {"job_id": "1", "old_state": "PendingApproval", "new_state": "InProgress", "changed_at": "50"}}),
        ]);
        let mut h = JobHistory::new(1);
        h.ingest(EventStream::JobStateChanged, &changes);
        let t = h
            .latest_transition_after(JobState::PendingApproval, JobState::InProgress, 10)
            .unwrap();
        assert_eq!(t.changed_at, 50);
        assert!(h
            .latest_transition_after(JobState::PendingApproval, JobState::Posted, 0)
            .is_none());
    }

    #[test]
    fn zero_requester_means_withdrawn() {
        let reqs = events(vec![
            json!({"sequence_number": "7", "data": {"job_id": "1", "requested_by": "0xa", "requested_at": "100"}}),
            json!({"sequence_number": "9", "data": {"job_id": "1", "requested_by": "0x0000", "requested_at": "100"}}),
        ]);
        let mut h = JobHistory::new(1);
        h.ingest(EventStream::MutualCancelRequested, &reqs);
        let latest = h.latest_mutual_cancel_request().unwrap();
        assert_eq!(latest.sequence_number, 9);
        assert_eq!(latest.requested_by, None);
    }

    #[test]
    fn reputation_latest_by_sequence() {
        let evs = events(vec![
            json!({"sequence_number": "2", "data": {"address": "0xA", "new_value": "40"}}),
            json!({"sequence_number": "5", "data": {"address": "0x0a", "new_value": "55"}}),
            json!({"sequence_number": "9", "data": {"address": "0xb", "new_value": "99"}}),
        ]);
        let latest = latest_reputation(&evs, &Address::parse("0xa").unwrap()).unwrap();
        assert_eq!(latest.new_value, 55);
        assert!(latest_reputation(&evs, &Address::parse("0xc").unwrap()).is_none());
    }

    #[test]
    fn created_ids_newest_first() {
        let evs = events(vec![
            json!({"sequence_number": "0", "data": {"job_id": "1"}}),
            json!({"sequence_number": "1", "data": {"job_id": "3"}}),
            json!({"sequence_number": "2", "data": {"job_id": "2"}}),
            json!({"sequence_number": "3", "data": {"job_id": "3"}}),
        ]);
        assert_eq!(created_job_ids(&evs), vec![3, 2, 1]);
    }

    #[test]
    fn account_filters() {
        let a = Address::parse("0xa").unwrap();
        let created = events(vec![
            json!({"sequence_number": "0", "data": {"job_id": "1", "poster": "0xa"}}),
            json!({"sequence_number": "1", "data": {"job_id": "2", "poster": "0xb"}}),
            json!({"sequence_number": "2", "data": {"job_id": "4", "poster": "0x0A"}}),
        ]);
        assert_eq!(jobs_posted_by(&created, &a), vec![4, 1]);
        assert_eq!(job_posters(&created).get(&2), Address::parse("0xb").ok().as_ref());

        let applied = events(vec![
            json!({"sequence_number": "0", "data": {"job_id": "2", "freelancer": "0xa", "applied_at": "10"}}),
            json!({"sequence_number": "1", "data": {"job_id": "2", "freelancer": "0xa", "applied_at": "40"}}),
            json!({"sequence_number": "2", "data": {"job_id": "3", "freelancer": "0xc", "applied_at": "20"}}),
            json!({"sequence_number": "3", "data": {"job_id": "5", "freelancer": "0xa", "applied_at": "30"}}),
        ]);
        assert_eq!(applications_by(&applied, &a), vec![(5, 30), (2, 40)]);
    }

    #[test]
    fn dispute_events() {
        let opened = events(vec![
            json!({"sequence_number": "0", "data": {"dispute_id": "3", "job_id": "7", "milestone_id": "2", "opened_by": "0xa", "created_at": "900"}}),
            json!({"sequence_number": "1", "data": {"dispute_id": "0", "job_id": "7"}}),
        ]);
        let parsed: Vec<DisputeOpened> = opened.iter().filter_map(DisputeOpened::from_event).collect();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].opened_at, 900);
        assert_eq!(parsed[0].opened_by, Address::parse("0xa").ok());

        let resolved = events(vec![
            json!({"sequence_number": "0", "data": {"dispute_id": "3", "winner_is_freelancer": true, "resolved_at": "1000"}}),
            json!({"sequence_number": "1", "data": {"dispute_id": "3", "winner_is_freelancer": false, "resolved_at": "800"}}),
        ]);
        let by_id = resolutions_by_dispute(&resolved);
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[&3].resolved_at, 1000);
        assert_eq!(by_id[&3].winner_is_freelancer, Some(true));
    }

    #[test]
    fn scopes_map_to_their_streams() {
        assert_eq!(EventStream::feeding(CacheScope::Job), &EventStream::JOB_HISTORY);
        assert!(EventStream::feeding(CacheScope::Dispute).contains(&EventStream::DisputeResolved));
        assert!(EventStream::feeding(CacheScope::Dispute).contains(&EventStream::DisputeOpened));
        assert!(EventStream::feeding(CacheScope::Role).is_empty());
        assert_eq!(EventStream::DisputeOpened.store(), EventStore::Dispute);
    }
}
