//! Error types for escrowlens-core

use serde::Serialize;
use thiserror::Error;

/// Result type alias for strict decoding
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// A payload shape the strict decoders do not recognize.
///
/// Strict parsers return this; the total `decode_*` wrappers log it as a
/// decode ambiguity and substitute the documented fallback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The value's JSON kind does not match any accepted encoding
    #[error("expected {expected}, found {found}")]
    UnrecognizedShape {
        expected: &'static str,
        found: &'static str,
    },

    /// An option wrapper carried more than one element
    #[error("option wrapper holds {0} elements")]
    OversizedOption(usize),

    /// A `0x`-prefixed payload that is not valid hex
    #[error("invalid hex payload: {0}")]
    InvalidHex(String),

    /// A numeric field that is neither a JSON number nor a decimal string
    #[error("invalid unsigned integer: {0}")]
    InvalidNumber(String),

    /// Not a hex account address
    #[error("invalid address: {0:?}")]
    InvalidAddress(String),

    /// A byte sequence element outside 0..=255
    #[error("byte sequence element out of range: {0}")]
    InvalidByte(String),

    /// A variant tag that names no known variant
    #[error("unknown {kind} variant: {tag}")]
    UnknownVariant { kind: &'static str, tag: String },
}

impl DecodeError {
    pub(crate) fn shape(expected: &'static str, found: &serde_json::Value) -> Self {
        DecodeError::UnrecognizedShape {
            expected,
            found: json_kind(found),
        }
    }
}

/// Short name of a JSON value's kind, used in decode diagnostics
pub fn json_kind(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A derivation invariant that the ledger data broke.
///
/// These are defect signals. They are logged at error level and surface at
/// the endpoint boundary instead of being coerced into a plausible answer.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvariantViolation {
    /// Creation event and table item disagree on the number of milestones
    #[error("job {job_id}: expected {expected} milestones, decoded {actual}")]
    MilestoneCountMismatch {
        job_id: u64,
        expected: u64,
        actual: usize,
    },

    /// Escrow total differs from the milestone sum before any payout
    #[error("job {job_id}: total escrow {total_escrow} != milestone sum {milestone_sum}")]
    EscrowMismatch {
        job_id: u64,
        total_escrow: u64,
        milestone_sum: u64,
    },

    /// A state that requires a freelancer has none
    #[error("job {job_id}: state {state} requires a freelancer")]
    MissingFreelancer { job_id: u64, state: String },

    /// More votes than selected reviewers
    #[error("dispute {dispute_id}: {votes} votes from {reviewers} selected reviewers")]
    VoteOverflow {
        dispute_id: u64,
        votes: usize,
        reviewers: usize,
    },

    /// The same reviewer voted more than once
    #[error("dispute {dispute_id}: reviewer {reviewer} voted more than once")]
    DuplicateVote { dispute_id: u64, reviewer: String },
}

/// A milestone action rejected locally before any transaction is built.
///
/// The messages are user-facing.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ActionError {
    #[error("milestone {milestone_id} does not exist on job {job_id}")]
    UnknownMilestone { job_id: u64, milestone_id: u64 },

    #[error("job {job_id} is {state}; milestone actions need an in-progress job")]
    JobNotActive { job_id: u64, state: String },

    #[error("milestone {milestone_id} is {status}; this action needs status {required}")]
    WrongStatus {
        milestone_id: u64,
        status: String,
        required: &'static str,
    },

    #[error(
        "review deadline for milestone {milestone_id} passed at {review_deadline}; \
         it can no longer be confirmed or rejected, the freelancer may claim the timeout"
    )]
    ReviewDeadlineExceeded {
        milestone_id: u64,
        review_deadline: u64,
    },

    #[error("milestone {milestone_id} has no elapsed deadline to claim (deadline {deadline})")]
    TimeoutNotReached { milestone_id: u64, deadline: u64 },

    #[error("milestone {milestone_id} is already under dispute")]
    AlreadyDisputed { milestone_id: u64 },
}
