//! # EscrowLens Core
//!
//! Runtime-agnostic reconciliation of on-chain marketplace state.
//!
//! This crate provides:
//! - Decoders for the ledger's inconsistent JSON encodings ([`decode`])
//! - The typed job / milestone / dispute model ([`model`], [`record`])
//! - Event stream records and per-job history ([`events`])
//! - The job state machine and milestone action checks ([`job_state`])
//! - Dispute tally under a configurable quorum ([`dispute`])
//! - A TTL cache with single-flight misses and an injected clock ([`cache`])
//!
//! No network code lives here: callers fetch raw JSON and hand it in.

pub mod address;
pub mod cache;
pub mod clock;
pub mod decode;
pub mod dispute;
pub mod error;
pub mod events;
pub mod job_state;
pub mod model;
pub mod record;

pub use address::Address;
pub use cache::{CacheKey, CacheScope, CacheStats, TtlCache, TtlPolicy};
pub use clock::{Clock, ManualClock, SystemClock};
pub use dispute::{derive_dispute, tally, DisputeView, QuorumPolicy, Side, Tally};
pub use error::{ActionError, DecodeError, DecodeResult, InvariantViolation};
pub use events::{EventStore, EventStream, JobHistory, LedgerEvent};
pub use job_state::{
    check_action, derive_job, JobView, MilestoneAction, MilestoneActions, MilestoneView,
    StateSource,
};
pub use model::{
    ContentPointer, Dispute, DisputeStatus, Job, JobState, Milestone, MilestoneStatus,
    Reselection, Vote,
};
pub use record::{decode_dispute, decode_job};
