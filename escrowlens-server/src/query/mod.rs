//! Query pipelines: cache lookup, ledger fetch, decode, derive.
//!
//! Each pipeline returns `QueryError::NotFound` for an entity the ledger
//! does not have, distinct from `QueryError::Ledger` for a failed read.
//! Independent reads inside one pipeline are joined concurrently; dependent
//! ones (store handle, then table item) run in order.

mod account;
mod dispute;
mod events;
mod job;
mod reputation;
mod role;
mod store;

pub use account::{account_disputes, account_jobs, AccountDispute, AccountJob, AccountSide};
pub use dispute::{dispute_detail, reviewer_load};
pub use events::{event_stream, job_history};
pub use job::{job_detail, list_jobs};
pub use reputation::{reputation, ReputationSource, ReputationView};
pub use role::{roles, RoleKind, RoleSummary};
pub use store::{dispute_store, escrow_store, StoreHandles};
