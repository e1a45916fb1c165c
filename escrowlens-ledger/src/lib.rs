//! Read-only client for the ledger node's REST API
//!
//! # Architecture
//!
//! - [`client`]: [`LedgerReader`] trait and its `reqwest` implementation
//! - [`contract`]: resource, table and view function names of the marketplace contract
//! - [`key`]: table key / view argument normalization
//! - [`error`]: Error types for ledger reads
//!
//! Nothing here interprets the returned JSON beyond its outer shape; decoding
//! lives in `escrowlens-core`.

pub mod client;
pub mod contract;
pub mod error;
pub mod key;

pub use client::{HttpLedgerClient, LedgerReader, TableItemRequest, ViewRequest};
pub use contract::{extract_handle, ContractPaths};
pub use error::{LedgerError, Result};
pub use key::normalize_key;
