//! Names of the marketplace contract's resources, tables and view functions.

use serde_json::Value;

/// Module-qualified resource and function names under one deployed contract
/// address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractPaths {
    address: String,
}

pub const ESCROW_STORE: &str = "escrow::EscrowStore";
pub const DISPUTE_STORE: &str = "dispute::DisputeStore";

pub const JOB_VALUE: &str = "escrow::Job";
pub const DISPUTE_VALUE: &str = "dispute::Dispute";

/// Handle of the job table inside `EscrowStore`, and of the dispute table
/// inside `DisputeStore`.
pub const TABLE_HANDLE_PATH: &[&str] = &["table", "handle"];
pub const REVIEWER_LOAD_HANDLE_PATH: &[&str] = &["reviewer_load", "handle"];

impl ContractPaths {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// `{address}::{module}::{Name}` for a resource or struct type
    pub fn qualified(&self, path: &str) -> String {
        format!("{}::{}", self.address, path)
    }

    pub fn job_value_type(&self) -> String {
        self.qualified(JOB_VALUE)
    }

    pub fn dispute_value_type(&self) -> String {
        self.qualified(DISPUTE_VALUE)
    }

    /// `{address}::{module}::{function}` for a view call
    pub fn function(&self, module: &str, name: &str) -> String {
        format!("{}::{}::{}", self.address, module, name)
    }
}

/// Follow `path` through a resource's `data` and return the handle string.
/// Handles are usually strings but some nodes print them as numbers.
pub fn extract_handle(resource: &Value, path: &[&str]) -> Option<String> {
    let mut node = resource;
    for segment in path {
        node = node.get(segment)?;
    }
    match node {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn qualified_names() {
        let paths = ContractPaths::new("0xc0de");
        assert_eq!(paths.qualified(ESCROW_STORE), "0xc0de::escrow::EscrowStore");
        assert_eq!(paths.qualified(DISPUTE_STORE), "0xc0de::dispute::DisputeStore");
        assert_eq!(paths.job_value_type(), "0xc0de::escrow::Job");
        assert_eq!(
            paths.function("role", "has_poster"),
            "0xc0de::role::has_poster"
        );
    }

    #[test]
    fn handle_lookup() {
        let store = json!({
            "table": {"handle": "0x77"},
            "reviewer_load": {"handle": 42},
            "next_job_id": "3"
        });
        assert_eq!(
            extract_handle(&store, TABLE_HANDLE_PATH).as_deref(),
            Some("0x77")
        );
        assert_eq!(
            extract_handle(&store, REVIEWER_LOAD_HANDLE_PATH).as_deref(),
            Some("42")
        );
        assert_eq!(extract_handle(&store, &["missing", "handle"]), None);
        assert_eq!(extract_handle(&json!({"table": {"handle": ""}}), TABLE_HANDLE_PATH), None);
    }
}
