//! Error types for ledger reads

use thiserror::Error;

/// Errors from ledger reads. Not-found is never an error: readers return
/// `Ok(None)` for it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Network failure, timeout, or any non-2xx status other than 404
    #[error("Ledger request failed{}: {message}", status_suffix(.status))]
    Transient {
        status: Option<u16>,
        message: String,
    },

    /// 2xx response whose body is not the expected JSON shape
    #[error("Invalid ledger response: {0}")]
    InvalidResponse(String),
}

impl LedgerError {
    /// HTTP status carried by a transient failure, if the ledger answered
    pub fn status(&self) -> Option<u16> {
        match self {
            LedgerError::Transient { status, .. } => *status,
            LedgerError::InvalidResponse(_) => None,
        }
    }

    /// The ledger answered and refused the request itself (4xx).
    pub fn is_rejection(&self) -> bool {
        matches!(self.status(), Some(400..=499))
    }
}

impl From<reqwest::Error> for LedgerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return LedgerError::InvalidResponse(e.to_string());
        }
        LedgerError::Transient {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" with status {s}")).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_is_4xx_only() {
        let bad_request = LedgerError::Transient {
            status: Some(400),
            message: "abort".into(),
        };
        let unavailable = LedgerError::Transient {
            status: Some(503),
            message: "busy".into(),
        };
        let network = LedgerError::Transient {
            status: None,
            message: "refused".into(),
        };
        assert!(bad_request.is_rejection());
        assert!(!unavailable.is_rejection());
        assert!(!network.is_rejection());
        assert_eq!(
            bad_request.to_string(),
            "Ledger request failed with status 400: abort"
        );
        assert_eq!(network.to_string(), "Ledger request failed: refused");
    }
}
