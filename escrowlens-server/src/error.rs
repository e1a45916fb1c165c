//! Server error types with HTTP status code mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use escrowlens_core::{ActionError, InvariantViolation};
use escrowlens_ledger::LedgerError;
use serde::Serialize;
use thiserror::Error;

/// `@type` values of error responses
pub mod errors {
    pub const NOT_FOUND: &str = "err:NotFound";
    pub const LEDGER_UNAVAILABLE: &str = "err:LedgerUnavailable";
    pub const INVALID_LEDGER_RESPONSE: &str = "err:InvalidLedgerResponse";
    pub const STORE_MISSING: &str = "err:ContractStoreMissing";
    pub const INVARIANT: &str = "err:DerivationInvariantViolation";
    pub const BAD_REQUEST: &str = "err:BadRequest";
    pub const ACTION_REJECTED: &str = "err:ActionRejected";
}

/// Failure of a query pipeline. `Clone` so one in-flight fetch can hand the
/// same error to every coalesced waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The entity does not exist on the ledger
    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The contract resource exists but lacks a table handle we need
    #[error("Contract store {0} is missing or malformed")]
    StoreMissing(String),

    #[error("Derivation invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    ActionRejected(#[from] ActionError),
}

impl ServerError {
    pub fn error_type(&self) -> &'static str {
        match self {
            ServerError::Query(QueryError::NotFound(_)) | ServerError::NotFound(_) => {
                errors::NOT_FOUND
            }
            ServerError::Query(QueryError::Ledger(LedgerError::Transient { .. })) => {
                errors::LEDGER_UNAVAILABLE
            }
            ServerError::Query(QueryError::Ledger(LedgerError::InvalidResponse(_))) => {
                errors::INVALID_LEDGER_RESPONSE
            }
            ServerError::Query(QueryError::StoreMissing(_)) => errors::STORE_MISSING,
            ServerError::Query(QueryError::Invariant(_)) => errors::INVARIANT,
            ServerError::BadRequest(_) => errors::BAD_REQUEST,
            ServerError::ActionRejected(_) => errors::ACTION_REJECTED,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            // 404 - entity legitimately absent
            ServerError::Query(QueryError::NotFound(_)) | ServerError::NotFound(_) => {
                StatusCode::NOT_FOUND
            }

            // 503 - retry later
            ServerError::Query(QueryError::Ledger(LedgerError::Transient { .. })) => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            // 502 - the ledger answered with something unusable
            ServerError::Query(QueryError::Ledger(LedgerError::InvalidResponse(_))) => {
                StatusCode::BAD_GATEWAY
            }
            ServerError::Query(QueryError::StoreMissing(_)) => StatusCode::BAD_GATEWAY,

            ServerError::Query(QueryError::Invariant(_)) => StatusCode::INTERNAL_SERVER_ERROR,

            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::ActionRejected(_) => StatusCode::CONFLICT,
        }
    }

    /// Whether the same request may succeed if retried
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ServerError::Query(QueryError::Ledger(LedgerError::Transient { .. }))
        )
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        ServerError::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ServerError::NotFound(msg.into())
    }

    /// Structured detail for the variants that carry one
    fn detail(&self) -> Option<serde_json::Value> {
        match self {
            ServerError::Query(QueryError::Invariant(v)) => serde_json::to_value(v).ok(),
            ServerError::ActionRejected(a) => serde_json::to_value(a).ok(),
            _ => None,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub status: u16,
    #[serde(rename = "@type")]
    pub error_type: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            status: status.as_u16(),
            error_type: self.error_type().to_string(),
            retryable: self.retryable(),
            detail: self.detail(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for server operations
pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_ledger_errors_are_retryable_503() {
        let err = ServerError::from(QueryError::from(LedgerError::Transient {
            status: Some(500),
            message: "boom".into(),
        }));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.retryable());
        assert_eq!(err.error_type(), errors::LEDGER_UNAVAILABLE);
    }

    #[test]
    fn status_mapping() {
        let cases = [
            (
                ServerError::from(QueryError::NotFound("job 4".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                ServerError::from(QueryError::StoreMissing("escrow::EscrowStore".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ServerError::from(QueryError::from(InvariantViolation::MissingFreelancer {
                    job_id: 1,
                    state: "InProgress".into(),
                })),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ServerError::from(ActionError::AlreadyDisputed { milestone_id: 2 }),
                StatusCode::CONFLICT,
            ),
            (ServerError::bad_request("limit"), StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{err}");
            assert!(!err.retryable());
        }
    }

    #[test]
    fn invariant_detail_is_structured() {
        let err = ServerError::from(QueryError::from(InvariantViolation::DuplicateVote {
            dispute_id: 3,
            reviewer: "0xa".into(),
        }));
        let detail = err.detail().unwrap();
        assert_eq!(detail["kind"], "duplicate_vote");
        assert_eq!(err.error_type(), errors::INVARIANT);
    }
}
