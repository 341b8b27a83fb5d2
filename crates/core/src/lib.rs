pub mod config;
pub mod domain;
pub mod engine;
pub mod math;
pub mod matching;
pub mod plan;
pub mod scoring;
pub mod store;

pub use crate::config::EngineConfig;
pub use domain::{
    Assignment, Person, PersonId, RequestId, SwapRequest, SwapSnapshot, SwapStatus, SwapType,
};
pub use engine::{NewSwapRequest, SwapEngine};
pub use matching::{ChainCoordinator, ExactMatcher, GraphMatcher, SwapChain};
pub use plan::ExecutionPlan;
pub use scoring::{CompatibilityScore, CompatibilityScorer};
pub use store::{InMemoryStore, StoreError, SwapStore};

use engine::validation::ValidationReport;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Core result type for swap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Stable machine-readable error codes surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    FacultyNotFound,
    RequestNotFound,
    InvalidStatus,
    ValidationFailed,
    RollbackWindowExpired,
    CreationFailed,
    ExecutionFailed,
    RollbackFailed,
    ConfigError,
    StoreError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::FacultyNotFound => "FACULTY_NOT_FOUND",
            ErrorCode::RequestNotFound => "REQUEST_NOT_FOUND",
            ErrorCode::InvalidStatus => "INVALID_STATUS",
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::RollbackWindowExpired => "ROLLBACK_WINDOW_EXPIRED",
            ErrorCode::CreationFailed => "CREATION_FAILED",
            ErrorCode::ExecutionFailed => "EXECUTION_FAILED",
            ErrorCode::RollbackFailed => "ROLLBACK_FAILED",
            ErrorCode::ConfigError => "CONFIG_ERROR",
            ErrorCode::StoreError => "STORE_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Faculty not found: {0}")]
    FacultyNotFound(PersonId),

    #[error("Swap request not found: {0}")]
    RequestNotFound(RequestId),

    #[error("Invalid status for {id}: {reason}")]
    InvalidStatus { id: RequestId, reason: String },

    #[error("Validation failed for {}: {}", .0.request_id, .0.errors().join("; "))]
    ValidationFailed(Box<ValidationReport>),

    #[error("Rollback window expired for {id}: executed {elapsed_minutes} minutes ago, window is {window_hours}h")]
    RollbackWindowExpired {
        id: RequestId,
        elapsed_minutes: i64,
        window_hours: i64,
    },

    #[error("Creation failed: {0}")]
    CreationFailed(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Rollback failed: {0}")]
    RollbackFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl Error {
    /// Returns the stable code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::FacultyNotFound(_) => ErrorCode::FacultyNotFound,
            Error::RequestNotFound(_) => ErrorCode::RequestNotFound,
            Error::InvalidStatus { .. } => ErrorCode::InvalidStatus,
            Error::ValidationFailed(_) => ErrorCode::ValidationFailed,
            Error::RollbackWindowExpired { .. } => ErrorCode::RollbackWindowExpired,
            Error::CreationFailed(_) => ErrorCode::CreationFailed,
            Error::ExecutionFailed(_) => ErrorCode::ExecutionFailed,
            Error::RollbackFailed(_) => ErrorCode::RollbackFailed,
            Error::ConfigError(_) => ErrorCode::ConfigError,
            Error::Store(_) => ErrorCode::StoreError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        let id = RequestId::new();
        let err = Error::InvalidStatus {
            id,
            reason: "already executed".to_string(),
        };
        assert_eq!(err.code(), ErrorCode::InvalidStatus);
        assert_eq!(err.code().as_str(), "INVALID_STATUS");

        let err = Error::FacultyNotFound(PersonId::from("dr-nobody"));
        assert_eq!(err.code().to_string(), "FACULTY_NOT_FOUND");
    }

    #[test]
    fn test_error_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::RollbackWindowExpired).unwrap();
        assert_eq!(json, "\"ROLLBACK_WINDOW_EXPIRED\"");
    }
}
