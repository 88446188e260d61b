//! Domain error type and the stable error codes clients match on

use miette::Diagnostic;
use rusqlite::ErrorCode as SqliteCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::identity::IdParseError;
use crate::core::principal::Role;
use crate::core::workflow::WorkflowError;
use crate::entities::impact::{DeletionReport, DependencyReport};

/// Result alias used throughout the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Stable machine-readable error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    Conflict,
    CircularRelationship,
    DuplicateRelationship,
    Cycle,
    HasDependencies,
    InUse,
    AuthenticationRequired,
    InvalidToken,
    TokenExpired,
    InsufficientPermissions,
    StorageError,
    Timeout,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::CircularRelationship => "CIRCULAR_RELATIONSHIP",
            ErrorCode::DuplicateRelationship => "DUPLICATE_RELATIONSHIP",
            ErrorCode::Cycle => "CYCLE",
            ErrorCode::HasDependencies => "HAS_DEPENDENCIES",
            ErrorCode::InUse => "IN_USE",
            ErrorCode::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            ErrorCode::InvalidToken => "INVALID_TOKEN",
            ErrorCode::TokenExpired => "TOKEN_EXPIRED",
            ErrorCode::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            ErrorCode::StorageError => "STORAGE_ERROR",
            ErrorCode::Timeout => "TIMEOUT",
        }
    }

    /// Client-class codes carry actionable messages; the rest are generic
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ErrorCode::StorageError)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors returned by every service operation
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("{message}")]
    #[diagnostic(code(storyline::validation))]
    Validation { code: ErrorCode, message: String },

    #[error("{what} not found: {key}")]
    #[diagnostic(code(storyline::not_found))]
    NotFound { what: &'static str, key: String },

    #[error("{message}")]
    #[diagnostic(code(storyline::conflict))]
    Conflict { code: ErrorCode, message: String },

    #[error("{message}")]
    #[diagnostic(
        code(storyline::has_dependencies),
        help("inspect the impact report, then delete again with cascade")
    )]
    HasDependencies {
        message: String,
        report: Box<DependencyReport>,
    },

    #[error("{message}")]
    #[diagnostic(code(storyline::unauthenticated), help("pass --as <username> or set STORYLINE_USER"))]
    Unauthenticated { code: ErrorCode, message: String },

    #[error("role '{role}' may not {action}")]
    #[diagnostic(code(storyline::forbidden))]
    Forbidden { role: Role, action: String },

    #[error("deadline exceeded during {operation}")]
    #[diagnostic(code(storyline::timeout), help("retry with backoff or raise request_timeout_ms"))]
    Timeout { operation: String },

    #[error("storage failure: {message}")]
    #[diagnostic(code(storyline::storage))]
    Storage { message: String, transient: bool },

    #[error("deletion of {target} failed: {message}")]
    #[diagnostic(code(storyline::deletion_failed))]
    DeletionFailed {
        target: String,
        message: String,
        report: Box<DeletionReport>,
    },
}

/// Wire shape for errors: `{ "error": { "code": ..., "message": ... } }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            code: ErrorCode::ValidationError,
            message: message.into(),
        }
    }

    pub fn not_found(what: &'static str, key: impl ToString) -> Self {
        Error::NotFound {
            what,
            key: key.to_string(),
        }
    }

    pub fn conflict(code: ErrorCode, message: impl Into<String>) -> Self {
        Error::Conflict {
            code,
            message: message.into(),
        }
    }

    pub fn in_use(message: impl Into<String>) -> Self {
        Error::conflict(ErrorCode::InUse, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Error::Unauthenticated {
            code: ErrorCode::AuthenticationRequired,
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage {
            message: message.into(),
            transient: false,
        }
    }

    /// The stable code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Validation { code, .. } => *code,
            Error::NotFound { .. } => ErrorCode::NotFound,
            Error::Conflict { code, .. } => *code,
            Error::HasDependencies { .. } => ErrorCode::HasDependencies,
            Error::Unauthenticated { code, .. } => *code,
            Error::Forbidden { .. } => ErrorCode::InsufficientPermissions,
            Error::Timeout { .. } => ErrorCode::Timeout,
            Error::Storage { .. } | Error::DeletionFailed { .. } => ErrorCode::StorageError,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.code().is_client_error()
    }

    /// Busy/locked failures worth retrying inside the store
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Storage { transient: true, .. })
    }

    /// Render for the wire. Server-class errors get a generic message quoting
    /// the correlation ID; the detail is logged under the same ID.
    pub fn to_response(&self, correlation_id: &str) -> ErrorResponse {
        let code = self.code();
        let message = if code.is_client_error() {
            self.to_string()
        } else {
            tracing::error!(correlation_id, error = %self, "request failed");
            format!(
                "internal storage error; quote correlation id {} when reporting",
                correlation_id
            )
        };
        ErrorResponse {
            error: ErrorBody { code, message },
        }
    }
}

impl From<IdParseError> for Error {
    fn from(e: IdParseError) -> Self {
        Error::validation(e.to_string())
    }
}

impl From<WorkflowError> for Error {
    fn from(e: WorkflowError) -> Self {
        match e {
            WorkflowError::InvalidTransition { .. } => Error::validation(e.to_string()),
            WorkflowError::UnknownStatus { ref status, ref model } => Error::NotFound {
                what: "status",
                key: format!("{} (workflow '{}')", status, model),
            },
            WorkflowError::Unreconciled { .. } => {
                Error::conflict(ErrorCode::Conflict, e.to_string())
            }
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref failure, _) = e {
            match failure.code {
                SqliteCode::OperationInterrupted => {
                    return Error::Timeout {
                        operation: "database query".to_string(),
                    }
                }
                SqliteCode::DatabaseBusy | SqliteCode::DatabaseLocked => {
                    return Error::Storage {
                        message: e.to_string(),
                        transient: true,
                    }
                }
                SqliteCode::ConstraintViolation => {
                    return Error::conflict(ErrorCode::Conflict, e.to_string())
                }
                _ => {}
            }
        }
        Error::storage(e.to_string())
    }
}

impl From<r2d2::Error> for Error {
    fn from(e: r2d2::Error) -> Self {
        Error::Storage {
            message: format!("connection pool: {}", e),
            transient: true,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::storage(format!("serialization: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_serialize_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::DuplicateRelationship).unwrap();
        assert_eq!(json, "\"DUPLICATE_RELATIONSHIP\"");
        assert_eq!(ErrorCode::HasDependencies.as_str(), "HAS_DEPENDENCIES");
    }

    #[test]
    fn test_variant_to_code_mapping() {
        assert_eq!(Error::validation("x").code(), ErrorCode::ValidationError);
        assert_eq!(Error::not_found("epic", "EP-001").code(), ErrorCode::NotFound);
        assert_eq!(
            Error::conflict(ErrorCode::Cycle, "cycle").code(),
            ErrorCode::Cycle
        );
        assert_eq!(
            Error::Forbidden {
                role: Role::Commenter,
                action: "delete entities".into()
            }
            .code(),
            ErrorCode::InsufficientPermissions
        );
        assert_eq!(Error::storage("boom").code(), ErrorCode::StorageError);
        assert_eq!(
            Error::Timeout {
                operation: "search".into()
            }
            .code(),
            ErrorCode::Timeout
        );
    }

    #[test]
    fn test_client_errors_keep_their_message() {
        let resp = Error::not_found("epic", "EP-009").to_response("cid-1");
        assert_eq!(resp.error.code, ErrorCode::NotFound);
        assert_eq!(resp.error.message, "epic not found: EP-009");
    }

    #[test]
    fn test_server_errors_are_generic_and_quote_correlation_id() {
        let resp = Error::storage("disk I/O error at page 7").to_response("cid-42");
        assert_eq!(resp.error.code, ErrorCode::StorageError);
        assert!(resp.error.message.contains("cid-42"));
        assert!(!resp.error.message.contains("page 7"));
    }

    #[test]
    fn test_error_response_shape() {
        let resp = Error::validation("title must not be empty").to_response("c");
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(value["error"]["message"], "title must not be empty");
    }

    #[test]
    fn test_workflow_errors_map_to_taxonomy() {
        let invalid: Error = WorkflowError::InvalidTransition {
            from: "Backlog".into(),
            to: "Done".into(),
        }
        .into();
        assert_eq!(invalid.code(), ErrorCode::ValidationError);
        assert!(invalid.to_string().contains("Backlog→Done"));

        let stale: Error = WorkflowError::Unreconciled {
            status: "Legacy".into(),
            model: "m".into(),
        }
        .into();
        assert_eq!(stale.code(), ErrorCode::Conflict);
    }

    #[test]
    fn test_interrupt_maps_to_timeout() {
        let e = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_INTERRUPT),
            None,
        );
        assert_eq!(Error::from(e).code(), ErrorCode::Timeout);
    }

    #[test]
    fn test_busy_is_transient() {
        let e = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(Error::from(e).is_transient());
    }
}
