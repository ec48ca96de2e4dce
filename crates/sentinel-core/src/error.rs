//! Error taxonomy shared by every guarded operation.
//!
//! Three layers:
//! - [`DomainError`]: raised on purpose by service logic, always carries a code.
//! - [`ServiceError`]: what a guarded closure returns; either a domain error or
//!   anything unexpected.
//! - [`AppError`]: the immutable, serializable failure handed back to callers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// Closed set of failure codes exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The addressed entity does not exist.
    NotFound,
    /// The entity being created already exists.
    AlreadyExists,
    /// The actor may not perform the operation.
    PermissionDenied,
    /// The request was malformed or failed validation.
    InvalidInput,
    /// The entity is not in a state that allows the operation.
    FailedPrecondition,
    /// The caller was rejected by the rate limiter.
    TooManyRequests,
    /// The circuit for the operation is open.
    ServiceUnavailable,
    /// The operation did not settle before its deadline.
    Timeout,
    /// Any unclassified failure.
    InternalError,
    /// A code this build does not recognize.
    Unknown,
}

impl ErrorCode {
    /// Returns the wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::InvalidInput => "INVALID_INPUT",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::TooManyRequests => "TOO_MANY_REQUESTS",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::Timeout => "TIMEOUT",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "NOT_FOUND" => Self::NotFound,
            "ALREADY_EXISTS" => Self::AlreadyExists,
            "PERMISSION_DENIED" => Self::PermissionDenied,
            "INVALID_INPUT" => Self::InvalidInput,
            "FAILED_PRECONDITION" => Self::FailedPrecondition,
            "TOO_MANY_REQUESTS" => Self::TooManyRequests,
            "SERVICE_UNAVAILABLE" => Self::ServiceUnavailable,
            "TIMEOUT" => Self::Timeout,
            "INTERNAL_ERROR" => Self::InternalError,
            _ => Self::Unknown,
        })
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let Ok(code) = raw.parse::<ErrorCode>();
        Ok(code)
    }
}

/// Structured failure returned across the guarded-execution boundary.
///
/// Immutable once built: fields are private and [`AppError::with_detail`]
/// consumes `self`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{code}: {message}")]
pub struct AppError {
    code: ErrorCode,
    message: String,
    trace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    details: Option<Map<String, Value>>,
}

impl AppError {
    /// Creates a failure with no details.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            trace_id: trace_id.into(),
            details: None,
        }
    }

    /// Returns a copy of this error with one more detail entry.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// The failure code.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Correlation id matching the log lines of the failed call.
    #[must_use]
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Optional structured context.
    #[must_use]
    pub fn details(&self) -> Option<&Map<String, Value>> {
        self.details.as_ref()
    }
}

/// Business errors raised intentionally by service logic.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An entity was not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity, e.g. `"member"`.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// The entity being created already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The actor is not allowed to perform the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// The entity is in the wrong state for the operation.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// The caller-facing code this error maps to.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::AlreadyExists(_) => ErrorCode::AlreadyExists,
            Self::PermissionDenied(_) => ErrorCode::PermissionDenied,
            Self::Validation(_) => ErrorCode::InvalidInput,
            Self::Precondition(_) => ErrorCode::FailedPrecondition,
            Self::Infrastructure(_) => ErrorCode::InternalError,
        }
    }
}

/// Error type returned by the closures handed to the guarded executor.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// An expected business error with a specific code.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Anything else. Mapped to `INTERNAL_ERROR`.
    #[error("{0}")]
    Unexpected(Box<dyn std::error::Error + Send + Sync>),
}

/// Message shown to callers in place of an unclassified failure.
pub const INTERNAL_ERROR_MESSAGE: &str = "an unexpected error occurred";

impl ServiceError {
    /// Wraps an arbitrary error as unexpected.
    pub fn unexpected(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Unexpected(err.into())
    }

    /// Whether this failure says something about downstream health.
    ///
    /// Business rejections (not found, validation, ...) do not trip breakers.
    #[must_use]
    pub fn counts_as_breaker_failure(&self) -> bool {
        match self {
            Self::Domain(err) => err.code() == ErrorCode::InternalError,
            Self::Unexpected(_) => true,
        }
    }

    /// Converts into the caller-facing failure.
    #[must_use]
    pub fn into_app_error(self, trace_id: impl Into<String>) -> AppError {
        match self {
            Self::Domain(err) => AppError::new(err.code(), err.to_string(), trace_id),
            Self::Unexpected(err) => {
                AppError::new(ErrorCode::InternalError, INTERNAL_ERROR_MESSAGE, trace_id)
                    .with_detail("cause", err.to_string())
            }
        }
    }
}
