//! Domain-level error type shared by every driving port.
//!
//! Errors are transport agnostic. The HTTP adapter maps [`ErrorCode`] to a
//! status code and serialises the payload as JSON; the trace identifier of
//! the active request is captured when the error is built so clients can
//! quote it back when reporting a failure.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use super::TraceId;

/// Header carrying the request trace identifier on every response.
pub const TRACE_ID_HEADER: &str = "trace-id";

const FALLBACK_MESSAGE: &str = "unspecified error";

/// Stable machine-readable error code describing the failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The request is malformed or fails validation.
    InvalidRequest,
    /// The credential header does not have the expected shape.
    MalformedCredential,
    /// Authentication failed or is missing.
    Unauthorized,
    /// Authenticated but the role does not permit the action.
    Forbidden,
    /// The caller does not own the targeted record.
    OwnershipMismatch,
    /// The device entitlement has lapsed.
    AlreadyExpired,
    /// The requested resource does not exist.
    NotFound,
    /// No tracking server is registered for the requested country.
    RoutingNotFound,
    /// The resource is in a state that forbids the request.
    Conflict,
    /// A remote account already exists and must be linked by an operator.
    LinkingRequired,
    /// A remote system rejected or failed a synchronisation step.
    RemoteSyncFailed,
    /// The connectivity provider refused a SIM state change.
    ActivationFailed,
    /// A local write failed after remote systems were mutated.
    PersistenceFailed,
    /// Local records contradict an invariant (e.g. duplicate subjects).
    IntegrityViolation,
    /// A dependency is temporarily unreachable.
    ServiceUnavailable,
    /// An unexpected error occurred inside the domain.
    InternalError,
}

/// Error payload returned by every driving port.
///
/// ## Invariants
/// - `message` is never empty; blank messages are replaced by a fallback.
/// - `trace_id`, when present, is non-empty.
///
/// # Examples
/// ```
/// use fleet_sync::domain::{Error, ErrorCode};
///
/// let err = Error::not_found("device not found");
/// assert_eq!(err.code(), ErrorCode::NotFound);
/// assert_eq!(err.message(), "device not found");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Error {
    #[schema(example = "invalid_request")]
    code: ErrorCode,
    #[schema(example = "imei must contain only digits")]
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "00000000-0000-0000-0000-000000000000")]
    trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

/// Validation failures for [`Error::try_new`] and [`Error::try_with_trace_id`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorValidationError {
    /// The message was empty once trimmed.
    #[error("error message must not be empty")]
    EmptyMessage,
    /// The trace identifier was empty once trimmed.
    #[error("trace identifier must not be empty")]
    EmptyTraceId,
}

impl Error {
    /// Build an error, capturing the trace identifier in scope.
    ///
    /// Blank messages are replaced with a generic fallback rather than
    /// rejected so error paths never fail themselves.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            FALLBACK_MESSAGE.to_owned()
        } else {
            message
        };
        Self {
            code,
            message,
            trace_id: TraceId::current().map(|id| id.to_string()),
            details: None,
        }
    }

    /// Fallible constructor that rejects blank messages.
    pub fn try_new(code: ErrorCode, message: impl Into<String>) -> Result<Self, ErrorValidationError> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(ErrorValidationError::EmptyMessage);
        }
        Ok(Self::new(code, message))
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Human-readable message.
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Trace identifier captured when the error was built.
    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    /// Supplementary structured details.
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// Attach structured details.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Override the trace identifier.
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        let trace_id = trace_id.into();
        if !trace_id.trim().is_empty() {
            self.trace_id = Some(trace_id);
        }
        self
    }

    /// Override the trace identifier, rejecting blank values.
    pub fn try_with_trace_id(
        self,
        trace_id: impl Into<String>,
    ) -> Result<Self, ErrorValidationError> {
        let trace_id = trace_id.into();
        if trace_id.trim().is_empty() {
            return Err(ErrorValidationError::EmptyTraceId);
        }
        Ok(self.with_trace_id(trace_id))
    }

    /// Convenience constructor for [`ErrorCode::InvalidRequest`].
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Convenience constructor for [`ErrorCode::MalformedCredential`].
    pub fn malformed_credential(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MalformedCredential, message)
    }

    /// Convenience constructor for [`ErrorCode::Unauthorized`].
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// Convenience constructor for [`ErrorCode::Forbidden`].
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// Convenience constructor for [`ErrorCode::OwnershipMismatch`].
    pub fn ownership_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::OwnershipMismatch, message)
    }

    /// Convenience constructor for [`ErrorCode::AlreadyExpired`].
    pub fn already_expired(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AlreadyExpired, message)
    }

    /// Convenience constructor for [`ErrorCode::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Convenience constructor for [`ErrorCode::RoutingNotFound`].
    pub fn routing_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RoutingNotFound, message)
    }

    /// Convenience constructor for [`ErrorCode::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Convenience constructor for [`ErrorCode::LinkingRequired`].
    pub fn linking_required(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::LinkingRequired, message)
    }

    /// Convenience constructor for [`ErrorCode::RemoteSyncFailed`].
    pub fn remote_sync_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RemoteSyncFailed, message)
    }

    /// Convenience constructor for [`ErrorCode::ActivationFailed`].
    pub fn activation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ActivationFailed, message)
    }

    /// Convenience constructor for [`ErrorCode::PersistenceFailed`].
    pub fn persistence_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PersistenceFailed, message)
    }

    /// Convenience constructor for [`ErrorCode::IntegrityViolation`].
    pub fn integrity_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::IntegrityViolation, message)
    }

    /// Convenience constructor for [`ErrorCode::ServiceUnavailable`].
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    /// Convenience constructor for [`ErrorCode::InternalError`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}
