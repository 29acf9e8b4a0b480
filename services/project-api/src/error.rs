//! Error handling module with type-safe, non-exhaustive error types
//!
//! This module provides a unified error handling approach with:
//! - A single taxonomy shared by authentication, querying and persistence
//! - Terminal vs transient classification for retrying callers
//! - Stable machine codes and a boundary status mapping
//! - Sanitization of sensitive information in responses

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::ConfigError;
use crate::jwt::KeyRingError;
use crate::project::StoreError;

/// Sensitive patterns that should be sanitized from error messages
const SENSITIVE_PATTERNS: &[&str] = &[
    "password",
    "secret",
    "token",
    "key",
    "credential",
    "bearer",
    "authorization",
    "api_key",
    "apikey",
    "private",
];

/// Non-exhaustive error enum for forward compatibility
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProjectApiError {
    /// No bearer token was presented on a call that requires one
    #[error("Bearer token missing from request")]
    AuthMissingToken,

    /// Token structure or encoding is malformed
    #[error("Token malformed: {reason}")]
    AuthMalformedToken {
        /// Description of the malformation
        reason: String,
    },

    /// Token signature verification failed
    #[error("Token signature invalid")]
    AuthBadSignature,

    /// Token has expired
    #[error("Token expired at {expired_at}")]
    AuthExpired {
        /// When the token expired
        expired_at: DateTime<Utc>,
    },

    /// Token is not yet valid (nbf claim)
    #[error("Token not yet valid until {valid_from}")]
    AuthNotYetValid {
        /// When the token becomes valid
        valid_from: DateTime<Utc>,
    },

    /// Token audience does not include the expected audience
    #[error("Token audience not accepted: {audience:?}")]
    AuthAudienceMismatch {
        /// Audience values presented by the token
        audience: Vec<String>,
    },

    /// Token issuer is not one of the accepted issuers
    #[error("Token issuer not accepted: {issuer}")]
    AuthIssuerMismatch {
        /// Issuer presented by the token
        issuer: String,
    },

    /// The signing key named by the token could not be resolved
    #[error("Signing key {kid} unresolved: {reason}")]
    AuthKeyUnresolved {
        /// Key identifier from the token header
        kid: String,
        /// Why resolution failed
        reason: String,
    },

    /// The key authority could not be reached
    #[error("Key ring unavailable: {reason}")]
    KeyRingUnavailable {
        /// Description of the failure
        reason: String,
        /// Suggested retry duration
        retry_after: Duration,
    },

    /// A filter, pagination or input field is invalid
    #[error("Invalid value for {field}: {reason}")]
    Validation {
        /// Offending field
        field: String,
        /// Why the value was rejected
        reason: String,
    },

    /// The requested project does not exist
    #[error("Project {id} not found")]
    NotFound {
        /// Requested project id
        id: String,
    },

    /// A project with this id already exists
    #[error("Project {id} already exists")]
    AlreadyExists {
        /// Colliding project id
        id: String,
    },

    /// The document store failed transiently (timeout, throttling, connectivity)
    #[error("Document store unavailable: {reason}")]
    StoreUnavailable {
        /// Description of the failure
        reason: String,
        /// Suggested retry duration
        retry_after: Duration,
    },

    /// Internal error (details sanitized in responses)
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Error codes for boundary responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    AuthMissingToken,
    AuthMalformedToken,
    AuthBadSignature,
    AuthExpired,
    AuthNotYetValid,
    AuthAudienceMismatch,
    AuthIssuerMismatch,
    AuthKeyUnresolved,
    KeyRingUnavailable,
    ValidationError,
    NotFound,
    AlreadyExists,
    StoreUnavailable,
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AuthMissingToken => "AUTH_TOKEN_MISSING",
            Self::AuthMalformedToken => "AUTH_TOKEN_MALFORMED",
            Self::AuthBadSignature => "AUTH_BAD_SIGNATURE",
            Self::AuthExpired => "AUTH_TOKEN_EXPIRED",
            Self::AuthNotYetValid => "AUTH_TOKEN_NOT_YET_VALID",
            Self::AuthAudienceMismatch => "AUTH_AUDIENCE_MISMATCH",
            Self::AuthIssuerMismatch => "AUTH_ISSUER_MISMATCH",
            Self::AuthKeyUnresolved => "AUTH_KEY_UNRESOLVED",
            Self::KeyRingUnavailable => "KEY_RING_UNAVAILABLE",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    /// Get the HTTP status the boundary layer should answer with
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::AuthMissingToken
            | Self::AuthMalformedToken
            | Self::AuthBadSignature
            | Self::AuthExpired
            | Self::AuthNotYetValid
            | Self::AuthAudienceMismatch
            | Self::AuthIssuerMismatch
            | Self::AuthKeyUnresolved => 401,
            Self::ValidationError => 400,
            Self::NotFound => 404,
            Self::AlreadyExists => 409,
            Self::KeyRingUnavailable | Self::StoreUnavailable => 503,
            Self::Internal => 500,
        }
    }

    /// Whether this code reports an authentication failure
    pub const fn is_authentication_failure(&self) -> bool {
        self.http_status() == 401
    }
}

/// Structured error response with correlation ID
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: ErrorCode,
    /// Human-readable message (sanitized)
    pub message: String,
    /// Offending field for validation failures
    pub field: Option<String>,
    /// Correlation ID for tracing
    pub correlation_id: Uuid,
    /// Optional retry-after duration
    pub retry_after: Option<Duration>,
}

impl ErrorResponse {
    /// Create a new error response from a ProjectApiError
    pub fn from_error(error: &ProjectApiError, correlation_id: Uuid) -> Self {
        let message = match error {
            ProjectApiError::AuthMissingToken => "Bearer token is required".to_string(),
            ProjectApiError::AuthMalformedToken { reason } => sanitize_message(reason),
            ProjectApiError::AuthBadSignature => "Token signature is invalid".to_string(),
            ProjectApiError::AuthExpired { .. } => "Token has expired".to_string(),
            ProjectApiError::AuthNotYetValid { .. } => "Token is not yet valid".to_string(),
            ProjectApiError::AuthAudienceMismatch { .. } => "Invalid audience".to_string(),
            ProjectApiError::AuthIssuerMismatch { .. } => "Invalid issuer".to_string(),
            ProjectApiError::AuthKeyUnresolved { .. } => "Signing key not found".to_string(),
            ProjectApiError::KeyRingUnavailable { .. } => {
                "Key validation temporarily unavailable".to_string()
            }
            ProjectApiError::Validation { field, reason } => {
                sanitize_message(&format!("Invalid value for {field}: {reason}"))
            }
            ProjectApiError::NotFound { id } => format!("Project {id} not found"),
            ProjectApiError::AlreadyExists { id } => format!("Project {id} already exists"),
            ProjectApiError::StoreUnavailable { .. } => {
                "Project storage temporarily unavailable".to_string()
            }
            // Never expose internal error details
            ProjectApiError::Internal(_) => "Internal error".to_string(),
        };

        Self {
            code: error.code(),
            message,
            field: error.field().map(str::to_string),
            correlation_id,
            retry_after: error.retry_after(),
        }
    }

    /// Render the message with its correlation id appended
    pub fn display_message(&self) -> String {
        format!("{} [correlation_id: {}]", self.message, self.correlation_id)
    }
}

impl ProjectApiError {
    /// Get the error code for this error
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::AuthMissingToken => ErrorCode::AuthMissingToken,
            Self::AuthMalformedToken { .. } => ErrorCode::AuthMalformedToken,
            Self::AuthBadSignature => ErrorCode::AuthBadSignature,
            Self::AuthExpired { .. } => ErrorCode::AuthExpired,
            Self::AuthNotYetValid { .. } => ErrorCode::AuthNotYetValid,
            Self::AuthAudienceMismatch { .. } => ErrorCode::AuthAudienceMismatch,
            Self::AuthIssuerMismatch { .. } => ErrorCode::AuthIssuerMismatch,
            Self::AuthKeyUnresolved { .. } => ErrorCode::AuthKeyUnresolved,
            Self::KeyRingUnavailable { .. } => ErrorCode::KeyRingUnavailable,
            Self::Validation { .. } => ErrorCode::ValidationError,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::AlreadyExists { .. } => ErrorCode::AlreadyExists,
            Self::StoreUnavailable { .. } => ErrorCode::StoreUnavailable,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::KeyRingUnavailable { .. } | Self::StoreUnavailable { .. }
        )
    }

    /// Get retry-after duration if applicable
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::KeyRingUnavailable { retry_after, .. }
            | Self::StoreUnavailable { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// The offending field of a validation failure
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            _ => None,
        }
    }

    /// The project id a not-found or conflict failure refers to
    pub fn resource_id(&self) -> Option<&str> {
        match self {
            Self::NotFound { id } | Self::AlreadyExists { id } => Some(id),
            _ => None,
        }
    }

    /// Shorthand for a validation failure
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a malformed token
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::AuthMalformedToken {
            reason: reason.into(),
        }
    }
}

/// Sanitize a message by removing sensitive information
fn sanitize_message(message: &str) -> String {
    if contains_sensitive_info(message) {
        return "Invalid request".to_string();
    }
    message.to_string()
}

/// Check if a string contains sensitive information
pub fn contains_sensitive_info(text: &str) -> bool {
    let lower = text.to_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

// ============================================================================
// From trait implementations for automatic error conversion
// ============================================================================

impl From<KeyRingError> for ProjectApiError {
    fn from(err: KeyRingError) -> Self {
        match err {
            KeyRingError::NotFound { kid } => Self::AuthKeyUnresolved {
                kid,
                reason: "not present in the published key set".to_string(),
            },
            KeyRingError::Unavailable { reason } => Self::KeyRingUnavailable {
                reason,
                retry_after: Duration::from_secs(5),
            },
        }
    }
}

impl From<ConfigError> for ProjectApiError {
    fn from(err: ConfigError) -> Self {
        Self::Internal(anyhow::Error::new(err).context("invalid configuration"))
    }
}

impl From<StoreError> for ProjectApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id } => Self::NotFound { id },
            StoreError::Conflict { id } => Self::AlreadyExists { id },
            StoreError::InvalidId { id } => Self::validation("id", format!("malformed id {id:?}")),
            StoreError::Throttled { retry_after } => Self::StoreUnavailable {
                reason: "request rate too large".to_string(),
                retry_after,
            },
            StoreError::Timeout { duration } => Self::StoreUnavailable {
                reason: format!("store call timed out after {duration:?}"),
                retry_after: Duration::from_secs(1),
            },
            StoreError::Unavailable(reason) => Self::StoreUnavailable {
                reason,
                retry_after: Duration::from_secs(5),
            },
            StoreError::Corrupt(reason) => {
                Self::Internal(anyhow::anyhow!("corrupt document: {reason}"))
            }
        }
    }
}
