//! Error code and response tests.

use chrono::Utc;
use std::time::Duration;
use uuid::Uuid;

use project_api::error::{ErrorCode, ErrorResponse, ProjectApiError};
use project_api::jwt::KeyRingError;
use project_api::project::StoreError;

#[test]
fn test_authentication_failures_map_to_401() {
    let errors = [
        ProjectApiError::AuthMissingToken,
        ProjectApiError::malformed("bad segment"),
        ProjectApiError::AuthBadSignature,
        ProjectApiError::AuthExpired {
            expired_at: Utc::now(),
        },
        ProjectApiError::AuthIssuerMismatch {
            issuer: "https://other".to_string(),
        },
        ProjectApiError::AuthKeyUnresolved {
            kid: "k".to_string(),
            reason: "missing".to_string(),
        },
    ];
    for error in errors {
        assert!(error.code().is_authentication_failure(), "{error:?}");
        assert_eq!(error.code().http_status(), 401);
        assert!(!error.is_retryable());
    }
}

#[test]
fn test_resource_errors() {
    let not_found = ProjectApiError::NotFound {
        id: "p-1".to_string(),
    };
    assert_eq!(not_found.code(), ErrorCode::NotFound);
    assert_eq!(not_found.code().http_status(), 404);
    assert_eq!(not_found.resource_id(), Some("p-1"));

    let validation = ProjectApiError::validation("limit", "must be between 1 and 100");
    assert_eq!(validation.code().as_str(), "VALIDATION_ERROR");
    assert_eq!(validation.field(), Some("limit"));
    assert_eq!(validation.code().http_status(), 400);
}

#[test]
fn test_unavailable_errors_are_retryable() {
    let from_ring: ProjectApiError = KeyRingError::Unavailable {
        reason: "timeout".to_string(),
    }
    .into();
    assert_eq!(from_ring.code(), ErrorCode::KeyRingUnavailable);
    assert!(from_ring.is_retryable());
    assert!(from_ring.retry_after().is_some());

    let from_store: ProjectApiError = StoreError::Throttled {
        retry_after: Duration::from_secs(3),
    }
    .into();
    assert_eq!(from_store.code(), ErrorCode::StoreUnavailable);
    assert_eq!(from_store.retry_after(), Some(Duration::from_secs(3)));
}

#[test]
fn test_store_conflict_and_missing_map_to_resource_errors() {
    let conflict: ProjectApiError = StoreError::Conflict {
        id: "p-1".to_string(),
    }
    .into();
    assert_eq!(conflict.code(), ErrorCode::AlreadyExists);

    let missing: ProjectApiError = StoreError::NotFound {
        id: "p-2".to_string(),
    }
    .into();
    assert_eq!(missing.code(), ErrorCode::NotFound);
    assert_eq!(missing.resource_id(), Some("p-2"));
}

#[test]
fn test_internal_error_is_not_leaked() {
    let error = ProjectApiError::Internal(anyhow::anyhow!("password=hunter2 at db-01"));
    let correlation_id = Uuid::new_v4();
    let response = ErrorResponse::from_error(&error, correlation_id);
    assert_eq!(response.code, ErrorCode::Internal);
    assert_eq!(response.correlation_id, correlation_id);
    assert!(!response.message.contains("hunter2"));
    assert!(!response.display_message().contains("db-01"));
}

#[test]
fn test_validation_response_carries_field() {
    let error = ProjectApiError::validation("sortBy", "unknown sort field");
    let response = ErrorResponse::from_error(&error, Uuid::new_v4());
    assert_eq!(response.field.as_deref(), Some("sortBy"));
    assert!(response.retry_after.is_none());
}
