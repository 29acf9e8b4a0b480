//! The full pipeline: header in, project out.

use project_api::error::{ErrorCode, ProjectApiError};
use project_api::pipeline::{CallMetadata, Operation};
use project_api::project::{FilterSpec, PaginationSpec, ProjectCreate, ProjectStatus};

use crate::support::{self, KEY_A_PEM, KEY_B_PEM, KID_A};

#[tokio::test]
async fn test_authenticated_create_then_list() {
    let (pipeline, _) = support::pipeline();
    let call = CallMetadata::bearer(&support::token_a("user-1"));

    let mut input = ProjectCreate::new("Atlas", "Map service", "ana", "core");
    input.status = Some(ProjectStatus::InProgress);
    let created = pipeline.create_project(&call, input).await.unwrap();

    let filter = FilterSpec {
        status: Some(ProjectStatus::InProgress),
        ..FilterSpec::default()
    };
    let page = pipeline
        .projects(&call, Some(filter), Some(PaginationSpec::window(5, 0)))
        .await
        .unwrap();
    assert_eq!(page.total_count, 1);
    assert_eq!(page.items[0].id, created.id);
}

#[tokio::test]
async fn test_forged_token_never_reaches_the_store() {
    let (pipeline, repository) = support::pipeline();
    let forged = support::sign(KEY_B_PEM, KID_A, &support::claims("mallory"));
    let call = CallMetadata::bearer(&forged);

    let err = pipeline
        .create_project(&call, ProjectCreate::new("Evil", "Nope", "m", "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProjectApiError::AuthBadSignature));

    let response = call.error_response(&err);
    assert_eq!(response.code, ErrorCode::AuthBadSignature);
    assert_eq!(response.code.http_status(), 401);

    let all = repository.scan(&FilterSpec::default()).await.unwrap();
    assert!(all.is_empty());
}

#[tokio::test]
async fn test_expired_token_rejected() {
    let (pipeline, _) = support::pipeline();
    let mut claims = support::claims("user-1");
    claims["exp"] = serde_json::json!(chrono::Utc::now().timestamp() - 3600);
    let call = CallMetadata::bearer(&support::sign(KEY_A_PEM, KID_A, &claims));

    let err = pipeline.projects(&call, None, None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::AuthExpired);
}

#[tokio::test]
async fn test_health_and_version_are_anonymous() {
    let (pipeline, _) = support::pipeline();
    assert_eq!(Operation::ANONYMOUS, &[Operation::Health, Operation::Version]);

    let call = CallMetadata::anonymous();
    let report = pipeline.health(&call).await;
    assert_eq!(report.status, "healthy");
    assert!(report.key_ring.stale);
    assert_eq!(report.key_ring.key_count, 0);

    // Validating any token warms the ring
    let authed = CallMetadata::bearer(&support::token_a("user-1"));
    pipeline.projects(&authed, None, None).await.unwrap();
    let report = pipeline.health(&call).await;
    assert_eq!(report.key_ring.key_count, 1);
    assert!(!report.key_ring.stale);

    let json = serde_json::to_value(pipeline.version()).unwrap();
    assert_eq!(json["name"], env!("CARGO_PKG_NAME"));
}

#[tokio::test]
async fn test_missing_and_malformed_headers() {
    let (pipeline, _) = support::pipeline();

    let err = pipeline
        .project(&CallMetadata::anonymous(), "p-1")
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::AuthMissingToken);

    let basic = CallMetadata::new(Some("Basic dXNlcjpwYXNz"));
    let err = pipeline.project(&basic, "p-1").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::AuthMalformedToken);
}
