//! Type-state token tests over real RS256 signatures.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::Algorithm;
use serde_json::json;

use project_api::error::ProjectApiError;
use project_api::jwt::{Jwk, SigningKey, Token, Unvalidated};

use crate::support::{self, KEY_A_N, KEY_A_PEM, KEY_B_N, KEY_B_PEM, KID_A};

const ALLOWED: &[Algorithm] = &[Algorithm::RS256];

fn signing_key(kid: &str, n: &str) -> SigningKey {
    let jwk: Jwk = serde_json::from_value(support::jwk(kid, n)).unwrap();
    SigningKey::from_jwk(&jwk, Utc::now()).unwrap()
}

#[test]
fn test_full_transition_chain() {
    let raw = support::token_a("user-1");
    let token = Token::<Unvalidated>::parse(&raw, ALLOWED).unwrap();
    assert_eq!(token.state_name(), "Unvalidated");
    assert_eq!(token.kid(), KID_A);

    let verified = token.verify_signature(&signing_key(KID_A, KEY_A_N)).unwrap();
    assert_eq!(verified.state_name(), "SignatureVerified");

    let validated = verified.validate_claims(&support::rules(), Utc::now()).unwrap();
    assert_eq!(validated.state_name(), "Validated");
    let claims = validated.into_claims().unwrap();
    assert_eq!(claims.subject(), "user-1");
    assert!(claims.has_role("Projects.Write"));
    assert_eq!(claims.preferred_username(), Some("user-1@example.com"));
}

#[test]
fn test_signature_from_other_key_rejected() {
    let raw = support::sign(KEY_B_PEM, KID_A, &support::claims("user-1"));
    let token = Token::<Unvalidated>::parse(&raw, ALLOWED).unwrap();
    let err = token
        .verify_signature(&signing_key(KID_A, KEY_A_N))
        .unwrap_err();
    assert!(matches!(err, ProjectApiError::AuthBadSignature));
}

#[test]
fn test_tampered_payload_rejected() {
    let raw = support::token_a("user-1");
    let parts: Vec<&str> = raw.split('.').collect();
    let mut payload = support::claims("user-1");
    payload["roles"] = json!(["Projects.Admin"]);
    let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap());
    let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

    let token = Token::<Unvalidated>::parse(&forged, ALLOWED).unwrap();
    assert!(matches!(
        token.verify_signature(&signing_key(KID_A, KEY_A_N)),
        Err(ProjectApiError::AuthBadSignature)
    ));
}

#[test]
fn test_unlisted_algorithm_is_malformed() {
    let raw = support::token_a("user-1");
    let err = Token::<Unvalidated>::parse(&raw, &[Algorithm::ES256]).unwrap_err();
    assert!(matches!(err, ProjectApiError::AuthMalformedToken { .. }));
}

#[test]
fn test_claims_checked_only_after_signature() {
    let mut payload = support::claims("user-1");
    payload["aud"] = json!("api://someone-else");
    let raw = support::sign(KEY_A_PEM, KID_A, &payload);

    // A bad signature wins over bad claims
    let token = Token::<Unvalidated>::parse(&raw, ALLOWED).unwrap();
    assert!(matches!(
        token.verify_signature(&signing_key(KID_A, KEY_B_N)),
        Err(ProjectApiError::AuthBadSignature)
    ));

    let token = Token::<Unvalidated>::parse(&raw, ALLOWED).unwrap();
    let err = token
        .verify_signature(&signing_key(KID_A, KEY_A_N))
        .unwrap()
        .validate_claims(&support::rules(), Utc::now())
        .unwrap_err();
    assert!(matches!(err, ProjectApiError::AuthAudienceMismatch { .. }));
}

#[test]
fn test_expiry_boundary_with_skew() {
    let payload = support::claims("user-1");
    let raw = support::sign(KEY_A_PEM, KID_A, &payload);
    let exp = payload["exp"].as_i64().unwrap();
    let skew = ChronoDuration::seconds(300);
    let exp_at = chrono::DateTime::from_timestamp(exp, 0).unwrap();
    let key = signing_key(KID_A, KEY_A_N);

    let verify = || {
        Token::<Unvalidated>::parse(&raw, ALLOWED)
            .unwrap()
            .verify_signature(&key)
            .unwrap()
    };

    assert!(verify()
        .validate_claims(&support::rules(), exp_at + skew - ChronoDuration::seconds(1))
        .is_ok());
    assert!(matches!(
        verify().validate_claims(&support::rules(), exp_at + skew),
        Err(ProjectApiError::AuthExpired { .. })
    ));
}
