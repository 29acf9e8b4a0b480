//! Bearer token validator
//!
//! Runs a token through the type-state pipeline: parse, resolve key,
//! verify signature, validate claims.

use chrono::Utc;
use jsonwebtoken::Algorithm;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::error::ProjectApiError;
use crate::jwt::claims::Claims;
use crate::jwt::key_ring::{KeyRing, KeyRingError};
use crate::jwt::token::{ClaimRules, Token, Unvalidated};
use crate::observability::CoreMetrics;

/// JWT validator backed by the shared key ring
#[derive(Debug, Clone)]
pub struct TokenValidator {
    key_ring: KeyRing,
    allowed_algorithms: Vec<Algorithm>,
    rules: ClaimRules,
    metrics: CoreMetrics,
}

impl TokenValidator {
    /// Creates a validator from explicit rules
    pub fn new(
        key_ring: KeyRing,
        allowed_algorithms: Vec<Algorithm>,
        rules: ClaimRules,
        metrics: CoreMetrics,
    ) -> Self {
        Self {
            key_ring,
            allowed_algorithms,
            rules,
            metrics,
        }
    }

    /// Creates a validator with the audience, issuers, algorithms and skew
    /// from the service configuration
    pub fn from_config(config: &Config, key_ring: KeyRing, metrics: CoreMetrics) -> Self {
        Self::new(
            key_ring,
            config.allowed_algorithms.clone(),
            ClaimRules {
                audience: config.audience.clone(),
                accepted_issuers: config.accepted_issuers.clone(),
                clock_skew: config.clock_skew(),
            },
            metrics,
        )
    }

    /// Validates a compact bearer token and returns its verified claims
    #[instrument(skip_all)]
    pub async fn validate(&self, token: &str) -> Result<Claims, ProjectApiError> {
        let result = self.validate_inner(token).await;
        let outcome = match &result {
            Ok(_) => "valid",
            Err(err) => err.code().as_str(),
        };
        self.metrics.record_validation(outcome);
        if let Err(err) = &result {
            debug!(code = err.code().as_str(), "Token rejected");
        }
        result
    }

    /// Extracts the token from an `Authorization` header value and validates it
    pub async fn validate_authorization_header(
        &self,
        header: Option<&str>,
    ) -> Result<Claims, ProjectApiError> {
        let token = bearer_token(header)?;
        self.validate(token).await
    }

    async fn validate_inner(&self, raw: &str) -> Result<Claims, ProjectApiError> {
        let unvalidated = Token::<Unvalidated>::parse(raw, &self.allowed_algorithms)?;

        let key = self
            .key_ring
            .get_key(unvalidated.kid())
            .await
            .map_err(|err| {
                let reason = match err {
                    KeyRingError::NotFound { .. } => {
                        "not present in the published key set".to_string()
                    }
                    KeyRingError::Unavailable { reason } => {
                        format!("key authority unavailable: {reason}")
                    }
                };
                ProjectApiError::AuthKeyUnresolved {
                    kid: unvalidated.kid().to_string(),
                    reason,
                }
            })?;

        unvalidated
            .verify_signature(&key)?
            .validate_claims(&self.rules, Utc::now())?
            .into_claims()
    }
}

/// Splits the token out of `Bearer <token>`; a missing header is
/// `AuthMissingToken`, any other shape is malformed.
pub fn bearer_token(header: Option<&str>) -> Result<&str, ProjectApiError> {
    let value = header
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ProjectApiError::AuthMissingToken)?;

    // "Bearer " trims down to the bare scheme
    if value.eq_ignore_ascii_case("bearer") {
        return Err(ProjectApiError::AuthMissingToken);
    }

    let (scheme, token) = value
        .split_once(' ')
        .ok_or_else(|| ProjectApiError::malformed("authorization header must be Bearer"))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(ProjectApiError::malformed(
            "authorization header must be Bearer",
        ));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(ProjectApiError::AuthMissingToken);
    }
    Ok(token)
}
