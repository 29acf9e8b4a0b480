//! Type-State JWT Token with compile-time validation guarantees
//!
//! This module implements the type-state pattern for JWT validation,
//! ensuring that claims can only be obtained from fully validated tokens.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::Algorithm;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::marker::PhantomData;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ProjectApiError;
use crate::jwt::claims::Claims;
use crate::jwt::key_ring::SigningKey;

// ============================================================================
// Sealed Trait Pattern for Token States
// ============================================================================

mod private {
    /// Sealed trait to prevent external implementations
    pub trait Sealed {}
}

/// Marker trait for token validation states
pub trait TokenState: private::Sealed {
    /// Human-readable state name for debugging
    fn state_name() -> &'static str;
}

/// Unvalidated token - structure parsed, nothing verified
#[derive(Debug)]
pub struct Unvalidated;
impl private::Sealed for Unvalidated {}
impl TokenState for Unvalidated {
    fn state_name() -> &'static str {
        "Unvalidated"
    }
}

/// Signature verified - cryptographic verification passed
#[derive(Debug)]
pub struct SignatureVerified;
impl private::Sealed for SignatureVerified {}
impl TokenState for SignatureVerified {
    fn state_name() -> &'static str {
        "SignatureVerified"
    }
}

/// Fully validated - signature and standard claims verified
#[derive(Debug)]
pub struct Validated;
impl private::Sealed for Validated {}
impl TokenState for Validated {
    fn state_name() -> &'static str {
        "Validated"
    }
}

/// Claim checks applied after signature verification.
#[derive(Debug, Clone)]
pub struct ClaimRules {
    /// Expected `aud` value
    pub audience: String,
    /// Accepted `iss` values
    pub accepted_issuers: Vec<String>,
    /// Allowance applied to `exp` and `nbf`
    pub clock_skew: Duration,
}

#[derive(Debug, Deserialize)]
struct RawHeader {
    alg: String,
    kid: Option<String>,
}

// ============================================================================
// Type-State Token Wrapper
// ============================================================================

/// Type-state token wrapper that enforces validation at compile time
#[derive(Debug)]
pub struct Token<State: TokenState> {
    /// Raw compact serialization
    raw: String,
    /// Byte length of `header.payload`
    signing_input_len: usize,
    /// Declared algorithm, already checked against the allow-list
    algorithm: Algorithm,
    /// Key ID from the header
    kid: String,
    /// Decoded but untrusted payload
    payload: Map<String, Value>,
    /// Claims, populated once claim validation passed
    claims: Option<Claims>,
    /// Phantom marker for state
    _state: PhantomData<State>,
}

impl Token<Unvalidated> {
    /// Parse a compact token and check its declared algorithm.
    ///
    /// Rejects anything that is not three unpadded base64url segments with
    /// JSON header and payload, a `kid`, and an allowed algorithm.
    pub fn parse(raw: &str, allowed: &[Algorithm]) -> Result<Self, ProjectApiError> {
        if raw.is_empty() {
            return Err(ProjectApiError::malformed("empty token"));
        }

        let segments: Vec<&str> = raw.split('.').collect();
        let [header_b64, payload_b64, signature_b64] = segments.as_slice() else {
            return Err(ProjectApiError::malformed("expected three segments"));
        };

        let header_bytes = decode_segment(header_b64, "header")?;
        let payload_bytes = decode_segment(payload_b64, "payload")?;
        let signature = decode_segment(signature_b64, "signature")?;
        if signature.is_empty() {
            return Err(ProjectApiError::malformed("empty signature"));
        }

        let header: RawHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| ProjectApiError::malformed(format!("invalid header: {e}")))?;
        let payload: Map<String, Value> = serde_json::from_slice(&payload_bytes)
            .map_err(|e| ProjectApiError::malformed(format!("invalid payload: {e}")))?;

        let algorithm = Algorithm::from_str(&header.alg)
            .ok()
            .filter(|alg| allowed.contains(alg))
            .ok_or_else(|| {
                ProjectApiError::malformed(format!("algorithm {} not accepted", header.alg))
            })?;

        let kid = header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| ProjectApiError::malformed("missing kid in header"))?;

        Ok(Self {
            raw: raw.to_string(),
            signing_input_len: header_b64.len() + 1 + payload_b64.len(),
            algorithm,
            kid,
            payload,
            claims: None,
            _state: PhantomData,
        })
    }

    /// Get the key ID from the token header
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Get the algorithm from the token header
    pub const fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Verify the signature over `header.payload` with the resolved key
    pub fn verify_signature(
        self,
        key: &SigningKey,
    ) -> Result<Token<SignatureVerified>, ProjectApiError> {
        let (message, signature) = self.raw.split_at(self.signing_input_len);
        let signature = signature.trim_start_matches('.');

        match jsonwebtoken::crypto::verify(
            signature,
            message.as_bytes(),
            key.material(),
            self.algorithm,
        ) {
            Ok(true) => Ok(self.transition()),
            Ok(false) | Err(_) => Err(ProjectApiError::AuthBadSignature),
        }
    }
}

impl Token<SignatureVerified> {
    /// Validate standard claims and transition to fully validated state
    pub fn validate_claims(
        self,
        rules: &ClaimRules,
        now: DateTime<Utc>,
    ) -> Result<Token<Validated>, ProjectApiError> {
        let claims = Claims::from_verified_payload(self.payload.clone())?;
        let skew = ChronoDuration::from_std(rules.clock_skew)
            .map_err(|e| ProjectApiError::Internal(anyhow::anyhow!("clock skew: {e}")))?;

        // Expired once now reaches exp + skew
        if now >= claims.expiry() + skew {
            return Err(ProjectApiError::AuthExpired {
                expired_at: claims.expiry(),
            });
        }

        if let Some(nbf) = claims.not_before() {
            if nbf - skew > now {
                return Err(ProjectApiError::AuthNotYetValid { valid_from: nbf });
            }
        }

        if !claims.audience().iter().any(|aud| aud == &rules.audience) {
            return Err(ProjectApiError::AuthAudienceMismatch {
                audience: claims.audience().to_vec(),
            });
        }

        if !rules.accepted_issuers.iter().any(|iss| iss == claims.issuer()) {
            return Err(ProjectApiError::AuthIssuerMismatch {
                issuer: claims.issuer().to_string(),
            });
        }

        let mut validated: Token<Validated> = self.transition();
        validated.claims = Some(claims);
        Ok(validated)
    }

    /// Get the key ID used to verify the signature
    pub fn kid(&self) -> &str {
        &self.kid
    }
}

impl Token<Validated> {
    /// Consume the token, yielding its claims
    pub fn into_claims(self) -> Result<Claims, ProjectApiError> {
        self.claims.ok_or_else(|| {
            ProjectApiError::Internal(anyhow::anyhow!("validated token without claims"))
        })
    }

    /// Access claims - only available on fully validated tokens
    pub const fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }
}

// Common methods for all states
impl<S: TokenState> Token<S> {
    /// Get the current state name
    pub fn state_name(&self) -> &'static str {
        S::state_name()
    }

    fn transition<T: TokenState>(self) -> Token<T> {
        Token {
            raw: self.raw,
            signing_input_len: self.signing_input_len,
            algorithm: self.algorithm,
            kid: self.kid,
            payload: self.payload,
            claims: self.claims,
            _state: PhantomData,
        }
    }
}

fn decode_segment(segment: &str, name: &str) -> Result<Vec<u8>, ProjectApiError> {
    if segment.is_empty() {
        return Err(ProjectApiError::malformed(format!("empty {name} segment")));
    }
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| ProjectApiError::malformed(format!("{name} is not unpadded base64url")))
}
