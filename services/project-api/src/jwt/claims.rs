//! Verified token claims.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::error::ProjectApiError;

/// Claims of a token whose signature and standard claims were verified.
///
/// Only the validation pipeline constructs this type, so holding a `Claims`
/// value means the payload came from a trusted signer.
#[derive(Debug, Clone, PartialEq)]
pub struct Claims {
    subject: String,
    audience: Vec<String>,
    issuer: String,
    expiry: DateTime<Utc>,
    not_before: Option<DateTime<Utc>>,
    roles: BTreeSet<String>,
    raw: Map<String, Value>,
}

impl Claims {
    /// Projects a signature-verified payload into typed claims.
    pub(crate) fn from_verified_payload(raw: Map<String, Value>) -> Result<Self, ProjectApiError> {
        let subject = required_str(&raw, "sub")?.to_string();
        let issuer = required_str(&raw, "iss")?.to_string();
        let expiry = timestamp(&raw, "exp")?
            .ok_or_else(|| ProjectApiError::malformed("missing exp claim"))?;
        let not_before = timestamp(&raw, "nbf")?;

        let audience = match raw.get("aud") {
            Some(Value::String(aud)) => vec![aud.clone()],
            Some(Value::Array(values)) => values
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| ProjectApiError::malformed("aud entries must be strings"))
                })
                .collect::<Result<_, _>>()?,
            Some(_) => return Err(ProjectApiError::malformed("aud must be a string or array")),
            None => return Err(ProjectApiError::malformed("missing aud claim")),
        };

        let roles = match (raw.get("roles"), raw.get("scp")) {
            (Some(Value::Array(roles)), _) => roles
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            (_, Some(Value::String(scopes))) => {
                scopes.split_whitespace().map(str::to_string).collect()
            }
            _ => BTreeSet::new(),
        };

        Ok(Self {
            subject,
            audience,
            issuer,
            expiry,
            not_before,
            roles,
            raw,
        })
    }

    /// The `sub` claim
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The `aud` claim, normalised to a list
    pub fn audience(&self) -> &[String] {
        &self.audience
    }

    /// The `iss` claim
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// The `exp` claim
    pub const fn expiry(&self) -> DateTime<Utc> {
        self.expiry
    }

    /// The `nbf` claim, if present
    pub const fn not_before(&self) -> Option<DateTime<Utc>> {
        self.not_before
    }

    /// Roles from `roles`, or the scopes of `scp` when no roles are present
    pub const fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    /// Whether the token carries the given role or scope
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Display name for audit records.
    ///
    /// Resolves `preferred_username`, `upn`, `email` and then `oid`.
    pub fn preferred_username(&self) -> Option<&str> {
        ["preferred_username", "upn", "email", "oid"]
            .iter()
            .find_map(|name| self.raw.get(*name).and_then(Value::as_str))
            .filter(|name| !name.is_empty())
    }

    /// Every claim of the payload, modelled or not
    pub const fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }
}

fn required_str<'a>(raw: &'a Map<String, Value>, name: &str) -> Result<&'a str, ProjectApiError> {
    match raw.get(name) {
        Some(Value::String(value)) if !value.is_empty() => Ok(value),
        Some(_) => Err(ProjectApiError::malformed(format!(
            "{name} claim must be a non-empty string"
        ))),
        None => Err(ProjectApiError::malformed(format!("missing {name} claim"))),
    }
}

fn timestamp(raw: &Map<String, Value>, name: &str) -> Result<Option<DateTime<Utc>>, ProjectApiError> {
    let Some(value) = raw.get(name) else {
        return Ok(None);
    };
    let seconds = value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
        .ok_or_else(|| ProjectApiError::malformed(format!("{name} claim must be numeric")))?;
    DateTime::from_timestamp(seconds, 0)
        .map(Some)
        .ok_or_else(|| ProjectApiError::malformed(format!("{name} claim out of range")))
}
