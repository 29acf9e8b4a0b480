//! Type-Safe Configuration with Validation
//!
//! Provides type-safe configuration with URL validation and environment variable support.

use jsonwebtoken::Algorithm;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Algorithms a deployment may allow. Symmetric algorithms are never accepted
/// because the key ring only holds published public keys.
const ASYMMETRIC_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
];

/// Authority path segments that stand for many tenants
const MULTI_TENANT_ALIASES: &[&str] = &["common", "organizations", "consumers"];

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid URL format
    #[error("Invalid URL for {field}: {reason}")]
    InvalidUrl { field: String, reason: String },

    /// Invalid TTL value
    #[error("Invalid TTL: must be greater than 0")]
    InvalidTtl,

    /// A timeout was configured as zero
    #[error("Invalid timeout for {0}: must be greater than 0")]
    InvalidTimeout(String),

    /// Algorithm name unknown or not asymmetric
    #[error("Algorithm not allowed: {0}")]
    InvalidAlgorithm(String),

    /// Missing required field
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    /// Issuers cannot be derived from a multi-tenant authority
    #[error("Authority {0} is not tenant-qualified; set AUTH_ACCEPTED_ISSUERS or use a tenant id")]
    UnqualifiedAuthority(String),

    /// Environment variable parse error
    #[error("Failed to parse environment variable {name}: {reason}")]
    ParseError { name: String, reason: String },
}

/// Service configuration with validation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Token authority base URL (tenant-qualified)
    pub authority: Url,
    /// Expected `aud` claim
    pub audience: String,
    /// Accepted `iss` claim values
    pub accepted_issuers: Vec<String>,
    /// Accepted signing algorithms
    pub allowed_algorithms: Vec<Algorithm>,
    /// Explicit JWKS endpoint, bypassing discovery
    pub jwks_url: Option<Url>,
    /// Clock skew allowance for `exp`/`nbf` in seconds
    pub clock_skew_seconds: u64,
    /// JWKS cache TTL in seconds (must be > 0)
    pub jwks_cache_ttl_seconds: u64,
    /// Cooldown between miss-driven refreshes of a fresh key set
    pub jwks_min_refresh_interval_seconds: u64,
    /// Upper bound for one key set refresh in seconds
    pub jwks_fetch_timeout_secs: u64,
    /// Retries inside one key set refresh
    pub jwks_fetch_retries: u32,
    /// Upper bound for one document store call in seconds
    pub store_timeout_secs: u64,
    /// Log level filter
    pub log_level: String,
    /// Emit JSON log lines
    pub log_json: bool,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

impl Config {
    /// Loads configuration from environment variables with validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let authority = lookup("AUTH_AUTHORITY")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired("AUTH_AUTHORITY".to_string()))?;
        let authority = parse_url("AUTH_AUTHORITY", Some(&authority), "")?;
        let audience = lookup("AUTH_AUDIENCE")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired("AUTH_AUDIENCE".to_string()))?;

        let accepted_issuers = match parse_list(lookup("AUTH_ACCEPTED_ISSUERS")) {
            list if list.is_empty() => default_issuers(&authority)?,
            list => list,
        };

        let allowed_algorithms = match parse_list(lookup("AUTH_ALLOWED_ALGORITHMS")) {
            names if names.is_empty() => vec![Algorithm::RS256],
            names => names
                .iter()
                .map(|name| parse_algorithm(name))
                .collect::<Result<Vec<_>, _>>()?,
        };

        let jwks_url = lookup("AUTH_JWKS_URL")
            .map(|raw| parse_url("AUTH_JWKS_URL", Some(&raw), ""))
            .transpose()?;

        let config = Self {
            authority,
            audience,
            accepted_issuers,
            allowed_algorithms,
            jwks_url,
            clock_skew_seconds: parse_value(&lookup, "AUTH_CLOCK_SKEW_SECONDS", 60)?,
            jwks_cache_ttl_seconds: parse_value(&lookup, "JWKS_CACHE_TTL", 3600)?,
            jwks_min_refresh_interval_seconds: parse_value(
                &lookup,
                "JWKS_MIN_REFRESH_INTERVAL",
                10,
            )?,
            jwks_fetch_timeout_secs: parse_value(&lookup, "JWKS_FETCH_TIMEOUT", 10)?,
            jwks_fetch_retries: parse_value(&lookup, "JWKS_FETCH_RETRIES", 2)?,
            store_timeout_secs: parse_value(&lookup, "STORE_TIMEOUT", 10)?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_json: parse_value(&lookup, "LOG_JSON", true)?,
            shutdown_timeout_seconds: parse_value(&lookup, "SHUTDOWN_TIMEOUT", 30)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.jwks_cache_ttl_seconds == 0 {
            return Err(ConfigError::InvalidTtl);
        }
        if self.jwks_fetch_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("JWKS_FETCH_TIMEOUT".to_string()));
        }
        if self.store_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("STORE_TIMEOUT".to_string()));
        }
        if self.accepted_issuers.is_empty() {
            return Err(ConfigError::MissingRequired(
                "AUTH_ACCEPTED_ISSUERS".to_string(),
            ));
        }
        if self.allowed_algorithms.is_empty() {
            return Err(ConfigError::MissingRequired(
                "AUTH_ALLOWED_ALGORITHMS".to_string(),
            ));
        }
        Ok(())
    }

    /// OpenID discovery document location for the authority.
    #[must_use]
    pub fn discovery_url(&self) -> String {
        format!(
            "{}/v2.0/.well-known/openid-configuration",
            self.authority.as_str().trim_end_matches('/')
        )
    }

    /// Clock skew allowance.
    #[must_use]
    pub const fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_seconds)
    }

    /// Key set freshness window.
    #[must_use]
    pub const fn jwks_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_cache_ttl_seconds)
    }

    /// Miss-driven refresh cooldown.
    #[must_use]
    pub const fn jwks_min_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.jwks_min_refresh_interval_seconds)
    }

    /// Key set refresh bound.
    #[must_use]
    pub const fn jwks_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.jwks_fetch_timeout_secs)
    }

    /// Store call bound.
    #[must_use]
    pub const fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    /// Graceful shutdown bound.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

/// The v2.0 issuer and the legacy STS issuer for the authority's tenant.
///
/// Tokens always carry their real tenant id, so an alias tenant yields no
/// issuer that could ever match.
fn default_issuers(authority: &Url) -> Result<Vec<String>, ConfigError> {
    let tenant = authority
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .filter(|tenant| !MULTI_TENANT_ALIASES.contains(&tenant.to_ascii_lowercase().as_str()))
        .ok_or_else(|| ConfigError::UnqualifiedAuthority(authority.to_string()))?;

    let base = authority.as_str().trim_end_matches('/');
    Ok(vec![
        format!("{base}/v2.0"),
        format!("https://sts.windows.net/{tenant}/"),
    ])
}

fn parse_algorithm(name: &str) -> Result<Algorithm, ConfigError> {
    let alg = Algorithm::from_str(name)
        .map_err(|_| ConfigError::InvalidAlgorithm(name.to_string()))?;
    if ASYMMETRIC_ALGORITHMS.contains(&alg) {
        Ok(alg)
    } else {
        Err(ConfigError::InvalidAlgorithm(name.to_string()))
    }
}

/// Parse a variable with a default value.
fn parse_value<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(val) => val.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Parse a URL variable with a default value.
fn parse_url(name: &str, value: Option<&str>, default: &str) -> Result<Url, ConfigError> {
    let url_str = value.unwrap_or(default);
    Url::parse(url_str).map_err(|e| ConfigError::InvalidUrl {
        field: name.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a comma-separated list variable.
fn parse_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
