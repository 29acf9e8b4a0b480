//! Published key set retrieval
//!
//! The key authority is reached with plain HTTP GET: the OpenID discovery
//! document names the JWKS location, the JWKS lists the active public keys.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::jwt::key_ring::KeyRingError;

/// JSON Web Key structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type (RSA, EC)
    pub kty: String,
    /// Key ID; keys published without one cannot be selected and are skipped
    #[serde(default)]
    pub kid: String,
    /// Key use (sig, enc)
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    /// Algorithm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// RSA modulus
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA exponent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    /// EC x coordinate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    /// EC y coordinate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    /// EC curve
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
}

/// JSON Web Key Set structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Jwks {
    /// List of keys
    pub keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    jwks_uri: String,
}

/// Where the key ring gets the authority's current key set from.
#[async_trait]
pub trait KeySetSource: Send + Sync {
    /// Fetch the complete published key set.
    async fn fetch(&self) -> Result<Jwks, KeyRingError>;
}

/// Key set source backed by the authority's HTTP endpoints.
#[derive(Debug)]
pub struct HttpKeySetSource {
    client: reqwest::Client,
    discovery_url: String,
    explicit_jwks_url: Option<String>,
    discovered_jwks_url: Mutex<Option<String>>,
}

impl HttpKeySetSource {
    /// Creates a source that discovers the JWKS location unless `jwks_url` is given.
    pub fn new(
        discovery_url: impl Into<String>,
        jwks_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, KeyRingError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KeyRingError::Unavailable {
                reason: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            discovery_url: discovery_url.into(),
            explicit_jwks_url: jwks_url,
            discovered_jwks_url: Mutex::new(None),
        })
    }

    /// Creates a source from the service configuration.
    pub fn from_config(config: &Config) -> Result<Self, KeyRingError> {
        Self::new(
            config.discovery_url(),
            config.jwks_url.as_ref().map(ToString::to_string),
            config.jwks_fetch_timeout(),
        )
    }

    async fn jwks_url(&self) -> Result<String, KeyRingError> {
        if let Some(url) = &self.explicit_jwks_url {
            return Ok(url.clone());
        }
        if let Some(url) = self.discovered_jwks_url.lock().clone() {
            return Ok(url);
        }

        debug!(url = %self.discovery_url, "Resolving JWKS location");
        let document: DiscoveryDocument = self.get_json(&self.discovery_url).await?;
        info!(jwks_uri = %document.jwks_uri, "Discovered JWKS location");
        *self.discovered_jwks_url.lock() = Some(document.jwks_uri.clone());
        Ok(document.jwks_uri)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, KeyRingError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| KeyRingError::Unavailable {
                reason: format!("Request to {url} failed: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(KeyRingError::Unavailable {
                reason: format!("{url} answered with status {}", response.status()),
            });
        }

        response.json().await.map_err(|e| KeyRingError::Unavailable {
            reason: format!("Failed to parse response from {url}: {e}"),
        })
    }
}

#[async_trait]
impl KeySetSource for HttpKeySetSource {
    #[instrument(skip(self))]
    async fn fetch(&self) -> Result<Jwks, KeyRingError> {
        let url = self.jwks_url().await?;
        let result = self.get_json::<Jwks>(&url).await;
        if result.is_err() && self.explicit_jwks_url.is_none() {
            // The authority may have moved its key set; rediscover next time
            self.discovered_jwks_url.lock().take();
        }
        result
    }
}
