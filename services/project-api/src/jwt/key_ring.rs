//! Signing Key Ring with Single-Flight Refresh
//!
//! Implements the cache of the authority's published signing keys that:
//! - Is populated lazily on the first lookup
//! - Collapses concurrent misses into one outbound refresh
//! - Treats the whole set as stale after the configured TTL
//! - Keeps serving cached keys when the authority cannot be reached

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use jsonwebtoken::{Algorithm, DecodingKey};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::jwt::key_source::{Jwk, Jwks, KeySetSource};
use crate::observability::CoreMetrics;
use crate::retry::{RetryConfig, RetryPolicy};
use crate::shutdown::ShutdownCoordinator;

/// Minimum accepted RSA modulus length in base64url characters (2048 bits)
const MIN_RSA_MODULUS_CHARS: usize = 340;

/// Key ring failures. Cloned to every waiter of a shared refresh.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyRingError {
    /// The key id is not part of the published key set
    #[error("Signing key {kid} not found")]
    NotFound {
        /// Requested key id
        kid: String,
    },

    /// The authority could not be reached or answered unusably
    #[error("Key authority unavailable: {reason}")]
    Unavailable {
        /// Description of the failure
        reason: String,
    },
}

/// A published public key, immutable once fetched.
#[derive(Clone)]
pub struct SigningKey {
    id: String,
    algorithm: Algorithm,
    material: DecodingKey,
    fetched_at: DateTime<Utc>,
}

impl SigningKey {
    /// Builds a key from its JWK form, or `None` when the key is unusable for
    /// signature verification.
    pub fn from_jwk(jwk: &Jwk, fetched_at: DateTime<Utc>) -> Option<Self> {
        if jwk.kid.is_empty() {
            warn!(kty = %jwk.kty, "Published key has no kid, skipping");
            return None;
        }
        if jwk.key_use.as_deref().is_some_and(|u| u != "sig") {
            return None;
        }

        let (material, default_alg) = match jwk.kty.as_str() {
            "RSA" => {
                let n = jwk.n.as_deref()?;
                let e = jwk.e.as_deref()?;
                if n.len() < MIN_RSA_MODULUS_CHARS {
                    warn!(kid = %jwk.kid, "RSA key too small, rejecting");
                    return None;
                }
                (DecodingKey::from_rsa_components(n, e).ok()?, Algorithm::RS256)
            }
            "EC" => {
                let x = jwk.x.as_deref()?;
                let y = jwk.y.as_deref()?;
                let alg = match jwk.crv.as_deref().unwrap_or("P-256") {
                    "P-256" => Algorithm::ES256,
                    "P-384" => Algorithm::ES384,
                    crv => {
                        warn!(kid = %jwk.kid, crv = %crv, "Unsupported EC curve, rejecting");
                        return None;
                    }
                };
                (DecodingKey::from_ec_components(x, y).ok()?, alg)
            }
            other => {
                warn!(kid = %jwk.kid, kty = %other, "Unsupported key type");
                return None;
            }
        };

        let algorithm = match jwk.alg.as_deref() {
            Some(name) => Algorithm::from_str(name).ok()?,
            None => default_alg,
        };

        Some(Self {
            id: jwk.kid.clone(),
            algorithm,
            material,
            fetched_at,
        })
    }

    /// Key identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Algorithm the key is published for
    pub const fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Public key material
    pub const fn material(&self) -> &DecodingKey {
        &self.material
    }

    /// When the key set holding this key was fetched
    pub const fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("id", &self.id)
            .field("algorithm", &self.algorithm)
            .field("fetched_at", &self.fetched_at)
            .finish_non_exhaustive()
    }
}

/// One complete snapshot of the published keys.
#[derive(Debug)]
pub struct KeySet {
    keys: HashMap<String, Arc<SigningKey>>,
    refreshed_at: Instant,
    refreshed_at_utc: DateTime<Utc>,
}

impl KeySet {
    /// Converts a fetched JWKS, dropping unusable keys.
    pub fn from_jwks(jwks: &Jwks) -> Self {
        let now = Utc::now();
        let keys = jwks
            .keys
            .iter()
            .filter_map(|jwk| SigningKey::from_jwk(jwk, now))
            .map(|key| (key.id.clone(), Arc::new(key)))
            .collect();
        Self {
            keys,
            refreshed_at: Instant::now(),
            refreshed_at_utc: now,
        }
    }

    /// Looks up a key by id
    pub fn get(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.keys.get(kid).cloned()
    }

    /// Number of usable keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set holds no usable key
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn age(&self) -> Duration {
        self.refreshed_at.elapsed()
    }
}

/// Timing and retry settings for the key ring.
#[derive(Debug, Clone)]
pub struct KeyRingSettings {
    /// Freshness window of a fetched key set
    pub ttl: Duration,
    /// A miss against a set younger than this does not refresh again
    pub min_refresh_interval: Duration,
    /// Bound on one refresh, retries included
    pub fetch_timeout: Duration,
    /// Retry policy inside one refresh
    pub retry: RetryConfig,
}

impl Default for KeyRingSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            min_refresh_interval: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(10),
            retry: RetryConfig::default(),
        }
    }
}

impl KeyRingSettings {
    /// Settings from the service configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            ttl: config.jwks_cache_ttl(),
            min_refresh_interval: config.jwks_min_refresh_interval(),
            fetch_timeout: config.jwks_fetch_timeout(),
            retry: RetryConfig::default().with_max_retries(config.jwks_fetch_retries),
        }
    }
}

type RefreshResult = Result<Arc<KeySet>, KeyRingError>;

/// Type alias for the inflight future.
type InflightRefresh = Shared<BoxFuture<'static, RefreshResult>>;

struct KeyRingInner {
    source: Arc<dyn KeySetSource>,
    keys: ArcSwapOption<KeySet>,
    /// Single-flight coordinator
    inflight: Mutex<Option<InflightRefresh>>,
    /// Bumped after every successful refresh
    generation: AtomicU64,
    settings: KeyRingSettings,
    retry: RetryPolicy,
    metrics: CoreMetrics,
}

/// Cache of the authority's signing keys. Cloning shares the cache.
#[derive(Clone)]
pub struct KeyRing {
    inner: Arc<KeyRingInner>,
}

impl KeyRing {
    /// Creates an empty key ring; the first lookup populates it.
    pub fn new(
        source: Arc<dyn KeySetSource>,
        settings: KeyRingSettings,
        metrics: CoreMetrics,
    ) -> Self {
        let retry = RetryPolicy::new(settings.retry.clone());
        Self {
            inner: Arc::new(KeyRingInner {
                source,
                keys: ArcSwapOption::empty(),
                inflight: Mutex::new(None),
                generation: AtomicU64::new(0),
                settings,
                retry,
                metrics,
            }),
        }
    }

    /// Gets a signing key by key ID, refreshing the set when it is absent or stale.
    #[instrument(skip_all, fields(kid = %kid))]
    pub async fn get_key(&self, kid: &str) -> Result<Arc<SigningKey>, KeyRingError> {
        let observed = self.inner.generation.load(Ordering::Acquire);
        let current = self.inner.keys.load_full();

        if let Some(set) = current {
            if set.age() >= self.inner.settings.ttl {
                self.inner.metrics.record_lookup("stale");
                return match self.refresh_after(observed).await {
                    Ok(fresh) => fresh.get(kid).ok_or_else(|| not_found(kid)),
                    Err(err) => set.get(kid).ok_or(err).inspect(|_| {
                        warn!("Key authority unreachable, serving key from stale set");
                    }),
                };
            }

            if let Some(key) = set.get(kid) {
                self.inner.metrics.record_lookup("hit");
                return Ok(key);
            }

            if set.age() < self.inner.settings.min_refresh_interval
                && self.inner.generation.load(Ordering::Acquire) == observed
            {
                self.inner.metrics.record_lookup("miss");
                return Err(not_found(kid));
            }
        }

        self.inner.metrics.record_lookup("miss");
        let fresh = self.refresh_after(observed).await?;
        fresh.get(kid).ok_or_else(|| not_found(kid))
    }

    /// Refreshes unless another caller completed a refresh since `observed`.
    async fn refresh_after(&self, observed: u64) -> RefreshResult {
        if self.inner.generation.load(Ordering::Acquire) != observed {
            if let Some(set) = self.inner.keys.load_full() {
                return Ok(set);
            }
        }
        self.refresh().await
    }

    /// Refreshes the key set using the single-flight pattern.
    ///
    /// Only one fetch runs even if multiple concurrent callers request a
    /// refresh simultaneously; every caller receives the same result.
    pub async fn refresh(&self) -> RefreshResult {
        let flight = {
            let mut slot = self.inner.inflight.lock();
            match slot.as_ref() {
                Some(pending) if pending.peek().is_none() => pending.clone(),
                _ => {
                    let flight = Self::fetch_key_set(Arc::clone(&self.inner))
                        .boxed()
                        .shared();
                    *slot = Some(flight.clone());
                    flight
                }
            }
        };

        let result = flight.clone().await;

        let mut slot = self.inner.inflight.lock();
        if slot
            .as_ref()
            .is_some_and(|pending| Shared::ptr_eq(pending, &flight))
        {
            slot.take();
        }
        result
    }

    async fn fetch_key_set(inner: Arc<KeyRingInner>) -> RefreshResult {
        let fetch = inner.retry.execute(
            || inner.source.fetch(),
            |err| matches!(err, KeyRingError::Unavailable { .. }),
        );

        let jwks = match tokio::time::timeout(inner.settings.fetch_timeout, fetch).await {
            Ok(Ok(jwks)) => jwks,
            Ok(Err(err)) => {
                inner.metrics.record_fetch(false);
                warn!(error = %err, "Key set refresh failed");
                return Err(err);
            }
            Err(_) => {
                inner.metrics.record_fetch(false);
                warn!(timeout = ?inner.settings.fetch_timeout, "Key set refresh timed out");
                return Err(KeyRingError::Unavailable {
                    reason: format!(
                        "key set refresh timed out after {:?}",
                        inner.settings.fetch_timeout
                    ),
                });
            }
        };

        let set = KeySet::from_jwks(&jwks);
        if set.is_empty() {
            inner.metrics.record_fetch(false);
            return Err(KeyRingError::Unavailable {
                reason: "published key set contains no usable signing keys".to_string(),
            });
        }

        let set = Arc::new(set);
        inner.keys.store(Some(Arc::clone(&set)));
        inner.generation.fetch_add(1, Ordering::AcqRel);
        inner.metrics.record_fetch(true);
        info!(key_count = set.len(), "Signing key set refreshed");
        Ok(set)
    }

    /// Refreshes the key set in the background at three quarters of the TTL
    /// until shutdown.
    pub fn spawn_refresher(&self, coordinator: &mut ShutdownCoordinator) {
        let ring = self.clone();
        let period = (self.inner.settings.ttl * 3 / 4).max(Duration::from_secs(1));

        coordinator.spawn("key-ring-refresher", async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if let Err(err) = ring.refresh().await {
                    warn!(error = %err, "Background key set refresh failed");
                }
            }
        });
    }

    /// Checks if the key set is stale or was never fetched.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.inner
            .keys
            .load_full()
            .is_none_or(|set| set.age() >= self.inner.settings.ttl)
    }

    /// Gets the number of cached keys.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.inner.keys.load_full().map_or(0, |set| set.len())
    }

    /// When the current key set was fetched.
    #[must_use]
    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.inner.keys.load_full().map(|set| set.refreshed_at_utc)
    }
}

impl std::fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRing")
            .field("key_count", &self.key_count())
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

fn not_found(kid: &str) -> KeyRingError {
    KeyRingError::NotFound {
        kid: kid.to_string(),
    }
}
