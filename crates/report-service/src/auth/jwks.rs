//! Key store for the identity provider's published signing keys.
//!
//! Fetches the realm JWKS from
//! `{provider}/realms/{realm}/protocol/openid-connect/certs` and caches the
//! whole set in the `KeyStore` instance.
//!
//! # Refresh policy
//!
//! - Default: the first successful fetch is kept for the process lifetime.
//!   A key rotated upstream afterwards is unknown until restart.
//! - `ttl`: an expired set is refetched on the next lookup.
//! - `refresh_on_miss`: an unknown `kid` triggers one refetch, at most once
//!   per `min_refresh_interval`.
//! - `invalidate()` drops the cached set.
//!
//! The set is replaced as a whole behind a write lock held only for the
//! assignment, so readers see either the previous set or the new one and
//! never wait on the network. Upstream fetches are serialized by a separate
//! mutex: concurrent misses produce one request.

use crate::errors::ReportError;
use crate::observability::metrics::record_jwks_fetch;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Default spacing between refresh-on-miss fetches.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// JSON Web Key from the JWKS endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA", "EC" or "OKP").
    pub kty: String,

    /// Key ID. Keys published without one never match a token.
    #[serde(default)]
    pub kid: String,

    /// Algorithm the key is intended for.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use ("sig" or "enc").
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// Curve name for EC and OKP keys.
    #[serde(default)]
    pub crv: Option<String>,

    /// EC x coordinate or OKP public key (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    pub keys: Vec<Jwk>,
}

/// An immutable snapshot of the provider's published keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SigningKeySet {
    keys: Vec<Jwk>,
}

impl SigningKeySet {
    pub fn new(keys: Vec<Jwk>) -> Self {
        Self { keys }
    }

    /// Find the key for `kid`. Linear search; the first match wins.
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|key| key.kid == kid)
    }

    pub fn keys(&self) -> &[Jwk] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// When the cached key set is refetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JwksRefreshPolicy {
    /// Lifetime of a fetched set. `None` never expires.
    pub ttl: Option<Duration>,

    /// Refetch when a token names a `kid` missing from the cached set.
    pub refresh_on_miss: bool,

    /// Minimum spacing between upstream attempts triggered by a `kid` miss.
    /// Failed attempts count.
    pub min_refresh_interval: Duration,
}

impl Default for JwksRefreshPolicy {
    fn default() -> Self {
        Self {
            ttl: None,
            refresh_on_miss: false,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
        }
    }
}

struct CachedKeySet {
    keys: Arc<SigningKeySet>,
    fetched_at: Instant,
}

/// Owned, shareable cache of the provider's signing keys.
pub struct KeyStore {
    /// URL of the realm JWKS endpoint.
    jwks_url: String,

    http_client: reqwest::Client,

    policy: JwksRefreshPolicy,

    cache: RwLock<Option<CachedKeySet>>,

    /// Held for the duration of an upstream fetch. Records when the last
    /// attempt started, successful or not.
    last_attempt: Mutex<Option<Instant>>,
}

impl KeyStore {
    /// Create a key store with the default policy and transport timeout.
    pub fn new(jwks_url: String) -> Self {
        Self::with_client(
            jwks_url,
            JwksRefreshPolicy::default(),
            reqwest::Client::new(),
        )
    }

    /// Create a key store.
    ///
    /// # Arguments
    ///
    /// * `jwks_url` - URL of the realm JWKS endpoint
    /// * `policy` - When to refetch the cached set
    /// * `fetch_timeout` - Upstream request timeout; `None` leaves it unbounded
    ///
    /// # Errors
    ///
    /// Returns the `reqwest` error if the HTTP client cannot be built.
    pub fn with_policy(
        jwks_url: String,
        policy: JwksRefreshPolicy,
        fetch_timeout: Option<Duration>,
    ) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = fetch_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self::with_client(jwks_url, policy, builder.build()?))
    }

    fn with_client(
        jwks_url: String,
        policy: JwksRefreshPolicy,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            jwks_url,
            http_client,
            policy,
            cache: RwLock::new(None),
            last_attempt: Mutex::new(None),
        }
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    pub fn policy(&self) -> &JwksRefreshPolicy {
        &self.policy
    }

    /// Return the current key set, fetching it if absent or expired.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::UpstreamUnavailable` if the provider cannot be
    /// reached, answers with a non-success status, or serves an unparsable
    /// document. Failures are not retried.
    #[instrument(skip_all, name = "report.auth.jwks.get_keys")]
    pub async fn get_keys(&self) -> Result<Arc<SigningKeySet>, ReportError> {
        if let Some(keys) = self.fresh_keys().await {
            tracing::debug!(target: "report.auth.jwks", "JWKS cache hit");
            return Ok(keys);
        }

        let mut last_attempt = self.last_attempt.lock().await;
        // Another request may have refreshed while this one waited.
        if let Some(keys) = self.fresh_keys().await {
            return Ok(keys);
        }

        tracing::debug!(target: "report.auth.jwks", "JWKS cache empty or expired");
        self.refresh(&mut last_attempt).await
    }

    /// Refetch after a `kid` miss, when the policy allows it.
    ///
    /// `seen` is the set the caller looked the `kid` up in. If the cache has
    /// moved past it, the current set is returned without a fetch. When the
    /// last upstream attempt is younger than `min_refresh_interval` the
    /// current set is returned as is. Returns `Ok(None)` when refresh-on-miss
    /// is disabled or nothing is cached.
    #[instrument(skip(self, seen), name = "report.auth.jwks.refresh_after_miss")]
    pub async fn refresh_after_miss(
        &self,
        kid: &str,
        seen: &Arc<SigningKeySet>,
    ) -> Result<Option<Arc<SigningKeySet>>, ReportError> {
        if !self.policy.refresh_on_miss {
            return Ok(None);
        }

        let mut last_attempt = self.last_attempt.lock().await;

        let current = self.cached_keys().await;
        if let Some(current) = &current {
            if !Arc::ptr_eq(current, seen) {
                tracing::debug!(target: "report.auth.jwks", kid = %kid, "JWKS refreshed concurrently");
                return Ok(Some(Arc::clone(current)));
            }
        }

        if matches!(*last_attempt, Some(at) if at.elapsed() < self.policy.min_refresh_interval) {
            tracing::debug!(target: "report.auth.jwks", kid = %kid, "Refresh on miss throttled");
            return Ok(current);
        }

        tracing::info!(target: "report.auth.jwks", kid = %kid, "Unknown kid, refreshing JWKS");
        self.refresh(&mut last_attempt).await.map(Some)
    }

    /// Drop the cached set; the next lookup refetches.
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
        tracing::info!(target: "report.auth.jwks", "JWKS cache invalidated");
    }

    async fn cached_keys(&self) -> Option<Arc<SigningKeySet>> {
        let cache = self.cache.read().await;
        cache.as_ref().map(|cached| Arc::clone(&cached.keys))
    }

    async fn fresh_keys(&self) -> Option<Arc<SigningKeySet>> {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|cached| !self.is_expired(cached))
            .map(|cached| Arc::clone(&cached.keys))
    }

    fn is_expired(&self, cached: &CachedKeySet) -> bool {
        self.policy
            .ttl
            .is_some_and(|ttl| cached.fetched_at.elapsed() >= ttl)
    }

    /// Fetch and replace the cached set. Callers hold the `last_attempt`
    /// mutex; the cache lock is taken only to store the result.
    async fn refresh(
        &self,
        last_attempt: &mut Option<Instant>,
    ) -> Result<Arc<SigningKeySet>, ReportError> {
        let start = Instant::now();
        *last_attempt = Some(start);

        let result = self.fetch().await;
        record_jwks_fetch(
            if result.is_ok() { "success" } else { "error" },
            start.elapsed(),
        );

        let keys = Arc::new(result?);

        let mut cache = self.cache.write().await;
        *cache = Some(CachedKeySet {
            keys: Arc::clone(&keys),
            fetched_at: Instant::now(),
        });

        Ok(keys)
    }

    async fn fetch(&self) -> Result<SigningKeySet, ReportError> {
        tracing::debug!(target: "report.auth.jwks", url = %self.jwks_url, "Fetching JWKS from identity provider");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "report.auth.jwks", error = %e, "Failed to fetch JWKS");
                ReportError::UpstreamUnavailable("JWKS request failed".to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(
                target: "report.auth.jwks",
                status = %status,
                "JWKS endpoint returned error"
            );
            return Err(ReportError::UpstreamUnavailable(format!(
                "JWKS endpoint returned {}",
                status.as_u16()
            )));
        }

        let jwks: JwksResponse = response.json().await.map_err(|e| {
            tracing::error!(target: "report.auth.jwks", error = %e, "Failed to parse JWKS response");
            ReportError::UpstreamUnavailable("JWKS response unparsable".to_string())
        })?;

        tracing::info!(
            target: "report.auth.jwks",
            key_count = jwks.keys.len(),
            "JWKS cache refreshed"
        );

        Ok(SigningKeySet::new(jwks.keys))
    }
}
