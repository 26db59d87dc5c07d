//! JWKS key cache for fetching and caching the issuer's signing keys.
//!
//! Keys are fetched from the issuer's key-discovery endpoint
//! (`/.well-known/jwks.json`) and held as one immutable [`KeySet`] with a
//! configurable TTL.
//!
//! # Rotation and refresh
//!
//! - A lookup hits the cache while the KeySet is younger than the TTL
//! - An expired KeySet, or an unknown `kid`, triggers one refresh and one retry
//! - A refresh swaps in a complete new KeySet; readers never see partial state
//! - Refreshes are single-flight: callers that queued behind a refresh reuse
//!   its outcome instead of fetching again
//! - The fetch runs on its own task, so a cancelled request does not abort a
//!   fetch that later requests will benefit from
//!
//! # Security
//!
//! - Keys are typed at fetch time; a key's algorithm is fixed by the document
//! - Key material never appears in logs or Debug output
//! - HTTPS should be used in production (enforced by the configured issuer URL)

use crate::auth::clock::Clock;
use crate::errors::AuthError;
use crate::observability::metrics;
use chrono::{DateTime, Utc};
use common::jwt::parse_algorithm;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Default cache TTL in seconds (5 minutes).
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;

/// Timeout for a single key-discovery request.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON Web Key from the key-discovery endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA", "OKP", or "EC").
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: Option<String>,

    /// Algorithm the key is published for.
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

    /// Curve name ("Ed25519", "P-256", "P-384").
    #[serde(default)]
    pub crv: Option<String>,

    /// OKP public key or EC x coordinate (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,
}

/// Key-discovery document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

/// Why a published JWK could not be turned into a [`SigningKey`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JwkError {
    #[error("JWK has no kid")]
    MissingKid,

    #[error("JWK algorithm is not supported")]
    UnsupportedAlgorithm,

    #[error("JWK key type {0} does not match its algorithm")]
    KeyTypeMismatch(String),

    #[error("JWK is missing parameter {0}")]
    MissingParameter(&'static str),

    #[error("JWK key parameters are invalid")]
    InvalidKeyMaterial,
}

/// Why a refresh of the KeySet failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("key-discovery request failed: {0}")]
    Request(String),

    #[error("key-discovery endpoint returned status {0}")]
    Status(u16),

    #[error("key-discovery document is malformed: {0}")]
    Parse(String),

    #[error("key-discovery document repeats kid {0}")]
    DuplicateKid(String),

    #[error("concurrent refresh failed")]
    Coalesced,
}

/// One public verification key published by the issuer.
///
/// Immutable once built; superseded only by a full KeySet refresh.
pub struct SigningKey {
    kid: String,
    algorithm: Algorithm,
    decoding_key: DecodingKey,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum KeyFamily {
    Rsa,
    Okp,
    Ec,
}

fn key_family(alg: Algorithm) -> Option<KeyFamily> {
    match alg {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => Some(KeyFamily::Rsa),
        Algorithm::EdDSA => Some(KeyFamily::Okp),
        Algorithm::ES256 | Algorithm::ES384 => Some(KeyFamily::Ec),
        _ => None,
    }
}

fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, JwkError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or(JwkError::MissingParameter(name))
}

impl SigningKey {
    /// Build a verification key from a published JWK.
    ///
    /// When `alg` is absent it is inferred from the key type:
    /// RSA → RS256, OKP → EdDSA, EC P-256 → ES256, EC P-384 → ES384.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, JwkError> {
        let kid = jwk
            .kid
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(JwkError::MissingKid)?
            .to_string();

        let algorithm = match jwk.alg.as_deref() {
            Some(alg) => parse_algorithm(alg).map_err(|_| JwkError::UnsupportedAlgorithm)?,
            None => match (jwk.kty.as_str(), jwk.crv.as_deref()) {
                ("RSA", _) => Algorithm::RS256,
                ("OKP", _) => Algorithm::EdDSA,
                ("EC", Some("P-256")) => Algorithm::ES256,
                ("EC", Some("P-384")) => Algorithm::ES384,
                _ => return Err(JwkError::UnsupportedAlgorithm),
            },
        };

        let family = key_family(algorithm).ok_or(JwkError::UnsupportedAlgorithm)?;

        let decoding_key = match (jwk.kty.as_str(), family) {
            ("RSA", KeyFamily::Rsa) => {
                let n = required(&jwk.n, "n")?;
                let e = required(&jwk.e, "e")?;
                DecodingKey::from_rsa_components(n, e)
            }
            ("OKP", KeyFamily::Okp) => {
                if jwk.crv.as_deref().is_some_and(|crv| crv != "Ed25519") {
                    return Err(JwkError::UnsupportedAlgorithm);
                }
                DecodingKey::from_ed_components(required(&jwk.x, "x")?)
            }
            ("EC", KeyFamily::Ec) => {
                let expected_crv = if algorithm == Algorithm::ES256 {
                    "P-256"
                } else {
                    "P-384"
                };
                if jwk.crv.as_deref().is_some_and(|crv| crv != expected_crv) {
                    return Err(JwkError::KeyTypeMismatch(jwk.kty.clone()));
                }
                DecodingKey::from_ec_components(required(&jwk.x, "x")?, required(&jwk.y, "y")?)
            }
            _ => return Err(JwkError::KeyTypeMismatch(jwk.kty.clone())),
        }
        .map_err(|_| JwkError::InvalidKeyMaterial)?;

        Ok(Self {
            kid,
            algorithm,
            decoding_key,
        })
    }

    /// Key identifier.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The only algorithm this key verifies.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Verification key for `jsonwebtoken`.
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

/// The full set of keys from one successful fetch.
#[derive(Debug)]
pub struct KeySet {
    keys: HashMap<String, Arc<SigningKey>>,
    fetched_at: DateTime<Utc>,
}

impl KeySet {
    /// Build a KeySet from a key-discovery document.
    ///
    /// Encryption keys and keys that cannot be used for verification are
    /// skipped. A repeated `kid` rejects the whole document, since it makes
    /// key selection ambiguous.
    pub fn from_document(
        document: JwksResponse,
        fetched_at: DateTime<Utc>,
    ) -> Result<Self, FetchError> {
        // A skipped key still occupies its kid
        let mut seen = HashSet::new();
        for kid in document.keys.iter().filter_map(|k| k.kid.as_deref()) {
            if !seen.insert(kid) {
                return Err(FetchError::DuplicateKid(kid.to_string()));
            }
        }

        let mut keys = HashMap::new();
        for jwk in &document.keys {
            if jwk.key_use.as_deref() == Some("enc") {
                tracing::debug!(target: "ticket.auth.jwks", kid = ?jwk.kid, "Skipping encryption key");
                continue;
            }

            match SigningKey::from_jwk(jwk) {
                Ok(key) => {
                    keys.insert(key.kid.clone(), Arc::new(key));
                }
                Err(e) => {
                    tracing::warn!(
                        target: "ticket.auth.jwks",
                        kid = ?jwk.kid,
                        kty = %jwk.kty,
                        error = %e,
                        "Skipping unusable JWK"
                    );
                }
            }
        }

        Ok(Self { keys, fetched_at })
    }

    /// Look up a key by identifier.
    pub fn get(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.keys.get(kid).cloned()
    }

    /// Number of usable keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True if the document contained no usable keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn age(&self, now: DateTime<Utc>) -> Duration {
        // A clock that moved backwards counts as a fresh set
        now.signed_duration_since(self.fetched_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Key cache settings.
#[derive(Debug, Clone)]
pub struct JwksConfig {
    /// URL of the key-discovery document.
    pub jwks_url: String,

    /// How long a fetched KeySet is served before a refresh is forced.
    pub cache_ttl: Duration,

    /// Minimum KeySet age before an unknown `kid` may trigger a refresh.
    pub min_refresh_interval: Duration,
}

impl JwksConfig {
    /// Settings with the default TTL and no unknown-kid throttle.
    pub fn new(jwks_url: impl Into<String>) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS),
            min_refresh_interval: Duration::ZERO,
        }
    }
}

struct RefreshState {
    /// Number of completed fetch attempts.
    completed: u64,

    /// Outcome of the latest attempt.
    last_ok: bool,
}

struct Inner {
    config: JwksConfig,
    http_client: reqwest::Client,
    clock: Arc<dyn Clock>,
    cache: RwLock<Option<Arc<KeySet>>>,

    /// Serializes fetches and records their outcome.
    fetch_lock: Mutex<RefreshState>,

    /// Mirror of `RefreshState::completed`, readable without the lock.
    attempts: AtomicU64,
}

/// Key cache for the issuer's signing keys.
///
/// Cheap to clone; clones share the same cache.
#[derive(Clone)]
pub struct JwksClient {
    inner: Arc<Inner>,
}

impl JwksClient {
    /// Create a new key cache. Nothing is fetched until the first lookup.
    pub fn new(config: JwksConfig, clock: Arc<dyn Clock>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "ticket.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            inner: Arc::new(Inner {
                config,
                http_client,
                clock,
                cache: RwLock::new(None),
                fetch_lock: Mutex::new(RefreshState {
                    completed: 0,
                    last_ok: false,
                }),
                attempts: AtomicU64::new(0),
            }),
        }
    }

    /// URL of the key-discovery document.
    pub fn jwks_url(&self) -> &str {
        &self.inner.config.jwks_url
    }

    /// Get a signing key by key ID.
    ///
    /// Served from the cached KeySet when it is unexpired and contains
    /// `kid`. Otherwise the KeySet is refreshed once and the lookup retried.
    ///
    /// # Errors
    ///
    /// - `AuthError::UnknownSigningKey` if `kid` is absent from a fresh KeySet
    /// - `AuthError::KeyFetchUnavailable` if the refresh failed and no
    ///   unexpired KeySet contains `kid`
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn get_key(&self, kid: &str) -> Result<Arc<SigningKey>, AuthError> {
        // Read the attempt counter before the cache; see Inner::refresh_after
        let observed_attempt = self.inner.attempts.load(Ordering::Acquire);
        let now = self.inner.clock.now();

        if let Some(set) = self.inner.current().await {
            if set.age(now) < self.inner.config.cache_ttl {
                if let Some(key) = set.get(kid) {
                    tracing::debug!(target: "ticket.auth.jwks", "JWKS cache hit");
                    return Ok(key);
                }

                if set.age(now) < self.inner.config.min_refresh_interval {
                    tracing::debug!(
                        target: "ticket.auth.jwks",
                        "Unknown kid, KeySet too recent to refresh"
                    );
                    return Err(AuthError::UnknownSigningKey);
                }

                tracing::debug!(target: "ticket.auth.jwks", "Unknown kid, refreshing JWKS");
            } else {
                tracing::debug!(target: "ticket.auth.jwks", "JWKS cache expired");
            }
        }

        // Detached so that a cancelled caller still lets the fetch land
        let inner = Arc::clone(&self.inner);
        let refreshed = tokio::spawn(async move { inner.refresh_after(observed_attempt).await })
            .await
            .map_err(|e| {
                tracing::error!(target: "ticket.auth.jwks", error = %e, "JWKS refresh task failed");
                AuthError::KeyFetchUnavailable
            })?;

        match refreshed {
            Ok(set) => set.get(kid).ok_or_else(|| {
                tracing::warn!(target: "ticket.auth.jwks", "Key not found in JWKS after refresh");
                AuthError::UnknownSigningKey
            }),
            Err(e) => {
                tracing::warn!(target: "ticket.auth.jwks", error = %e, "No usable signing key available");
                Err(AuthError::KeyFetchUnavailable)
            }
        }
    }

    /// Fetch a new KeySet now, regardless of cache state.
    pub async fn force_refresh(&self) -> Result<(), FetchError> {
        let observed_attempt = self.inner.attempts.load(Ordering::Acquire);
        self.inner.refresh_after(observed_attempt).await.map(|_| ())
    }

    /// Number of keys in the current KeySet (0 if nothing fetched yet).
    pub async fn key_count(&self) -> usize {
        self.inner.current().await.map_or(0, |set| set.len())
    }

    /// True if a KeySet is cached and younger than the TTL.
    pub async fn has_fresh_keys(&self) -> bool {
        let now = self.inner.clock.now();
        self.inner
            .current()
            .await
            .is_some_and(|set| set.age(now) < self.inner.config.cache_ttl)
    }
}

impl Inner {
    async fn current(&self) -> Option<Arc<KeySet>> {
        self.cache.read().await.clone()
    }

    /// Refresh unless another fetch completed after `observed_attempt`.
    ///
    /// Callers read `attempts` before they inspect the cache, and a fetch
    /// publishes its KeySet before bumping `attempts`. A caller that finds
    /// the counter moved while it waited for the lock therefore reuses that
    /// fetch's outcome instead of issuing its own request.
    async fn refresh_after(&self, observed_attempt: u64) -> Result<Arc<KeySet>, FetchError> {
        let mut state = self.fetch_lock.lock().await;

        if state.completed != observed_attempt {
            tracing::debug!(target: "ticket.auth.jwks", "Reusing concurrent JWKS refresh");
            if !state.last_ok {
                return Err(FetchError::Coalesced);
            }
            if let Some(set) = self.current().await {
                return Ok(set);
            }
        }

        let start = Instant::now();
        let result = self.fetch().await;
        let fetched_at = self.clock.now();

        let outcome = result.and_then(|document| KeySet::from_document(document, fetched_at));

        let published = match outcome {
            Ok(set) => {
                let set = Arc::new(set);
                if set.is_empty() {
                    tracing::warn!(target: "ticket.auth.jwks", "JWKS contains no usable keys");
                }
                tracing::info!(
                    target: "ticket.auth.jwks",
                    key_count = set.len(),
                    "JWKS cache refreshed"
                );
                metrics::set_jwks_keys(set.len());
                metrics::record_jwks_refresh("success", start.elapsed());
                *self.cache.write().await = Some(Arc::clone(&set));
                Ok(set)
            }
            Err(e) => {
                tracing::error!(target: "ticket.auth.jwks", error = %e, "JWKS refresh failed");
                metrics::record_jwks_refresh("error", start.elapsed());
                Err(e)
            }
        };

        state.completed += 1;
        state.last_ok = published.is_ok();
        self.attempts.store(state.completed, Ordering::Release);

        published
    }

    async fn fetch(&self) -> Result<JwksResponse, FetchError> {
        tracing::debug!(target: "ticket.auth.jwks", url = %self.config.jwks_url, "Fetching JWKS from issuer");

        let response = self
            .http_client
            .get(&self.config.jwks_url)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        response
            .json::<JwksResponse>()
            .await
            .map_err(|e| FetchError::Parse(e.to_string()))
    }
}
