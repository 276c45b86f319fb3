//! Air3 signing key resolution.
//!
//! [`JwksKeyResolver`] fetches the JSON Web Key Set published by the Air3
//! identity service and caches decoding keys by `kid` for the lifetime of the
//! resolver. An unknown `kid` triggers a re-fetch of the whole set, which is
//! how key rotation is picked up; there is no TTL.
//!
//! # Example
//!
//! ```ignore
//! use air3_auth::federation::jwks::{JwksKeyResolver, KeyResolverConfig};
//! use url::Url;
//!
//! let jwks_uri = Url::parse("https://auth.air3.example/.well-known/jwks.json")?;
//! let resolver = JwksKeyResolver::new(jwks_uri, KeyResolverConfig::default())?;
//! let (key, alg) = resolver.resolve("key-1").await?;
//! ```
//!
//! # Security Considerations
//!
//! - Only HTTPS URIs are allowed (configurable for testing)
//! - HTTP timeouts prevent hanging on slow endpoints
//! - Response size is limited
//! - Fetches caused by unknown key ids are rate limited by a cooldown

use std::collections::HashMap;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::{Mutex, RwLock};
use url::Url;

/// Configuration for the key resolver.
#[derive(Debug, Clone)]
pub struct KeyResolverConfig {
    /// HTTP request timeout (default: 10 seconds).
    pub request_timeout: Duration,

    /// Maximum response size in bytes (default: 1 MB).
    pub max_response_size: usize,

    /// Minimum time between two fetches (default: 10 seconds).
    pub refresh_cooldown: Duration,

    /// Whether to allow HTTP (non-HTTPS) JWKS URIs.
    /// This should only be enabled for testing.
    pub allow_http: bool,
}

impl Default for KeyResolverConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_response_size: 1024 * 1024,
            refresh_cooldown: Duration::from_secs(10),
            allow_http: false,
        }
    }
}

impl KeyResolverConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the maximum response size.
    #[must_use]
    pub fn with_max_response_size(mut self, size: usize) -> Self {
        self.max_response_size = size;
        self
    }

    /// Sets the minimum interval between fetches.
    #[must_use]
    pub fn with_refresh_cooldown(mut self, cooldown: Duration) -> Self {
        self.refresh_cooldown = cooldown;
        self
    }

    /// Allows HTTP (non-HTTPS) JWKS URIs.
    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }
}

/// Errors that can occur during JWKS operations.
#[derive(Debug, thiserror::Error)]
pub enum JwksError {
    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    ClientError(String),

    /// A network error occurred while fetching the JWKS.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The HTTP request returned a non-success status code.
    #[error("HTTP error: status {0}")]
    HttpError(u16),

    /// The JWKS response could not be parsed as JSON.
    #[error("Failed to parse JWKS: {0}")]
    ParseError(String),

    /// The requested key was not found in the JWKS.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// The JWKS URI scheme is not allowed (must be HTTPS in production).
    #[error("Invalid URL scheme: only HTTPS is allowed")]
    InvalidScheme,

    /// The response exceeded the maximum allowed size.
    #[error("Response exceeds maximum size of {max_size} bytes")]
    ResponseTooLarge {
        /// The maximum allowed size.
        max_size: usize,
    },
}

#[derive(Clone)]
struct CachedKey {
    key: DecodingKey,
    algorithm: Option<Algorithm>,
}

/// Resolves Air3 token signing keys by key id.
///
/// The cache is read-mostly: lookups take a shared lock, a miss takes the
/// refresh lock so concurrent misses for the same rotation cause a single
/// fetch.
pub struct JwksKeyResolver {
    /// HTTP client for fetching JWKS.
    http_client: reqwest::Client,
    /// JWKS endpoint.
    jwks_uri: Url,
    /// Decoding keys by kid.
    keys: RwLock<HashMap<String, CachedKey>>,
    /// Time of the last fetch attempt; also serializes fetches.
    last_refresh: Mutex<Option<Instant>>,
    /// Configuration.
    config: KeyResolverConfig,
}

impl JwksKeyResolver {
    /// Creates a resolver for the given JWKS endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the URI scheme is not allowed or the HTTP client
    /// cannot be built.
    pub fn new(jwks_uri: Url, config: KeyResolverConfig) -> Result<Self, JwksError> {
        validate_scheme(&jwks_uri, config.allow_http)?;

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| JwksError::ClientError(e.to_string()))?;

        Ok(Self {
            http_client,
            jwks_uri,
            keys: RwLock::new(HashMap::new()),
            last_refresh: Mutex::new(None),
            config,
        })
    }

    /// Gets the decoding key and its declared algorithm for `kid`.
    ///
    /// Checks the cache first. On a miss the key set is fetched again (at
    /// most once per cooldown period) and the lookup retried.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The JWKS cannot be fetched or parsed
    /// - No key with the specified kid is published
    pub async fn resolve(&self, kid: &str) -> Result<(DecodingKey, Option<Algorithm>), JwksError> {
        if let Some(hit) = self.cached(kid).await {
            tracing::trace!(kid, "JWKS cache hit");
            return Ok(hit);
        }

        let mut last_refresh = self.last_refresh.lock().await;

        // Another request may have fetched while we waited for the lock.
        if let Some(hit) = self.cached(kid).await {
            return Ok(hit);
        }

        if let Some(at) = *last_refresh
            && at.elapsed() < self.config.refresh_cooldown
        {
            tracing::debug!(kid, "Unknown key id within refresh cooldown");
            return Err(JwksError::KeyNotFound(kid.to_string()));
        }

        tracing::debug!(kid, jwks_uri = %self.jwks_uri, "JWKS cache miss");
        *last_refresh = Some(Instant::now());
        self.fetch_and_store().await?;
        drop(last_refresh);

        self.cached(kid)
            .await
            .ok_or_else(|| JwksError::KeyNotFound(kid.to_string()))
    }

    /// Fetches the key set now, ignoring the cooldown.
    ///
    /// Returns the number of keys added to the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the JWKS cannot be fetched or parsed.
    pub async fn refresh(&self) -> Result<usize, JwksError> {
        let mut last_refresh = self.last_refresh.lock().await;
        *last_refresh = Some(Instant::now());
        self.fetch_and_store().await
    }

    async fn cached(&self, kid: &str) -> Option<(DecodingKey, Option<Algorithm>)> {
        self.keys
            .read()
            .await
            .get(kid)
            .map(|cached| (cached.key.clone(), cached.algorithm))
    }

    async fn fetch_and_store(&self) -> Result<usize, JwksError> {
        let jwks = self.fetch().await?;

        let mut keys = self.keys.write().await;
        let mut added = 0;
        for jwk in &jwks.keys {
            if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
                continue;
            }
            let Some(kid) = jwk.common.key_id.as_deref() else {
                continue;
            };
            if keys.contains_key(kid) {
                continue;
            }
            match DecodingKey::from_jwk(jwk) {
                Ok(key) => {
                    keys.insert(
                        kid.to_string(),
                        CachedKey {
                            key,
                            algorithm: jwk_algorithm(jwk),
                        },
                    );
                    added += 1;
                }
                Err(e) => {
                    tracing::warn!(kid, error = %e, "Skipping unusable JWK");
                }
            }
        }

        tracing::debug!(
            jwks_uri = %self.jwks_uri,
            published = jwks.keys.len(),
            added,
            "Cached JWKS"
        );

        Ok(added)
    }

    async fn fetch(&self) -> Result<JwkSet, JwksError> {
        tracing::debug!("Fetching JWKS from {}", self.jwks_uri);

        let response = self
            .http_client
            .get(self.jwks_uri.as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Failed to fetch JWKS from {}: {}", self.jwks_uri, e);
                JwksError::NetworkError(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(JwksError::HttpError(response.status().as_u16()));
        }

        let max_size = self.config.max_response_size;
        if let Some(len) = response.content_length()
            && len as usize > max_size
        {
            return Err(JwksError::ResponseTooLarge { max_size });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| JwksError::NetworkError(e.to_string()))?;
        if body.len() > max_size {
            return Err(JwksError::ResponseTooLarge { max_size });
        }

        serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!("Failed to parse JWKS from {}: {}", self.jwks_uri, e);
            JwksError::ParseError(e.to_string())
        })
    }

    /// Drops every cached key.
    pub async fn invalidate(&self) {
        self.keys.write().await.clear();
        tracing::debug!("Invalidated JWKS cache for {}", self.jwks_uri);
    }

    /// Returns the number of cached keys.
    pub async fn len(&self) -> usize {
        self.keys.read().await.len()
    }

    /// Returns `true` if no key is cached.
    pub async fn is_empty(&self) -> bool {
        self.keys.read().await.is_empty()
    }
}

fn validate_scheme(uri: &Url, allow_http: bool) -> Result<(), JwksError> {
    match uri.scheme() {
        "https" => Ok(()),
        "http" if allow_http => Ok(()),
        _ => Err(JwksError::InvalidScheme),
    }
}

/// Extracts the algorithm from a JWK.
fn jwk_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    jwk.common.key_algorithm.as_ref().and_then(|alg| match alg {
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    })
}
