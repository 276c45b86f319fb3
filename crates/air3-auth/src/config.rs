//! Authentication configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! [auth]
//! verification = "signature"
//! expected_issuer = "https://auth.air3.example"
//!
//! [auth.jwks]
//! uri = "https://auth.air3.example/.well-known/jwks.json"
//! request_timeout = "10s"
//!
//! [auth.profile]
//! public_api_url = "https://api.example.com"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::federation::jwks::KeyResolverConfig;

/// Root authentication configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// How incoming Air3 bearer tokens are checked.
    pub verification: VerificationMode,

    /// Signing key set used in `signature` mode.
    pub jwks: JwksConfig,

    /// When set, the token `iss` claim must match.
    pub expected_issuer: Option<String>,

    /// When non-empty, the token `aud` claim must contain one of these.
    pub expected_audience: Vec<String>,

    /// Defaults for newly provisioned profiles.
    pub profile: ProfileConfig,
}

/// Token verification mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMode {
    /// Verify the signature against the configured JWKS.
    #[default]
    Signature,
    /// Decode claims without checking the signature. Development only.
    DecodeOnly,
}

impl VerificationMode {
    /// Returns the configuration name of this mode.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Signature => "signature",
            Self::DecodeOnly => "decode_only",
        }
    }
}

/// JWKS endpoint settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JwksConfig {
    /// JWKS endpoint publishing the Air3 signing keys.
    pub uri: Option<Url>,

    /// HTTP request timeout for fetching the key set.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Maximum accepted response size in bytes.
    pub max_response_size: usize,

    /// Minimum time between two fetches triggered by unknown key ids.
    #[serde(with = "humantime_serde")]
    pub refresh_cooldown: Duration,

    /// Allow plain HTTP endpoints. Only meant for local setups and tests.
    pub allow_http: bool,
}

impl Default for JwksConfig {
    fn default() -> Self {
        Self {
            uri: None,
            request_timeout: Duration::from_secs(10),
            max_response_size: 1024 * 1024,
            refresh_cooldown: Duration::from_secs(10),
            allow_http: false,
        }
    }
}

impl JwksConfig {
    /// Builds the key resolver settings from this section.
    #[must_use]
    pub fn resolver_config(&self) -> KeyResolverConfig {
        KeyResolverConfig::new()
            .with_request_timeout(self.request_timeout)
            .with_max_response_size(self.max_response_size)
            .with_refresh_cooldown(self.refresh_cooldown)
            .with_allow_http(self.allow_http)
    }
}

/// Profile provisioning defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Public API base URL, used to build the default avatar URL.
    pub public_api_url: String,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            public_api_url: "http://localhost:3000".to_string(),
        }
    }
}

impl ProfileConfig {
    /// URL of the placeholder avatar assigned to new profiles.
    #[must_use]
    pub fn default_avatar_url(&self) -> String {
        format!(
            "{}/dev/images/user.jpg",
            self.public_api_url.trim_end_matches('/')
        )
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `signature` mode is selected without a JWKS URI
    /// - the JWKS URI is not HTTPS and `allow_http` is off
    /// - the public API URL is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.verification == VerificationMode::Signature {
            let Some(uri) = &self.jwks.uri else {
                return Err(ConfigError::Missing("auth.jwks.uri".to_string()));
            };
            if uri.scheme() != "https" && !(uri.scheme() == "http" && self.jwks.allow_http) {
                return Err(ConfigError::InvalidValue(format!(
                    "auth.jwks.uri must use https, got '{}'",
                    uri.scheme()
                )));
            }
        }

        if self.jwks.max_response_size == 0 {
            return Err(ConfigError::InvalidValue(
                "auth.jwks.max_response_size must be > 0".to_string(),
            ));
        }

        if self.profile.public_api_url.trim().is_empty() {
            return Err(ConfigError::Missing(
                "auth.profile.public_api_url".to_string(),
            ));
        }

        Ok(())
    }
}
