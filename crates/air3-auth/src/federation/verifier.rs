//! Air3 bearer token verification.
//!
//! In `signature` mode the token header must carry a `kid`; the matching key
//! is resolved through [`JwksKeyResolver`] and the signature checked with the
//! key's declared algorithm. `exp` and `nbf` are enforced when present.
//! Issuer and audience are only asserted when configured.
//!
//! `decode_only` mode reads the claims without any check. It exists for local
//! development against tokens minted by hand and must never be enabled in
//! production; configuration validation enforces that.

use std::collections::HashMap;
use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Validation, decode, decode_header};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use super::jwks::{JwksError, JwksKeyResolver};
use crate::config::{AuthConfig, VerificationMode};
use crate::error::AuthError;

/// Claims carried by an Air3 bearer token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject. Role assignment is keyed by this value.
    pub sub: String,

    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Audience (string or array in the token).
    #[serde(
        default,
        deserialize_with = "deserialize_audience",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub aud: Vec<String>,

    /// Session id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    /// Token id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// Expiration (seconds since epoch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Issued at (seconds since epoch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Token type as reported by the issuer.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Partner the user signed in through.
    #[serde(rename = "partnerId", default, skip_serializing_if = "Option::is_none")]
    pub partner_id: Option<String>,

    /// User id at the partner.
    #[serde(
        rename = "partnerUserId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub partner_user_id: Option<String>,

    /// Smart-account (wallet) address.
    #[serde(
        rename = "abstractAccountAddress",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub abstract_account_address: Option<String>,

    /// Any other claims.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Deserializes the `aud` claim, which may be a single string or an array.
fn deserialize_audience<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
    })
}

/// Reasons a bearer token is rejected.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The token is not a structurally valid JWT.
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// The token header carries no key id.
    #[error("Token header has no kid")]
    MissingKeyId,

    /// The signing key could not be resolved.
    #[error("Signing key unavailable: {0}")]
    KeyResolution(#[from] JwksError),

    /// Signature, algorithm or time-based claim check failed.
    #[error("Token rejected: {0}")]
    Rejected(String),

    /// The token has no usable subject.
    #[error("Token has no subject")]
    MissingSubject,
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        AuthError::unauthorized(err.to_string())
    }
}

enum Mode {
    Signature(Arc<JwksKeyResolver>),
    DecodeOnly,
}

/// Verifies Air3 bearer tokens.
pub struct TokenVerifier {
    mode: Mode,
    expected_issuer: Option<String>,
    expected_audience: Vec<String>,
}

impl TokenVerifier {
    /// Creates a verifier that checks signatures against `resolver`.
    #[must_use]
    pub fn with_jwks(resolver: Arc<JwksKeyResolver>) -> Self {
        Self {
            mode: Mode::Signature(resolver),
            expected_issuer: None,
            expected_audience: Vec::new(),
        }
    }

    /// Creates a verifier that decodes claims without checking them.
    #[must_use]
    pub fn decode_only() -> Self {
        Self {
            mode: Mode::DecodeOnly,
            expected_issuer: None,
            expected_audience: Vec::new(),
        }
    }

    /// Requires the `iss` claim to equal `issuer`.
    #[must_use]
    pub fn with_expected_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.expected_issuer = Some(issuer.into());
        self
    }

    /// Requires the `aud` claim to contain one of `audience`.
    #[must_use]
    pub fn with_expected_audience(mut self, audience: Vec<String>) -> Self {
        self.expected_audience = audience;
        self
    }

    /// Builds a verifier from the `[auth]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if `signature` mode has no usable
    /// JWKS URI.
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let verifier = match config.verification {
            VerificationMode::DecodeOnly => {
                tracing::warn!(
                    "Token signature verification is DISABLED (decode_only); never use this in production"
                );
                Self::decode_only()
            }
            VerificationMode::Signature => {
                let uri = config
                    .jwks
                    .uri
                    .clone()
                    .ok_or_else(|| AuthError::configuration("auth.jwks.uri is required"))?;
                let resolver = JwksKeyResolver::new(uri, config.jwks.resolver_config())
                    .map_err(|e| AuthError::configuration(e.to_string()))?;
                Self::with_jwks(Arc::new(resolver))
            }
        };

        let verifier = match &config.expected_issuer {
            Some(iss) => verifier.with_expected_issuer(iss.clone()),
            None => verifier,
        };
        Ok(verifier.with_expected_audience(config.expected_audience.clone()))
    }

    /// Returns the configured verification mode.
    #[must_use]
    pub fn mode(&self) -> VerificationMode {
        match self.mode {
            Mode::Signature(_) => VerificationMode::Signature,
            Mode::DecodeOnly => VerificationMode::DecodeOnly,
        }
    }

    /// Verifies `token` and returns its claims.
    ///
    /// # Errors
    ///
    /// Returns a `TokenError` describing why the token was rejected.
    pub async fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let claims = match &self.mode {
            Mode::DecodeOnly => decode_unverified::<TokenClaims>(token)?,
            Mode::Signature(resolver) => self.verify_signature(resolver, token).await?,
        };

        if claims.sub.trim().is_empty() {
            return Err(TokenError::MissingSubject);
        }

        Ok(claims)
    }

    async fn verify_signature(
        &self,
        resolver: &JwksKeyResolver,
        token: &str,
    ) -> Result<TokenClaims, TokenError> {
        let header = decode_header(token).map_err(|e| TokenError::Malformed(e.to_string()))?;
        let kid = header.kid.as_deref().ok_or(TokenError::MissingKeyId)?;

        let (key, key_alg) = resolver.resolve(kid).await?;
        let alg = key_alg.unwrap_or(header.alg);

        let mut validation = Validation::new(alg);
        validation.required_spec_claims.clear();
        validation.validate_nbf = true;
        if let Some(iss) = &self.expected_issuer {
            validation.set_issuer(&[iss]);
        }
        if self.expected_audience.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(&self.expected_audience);
        }

        let data = decode::<TokenClaims>(token, &key, &validation)
            .map_err(|e| TokenError::Rejected(e.to_string()))?;

        tracing::trace!(sub = %data.claims.sub, kid, "Token signature verified");
        Ok(data.claims)
    }
}

/// Decodes the payload of a compact JWT without verifying it.
///
/// Used by `decode_only` mode and to read the subject from access tokens the
/// identity provider has just issued to this service.
///
/// # Errors
///
/// Returns `TokenError::Malformed` if the token is not three base64url
/// segments or the payload is not the expected JSON.
pub fn decode_unverified<T: DeserializeOwned>(token: &str) -> Result<T, TokenError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(TokenError::Malformed(
            "expected three dot-separated segments".to_string(),
        ));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| TokenError::Malformed(e.to_string()))?;

    serde_json::from_slice(&bytes).map_err(|e| TokenError::Malformed(e.to_string()))
}
