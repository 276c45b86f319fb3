//! Air3 token federation.
//!
//! Air3 issues the bearer tokens this service accepts. Its signing keys are
//! published as a JWKS and resolved by key id on demand.
//!
//! - [`jwks`] - Key set fetching and the per-resolver key cache
//! - [`verifier`] - Bearer token verification

pub mod jwks;
pub mod verifier;

pub use jwks::{JwksError, JwksKeyResolver, KeyResolverConfig};
pub use verifier::{TokenClaims, TokenError, TokenVerifier, decode_unverified};
