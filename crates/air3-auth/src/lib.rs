//! Air3 authentication and provisioning.
//!
//! Accepts Air3 bearer tokens, authenticates the user at the managed
//! identity provider with a shared password, and provisions the provider
//! account and profile document on first login.
//!
//! # Modules
//!
//! - [`config`] - `[auth]` configuration section
//! - [`error`] - [`AuthError`] and its categories
//! - [`federation`] - JWKS key resolution and token verification
//! - [`provider`] - Identity provider interface
//! - [`storage`] - Profile documents and the profile store interface
//! - [`service`] - The login and role assignment flows
//! - [`http`] - axum handlers and error responses

pub mod config;
pub mod error;
pub mod federation;
pub mod http;
pub mod provider;
pub mod service;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{AuthConfig, VerificationMode};
pub use error::{AuthError, AuthResult, ErrorCategory};
pub use provider::{AuthTokens, Credential, IdentityProvider, ProviderError, ProvisionedAccount};
pub use service::{AuthService, LoginOutcome, ProfileStatus};
pub use storage::{CreateOutcome, ProfileStore, UserProfile};
