//! Managed identity provider interface.
//!
//! Every Air3 user gets an account at the identity provider whose username
//! is the email address and whose password is the shared provisioning
//! password. Holding a valid Air3 token is what entitles the caller to it;
//! the password never leaves this service.
//!
//! # Implementations
//!
//! - `air3-auth-cognito` - AWS Cognito user pools
//! - [`memory::InMemoryIdentityProvider`] - for tests and local runs

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Caller-supplied identity claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Email address; the provider username.
    pub email: String,

    /// Air3 user id.
    #[serde(rename = "id", default)]
    pub external_id: Option<String>,

    /// Smart-account (wallet) address.
    #[serde(rename = "abstractAccountAddress", default)]
    pub wallet_address: Option<String>,
}

impl Credential {
    /// Creates a credential with only an email address.
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            external_id: None,
            wallet_address: None,
        }
    }

    /// Sets the Air3 user id.
    #[must_use]
    pub fn with_external_id(mut self, id: impl Into<String>) -> Self {
        self.external_id = Some(id.into());
        self
    }

    /// Sets the wallet address.
    #[must_use]
    pub fn with_wallet_address(mut self, address: impl Into<String>) -> Self {
        self.wallet_address = Some(address.into());
        self
    }
}

/// Tokens issued by the identity provider after a successful authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTokens {
    /// Access token.
    pub access_token: String,
    /// Refresh token, when the flow issues one.
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds.
    pub expires_in: Option<i64>,
    /// Provider subject id of the authenticated account, when known.
    pub subject: Option<String>,
}

/// Result of creating an account at the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedAccount {
    /// Immutable provider subject id; the profile join key.
    pub subject_id: String,
    /// Email attribute as stored by the provider.
    pub email: Option<String>,
}

/// Classified identity provider failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// The provider rejected the request parameters. Points at a
    /// misconfigured pool or client, not at the caller.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// The credential was rejected or the account does not exist.
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// An account with this username already exists.
    #[error("Account already exists: {0}")]
    AccountExists(String),

    /// The account exists but its password is still temporary, e.g. because
    /// provisioning stopped before the password was made permanent.
    #[error("Password not permanent: {0}")]
    PasswordNotPermanent(String),

    /// The call succeeded but the response lacks required data.
    #[error("Incomplete provider response: {0}")]
    IncompleteResponse(String),

    /// Any provider error not classified above.
    #[error("Unclassified provider error ({code}): {message}")]
    Unclassified {
        /// Provider error code.
        code: String,
        /// Provider error message.
        message: String,
    },
}

impl ProviderError {
    /// Returns `true` if this failure means the account must be provisioned.
    #[must_use]
    pub fn requires_provisioning(&self) -> bool {
        matches!(self, Self::NotAuthorized(_))
    }

    /// Returns `true` if making the password permanent repairs this failure.
    #[must_use]
    pub fn requires_password_repair(&self) -> bool {
        matches!(self, Self::PasswordNotPermanent(_))
    }
}

impl From<ProviderError> for AuthError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotAuthorized(message) => AuthError::unauthorized(message),
            ProviderError::InvalidParameters(message) => {
                AuthError::internal(format!("identity provider rejected parameters: {message}"))
            }
            ProviderError::AccountExists(message)
            | ProviderError::PasswordNotPermanent(message)
            | ProviderError::IncompleteResponse(message) => AuthError::internal(message),
            ProviderError::Unclassified { code, message } => {
                AuthError::identity_provider(code, message)
            }
        }
    }
}

/// Operations against the managed identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Authenticates `credential` with the shared password.
    ///
    /// # Errors
    ///
    /// `NotAuthorized` when the account is missing or the password is not
    /// (yet) accepted; other variants for everything else.
    async fn authenticate(&self, credential: &Credential) -> Result<AuthTokens, ProviderError>;

    /// Creates an account for `credential` and makes the shared password
    /// permanent.
    ///
    /// # Errors
    ///
    /// `AccountExists` when the username is taken; `IncompleteResponse` when
    /// the provider returns no account or no subject id.
    async fn create_account(
        &self,
        credential: &Credential,
    ) -> Result<ProvisionedAccount, ProviderError>;

    /// Sets the shared password as the permanent password of the account
    /// registered for `email`.
    ///
    /// # Errors
    ///
    /// `NotAuthorized` when no such account exists.
    async fn set_permanent_password(&self, email: &str) -> Result<(), ProviderError>;

    /// Looks up the subject id of the account registered for `email`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup itself fails.
    async fn find_subject(&self, email: &str) -> Result<Option<String>, ProviderError>;
}
