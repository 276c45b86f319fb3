//! Login and role assignment orchestration.
//!
//! A login walks through:
//!
//! ```text
//! verify bearer -> authenticate -+-> success ----------------------------> status
//!                                |
//!                                +-> not authorized -> create account
//!                                       -> ensure profile -> authenticate -> new
//! ```
//!
//! Provisioning is attempted at most once per request. An account that
//! already exists at the provider (a concurrent first login) is treated as
//! provisioned: its subject is looked up and the flow continues. An account
//! left with a temporary password gets the shared password made permanent
//! and is authenticated once more.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ProfileConfig;
use crate::error::{AuthError, AuthResult};
use crate::federation::{TokenClaims, TokenVerifier};
use crate::provider::{AuthTokens, Credential, IdentityProvider, ProviderError};
use crate::storage::{CreateOutcome, ProfileStore, UserProfile};

/// Profile state reported with a successful login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileStatus {
    /// No role assigned yet; the client should run onboarding.
    New,
    /// A role has been assigned.
    Verified,
}

/// Successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    /// Tokens issued by the identity provider.
    pub tokens: AuthTokens,
    /// Profile state.
    pub status: ProfileStatus,
    /// Whether this request provisioned the account.
    pub provisioned: bool,
}

/// Orchestrates token verification, provider authentication and profile
/// provisioning.
pub struct AuthService {
    verifier: Arc<TokenVerifier>,
    provider: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    profile_config: ProfileConfig,
}

impl AuthService {
    /// Creates a new service.
    #[must_use]
    pub fn new(
        verifier: Arc<TokenVerifier>,
        provider: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        profile_config: ProfileConfig,
    ) -> Self {
        Self {
            verifier,
            provider,
            profiles,
            profile_config,
        }
    }

    /// Logs the caller in, provisioning the account on first use.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` if the bearer token is missing or invalid, or the
    ///   provider rejects the credential after provisioning
    /// - `Internal`, `Storage` or `IdentityProvider` for everything else
    pub async fn login(
        &self,
        bearer: Option<&str>,
        credential: &Credential,
    ) -> AuthResult<LoginOutcome> {
        let claims = self.verify_bearer(bearer).await?;

        match self.authenticate(credential).await {
            Ok(tokens) => {
                let status = self.status_after_login(&claims, &tokens, credential).await?;
                tracing::info!(sub = %claims.sub, ?status, "Login succeeded");
                Ok(LoginOutcome {
                    tokens,
                    status,
                    provisioned: false,
                })
            }
            Err(err) if err.requires_provisioning() => {
                tracing::info!(sub = %claims.sub, "No usable provider account, provisioning");
                self.provision(credential).await?;

                let tokens = self.authenticate(credential).await.map_err(|e| {
                    tracing::warn!(error = %e, "Authentication after provisioning failed");
                    AuthError::from(e)
                })?;

                tracing::info!(sub = %claims.sub, "Login succeeded after provisioning");
                Ok(LoginOutcome {
                    tokens,
                    status: ProfileStatus::New,
                    provisioned: true,
                })
            }
            Err(err) => {
                tracing::warn!(error = %err, "Provider authentication failed");
                Err(err.into())
            }
        }
    }

    /// Assigns `role` to the profile of the bearer token's subject.
    ///
    /// Succeeds even when no profile matched; that case is logged.
    ///
    /// # Errors
    ///
    /// `Unauthorized` for a missing or invalid token, `Storage` if the update
    /// fails.
    pub async fn assign_role(&self, bearer: Option<&str>, role: &str) -> AuthResult<()> {
        let claims = self.verify_bearer(bearer).await?;

        let matched = self.profiles.set_role(&claims.sub, role).await?;
        if matched {
            tracing::info!(sub = %claims.sub, role, "Role assigned");
        } else {
            tracing::warn!(sub = %claims.sub, role, "Role assignment matched no profile");
        }

        Ok(())
    }

    async fn verify_bearer(&self, bearer: Option<&str>) -> AuthResult<TokenClaims> {
        let token = bearer
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::unauthorized("Missing bearer token"))?;

        self.verifier.verify(token).await.map_err(|e| {
            tracing::warn!(error = %e, "Bearer token rejected");
            AuthError::from(e)
        })
    }

    /// Authenticates, repairing a temporary password at most once.
    async fn authenticate(&self, credential: &Credential) -> Result<AuthTokens, ProviderError> {
        match self.provider.authenticate(credential).await {
            Err(err) if err.requires_password_repair() => {
                tracing::info!(error = %err, "Account password is not permanent, repairing");
                self.provider
                    .set_permanent_password(&credential.email)
                    .await?;
                self.provider.authenticate(credential).await
            }
            result => result,
        }
    }

    async fn status_after_login(
        &self,
        claims: &TokenClaims,
        tokens: &AuthTokens,
        credential: &Credential,
    ) -> AuthResult<ProfileStatus> {
        let subject = tokens.subject.as_deref().unwrap_or(&claims.sub);

        match self.profiles.find_by_subject(subject).await? {
            Some(profile) if profile.has_role() => Ok(ProfileStatus::Verified),
            Some(_) => Ok(ProfileStatus::New),
            None => {
                // An earlier provisioning attempt stopped after creating the
                // account. Only the provider subject is a valid profile key.
                if let Some(provider_subject) = &tokens.subject {
                    tracing::info!(
                        subject = %provider_subject,
                        "Account has no profile, creating it"
                    );
                    self.ensure_profile(provider_subject, Some(credential.email.clone()))
                        .await?;
                }
                Ok(ProfileStatus::New)
            }
        }
    }

    async fn provision(&self, credential: &Credential) -> AuthResult<()> {
        let (subject_id, email) = match self.provider.create_account(credential).await {
            Ok(account) => {
                tracing::info!(subject = %account.subject_id, "Provider account created");
                (
                    account.subject_id,
                    account.email.or_else(|| Some(credential.email.clone())),
                )
            }
            Err(ProviderError::AccountExists(_)) => {
                tracing::info!("Provider account already exists, continuing provisioning");
                let subject_id = self
                    .provider
                    .find_subject(&credential.email)
                    .await?
                    .ok_or_else(|| {
                        AuthError::internal("existing provider account has no subject id")
                    })?;
                (subject_id, Some(credential.email.clone()))
            }
            Err(err) => {
                tracing::warn!(error = %err, "Provider account creation failed");
                return Err(err.into());
            }
        };

        self.ensure_profile(&subject_id, email).await
    }

    async fn ensure_profile(&self, subject_id: &str, email: Option<String>) -> AuthResult<()> {
        if self.profiles.find_by_subject(subject_id).await?.is_some() {
            return Ok(());
        }

        let profile = UserProfile::provisioned(subject_id, email, &self.profile_config);
        match self.profiles.create_profile(&profile).await? {
            CreateOutcome::Created(id) => {
                tracing::info!(subject = subject_id, profile_id = %id, "Profile created");
            }
            CreateOutcome::AlreadyExists => {
                tracing::debug!(subject = subject_id, "Profile created concurrently");
            }
        }
        Ok(())
    }
}
