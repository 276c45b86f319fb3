//! In-memory identity provider.
//!
//! Mirrors the provider behaviour the orchestrator relies on: unknown
//! accounts and wrong passwords are `NotAuthorized`, duplicate usernames are
//! `AccountExists`, and an account whose password was never made permanent
//! is `PasswordNotPermanent`. Failures can be injected for the next call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{AuthTokens, Credential, IdentityProvider, ProviderError, ProvisionedAccount};

#[derive(Debug, Clone)]
struct MemoryAccount {
    subject_id: String,
    external_id: Option<String>,
    wallet_address: Option<String>,
    password: String,
    permanent: bool,
}

/// Identity provider backed by a map from email to account.
#[derive(Debug)]
pub struct InMemoryIdentityProvider {
    password: String,
    accounts: RwLock<HashMap<String, MemoryAccount>>,
    next_authenticate_error: Mutex<Option<ProviderError>>,
    next_create_error: Mutex<Option<ProviderError>>,
    next_set_password_error: Mutex<Option<ProviderError>>,
    authenticate_calls: AtomicUsize,
    create_calls: AtomicUsize,
    set_password_calls: AtomicUsize,
}

impl InMemoryIdentityProvider {
    /// Creates an empty provider accepting `password` for every account.
    #[must_use]
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            accounts: RwLock::new(HashMap::new()),
            next_authenticate_error: Mutex::new(None),
            next_create_error: Mutex::new(None),
            next_set_password_error: Mutex::new(None),
            authenticate_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            set_password_calls: AtomicUsize::new(0),
        }
    }

    /// Seeds an existing account.
    #[must_use]
    pub fn with_account(mut self, email: impl Into<String>, subject_id: impl Into<String>) -> Self {
        let account = MemoryAccount {
            subject_id: subject_id.into(),
            external_id: None,
            wallet_address: None,
            password: self.password.clone(),
            permanent: true,
        };
        self.accounts.get_mut().insert(email.into(), account);
        self
    }

    /// Makes the next `authenticate` call fail with `err`.
    pub async fn fail_next_authenticate(&self, err: ProviderError) {
        *self.next_authenticate_error.lock().await = Some(err);
    }

    /// Makes the next `create_account` call fail with `err`.
    pub async fn fail_next_create(&self, err: ProviderError) {
        *self.next_create_error.lock().await = Some(err);
    }

    /// Makes the next password change fail with `err`, including the one
    /// `create_account` performs. The account is then left with a temporary
    /// password.
    pub async fn fail_next_set_password(&self, err: ProviderError) {
        *self.next_set_password_error.lock().await = Some(err);
    }

    /// Number of `authenticate` calls so far.
    #[must_use]
    pub fn authenticate_calls(&self) -> usize {
        self.authenticate_calls.load(Ordering::SeqCst)
    }

    /// Number of `create_account` calls so far.
    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of `set_permanent_password` calls so far.
    #[must_use]
    pub fn set_password_calls(&self) -> usize {
        self.set_password_calls.load(Ordering::SeqCst)
    }

    /// Number of registered accounts.
    pub async fn account_count(&self) -> usize {
        self.accounts.read().await.len()
    }

    /// Returns the (external id, wallet address) attributes stored for `email`.
    pub async fn attributes(&self, email: &str) -> Option<(Option<String>, Option<String>)> {
        self.accounts
            .read()
            .await
            .get(email)
            .map(|a| (a.external_id.clone(), a.wallet_address.clone()))
    }
}

/// Shapes an access token like a provider-issued JWT so its `sub` can be read.
fn access_token_for(subject_id: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        json!({ "sub": subject_id, "token_use": "access", "jti": Uuid::new_v4().to_string() })
            .to_string(),
    );
    format!("{header}.{payload}.")
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn authenticate(&self, credential: &Credential) -> Result<AuthTokens, ProviderError> {
        self.authenticate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.next_authenticate_error.lock().await.take() {
            return Err(err);
        }

        let accounts = self.accounts.read().await;
        let account = accounts
            .get(&credential.email)
            .ok_or_else(|| ProviderError::NotAuthorized("User does not exist.".to_string()))?;

        if account.password != self.password {
            return Err(ProviderError::NotAuthorized(
                "Incorrect username or password.".to_string(),
            ));
        }
        if !account.permanent {
            return Err(ProviderError::PasswordNotPermanent(
                "NEW_PASSWORD_REQUIRED".to_string(),
            ));
        }

        Ok(AuthTokens {
            access_token: access_token_for(&account.subject_id),
            refresh_token: Some(format!("refresh-{}", Uuid::new_v4())),
            expires_in: Some(3600),
            subject: Some(account.subject_id.clone()),
        })
    }

    async fn create_account(
        &self,
        credential: &Credential,
    ) -> Result<ProvisionedAccount, ProviderError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.next_create_error.lock().await.take() {
            return Err(err);
        }

        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&credential.email) {
            return Err(ProviderError::AccountExists(
                "An account with the given email already exists.".to_string(),
            ));
        }

        let account = MemoryAccount {
            subject_id: Uuid::new_v4().to_string(),
            external_id: credential.external_id.clone(),
            wallet_address: credential.wallet_address.clone(),
            password: self.password.clone(),
            permanent: false,
        };
        let subject_id = account.subject_id.clone();
        accounts.insert(credential.email.clone(), account);
        drop(accounts);
        tracing::debug!(subject_id, "Created in-memory account");

        self.set_permanent_password(&credential.email).await?;
        Ok(ProvisionedAccount {
            subject_id,
            email: Some(credential.email.clone()),
        })
    }

    async fn set_permanent_password(&self, email: &str) -> Result<(), ProviderError> {
        self.set_password_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.next_set_password_error.lock().await.take() {
            return Err(err);
        }

        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(email)
            .ok_or_else(|| ProviderError::NotAuthorized("User does not exist.".to_string()))?;
        account.permanent = true;
        Ok(())
    }

    async fn find_subject(&self, email: &str) -> Result<Option<String>, ProviderError> {
        Ok(self
            .accounts
            .read()
            .await
            .get(email)
            .map(|a| a.subject_id.clone()))
    }
}
