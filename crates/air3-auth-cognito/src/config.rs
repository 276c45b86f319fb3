//! Cognito connection settings.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Cognito user pool settings.
///
/// `users_password` is the shared password every provisioned account gets.
/// It and the secret access key are redacted from `Debug` output.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CognitoConfig {
    /// AWS region of the user pool.
    pub region: String,

    /// User pool id.
    pub user_pool_id: String,

    /// App client id allowed to use the admin password flow.
    pub client_id: String,

    /// Shared provisioning password.
    pub users_password: String,

    /// Static access key id. When unset the default AWS credential chain is
    /// used.
    pub access_key_id: Option<String>,

    /// Static secret access key.
    pub secret_access_key: Option<String>,

    /// Endpoint override, e.g. for a local emulator.
    pub endpoint_url: Option<String>,

    /// Deadline for a single provider operation, retries included.
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,
}

impl Default for CognitoConfig {
    fn default() -> Self {
        Self {
            region: "eu-central-1".to_string(),
            user_pool_id: String::new(),
            client_id: String::new(),
            users_password: String::new(),
            access_key_id: None,
            secret_access_key: None,
            endpoint_url: None,
            operation_timeout: Duration::from_secs(10),
        }
    }
}

impl fmt::Debug for CognitoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CognitoConfig")
            .field("region", &self.region)
            .field("user_pool_id", &self.user_pool_id)
            .field("client_id", &self.client_id)
            .field("users_password", &"<redacted>")
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field("endpoint_url", &self.endpoint_url)
            .field("operation_timeout", &self.operation_timeout)
            .finish()
    }
}

impl CognitoConfig {
    /// Returns the static credentials pair when both halves are configured.
    #[must_use]
    pub fn static_credentials(&self) -> Option<(&str, &str)> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                Some((id.as_str(), secret.as_str()))
            }
            _ => None,
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.region.trim().is_empty() {
            return Err("cognito.region must not be empty".into());
        }
        if self.user_pool_id.trim().is_empty() {
            return Err("cognito.user_pool_id must be set".into());
        }
        if self.client_id.trim().is_empty() {
            return Err("cognito.client_id must be set".into());
        }
        if self.users_password.is_empty() {
            return Err("cognito.users_password must be set".into());
        }
        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            return Err(
                "cognito.access_key_id and cognito.secret_access_key must be set together".into(),
            );
        }
        if self.operation_timeout.is_zero() {
            return Err("cognito.operation_timeout must be > 0".into());
        }
        Ok(())
    }
}
