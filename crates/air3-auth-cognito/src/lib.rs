//! AWS Cognito identity provider for Air3.
//!
//! Uses the user pool admin APIs:
//!
//! - `AdminInitiateAuth` with `ADMIN_USER_PASSWORD_AUTH` to authenticate
//! - `AdminCreateUser` + `AdminSetUserPassword` to provision
//! - `AdminSetUserPassword` alone to repair an account stuck with a
//!   temporary password (`NEW_PASSWORD_REQUIRED`)
//! - `AdminGetUser` to look up an existing account's subject
//!
//! Provider errors are classified by their error code; see [`classify`].

pub mod config;

use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::Client;
use aws_sdk_cognitoidentityprovider::config::timeout::TimeoutConfig;
use aws_sdk_cognitoidentityprovider::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_cognitoidentityprovider::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_cognitoidentityprovider::types::{
    AttributeType, AuthFlowType, ChallengeNameType, MessageActionType,
};
use serde::Deserialize;

use air3_auth::federation::decode_unverified;
use air3_auth::provider::{
    AuthTokens, Credential, IdentityProvider, ProviderError, ProvisionedAccount,
};

pub use config::CognitoConfig;

/// Account attribute holding the Air3 user id.
pub const ATTR_AIR3_ID: &str = "custom:air3_id";

/// Account attribute holding the smart-account address.
pub const ATTR_ABSTRACT_ACCOUNT: &str = "custom:air3_abs_acc_address";

const ATTR_EMAIL: &str = "email";
const ATTR_SUB: &str = "sub";

/// Maps a provider error code to a [`ProviderError`].
///
/// `UserNotFoundException` is treated like `NotAuthorizedException`: pools
/// that do not mask user existence report a missing account with it, and a
/// missing account is exactly what provisioning fixes.
#[must_use]
pub fn classify(code: Option<&str>, message: String) -> ProviderError {
    match code {
        Some("InvalidParameterException") => ProviderError::InvalidParameters(message),
        Some("NotAuthorizedException" | "UserNotFoundException") => {
            ProviderError::NotAuthorized(message)
        }
        Some("UsernameExistsException") => ProviderError::AccountExists(message),
        Some(other) => ProviderError::Unclassified {
            code: other.to_string(),
            message,
        },
        None => ProviderError::Unclassified {
            code: "Unknown".to_string(),
            message,
        },
    }
}

fn classify_sdk_error<E>(operation: &str, err: &E) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error,
{
    let message = err
        .message()
        .map_or_else(|| err.to_string(), str::to_string);
    tracing::debug!(
        operation,
        code = ?err.code(),
        context = %DisplayErrorContext(err),
        "Cognito call failed"
    );
    classify(err.code(), message)
}

fn attribute(name: &str, value: &str) -> Result<AttributeType, ProviderError> {
    AttributeType::builder()
        .name(name)
        .value(value)
        .build()
        .map_err(|e| ProviderError::InvalidParameters(e.to_string()))
}

fn attribute_value<'a>(attributes: &'a [AttributeType], name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|a| a.name() == name)
        .and_then(|a| a.value())
        .filter(|v| !v.is_empty())
}

#[derive(Deserialize)]
struct AccessTokenClaims {
    sub: Option<String>,
}

/// Identity provider backed by a Cognito user pool.
#[derive(Debug, Clone)]
pub struct CognitoIdentityProvider {
    client: Client,
    user_pool_id: String,
    client_id: String,
    users_password: String,
}

impl CognitoIdentityProvider {
    /// Creates a provider from an existing SDK client.
    #[must_use]
    pub fn new(client: Client, config: &CognitoConfig) -> Self {
        Self {
            client,
            user_pool_id: config.user_pool_id.clone(),
            client_id: config.client_id.clone(),
            users_password: config.users_password.clone(),
        }
    }

    /// Builds the SDK client from `config`.
    ///
    /// Static credentials, when configured, are used as-is; otherwise the
    /// default AWS credential chain is loaded.
    pub async fn from_config(config: &CognitoConfig) -> Self {
        let timeouts = TimeoutConfig::builder()
            .operation_timeout(config.operation_timeout)
            .build();
        let region = Region::new(config.region.clone());

        let client = match config.static_credentials() {
            Some((access_key_id, secret_access_key)) => {
                let credentials =
                    Credentials::new(access_key_id, secret_access_key, None, None, "air3-config");
                let mut builder = aws_sdk_cognitoidentityprovider::Config::builder()
                    .behavior_version(BehaviorVersion::latest())
                    .region(region)
                    .credentials_provider(credentials)
                    .timeout_config(timeouts);
                if let Some(endpoint) = &config.endpoint_url {
                    builder = builder.endpoint_url(endpoint);
                }
                Client::from_conf(builder.build())
            }
            None => {
                let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .region(region)
                    .timeout_config(timeouts);
                if let Some(endpoint) = &config.endpoint_url {
                    loader = loader.endpoint_url(endpoint);
                }
                Client::new(&loader.load().await)
            }
        };

        tracing::debug!(
            region = %config.region,
            user_pool_id = %config.user_pool_id,
            "Cognito identity provider configured"
        );
        Self::new(client, config)
    }
}

#[async_trait]
impl IdentityProvider for CognitoIdentityProvider {
    async fn authenticate(&self, credential: &Credential) -> Result<AuthTokens, ProviderError> {
        let output = self
            .client
            .admin_initiate_auth()
            .user_pool_id(&self.user_pool_id)
            .client_id(&self.client_id)
            .auth_flow(AuthFlowType::AdminUserPasswordAuth)
            .auth_parameters("USERNAME", &credential.email)
            .auth_parameters("PASSWORD", &self.users_password)
            .send()
            .await
            .map_err(|e| classify_sdk_error("AdminInitiateAuth", &e))?;

        if output.challenge_name() == Some(&ChallengeNameType::NewPasswordRequired) {
            return Err(ProviderError::PasswordNotPermanent(
                "NEW_PASSWORD_REQUIRED challenge".to_string(),
            ));
        }

        let result = output.authentication_result().ok_or_else(|| {
            ProviderError::IncompleteResponse(format!(
                "no authentication result (challenge: {:?})",
                output.challenge_name()
            ))
        })?;

        let access_token = result
            .access_token()
            .ok_or_else(|| ProviderError::IncompleteResponse("no access token".to_string()))?
            .to_string();

        let subject = decode_unverified::<AccessTokenClaims>(&access_token)
            .ok()
            .and_then(|claims| claims.sub);

        Ok(AuthTokens {
            access_token,
            refresh_token: result.refresh_token().map(str::to_string),
            expires_in: Some(i64::from(result.expires_in())).filter(|exp| *exp > 0),
            subject,
        })
    }

    async fn create_account(
        &self,
        credential: &Credential,
    ) -> Result<ProvisionedAccount, ProviderError> {
        let mut attributes = vec![attribute(ATTR_EMAIL, &credential.email)?];
        if let Some(id) = &credential.external_id {
            attributes.push(attribute(ATTR_AIR3_ID, id)?);
        }
        if let Some(address) = &credential.wallet_address {
            attributes.push(attribute(ATTR_ABSTRACT_ACCOUNT, address)?);
        }

        let output = self
            .client
            .admin_create_user()
            .user_pool_id(&self.user_pool_id)
            .username(&credential.email)
            .temporary_password(&self.users_password)
            .set_user_attributes(Some(attributes))
            .message_action(MessageActionType::Suppress)
            .send()
            .await
            .map_err(|e| classify_sdk_error("AdminCreateUser", &e))?;

        let user = output
            .user()
            .ok_or_else(|| ProviderError::IncompleteResponse("no user returned".to_string()))?;
        let subject_id = attribute_value(user.attributes(), ATTR_SUB).map(str::to_string);
        let email = attribute_value(user.attributes(), ATTR_EMAIL).map(str::to_string);

        self.set_permanent_password(&credential.email).await?;

        let subject_id = subject_id.ok_or_else(|| {
            ProviderError::IncompleteResponse("created user has no sub attribute".to_string())
        })?;

        tracing::debug!(subject_id, "Cognito user created");
        Ok(ProvisionedAccount { subject_id, email })
    }

    async fn set_permanent_password(&self, email: &str) -> Result<(), ProviderError> {
        self.client
            .admin_set_user_password()
            .user_pool_id(&self.user_pool_id)
            .username(email)
            .password(&self.users_password)
            .permanent(true)
            .send()
            .await
            .map_err(|e| classify_sdk_error("AdminSetUserPassword", &e))?;
        Ok(())
    }

    async fn find_subject(&self, email: &str) -> Result<Option<String>, ProviderError> {
        match self
            .client
            .admin_get_user()
            .user_pool_id(&self.user_pool_id)
            .username(email)
            .send()
            .await
        {
            Ok(output) => {
                Ok(attribute_value(output.user_attributes(), ATTR_SUB).map(str::to_string))
            }
            Err(e) if e.code() == Some("UserNotFoundException") => Ok(None),
            Err(e) => Err(classify_sdk_error("AdminGetUser", &e)),
        }
    }
}
