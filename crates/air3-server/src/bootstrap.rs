//! Wires the configured backends into the auth service.

use std::sync::Arc;

use air3_auth::AuthService;
use air3_auth::federation::TokenVerifier;
use air3_auth::http::AuthState;
use air3_auth_cognito::CognitoIdentityProvider;
use air3_auth_mongo::MongoProfileStore;
use anyhow::Context;

use crate::config::AppConfig;

/// Builds the token verifier, Cognito provider and MongoDB profile store.
///
/// An unreachable database is not fatal at startup: the driver connects
/// lazily and requests fail with a storage error until it is back.
pub async fn build_auth_state(cfg: &AppConfig) -> anyhow::Result<AuthState> {
    let verifier =
        TokenVerifier::from_config(&cfg.auth).context("token verifier initialization failed")?;
    tracing::info!(mode = verifier.mode().as_str(), "Token verifier ready");

    let provider = CognitoIdentityProvider::from_config(&cfg.cognito).await;

    let profiles = MongoProfileStore::connect(&cfg.mongo)
        .await
        .context("MongoDB client initialization failed")?;
    match profiles.ping().await {
        Ok(()) => tracing::info!(database = %cfg.mongo.database, "MongoDB reachable"),
        Err(e) => tracing::warn!(error = %e, "MongoDB ping failed, continuing"),
    }
    if let Err(e) = profiles.ensure_indexes().await {
        tracing::warn!(error = %e, "Could not ensure profile indexes");
    }

    let service = AuthService::new(
        Arc::new(verifier),
        Arc::new(provider),
        Arc::new(profiles),
        cfg.auth.profile.clone(),
    );
    Ok(AuthState::new(Arc::new(service)))
}
