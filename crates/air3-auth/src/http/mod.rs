//! HTTP handlers for Air3 login and role assignment.
//!
//! - `POST /api/auth/air-kit` - log in, provisioning on first use
//! - `POST /api/auth/role` - assign a role to the caller's profile

pub mod error;
pub mod extract;

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::provider::Credential;
use crate::service::{AuthService, LoginOutcome, ProfileStatus};

pub use extract::BearerToken;

/// Login route path.
pub const LOGIN_PATH: &str = "/api/auth/air-kit";

/// Role assignment route path.
pub const ROLE_PATH: &str = "/api/auth/role";

/// Shared state for the auth handlers.
#[derive(Clone)]
pub struct AuthState {
    pub service: Arc<AuthService>,
}

impl AuthState {
    #[must_use]
    pub fn new(service: Arc<AuthService>) -> Self {
        Self { service }
    }
}

/// Successful login response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: Option<String>,
    pub exp: Option<i64>,
    pub status: ProfileStatus,
}

impl From<LoginOutcome> for LoginResponse {
    fn from(outcome: LoginOutcome) -> Self {
        Self {
            access: outcome.tokens.access_token,
            refresh: outcome.tokens.refresh_token,
            exp: outcome.tokens.expires_in,
            status: outcome.status,
        }
    }
}

/// Role assignment request body.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleRequest {
    pub role: String,
}

/// Role assignment response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleResponse {
    pub success: bool,
}

/// Builds the auth routes.
pub fn router(state: AuthState) -> Router {
    Router::new()
        .route(LOGIN_PATH, post(login))
        .route(ROLE_PATH, post(assign_role))
        .with_state(state)
}

/// `POST /api/auth/air-kit`
pub async fn login(
    State(state): State<AuthState>,
    bearer: BearerToken,
    body: Result<Json<Credential>, JsonRejection>,
) -> Response {
    let credential = match require_body(&bearer, body) {
        Ok(credential) => credential,
        Err(response) => return response,
    };

    match state.service.login(bearer.as_deref(), &credential).await {
        Ok(outcome) => Json(LoginResponse::from(outcome)).into_response(),
        Err(err) => err.into_response(),
    }
}

/// `POST /api/auth/role`
pub async fn assign_role(
    State(state): State<AuthState>,
    bearer: BearerToken,
    body: Result<Json<RoleRequest>, JsonRejection>,
) -> Response {
    let request = match require_body(&bearer, body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    match state.service.assign_role(bearer.as_deref(), &request.role).await {
        Ok(()) => (StatusCode::CREATED, Json(RoleResponse { success: true })).into_response(),
        Err(err) => err.into_response(),
    }
}

/// A missing bearer token wins over a malformed body. Any other body
/// rejection is an internal error, so callers only ever see 200/201, 401 or
/// 500.
fn require_body<T>(
    bearer: &BearerToken,
    body: Result<Json<T>, JsonRejection>,
) -> Result<T, Response> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(_) if bearer.as_deref().is_none() => {
            Err(AuthError::unauthorized("Missing bearer token").into_response())
        }
        Err(rejection) => Err(AuthError::internal(format!(
            "unreadable request body ({}): {}",
            rejection.status(),
            rejection.body_text()
        ))
        .into_response()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfileConfig;
    use crate::federation::TokenVerifier;
    use crate::provider::memory::InMemoryIdentityProvider;
    use crate::storage::InMemoryProfileStore;
    use crate::testing::unsigned_token;
    use axum::body::Body;
    use axum::http::{Request, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn app() -> Router {
        let service = AuthService::new(
            Arc::new(TokenVerifier::decode_only()),
            Arc::new(InMemoryIdentityProvider::new("pw")),
            Arc::new(InMemoryProfileStore::new()),
            ProfileConfig::default(),
        );
        router(AuthState::new(Arc::new(service)))
    }

    async fn post(
        path: &str,
        bearer: Option<&str>,
        content_type: &str,
        body: &'static str,
    ) -> (StatusCode, Value) {
        let mut request = Request::post(path).header(header::CONTENT_TYPE, content_type);
        if let Some(token) = bearer {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let response = app()
            .oneshot(request.body(Body::from(body)).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_unreadable_body_with_bearer_is_internal_error() {
        let token = unsigned_token(&json!({ "sub": "air3-1" }));
        for (path, content_type, body) in [
            (LOGIN_PATH, "application/json", "{not json"),
            (LOGIN_PATH, "application/json", "{}"),
            (LOGIN_PATH, "text/plain", r#"{"email":"a@example.com"}"#),
            (ROLE_PATH, "application/json", r#"{"role":7}"#),
        ] {
            let (status, body) = post(path, Some(&token), content_type, body).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{path} {body}");
            assert_eq!(body, json!({ "message": "Something went wrong..." }));
        }
    }

    #[tokio::test]
    async fn test_unreadable_body_without_bearer_is_unauthorized() {
        let (status, body) = post(LOGIN_PATH, None, "text/plain", "nope").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "message": "Authorization failed" }));
    }

    #[tokio::test]
    async fn test_login_then_assign_role() {
        let token = unsigned_token(&json!({ "sub": "air3-1" }));
        let (status, body) = post(
            LOGIN_PATH,
            Some(&token),
            "application/json",
            r#"{"email":"a@example.com","id":"air3-1"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "new");

        let (status, body) = post(
            ROLE_PATH,
            Some(&token),
            "application/json",
            r#"{"role":"judge"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({ "success": true }));
    }
}
