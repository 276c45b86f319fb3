//! Error response handling.
//!
//! Callers only ever see one of two messages; the detailed error is logged.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthError;

/// Message returned for every authorization failure.
pub const AUTHORIZATION_FAILED: &str = "Authorization failed";

/// Message returned for every server-side failure.
pub const INTERNAL_FAILURE: &str = "Something went wrong...";

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = error_details(&self);

        if status.is_server_error() {
            tracing::error!(category = %self.category(), error = %self, "Request failed");
        } else {
            tracing::debug!(category = %self.category(), error = %self, "Request rejected");
        }

        let mut response = (status, Json(json!({ "message": message }))).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer error=\"invalid_token\""),
            );
        }

        response
    }
}

/// Returns (HTTP status, public message) for an error.
fn error_details(error: &AuthError) -> (StatusCode, &'static str) {
    match error {
        AuthError::Unauthorized { .. } => (StatusCode::UNAUTHORIZED, AUTHORIZATION_FAILED),
        AuthError::Storage { .. }
        | AuthError::Configuration { .. }
        | AuthError::Internal { .. }
        | AuthError::IdentityProvider { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_FAILURE)
        }
    }
}
