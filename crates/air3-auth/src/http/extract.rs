//! Bearer token extraction.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

/// The bearer token from the `Authorization` header, if any.
///
/// Extraction never fails; a missing token is turned into an authorization
/// error by the service so it is handled in one place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken(pub Option<String>);

impl BearerToken {
    /// Returns the token, if present.
    #[must_use]
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(parse_bearer)
            .map(str::to_string);

        Ok(Self(token))
    }
}

/// Parses `Bearer <token>`; the scheme is case-insensitive.
fn parse_bearer(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn test_parse_bearer() {
        assert_eq!(parse_bearer("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(parse_bearer("bearer abc"), Some("abc"));
        assert_eq!(parse_bearer("Bearer "), None);
        assert_eq!(parse_bearer("Basic dXNlcjpwYXNz"), None);
        assert_eq!(parse_bearer("Bearer"), None);
    }

    #[tokio::test]
    async fn test_extract_from_request() {
        let (mut parts, _) = Request::builder()
            .header(AUTHORIZATION, "Bearer token-1")
            .body(())
            .unwrap()
            .into_parts();
        let BearerToken(token) = BearerToken::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(token.as_deref(), Some("token-1"));

        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();
        let BearerToken(token) = BearerToken::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(token.is_none());
    }
}
