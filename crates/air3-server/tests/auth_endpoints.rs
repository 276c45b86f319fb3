//! End-to-end tests against a real listener with in-memory backends.

use std::net::SocketAddr;
use std::sync::Arc;

use air3_auth::AuthService;
use air3_auth::config::ProfileConfig;
use air3_auth::federation::TokenVerifier;
use air3_auth::http::AuthState;
use air3_auth::provider::memory::InMemoryIdentityProvider;
use air3_auth::storage::{InMemoryProfileStore, ProfileStore};
use air3_server::build_app;
use air3_server::config::AppConfig;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::{Value, json};
use tokio::sync::oneshot;

struct TestServer {
    base: String,
    provider: Arc<InMemoryIdentityProvider>,
    profiles: Arc<InMemoryProfileStore>,
    client: reqwest::Client,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    async fn start(provider: InMemoryIdentityProvider) -> Self {
        let provider = Arc::new(provider);
        let profiles = Arc::new(InMemoryProfileStore::new());
        let service = AuthService::new(
            Arc::new(TokenVerifier::decode_only()),
            provider.clone(),
            profiles.clone(),
            ProfileConfig::default(),
        );
        let app = build_app(&AppConfig::default(), AuthState::new(Arc::new(service)));

        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
                .expect("server");
        });

        Self {
            base: format!("http://{addr}"),
            provider,
            profiles,
            client: reqwest::Client::new(),
            shutdown: Some(tx),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn login(&self, bearer: Option<&str>, body: &Value) -> (u16, Value) {
        let mut request = self.client.post(self.url("/api/auth/air-kit")).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.expect("login request");
        let status = response.status().as_u16();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn assign_role(&self, bearer: &str, role: &str) -> (u16, Value) {
        let response = self
            .client
            .post(self.url("/api/auth/role"))
            .bearer_auth(bearer)
            .json(&json!({ "role": role }))
            .send()
            .await
            .expect("role request");
        let status = response.status().as_u16();
        (status, response.json().await.unwrap_or(Value::Null))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn air3_token(sub: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"ES384","typ":"JWT","kid":"air3"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        json!({
            "sub": sub,
            "type": "air3",
            "partnerId": "partner-1",
            "abstractAccountAddress": "0xabc"
        })
        .to_string(),
    );
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

fn login_body(email: &str) -> Value {
    json!({ "email": email, "id": "air3-user-1", "abstractAccountAddress": "0xabc" })
}

#[tokio::test]
async fn health_and_root() {
    let server = TestServer::start(InMemoryIdentityProvider::new("shared")).await;

    let health: Value = server
        .client
        .get(server.url("/healthz"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health, json!({ "status": "ok" }));

    let root: Value = server
        .client
        .get(server.url("/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(root["status"], "ok");
    assert!(root["version"].is_string());
}

#[tokio::test]
async fn missing_bearer_is_unauthorized_without_downstream_calls() {
    let server = TestServer::start(InMemoryIdentityProvider::new("shared")).await;

    let (status, body) = server.login(None, &login_body("a@example.com")).await;
    assert_eq!(status, 401);
    assert_eq!(body, json!({ "message": "Authorization failed" }));

    let response = server
        .client
        .post(server.url("/api/auth/role"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
    assert!(response.headers().contains_key("www-authenticate"));

    assert_eq!(server.provider.authenticate_calls(), 0);
    assert_eq!(server.profiles.operations(), 0);
}

#[tokio::test]
async fn malformed_bearer_is_unauthorized() {
    let server = TestServer::start(InMemoryIdentityProvider::new("shared")).await;

    let (status, body) = server
        .login(Some("not-a-jwt"), &login_body("a@example.com"))
        .await;
    assert_eq!(status, 401);
    assert_eq!(body["message"], "Authorization failed");
    assert_eq!(server.provider.authenticate_calls(), 0);
}

#[tokio::test]
async fn unreadable_body_with_bearer_is_internal_error() {
    let server = TestServer::start(InMemoryIdentityProvider::new("shared")).await;

    let cases = [
        ("application/json", "{not json"),
        ("application/json", "{}"),
        ("text/plain", "hello"),
    ];
    for (content_type, payload) in cases {
        let response = server
            .client
            .post(server.url("/api/auth/air-kit"))
            .bearer_auth(air3_token("sub-1"))
            .header("content-type", content_type)
            .body(payload)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 500, "{content_type} {payload}");
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!({ "message": "Something went wrong..." }));
    }
    assert_eq!(server.provider.authenticate_calls(), 0);
}

#[tokio::test]
async fn first_login_provisions_once() {
    let server = TestServer::start(InMemoryIdentityProvider::new("shared")).await;
    let token = air3_token("air3-sub-1");

    let (status, body) = server
        .login(Some(&token), &login_body("new@example.com"))
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["status"], "new");
    assert!(body["access"].as_str().is_some_and(|a| !a.is_empty()));
    assert!(body["refresh"].is_string());
    assert_eq!(body["exp"], 3600);
    assert_eq!(server.provider.create_calls(), 1);
    assert_eq!(server.provider.account_count().await, 1);
    assert_eq!(server.profiles.len().await, 1);

    let (status, body) = server
        .login(Some(&token), &login_body("new@example.com"))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "new");
    assert_eq!(server.provider.create_calls(), 1);
    assert_eq!(server.profiles.len().await, 1);
}

#[tokio::test]
async fn role_assignment_marks_login_verified() {
    let provider = InMemoryIdentityProvider::new("shared").with_account("judge@example.com", "sub-j");
    let server = TestServer::start(provider).await;
    let token = air3_token("sub-j");

    // Existing account without a profile gets one on login.
    let (status, body) = server
        .login(Some(&token), &login_body("judge@example.com"))
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["status"], "new");
    assert_eq!(server.provider.create_calls(), 0);

    let (status, body) = server.assign_role(&token, "judge").await;
    assert_eq!(status, 201);
    assert_eq!(body, json!({ "success": true }));

    let profile = server
        .profiles
        .find_by_subject("sub-j")
        .await
        .unwrap()
        .expect("profile");
    assert_eq!(profile.role.as_deref(), Some("judge"));

    let (status, body) = server
        .login(Some(&token), &login_body("judge@example.com"))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "verified");
}

#[tokio::test]
async fn role_assignment_without_profile_still_succeeds() {
    let server = TestServer::start(InMemoryIdentityProvider::new("shared")).await;

    let (status, body) = server.assign_role(&air3_token("nobody"), "artist").await;
    assert_eq!(status, 201);
    assert_eq!(body["success"], true);
    assert!(server.profiles.is_empty().await);
}
