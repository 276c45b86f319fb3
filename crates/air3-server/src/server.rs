use std::net::SocketAddr;

use axum::{
    Router,
    error_handling::HandleErrorLayer,
    response::{IntoResponse, Response},
    routing::get,
};
use tower::{BoxError, ServiceBuilder};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use air3_auth::{AuthError, http::AuthState};

use crate::{bootstrap, config::AppConfig, handlers};

pub struct Air3Server {
    addr: SocketAddr,
    app: Router,
}

/// Builds the application router: auth routes, health endpoints and the
/// middleware stack.
pub fn build_app(cfg: &AppConfig, auth: AuthState) -> Router {
    let router = Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .merge(air3_auth::http::router(auth));
    with_middleware(router, cfg)
}

fn with_middleware(router: Router, cfg: &AppConfig) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    router
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|req: &axum::http::Request<_>| {
                            use tracing::field::Empty;
                            tracing::info_span!(
                                "http.request",
                                http.method = %req.method(),
                                http.target = %req.uri(),
                                http.status_code = Empty
                            )
                        })
                        .on_response(
                            |res: &axum::http::Response<_>,
                             latency: std::time::Duration,
                             span: &tracing::Span| {
                                span.record(
                                    "http.status_code",
                                    tracing::field::display(res.status().as_u16()),
                                );
                                tracing::info!(
                                    http.status = %res.status().as_u16(),
                                    elapsed_ms = %latency.as_millis(),
                                    "request handled"
                                );
                            },
                        ),
                )
                .layer(CorsLayer::permissive())
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .timeout(cfg.request_timeout()),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

/// Deadline overruns surface as the generic 500 body like any other failure.
async fn handle_middleware_error(err: BoxError) -> Response {
    if err.is::<tower::timeout::error::Elapsed>() {
        AuthError::internal("request deadline exceeded").into_response()
    } else {
        AuthError::internal(format!("unhandled middleware error: {err}")).into_response()
    }
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    auth: Option<AuthState>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            auth: None,
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Uses `auth` instead of building backends from the configuration.
    pub fn with_auth_state(mut self, auth: AuthState) -> Self {
        self.auth = Some(auth);
        self
    }

    pub async fn build(self) -> anyhow::Result<Air3Server> {
        let auth = match self.auth {
            Some(auth) => auth,
            None => bootstrap::build_auth_state(&self.config).await?,
        };
        let app = build_app(&self.config, auth);

        Ok(Air3Server {
            addr: self.addr,
            app,
        })
    }
}

impl Air3Server {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
