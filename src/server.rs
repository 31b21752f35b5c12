//! Axum server setup, shared application state, and graceful shutdown.
//!
//! Contains [`AppState`] (the `Arc`-shared state holding the loaded
//! config, HTTP client, stats, and uptime), [`build_router`] for wiring
//! the gateway pipeline behind its middleware stages, [`build_http_client`]
//! for the connection-pooled hyper client, and [`shutdown_signal`] for
//! SIGTERM / Ctrl+C handling.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::auth::JwtVerifier;
use crate::config::model::GatewayConfig;
use crate::config::ConfigVersion;
use crate::health::health_handler;
use crate::{middleware, proxy};

/// A validated config together with everything derived from it.
pub struct LoadedConfig {
    pub config: Arc<GatewayConfig>,
    pub verifier: Arc<JwtVerifier>,
    pub version: ConfigVersion,
    pub source_name: String,
    pub loaded_at: Instant,
}

impl LoadedConfig {
    #[must_use]
    pub fn new(config: GatewayConfig, version: ConfigVersion, source_name: &str) -> Self {
        let verifier = Arc::new(JwtVerifier::new(&config.jwt));
        Self {
            config: Arc::new(config),
            verifier,
            version,
            source_name: source_name.to_string(),
            loaded_at: Instant::now(),
        }
    }
}

#[derive(Debug)]
pub struct Stats {
    pub forwarded: AtomicU64,
    pub failed: AtomicU64,
    pub config_reloads: AtomicU64,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            forwarded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            config_reloads: AtomicU64::new(0),
        }
    }
}

pub type HttpsConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;
pub type HttpClient = Client<HttpsConnector, http_body_util::Full<bytes::Bytes>>;

pub struct AppState {
    pub config: RwLock<LoadedConfig>,
    pub http_client: HttpClient,
    pub start_time: Instant,
    pub stats: Stats,
}

impl AppState {
    #[must_use]
    pub fn new(loaded: LoadedConfig) -> Self {
        Self {
            config: RwLock::new(loaded),
            http_client: build_http_client(),
            start_time: Instant::now(),
            stats: Stats::new(),
        }
    }
}

#[must_use]
pub fn build_http_client() -> HttpClient {
    // When multiple rustls crypto providers are compiled in, rustls cannot
    // auto-detect which one to use. Explicitly install `ring` as the default.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();
    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(30))
        .build(https)
}

/// Build the public router.
///
/// `/health` is served directly. Every other request goes through the
/// pipeline stages, outermost first: request ID, authentication, tenant
/// resolution, then [`proxy::forward_handler`].
pub fn build_router(state: Arc<AppState>, max_body: usize) -> Router {
    let gateway = Router::new()
        .fallback(proxy::forward_handler)
        .layer(from_fn_with_state(
            Arc::clone(&state),
            middleware::resolve_tenant,
        ))
        .layer(from_fn_with_state(
            Arc::clone(&state),
            middleware::authenticate,
        ))
        .layer(axum::middleware::from_fn(middleware::assign_request_id))
        .with_state(Arc::clone(&state));

    Router::new()
        .route("/health", get(health_handler))
        .fallback_service(gateway)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(max_body)),
        )
        .with_state(state)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
