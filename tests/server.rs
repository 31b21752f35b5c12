//! Integration tests for the HTTP server: health, the authentication and
//! tenant stages, and forwarding to a live upstream.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::{HeaderMap, Uri};
use axum::Router;
use jsonwebtoken::{encode, get_current_timestamp, EncodingKey, Header};

use gatehouse::auth::Claims;
use gatehouse::config::model::{Defaults, GatewayConfig, Instance, JwtSettings};
use gatehouse::config::ConfigVersion;
use gatehouse::health::HealthResponse;
use gatehouse::proxy::signing::SIGNATURE_HEADER;
use gatehouse::server::{self, AppState, LoadedConfig};

const SECRET: &str = "integration-secret";

type Captured = Arc<Mutex<Vec<(Uri, HeaderMap)>>>;

fn instance(id: &str, endpoint: &str, pool: &str) -> Instance {
    Instance {
        id: id.into(),
        provider: "github".into(),
        endpoint: endpoint.into(),
        access_tokens: pool.into(),
        roles: vec![],
        webhook_secret: None,
        site_id: None,
        timeout: None,
    }
}

fn test_config(upstream: SocketAddr) -> GatewayConfig {
    let endpoint = format!("http://{upstream}/repos/x");

    let mut admin_only = instance("tenant-admin", &endpoint, "tok1");
    admin_only.roles = vec!["admin".into()];

    let mut signed = instance("tenant-signed", &endpoint, "tok1");
    signed.webhook_secret = Some("hook-secret".into());
    signed.site_id = Some("site-9".into());

    GatewayConfig {
        jwt: JwtSettings {
            secret: SECRET.into(),
            audience: None,
        },
        defaults: Defaults::default(),
        instances: vec![
            instance("tenant-42", &endpoint, "tok1,tok2"),
            instance("tenant-empty", &endpoint, ""),
            admin_only,
            signed,
        ],
    }
}

fn token_for(instance_id: &str, roles: &[&str]) -> String {
    let claims = Claims {
        sub: "user-1".into(),
        email: None,
        instance_id: instance_id.into(),
        roles: roles.iter().map(ToString::to_string).collect(),
        exp: get_current_timestamp() + 600,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

/// Upstream stand-in that records every request it receives.
async fn start_upstream() -> (SocketAddr, Captured) {
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&captured);

    let router = Router::new().fallback(move |uri: Uri, headers: HeaderMap| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push((uri, headers));
            "upstream ok"
        }
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (addr, captured)
}

/// Upstream stand-in that answers only after `delay`.
async fn start_slow_upstream(delay: Duration) -> SocketAddr {
    let router = Router::new().fallback(move || async move {
        tokio::time::sleep(delay).await;
        "too late"
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// An address nothing is listening on.
async fn closed_port() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

async fn start_test_server(
    upstream: SocketAddr,
) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
    start_gateway(test_config(upstream)).await
}

async fn start_gateway(config: GatewayConfig) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
    let loaded = LoadedConfig::new(config, ConfigVersion::Hash("test-hash".into()), "test");
    let state = Arc::new(AppState::new(loaded));
    let router = server::build_router(state, 1_048_576);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .await
        .unwrap();
    });

    (addr, shutdown_tx)
}

async fn start() -> (SocketAddr, Captured, tokio::sync::oneshot::Sender<()>) {
    let (upstream, captured) = start_upstream().await;
    let (addr, shutdown) = start_test_server(upstream).await;
    (addr, captured, shutdown)
}

#[tokio::test]
async fn health_endpoint_returns_healthy() {
    let (addr, _, shutdown) = start().await;

    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);

    let health: HealthResponse = resp.json().await.unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    assert_eq!(health.config.source, "test");
    assert_eq!(health.config.version, "test-has");
    assert_eq!(health.config.instances, 4);
    assert_eq!(health.stats.requests_forwarded, 0);
    assert_eq!(health.stats.requests_failed, 0);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let (addr, captured, shutdown) = start().await;

    let resp = reqwest::get(format!("http://{addr}/github/contents"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    assert_eq!(resp.headers().get("www-authenticate").unwrap(), "Bearer");
    assert!(resp.headers().contains_key("x-request-id"));

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "missing bearer token");
    assert!(captured.lock().unwrap().is_empty());

    let _ = shutdown.send(());
}

#[tokio::test]
async fn token_signed_with_other_secret_is_unauthorized() {
    let (addr, _, shutdown) = start().await;

    let forged = encode(
        &Header::default(),
        &serde_json::json!({
            "sub": "user-1",
            "instance_id": "tenant-42",
            "exp": get_current_timestamp() + 600,
        }),
        &EncodingKey::from_secret(b"not-the-secret"),
    )
    .unwrap();

    let resp = reqwest::Client::new()
        .get(format!("http://{addr}/github/contents"))
        .bearer_auth(forged)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid signature");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn unknown_instance_is_not_found() {
    let (addr, _, shutdown) = start().await;

    let resp = reqwest::Client::new()
        .get(format!("http://{addr}/github/contents"))
        .bearer_auth(token_for("tenant-missing", &[]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn missing_role_is_forbidden() {
    let (addr, captured, shutdown) = start().await;

    let client = reqwest::Client::new();
    let denied = client
        .get(format!("http://{addr}/github/contents"))
        .bearer_auth(token_for("tenant-admin", &["editor"]))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), 403);
    assert!(captured.lock().unwrap().is_empty());

    let allowed = client
        .get(format!("http://{addr}/github/contents"))
        .bearer_auth(token_for("tenant-admin", &["admin"]))
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), 200);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn provider_mismatch_is_not_found() {
    let (addr, captured, shutdown) = start().await;

    let resp = reqwest::Client::new()
        .get(format!("http://{addr}/gitlab/projects"))
        .bearer_auth(token_for("tenant-42", &[]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    assert!(captured.lock().unwrap().is_empty());

    let _ = shutdown.send(());
}

#[tokio::test]
async fn empty_pool_is_bad_gateway() {
    let (addr, captured, shutdown) = start().await;

    let resp = reqwest::Client::new()
        .get(format!("http://{addr}/github/contents"))
        .bearer_auth(token_for("tenant-empty", &[]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
    assert!(captured.lock().unwrap().is_empty());

    assert_eq!(failed_count(addr).await, 1);

    let _ = shutdown.send(());
}

async fn failed_count(addr: SocketAddr) -> u64 {
    let health: HealthResponse = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    health.stats.requests_failed
}

#[tokio::test]
async fn unreachable_upstream_is_bad_gateway() {
    let down = closed_port().await;
    let mut config = test_config(down);
    config.instances = vec![instance("tenant-down", &format!("http://{down}/api"), "tok1")];
    let (addr, shutdown) = start_gateway(config).await;

    let resp = reqwest::Client::new()
        .get(format!("http://{addr}/github/contents"))
        .bearer_auth(token_for("tenant-down", &[]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "upstream request failed");
    assert_eq!(failed_count(addr).await, 1);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn slow_upstream_times_out_with_tenant_timeout() {
    let slow = start_slow_upstream(Duration::from_secs(5)).await;
    let mut tenant = instance("tenant-slow", &format!("http://{slow}/api"), "tok1");
    tenant.timeout = Some(50);
    let mut config = test_config(slow);
    config.instances = vec![tenant];
    let (addr, shutdown) = start_gateway(config).await;

    let resp = reqwest::Client::new()
        .get(format!("http://{addr}/github/contents"))
        .bearer_auth(token_for("tenant-slow", &[]))
        .timeout(Duration::from_secs(3))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 504);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "upstream request timed out");
    assert_eq!(failed_count(addr).await, 1);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn forwards_with_pool_credential() {
    let (addr, captured, shutdown) = start().await;

    let resp = reqwest::Client::new()
        .get(format!("http://{addr}/github/contents/README.md?ref=main"))
        .header("x-request-id", "req-abc")
        .bearer_auth(token_for("tenant-42", &[]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("x-request-id").unwrap(), "req-abc");
    assert_eq!(resp.text().await.unwrap(), "upstream ok");

    let seen = captured.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (uri, headers) = &seen[0];
    assert_eq!(uri.path(), "/repos/x/contents/README.md");
    assert_eq!(uri.query(), Some("ref=main"));

    let auth = headers.get("authorization").unwrap().to_str().unwrap();
    assert!(auth == "Bearer tok1" || auth == "Bearer tok2", "got {auth}");
    assert_eq!(headers.get("x-request-id").unwrap(), "req-abc");
    assert_eq!(headers.get("via").unwrap(), "1.1 gatehouse");
    assert!(headers.get(SIGNATURE_HEADER).is_none());
    drop(seen);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn signs_for_tenant_with_webhook_secret() {
    let (addr, captured, shutdown) = start().await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/github/hooks"))
        .bearer_auth(token_for("tenant-signed", &[]))
        .body("{\"ref\":\"main\"}")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let seen = captured.lock().unwrap();
    let (_, headers) = &seen[0];
    let signature = headers.get(SIGNATURE_HEADER).unwrap().to_str().unwrap();
    assert_eq!(signature.split('.').count(), 3);
    assert_eq!(headers.get("x-site-id").unwrap(), "site-9");
    assert_eq!(headers.get("authorization").unwrap(), "Bearer tok1");
    drop(seen);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn graceful_shutdown_works() {
    let (addr, _, shutdown) = start().await;

    let url = format!("http://{addr}/health");
    assert!(reqwest::get(&url).await.is_ok());

    let _ = shutdown.send(());
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(reqwest::get(&url).await.is_err());
}
