//! Terminal gateway handler: resolve, authorize upstream, and forward.
//!
//! [`forward_handler`] is the fallback behind the pipeline middleware. It
//! finishes the request context (proxy target, pinned credential, and
//! signature), then sends the request to the tenant's upstream and relays
//! the response. Submodules handle target resolution ([`routing`]),
//! header construction ([`headers`]), and body signing ([`signing`]).

pub mod headers;
pub mod routing;
pub mod signing;

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Method, Uri};
use axum::response::Response;
use axum::Extension;
use http_body_util::{BodyExt, Full};

use crate::context::RequestContext;
use crate::error::ProxyError;
use crate::server::AppState;

pub async fn forward_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Extension(ctx): Extension<RequestContext>,
    method: Method,
    uri: Uri,
    req_headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = ctx.request_id().to_string();
    let client_ip = addr.ip().to_string();

    match forward(&state, ctx, &client_ip, method, &uri, &req_headers, body).await {
        Ok(response) => {
            state.stats.forwarded.fetch_add(1, Ordering::Relaxed);
            response
        }
        Err(e) => {
            state.stats.failed.fetch_add(1, Ordering::Relaxed);
            e.into_response_for(&request_id)
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
async fn forward(
    state: &AppState,
    ctx: RequestContext,
    client_ip: &str,
    method: Method,
    uri: &Uri,
    original_headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let tenant = ctx.config().ok_or(ProxyError::Internal)?;
    let timeout = Duration::from_millis(tenant.timeout);
    let target = routing::resolve_target(&tenant.endpoint, &tenant.provider, uri.path(), uri.query())
        .ok_or(ProxyError::NoRoute)?;

    let ctx = ctx.bind_proxy_target(target).pin_credential();
    if ctx.credential().is_empty() {
        tracing::warn!(
            request_id = %ctx.request_id(),
            instance_id = ctx.instance_id().unwrap_or_default(),
            "credential pool is empty"
        );
        return Err(ProxyError::NoCredential);
    }

    let webhook_secret = ctx.instance().and_then(|i| i.webhook_secret.clone());
    let ctx = if let Some(secret) = webhook_secret {
        let signature = signing::sign_payload(&secret, &body, ctx.request_id()).map_err(|e| {
            tracing::error!(request_id = %ctx.request_id(), error = %e, "failed to sign request");
            ProxyError::Internal
        })?;
        ctx.bind_signature(signature)
    } else {
        ctx
    };

    let upstream_headers = headers::build_upstream_headers(original_headers, client_ip, &ctx);
    let target = ctx.proxy_target().ok_or(ProxyError::Internal)?;

    let mut builder = hyper::Request::builder()
        .method(method.clone())
        .uri(target.as_str());
    for (key, value) in &upstream_headers {
        builder = builder.header(key, value);
    }
    let request = builder.body(Full::new(body)).map_err(|e| {
        tracing::error!(request_id = %ctx.request_id(), error = %e, "failed to build upstream request");
        ProxyError::Internal
    })?;

    let start = Instant::now();
    let result = tokio::time::timeout(timeout, state.http_client.request(request)).await;
    let latency_ms = start.elapsed().as_millis() as u64;

    let response = match result {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            tracing::warn!(
                request_id = %ctx.request_id(),
                instance_id = ctx.instance_id().unwrap_or_default(),
                host = target.host_str().unwrap_or_default(),
                error = %e,
                latency_ms,
                "upstream request failed"
            );
            return Err(ProxyError::Upstream);
        }
        Err(_) => {
            tracing::warn!(
                request_id = %ctx.request_id(),
                instance_id = ctx.instance_id().unwrap_or_default(),
                host = target.host_str().unwrap_or_default(),
                latency_ms,
                "upstream request timed out"
            );
            return Err(ProxyError::Timeout);
        }
    };

    let status = response.status();
    let mut resp_headers = response.headers().clone();
    let body_bytes = response
        .into_body()
        .collect()
        .await
        .map_err(|e| {
            tracing::warn!(request_id = %ctx.request_id(), error = %e, "upstream body read failed");
            ProxyError::Upstream
        })?
        .to_bytes();

    tracing::info!(
        request_id = %ctx.request_id(),
        instance_id = ctx.instance_id().unwrap_or_default(),
        method = %method,
        host = target.host_str().unwrap_or_default(),
        path = target.path(),
        status = status.as_u16(),
        latency_ms,
        signed = !ctx.signature().is_empty(),
        "request forwarded"
    );

    headers::strip_response_hop_by_hop(&mut resp_headers);
    let mut builder = Response::builder().status(status);
    for (key, value) in &resp_headers {
        builder = builder.header(key, value);
    }
    builder.body(Body::from(body_bytes)).map_err(|e| {
        tracing::error!(request_id = %ctx.request_id(), error = %e, "failed to build response");
        ProxyError::Internal
    })
}
