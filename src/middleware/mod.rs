//! Pipeline stages that build up the per-request [`RequestContext`].
//!
//! Each stage takes the context left in the request extensions by the
//! previous stage, derives a new one with its bindings, and puts that
//! back before handing off:
//!
//! 1. [`assign_request_id`] -- starts the chain with a correlation ID.
//! 2. [`authenticate`] -- verifies the bearer token and binds its claims.
//! 3. [`resolve_tenant`] -- binds the caller's instance, its resolved
//!    config, and its credential pool, and enforces instance roles.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

use crate::auth;
use crate::context::RequestContext;
use crate::error::ProxyError;
use crate::server::AppState;

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Context bound by earlier stages, or an empty root.
fn current_context(req: &Request) -> RequestContext {
    req.extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_default()
}

pub async fn assign_request_id(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from);

    let ctx = current_context(&req).bind_request_id(request_id.as_str());
    req.extensions_mut().insert(ctx);

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(REQUEST_ID_HEADER.clone(), value);
    }
    response
}

pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let ctx = current_context(&req);
    let verifier = Arc::clone(&state.config.read().await.verifier);

    let Some(token) = auth::bearer_token(req.headers()) else {
        tracing::info!(request_id = %ctx.request_id(), "request without bearer token");
        return ProxyError::MissingToken.into_response_for(ctx.request_id());
    };

    let claims = match verifier.verify(token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::info!(request_id = %ctx.request_id(), error = %e, "token rejected");
            return e.into_response_for(ctx.request_id());
        }
    };

    tracing::debug!(
        request_id = %ctx.request_id(),
        sub = %claims.sub,
        instance_id = %claims.instance_id,
        "token verified"
    );

    let ctx = ctx.bind_verified_token(claims);
    req.extensions_mut().insert(ctx);
    next.run(req).await
}

pub async fn resolve_tenant(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let ctx = current_context(&req);
    match bind_tenant(&state, &ctx).await {
        Ok(ctx) => {
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Err(e) => {
            tracing::warn!(
                request_id = %ctx.request_id(),
                instance_id = ctx.claims().map_or("", |c| c.instance_id.as_str()),
                error = %e,
                "tenant resolution failed"
            );
            e.into_response_for(ctx.request_id())
        }
    }
}

async fn bind_tenant(state: &AppState, ctx: &RequestContext) -> Result<RequestContext, ProxyError> {
    let claims = ctx.claims().ok_or(ProxyError::MissingToken)?;

    // Clone the Arc<GatewayConfig> (cheap refcount bump) to release the RwLock quickly
    let config = Arc::clone(&state.config.read().await.config);

    let instance = config
        .find_instance(&claims.instance_id)
        .ok_or_else(|| ProxyError::UnknownInstance(claims.instance_id.clone()))?;

    if !claims.has_any_role(&instance.roles) {
        return Err(ProxyError::Forbidden);
    }

    let tenant = instance.resolve(&config.defaults).map_err(|e| {
        tracing::error!(
            request_id = %ctx.request_id(),
            instance_id = %instance.id,
            error = %e,
            "instance endpoint failed to parse"
        );
        ProxyError::Internal
    })?;

    let mut ctx = ctx
        .bind_instance_id(instance.id.as_str())
        .bind_credential_pool(tenant.access_tokens.as_str())
        .bind_config(tenant)
        .bind_instance(Arc::new(instance.clone()));
    if let Some(ref site_id) = instance.site_id {
        ctx = ctx.bind_site_id(site_id.as_str());
    }
    Ok(ctx)
}
