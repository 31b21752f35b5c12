//! Upstream header construction and hop-by-hop stripping.
//!
//! [`build_upstream_headers`] starts from the client's headers (when the
//! tenant forwards headers), drops hop-by-hop headers and the caller's own
//! gateway token, then fills in everything the upstream needs from the
//! request context: `Host`, the pinned credential as `Authorization`,
//! proxy metadata (`X-Forwarded-*`, `Via`, `X-Request-Id`), and the
//! outbound signature and site ID when present.

use std::sync::LazyLock;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use super::signing::SIGNATURE_HEADER;
use crate::context::RequestContext;
use crate::middleware::REQUEST_ID_HEADER;

pub const SITE_ID_HEADER: &str = "x-site-id";

static HOP_BY_HOP: LazyLock<Vec<HeaderName>> = LazyLock::new(|| {
    [
        "connection",
        "keep-alive",
        "transfer-encoding",
        "te",
        "trailer",
        "upgrade",
        "proxy-authorization",
        "proxy-authenticate",
    ]
    .iter()
    .filter_map(|name| name.parse::<HeaderName>().ok())
    .collect()
});

/// Strip hop-by-hop headers and `content-length` from an upstream response.
///
/// The body has already been fully collected, so the origin's framing
/// headers no longer apply. Axum sets `content-length` from the body.
pub fn strip_response_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers.remove(header::CONTENT_LENGTH);
}

pub fn build_upstream_headers(
    original: &HeaderMap,
    client_ip: &str,
    ctx: &RequestContext,
) -> HeaderMap {
    let forward = ctx.config().map_or(true, |c| c.forward_headers);
    let mut headers = if forward {
        original.clone()
    } else {
        HeaderMap::new()
    };

    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    // The gateway token authenticates the caller to us, never to the upstream
    headers.remove(header::AUTHORIZATION);

    if let Some(target) = ctx.proxy_target() {
        if let Some(host) = target.host_str() {
            let host_value = target
                .port()
                .map_or_else(|| host.to_string(), |port| format!("{host}:{port}"));
            if let Ok(val) = HeaderValue::from_str(&host_value) {
                headers.insert(header::HOST, val);
            }
        }

        let proto = if target.scheme() == "https" {
            "https"
        } else {
            "http"
        };
        headers.insert("x-forwarded-proto", HeaderValue::from_static(proto));
    }

    let xff = original
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map_or_else(
            || client_ip.to_string(),
            |existing| format!("{existing}, {client_ip}"),
        );
    if let Ok(val) = HeaderValue::from_str(&xff) {
        headers.insert("x-forwarded-for", val);
    }

    // The client's own X-Forwarded-For is untrusted; only the peer address is real
    if let Ok(val) = HeaderValue::from_str(client_ip) {
        headers.insert("x-real-ip", val);
    }

    if let Some(original_host) = original.get(header::HOST) {
        headers.insert("x-forwarded-host", original_host.clone());
    }

    headers.insert(header::VIA, HeaderValue::from_static("1.1 gatehouse"));

    insert_if_present(&mut headers, REQUEST_ID_HEADER.clone(), ctx.request_id());

    let credential = ctx.credential();
    if !credential.is_empty() {
        if let Ok(mut val) = HeaderValue::from_str(&format!("Bearer {credential}")) {
            val.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, val);
        } else {
            tracing::warn!(
                request_id = %ctx.request_id(),
                "credential is not a valid header value, sending without authorization"
            );
        }
    }

    insert_if_present(
        &mut headers,
        HeaderName::from_static(SIGNATURE_HEADER),
        ctx.signature(),
    );
    insert_if_present(
        &mut headers,
        HeaderName::from_static(SITE_ID_HEADER),
        ctx.site_id(),
    );

    headers
}

fn insert_if_present(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if value.is_empty() {
        headers.remove(&name);
        return;
    }
    match HeaderValue::from_str(value) {
        Ok(val) => {
            headers.insert(name, val);
        }
        Err(_) => {
            tracing::warn!(header = %name, "invalid header value, skipping");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::model::{Defaults, Instance};

    fn tenant_context(forward_headers: bool) -> RequestContext {
        let instance = Instance {
            id: "tenant-42".into(),
            provider: "github".into(),
            endpoint: "https://api.github.com/repos/x".into(),
            access_tokens: "tok1".into(),
            roles: vec![],
            webhook_secret: None,
            site_id: None,
            timeout: None,
        };
        let defaults = Defaults {
            forward_headers,
            ..Defaults::default()
        };
        let config = instance.resolve(&defaults).unwrap();
        let target = url::Url::parse("https://api.github.com:8443/repos/x/contents").unwrap();

        RequestContext::new()
            .bind_request_id("req-1")
            .bind_credential_pool(config.access_tokens.as_str())
            .bind_config(config)
            .bind_instance(Arc::new(instance))
            .bind_proxy_target(target)
            .pin_credential()
    }

    #[test]
    fn replaces_gateway_token_with_credential() {
        let mut original = HeaderMap::new();
        original.insert("authorization", "Bearer gateway.jwt.token".parse().unwrap());

        let headers = build_upstream_headers(&original, "10.0.0.1", &tenant_context(true));
        assert_eq!(headers.get("authorization").unwrap(), "Bearer tok1");
        assert!(headers.get("authorization").unwrap().is_sensitive());
    }

    #[test]
    fn strips_hop_by_hop() {
        let mut original = HeaderMap::new();
        original.insert("connection", "keep-alive".parse().unwrap());
        original.insert("content-type", "application/json".parse().unwrap());

        let headers = build_upstream_headers(&original, "10.0.0.1", &tenant_context(true));
        assert!(headers.get("connection").is_none());
        assert_eq!(headers.get("content-type").unwrap(), "application/json");
    }

    #[test]
    fn rewrites_host_and_proto() {
        let headers = build_upstream_headers(&HeaderMap::new(), "10.0.0.1", &tenant_context(true));
        assert_eq!(headers.get("host").unwrap(), "api.github.com:8443");
        assert_eq!(headers.get("x-forwarded-proto").unwrap(), "https");
    }

    #[test]
    fn appends_x_forwarded_for() {
        let mut original = HeaderMap::new();
        original.insert("x-forwarded-for", "1.2.3.4".parse().unwrap());

        let headers = build_upstream_headers(&original, "10.0.0.1", &tenant_context(true));
        assert_eq!(headers.get("x-forwarded-for").unwrap(), "1.2.3.4, 10.0.0.1");
    }

    #[test]
    fn real_ip_ignores_client_supplied_forwarding() {
        let mut original = HeaderMap::new();
        original.insert("x-forwarded-for", "6.6.6.6".parse().unwrap());
        original.insert("x-real-ip", "6.6.6.6".parse().unwrap());

        let headers = build_upstream_headers(&original, "10.0.0.1", &tenant_context(true));
        assert_eq!(headers.get("x-real-ip").unwrap(), "10.0.0.1");
    }

    #[test]
    fn sets_request_id_and_optional_headers() {
        let ctx = tenant_context(true)
            .bind_signature("sig.value.here")
            .bind_site_id("site-9");
        let headers = build_upstream_headers(&HeaderMap::new(), "10.0.0.1", &ctx);
        assert_eq!(headers.get("x-request-id").unwrap(), "req-1");
        assert_eq!(headers.get(SIGNATURE_HEADER).unwrap(), "sig.value.here");
        assert_eq!(headers.get(SITE_ID_HEADER).unwrap(), "site-9");
    }

    #[test]
    fn unsigned_request_drops_spoofed_signature() {
        let mut original = HeaderMap::new();
        original.insert(SIGNATURE_HEADER, "forged".parse().unwrap());
        let headers = build_upstream_headers(&original, "10.0.0.1", &tenant_context(true));
        assert!(headers.get(SIGNATURE_HEADER).is_none());
    }

    #[test]
    fn forward_headers_disabled_drops_client_headers() {
        let mut original = HeaderMap::new();
        original.insert("x-custom", "value".parse().unwrap());
        let headers = build_upstream_headers(&original, "10.0.0.1", &tenant_context(false));
        assert!(headers.get("x-custom").is_none());
        assert_eq!(headers.get("authorization").unwrap(), "Bearer tok1");
    }
}
