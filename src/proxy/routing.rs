//! Upstream target resolution for an authenticated request.
//!
//! A tenant is reachable under `/<provider>/...`. [`resolve_target`]
//! checks the first path segment against the tenant's provider and
//! appends the remaining segments to the tenant's endpoint, carrying the
//! query string across.

use url::Url;

#[must_use]
pub fn resolve_target(
    endpoint: &Url,
    provider: &str,
    path: &str,
    query: Option<&str>,
) -> Option<Url> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());

    if segments.next()? != provider {
        return None;
    }

    let rest: Vec<&str> = segments.collect();
    // Dot segments would let a caller climb out of the endpoint's base path
    if rest.iter().any(|s| *s == "." || *s == "..") {
        return None;
    }

    let mut target = endpoint.clone();
    if !rest.is_empty() {
        let base = endpoint.path().trim_end_matches('/');
        let mut joined = String::with_capacity(base.len() + path.len());
        joined.push_str(base);
        for segment in &rest {
            joined.push('/');
            joined.push_str(segment);
        }
        if path.ends_with('/') {
            joined.push('/');
        }
        target.set_path(&joined);
    }

    if let Some(q) = query.filter(|q| !q.is_empty()) {
        target.set_query(Some(q));
    }

    Some(target)
}
