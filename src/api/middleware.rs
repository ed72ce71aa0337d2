//! Cross-origin policy and the admin role check.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE, ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD, COOKIE,
    ORIGIN, VARY,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

const ALLOWED_METHODS: [Method; 4] = [Method::GET, Method::POST, Method::PUT, Method::DELETE];
const ALLOWED_METHODS_HEADER: &str = "GET, POST, PUT, DELETE";
const PREFLIGHT_MAX_AGE_SECS: &str = "86400";

pub const ROLE_COOKIE: &str = "X-User-Role";
pub const ADMIN_ROLE: &str = "admin";

/// Allows exactly one origin to call the API from a browser.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    origin: String,
}

impl CorsPolicy {
    pub fn new(origin: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { origin: origin.into() })
    }

    fn allowed_origin(&self, headers: &HeaderMap) -> Option<HeaderValue> {
        headers
            .get(ORIGIN)
            .filter(|value| value.as_bytes() == self.origin.as_bytes())
            .cloned()
    }
}

fn is_preflight(req: &Request) -> bool {
    req.method() == Method::OPTIONS && req.headers().contains_key(ACCESS_CONTROL_REQUEST_METHOD)
}

fn requested_method_allowed(headers: &HeaderMap) -> bool {
    headers
        .get(ACCESS_CONTROL_REQUEST_METHOD)
        .and_then(|value| Method::from_bytes(value.as_bytes()).ok())
        .is_some_and(|method| ALLOWED_METHODS.contains(&method))
}

pub async fn cors(State(policy): State<Arc<CorsPolicy>>, req: Request, next: Next) -> Response {
    let origin = policy.allowed_origin(req.headers());

    if is_preflight(&req) {
        let origin = match origin {
            Some(origin) if requested_method_allowed(req.headers()) => origin,
            _ => return StatusCode::FORBIDDEN.into_response(),
        };
        let mut response = StatusCode::NO_CONTENT.into_response();
        let headers = response.headers_mut();
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOWED_METHODS_HEADER));
        if let Some(requested) = req.headers().get(ACCESS_CONTROL_REQUEST_HEADERS) {
            headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
        }
        headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(PREFLIGHT_MAX_AGE_SECS));
        headers.append(VARY, HeaderValue::from_static("Origin"));
        return response;
    }

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    if let Some(origin) = origin {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
    headers.append(VARY, HeaderValue::from_static("Origin"));
    response
}

/// Whether mutating requests must carry the admin role cookie.
#[derive(Debug, Clone, Copy)]
pub struct RoleGate {
    pub required: bool,
}

fn is_mutation(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::DELETE
}

fn role_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == ROLE_COOKIE)
        .map(|(_, role)| role)
}

pub async fn require_admin(State(gate): State<RoleGate>, req: Request, next: Next) -> Response {
    if !gate.required || !is_mutation(req.method()) {
        return next.run(req).await;
    }

    let role = role_cookie(req.headers()).map(str::to_owned);
    match role.as_deref() {
        Some(ADMIN_ROLE) => next.run(req).await,
        Some(role) => {
            warn!(role, method = %req.method(), path = req.uri().path(), "rejected non-admin role");
            StatusCode::UNAUTHORIZED.into_response()
        }
        None => {
            warn!(method = %req.method(), path = req.uri().path(), "rejected request without role cookie");
            StatusCode::UNAUTHORIZED.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn role_cookie_is_found_among_others() {
        let map = headers(&[("cookie", "session=abc; X-User-Role=admin; theme=dark")]);
        assert_eq!(role_cookie(&map), Some("admin"));
    }

    #[test]
    fn role_cookie_across_multiple_headers() {
        let map = headers(&[("cookie", "session=abc"), ("cookie", "X-User-Role=viewer")]);
        assert_eq!(role_cookie(&map), Some("viewer"));
        assert_eq!(role_cookie(&headers(&[("cookie", "session=abc")])), None);
    }

    #[test]
    fn only_the_configured_origin_is_allowed() {
        let policy = CorsPolicy::new("http://localhost:3000");
        assert!(policy.allowed_origin(&headers(&[("origin", "http://localhost:3000")])).is_some());
        assert!(policy.allowed_origin(&headers(&[("origin", "http://evil.example")])).is_none());
        assert!(policy.allowed_origin(&HeaderMap::new()).is_none());
    }

    #[test]
    fn preflight_method_must_be_allowed() {
        assert!(requested_method_allowed(&headers(&[("access-control-request-method", "PUT")])));
        assert!(!requested_method_allowed(&headers(&[("access-control-request-method", "PATCH")])));
    }
}
