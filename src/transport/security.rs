//! Security middleware for the protocol endpoint.
//!
//! Runs before any session logic: request-rate admission on the protocol
//! path, cross-origin policy gated by the path allow-list (boundary match,
//! never substring), cache suppression on protocol responses, and strict
//! framing headers process-wide so the endpoint cannot host injected
//! content.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use hyper::http::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_MAX_AGE,
    CACHE_CONTROL, CONTENT_SECURITY_POLICY, CONTENT_TYPE, ORIGIN, PRAGMA, VARY,
    X_CONTENT_TYPE_OPTIONS,
};
use hyper::http::{HeaderMap, Method, Request, Response, StatusCode};
use tower_service::Service;
use tracing::warn;

use super::{empty_body, full_body, PathAllowList, RateLimiter, ResponseBody};
use crate::error::{self, error_envelope};

/// Policy shared by every connection's middleware instance.
pub struct SecurityPolicy {
    pub protocol_path: String,
    pub allow_list: PathAllowList,
    pub limiter: RateLimiter,
}

/// Tower middleware enforcing [`SecurityPolicy`] around an inner service.
#[derive(Clone)]
pub struct SecurityService<S> {
    inner: S,
    policy: Arc<SecurityPolicy>,
}

impl<S> SecurityService<S> {
    pub fn new(inner: S, policy: Arc<SecurityPolicy>) -> Self {
        Self { inner, policy }
    }
}

impl<B, S> Service<Request<B>> for SecurityService<S>
where
    B: http_body::Body + Send + 'static,
    S: Service<Request<B>, Response = Response<ResponseBody>, Error = Infallible>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<ResponseBody>;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let policy = self.policy.clone();
        let mut inner = self.inner.clone();
        Box::pin(async move {
            let path = req.uri().path().to_owned();
            let on_protocol = path == policy.protocol_path;
            let origin = req
                .headers()
                .get(ORIGIN)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);

            if on_protocol && !policy.limiter.try_admit() {
                let mut resp = Response::builder()
                    .status(StatusCode::TOO_MANY_REQUESTS)
                    .header(CONTENT_TYPE, "application/json")
                    .body(full_body(
                        error_envelope(error::OVERLOADED, "rate limit exceeded").to_string(),
                    ))
                    .expect("valid response");
                suppress_caching(resp.headers_mut());
                apply_framing(resp.headers_mut());
                return Ok(resp);
            }

            // Preflight for allow-listed paths bypasses dispatch entirely.
            if req.method() == Method::OPTIONS && policy.allow_list.is_allowed(&path) {
                let mut resp = Response::builder()
                    .status(StatusCode::NO_CONTENT)
                    .body(empty_body())
                    .expect("valid response");
                if let Some(origin) = origin.as_deref() {
                    apply_cors(resp.headers_mut(), origin);
                    apply_preflight(resp.headers_mut());
                }
                if on_protocol {
                    suppress_caching(resp.headers_mut());
                }
                apply_framing(resp.headers_mut());
                return Ok(resp);
            }

            if let Some(origin) = origin.as_deref() {
                if !policy.allow_list.is_allowed(&path) {
                    warn!(%path, %origin, "cross-origin request outside allow-listed paths");
                    let mut resp = Response::builder()
                        .status(StatusCode::FORBIDDEN)
                        .body(full_body("Forbidden"))
                        .expect("valid response");
                    apply_framing(resp.headers_mut());
                    return Ok(resp);
                }
            }

            let mut resp = inner.call(req).await?;
            if on_protocol {
                suppress_caching(resp.headers_mut());
            }
            if let Some(origin) = origin.as_deref() {
                apply_cors(resp.headers_mut(), origin);
            }
            apply_framing(resp.headers_mut());
            Ok(resp)
        })
    }
}

fn apply_cors(headers: &mut HeaderMap, origin: &str) {
    if let Ok(value) = HeaderValue::from_str(origin) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
        headers.insert(
            ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static("Mcp-Session-Id"),
        );
        headers.insert(VARY, HeaderValue::from_static("Origin"));
    }
}

fn apply_preflight(headers: &mut HeaderMap) {
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, DELETE, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Accept, Mcp-Session-Id, Last-Event-ID"),
    );
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
}

fn suppress_caching(headers: &mut HeaderMap) {
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
}

fn apply_framing(headers: &mut HeaderMap) {
    headers.insert(
        CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'none'; script-src 'none'; object-src 'none'; frame-ancestors 'none'",
        ),
    );
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
}
