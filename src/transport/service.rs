//! The protocol front door.
//!
//! Classifies each request against the session registry, in this order for
//! POST on the protocol endpoint:
//!
//! 1. key present and live → reuse: refresh activity, dispatch to the engine
//! 2. key absent, payload initiates → create: fresh key, new engine,
//!    registered only after the handshake succeeds
//! 3. key present but unresolvable → not-found
//! 4. key absent, payload does not initiate → bad-request
//!
//! GET (server push) and DELETE (terminate) only reuse; an unresolved key is
//! always a not-found rejection, never implicit creation.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Limited};
use hyper::http::header::{HeaderValue, ACCEPT, ALLOW, CONTENT_TYPE};
use hyper::http::{Method, Request, Response, StatusCode};
use serde_json::Value;
use tower_service::Service;
use tracing::{debug, info, warn};

use super::{empty_body, full_body, sse, ResponseBody};
use crate::config::ServerConfig;
use crate::engine::ProtocolEngine;
use crate::error::{self, error_envelope};
use crate::session::{SessionKey, SessionRegistry};

/// Header carrying the session key on every request after initialization.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// HTTP service for the protocol endpoint, generic over the engine type and
/// the factory that builds one engine per new session.
pub struct McpService<E, F> {
    inner: Arc<Inner<E, F>>,
}

impl<E, F> Clone for McpService<E, F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<E, F> {
    registry: Arc<SessionRegistry<E>>,
    factory: F,
    protocol_path: String,
    max_body_bytes: usize,
    sse_keep_alive: Option<Duration>,
}

impl<E, F> McpService<E, F>
where
    E: ProtocolEngine,
    F: Fn() -> E + Send + Sync + 'static,
{
    pub fn new(registry: Arc<SessionRegistry<E>>, factory: F, config: &ServerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                factory,
                protocol_path: config.protocol_path.clone(),
                max_body_bytes: config.max_body_bytes,
                sse_keep_alive: config.sse_keep_alive,
            }),
        }
    }
}

impl<B, E, F> Service<Request<B>> for McpService<E, F>
where
    B: http_body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    E: ProtocolEngine,
    F: Fn() -> E + Send + Sync + 'static,
{
    type Response = Response<ResponseBody>;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.handle(req).await) })
    }
}

impl<E, F> Inner<E, F>
where
    E: ProtocolEngine,
    F: Fn() -> E + Send + Sync + 'static,
{
    async fn handle<B>(&self, req: Request<B>) -> Response<ResponseBody>
    where
        B: http_body::Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if req.uri().path() != self.protocol_path {
            return Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(empty_body())
                .expect("valid response");
        }

        match req.method() {
            &Method::POST => self.handle_post(req).await,
            &Method::GET => self.handle_subscribe(req).await,
            &Method::DELETE => self.handle_terminate(req).await,
            _ => Response::builder()
                .status(StatusCode::METHOD_NOT_ALLOWED)
                .header(ALLOW, "GET, POST, DELETE")
                .body(empty_body())
                .expect("valid response"),
        }
    }

    async fn handle_post<B>(&self, req: Request<B>) -> Response<ResponseBody>
    where
        B: http_body::Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !content_type.starts_with("application/json") {
            return json_response(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                error_envelope(
                    error::INVALID_REQUEST,
                    "Content-Type must be application/json",
                ),
            );
        }

        let key = session_key(&req).map(str::to_owned);
        let body = match read_body(req, self.max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(resp) => return resp,
        };
        let payload: Value = match serde_json::from_slice(&body) {
            Ok(payload) => payload,
            Err(err) => {
                debug!(error = %err, "malformed request payload");
                return json_response(
                    StatusCode::BAD_REQUEST,
                    error_envelope(error::INVALID_REQUEST, "malformed JSON payload"),
                );
            }
        };

        match key {
            Some(key) => match self.registry.touch(&key) {
                Some(engine) => self.dispatch(&key, engine, payload).await,
                None => session_not_found(),
            },
            None if is_initialize(&payload) => self.create_session(payload).await,
            None => json_response(
                StatusCode::BAD_REQUEST,
                error_envelope(
                    error::INVALID_REQUEST,
                    "missing session ID on non-initialize request",
                ),
            ),
        }
    }

    async fn dispatch(&self, key: &str, engine: Arc<E>, payload: Value) -> Response<ResponseBody> {
        match engine.handle(payload).await {
            Ok(Some(response)) => json_response(StatusCode::OK, response),
            Ok(None) => Response::builder()
                .status(StatusCode::ACCEPTED)
                .body(empty_body())
                .expect("valid response"),
            Err(err) => {
                warn!(session_key = %key, error = %err, "engine dispatch failed");
                json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_envelope(error::INTERNAL_ERROR, "internal error"),
                )
            }
        }
    }

    async fn create_session(&self, payload: Value) -> Response<ResponseBody> {
        let engine = Arc::new((self.factory)());
        match engine.initialize(payload).await {
            Ok(response) => {
                let key = SessionKey::generate();

                // Drop the session when the engine closes itself (peer
                // disconnect); removal is idempotent against the other
                // close paths.
                let closed = engine.closed();
                let registry = self.registry.clone();
                let watch_key = key.clone();
                tokio::spawn(async move {
                    closed.cancelled().await;
                    if registry.remove(watch_key.as_str()) {
                        debug!(session_key = %watch_key, "session removed after engine closed");
                    }
                });

                self.registry.insert(key.clone(), engine);
                info!(session_key = %key, live = self.registry.len(), "session established");

                let mut resp = json_response(StatusCode::OK, response);
                if let Ok(value) = HeaderValue::from_str(key.as_str()) {
                    resp.headers_mut().insert(SESSION_HEADER, value);
                }
                resp
            }
            Err(err) => {
                debug!(error = %err, "handshake rejected");
                json_response(
                    StatusCode::BAD_REQUEST,
                    error_envelope(error::INVALID_REQUEST, err.to_string()),
                )
            }
        }
    }

    async fn handle_subscribe<B>(&self, req: Request<B>) -> Response<ResponseBody> {
        let accept = req
            .headers()
            .get(ACCEPT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !accept.contains("text/event-stream") {
            return json_response(
                StatusCode::NOT_ACCEPTABLE,
                error_envelope(
                    error::INVALID_REQUEST,
                    "Accept must include text/event-stream",
                ),
            );
        }
        let Some(key) = session_key(&req) else {
            return missing_session_key();
        };
        let Some(engine) = self.registry.touch(key) else {
            return session_not_found();
        };

        debug!(session_key = %key, "push stream opened");
        Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "text/event-stream")
            .body(sse::push_body(engine.subscribe(), self.sse_keep_alive))
            .expect("valid response")
    }

    async fn handle_terminate<B>(&self, req: Request<B>) -> Response<ResponseBody> {
        let Some(key) = session_key(&req) else {
            return missing_session_key();
        };
        match self.registry.take(key) {
            Some(engine) => {
                if let Err(err) = engine.close().await {
                    warn!(session_key = %key, error = %err, "engine close failed on terminate");
                }
                info!(session_key = %key, "session terminated by client");
                Response::builder()
                    .status(StatusCode::OK)
                    .body(empty_body())
                    .expect("valid response")
            }
            None => session_not_found(),
        }
    }
}

/// True iff the payload is a session-initiating message.
pub(crate) fn is_initialize(payload: &Value) -> bool {
    payload.get("method").and_then(Value::as_str) == Some("initialize")
}

fn session_key<B>(req: &Request<B>) -> Option<&str> {
    req.headers().get(SESSION_HEADER).and_then(|v| v.to_str().ok())
}

async fn read_body<B>(req: Request<B>, limit: usize) -> Result<Bytes, Response<ResponseBody>>
where
    B: http_body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(req.into_body(), limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) => Err(json_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            error_envelope(
                error::INVALID_REQUEST,
                format!("request body rejected: {err}"),
            ),
        )),
    }
}

fn json_response(status: StatusCode, payload: Value) -> Response<ResponseBody> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(full_body(payload.to_string()))
        .expect("valid response")
}

fn session_not_found() -> Response<ResponseBody> {
    json_response(
        StatusCode::NOT_FOUND,
        error_envelope(error::SESSION_NOT_FOUND, "session not found"),
    )
}

fn missing_session_key() -> Response<ResponseBody> {
    json_response(
        StatusCode::BAD_REQUEST,
        error_envelope(error::INVALID_REQUEST, "missing session ID"),
    )
}
