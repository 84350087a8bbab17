//! HTTP-facing transport: security middleware and the protocol front door.
//!
//! Requests flow through [`SecurityService`] (rate admission, cross-origin
//! policy, cache suppression, framing headers) before [`McpService`]
//! classifies them against the session registry and routes payloads to the
//! owning engine. Responses are buffered except for push streams, so a
//! failed dispatch always yields exactly one well-formed error envelope.

pub mod paths;
pub mod ratelimit;
pub mod security;
pub mod service;
mod sse;

pub use paths::{path_matches, PathAllowList};
pub use ratelimit::RateLimiter;
pub use security::{SecurityPolicy, SecurityService};
pub use service::{McpService, SESSION_HEADER};

use std::convert::Infallible;

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};

/// Response body shared by every transport service.
pub type ResponseBody = UnsyncBoxBody<Bytes, Infallible>;

pub(crate) fn full_body(bytes: impl Into<Bytes>) -> ResponseBody {
    Full::new(bytes.into()).boxed_unsync()
}

pub(crate) fn empty_body() -> ResponseBody {
    Empty::new().boxed_unsync()
}
