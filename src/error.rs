//! Error types and JSON-RPC error envelopes.
//!
//! Engine failures stay inside [`EngineError`]; what clients see is always a
//! structured envelope built by [`error_envelope`] or [`error_response`],
//! never a stack trace or internal identifier.

use serde_json::{json, Value};
use thiserror::Error;

/// Malformed or invalid request (including a missing session on a
/// non-initiating message).
pub const INVALID_REQUEST: i64 = -32600;

/// Method not understood by the protocol engine.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Unexpected failure while a resolved session handled a request.
pub const INTERNAL_ERROR: i64 = -32603;

/// Session key present but unresolvable (expired, evicted, or forged).
pub const SESSION_NOT_FOUND: i64 = -32001;

/// Request-rate ceiling reached on the protocol path.
pub const OVERLOADED: i64 = -32000;

/// Failures raised by a protocol engine while establishing or serving a
/// session.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("handshake rejected: {0}")]
    Handshake(String),

    #[error("dispatch failed: {0}")]
    Dispatch(String),

    #[error("engine already closed")]
    Closed,
}

/// Error envelope with no correlation identifier, used when no request id
/// could be parsed (transport-level rejections).
pub fn error_envelope(code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": { "code": code, "message": message.into() },
        "id": null,
    })
}

/// Error envelope correlated to a specific request id.
pub fn error_response(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": { "code": code, "message": message.into() },
        "id": id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_has_null_id() {
        let envelope = error_envelope(INVALID_REQUEST, "bad payload");
        assert_eq!(envelope["id"], Value::Null);
        assert_eq!(envelope["error"]["code"], INVALID_REQUEST);
        assert_eq!(envelope["error"]["message"], "bad payload");
    }

    #[test]
    fn response_carries_request_id() {
        let response = error_response(json!(7), METHOD_NOT_FOUND, "nope");
        assert_eq!(response["id"], 7);
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
    }
}
