//! The seam between the transport and the protocol library.
//!
//! The transport knows nothing about the control protocol's grammar beyond
//! "which message starts a session". Everything else (method dispatch,
//! capability negotiation, tool execution) lives behind [`ProtocolEngine`].
//! Each session owns exactly one engine instance; no engine is ever shared
//! between sessions.

use std::future::Future;

use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;

/// One session's protocol engine.
///
/// The transport drives the engine through three paths: the initiating
/// handshake ([`initialize`](Self::initialize)), ordinary inbound dispatch
/// ([`handle`](Self::handle)), and teardown ([`close`](Self::close)).
/// Server-initiated messages flow out through the broadcast channel returned
/// by [`subscribe`](Self::subscribe).
pub trait ProtocolEngine: Send + Sync + 'static {
    /// Drive the session-initiating handshake.
    ///
    /// The transport registers the session only after this returns `Ok`, so
    /// a failed handshake never leaves a hollow session behind.
    fn initialize(
        &self,
        message: Value,
    ) -> impl Future<Output = Result<Value, EngineError>> + Send;

    /// Handle one inbound message for an established session.
    ///
    /// `Ok(None)` means the message produced no response (a notification).
    fn handle(
        &self,
        message: Value,
    ) -> impl Future<Output = Result<Option<Value>, EngineError>> + Send;

    /// Subscribe to server-initiated messages for the standalone push stream.
    fn subscribe(&self) -> broadcast::Receiver<Value>;

    /// Token cancelled when the engine stops, whether the server closed it or
    /// the peer went away. The transport watches this to drop the session
    /// from the registry.
    fn closed(&self) -> CancellationToken;

    /// Shut the engine down. Implementations must cancel the
    /// [`closed`](Self::closed) token and must tolerate being called more
    /// than once.
    fn close(&self) -> impl Future<Output = Result<(), EngineError>> + Send;
}
