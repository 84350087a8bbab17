//! Incident reporting MCP server over session-managed Streamable HTTP.
//!
//! This crate turns a stateless HTTP server into a host for a stateful,
//! session-oriented control protocol: many concurrent logical sessions are
//! multiplexed over one process, bounded in number by an LRU cache and in
//! lifetime by an idle sweep.
//!
//! # Architecture
//!
//! - **Transport** ([`transport`]): security middleware (rate admission,
//!   cross-origin policy with boundary-checked path matching, cache
//!   suppression, framing headers) in front of the protocol endpoint, which
//!   classifies requests as reuse / create / not-found / bad-request.
//!
//! - **Sessions** ([`session`]): a bounded, access-ordered cache under a
//!   lifecycle registry. Session keys are server-issued UUIDs; eviction,
//!   idle expiry, explicit termination, and engine self-closure all converge
//!   on the same idempotent removal path.
//!
//! - **Engine** ([`engine`], [`server`]): each session exclusively owns one
//!   [`ProtocolEngine`]. The shipped engine translates tool calls
//!   (`list_incidents`, `report_incident`, `incident_status`) into requests
//!   against the upstream incident API ([`upstream`]).
//!
//! - **Shutdown** ([`shutdown`]): drain the listener, stop the sweeper,
//!   best-effort close every session, exit within a bounded grace window.

pub mod config;
pub mod engine;
pub mod error;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod transport;
pub mod upstream;

pub use config::ServerConfig;
pub use engine::ProtocolEngine;
pub use server::IncidentEngine;
pub use session::{SessionKey, SessionRegistry};
pub use transport::{McpService, SecurityPolicy, SecurityService};
pub use upstream::UpstreamClient;
