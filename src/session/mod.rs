//! Session management for the Streamable HTTP transport.
//!
//! A *session* is one logical, long-lived conversation between a remote peer
//! and one protocol-engine instance, named by an opaque server-issued key.
//! This module bounds how many sessions exist and how long they live:
//!
//! - [`SessionCache`]: fixed-capacity, access-ordered storage with LRU
//!   eviction through a synchronous hook.
//! - [`SessionRegistry`]: the lifecycle manager layered on top (create,
//!   touch, idle-sweep, explicit close, eviction close).
//! - [`SessionKey`] / [`SessionEntry`]: identity and per-session state.
//!
//! The registry is the only writer of session membership. Request handling
//! resolves keys through it and never retains an independent reference past
//! the request.

pub mod cache;
mod registry;
mod types;

pub use cache::{EvictionHook, SessionCache};
pub use registry::SessionRegistry;
pub use types::{SessionEntry, SessionKey};
