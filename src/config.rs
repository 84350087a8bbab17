//! Runtime configuration for the transport layer.
//!
//! Values arrive as plain data from the CLI; nothing in here reads the
//! environment or the filesystem.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Configuration consumed by the transport, session, and shutdown layers.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listening address.
    pub bind: SocketAddr,
    /// The protocol endpoint path.
    pub protocol_path: String,
    /// Path prefixes permitted to receive cross-origin headers.
    pub cors_paths: Vec<String>,
    /// Maximum number of concurrently live sessions.
    pub session_capacity: usize,
    /// Idle duration after which the sweep closes a session.
    pub idle_timeout: Duration,
    /// Interval between idle-sweep ticks.
    pub sweep_interval: Duration,
    /// Fixed-window span for request-rate admission on the protocol path.
    pub rate_limit_window: Duration,
    /// Requests admitted per window.
    pub rate_limit_max: u32,
    /// Largest accepted request body, in bytes.
    pub max_body_bytes: usize,
    /// Keep-alive comment interval on push streams; `None` disables.
    pub sse_keep_alive: Option<Duration>,
    /// Grace window for closing live sessions at shutdown.
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8765),
            protocol_path: "/mcp".to_string(),
            cors_paths: vec!["/mcp".to_string()],
            session_capacity: 64,
            idle_timeout: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(30),
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max: 600,
            max_body_bytes: 1024 * 1024,
            sse_keep_alive: Some(Duration::from_secs(15)),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}
