//! Protocol engine backed by the upstream incident API.
//!
//! One engine per session. The engine understands the control protocol's
//! message grammar (initialize handshake, ping, tool listing and calls) and
//! translates tool calls into upstream requests. Tool failures become
//! `isError` results, never transport failures.

mod requests;

pub use requests::*;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::engine::ProtocolEngine;
use crate::error::{error_response, EngineError, INVALID_REQUEST, METHOD_NOT_FOUND};
use crate::upstream::{NewIncident, Severity, UpstreamClient};

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "incident-mcp";

/// Buffered server-initiated messages per session before slow push
/// subscribers start losing them.
const PUSH_CHANNEL_CAPACITY: usize = 64;

const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_LIST_LIMIT: usize = 100;

/// Per-session protocol engine for the incident tools.
pub struct IncidentEngine {
    upstream: Arc<UpstreamClient>,
    push: broadcast::Sender<Value>,
    closed: CancellationToken,
    initialized: AtomicBool,
}

impl IncidentEngine {
    pub fn new(upstream: Arc<UpstreamClient>) -> Self {
        let (push, _) = broadcast::channel(PUSH_CHANNEL_CAPACITY);
        Self {
            upstream,
            push,
            closed: CancellationToken::new(),
            initialized: AtomicBool::new(false),
        }
    }

    fn tools() -> Value {
        json!([
            {
                "name": "list_incidents",
                "description": "List incidents, optionally filtered by status (open, acknowledged, resolved).",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "status": {
                            "type": "string",
                            "enum": ["open", "acknowledged", "resolved"],
                            "description": "Only return incidents in this state"
                        },
                        "limit": {
                            "type": "integer",
                            "description": "Maximum incidents to return (1-100, default: 20)"
                        }
                    }
                }
            },
            {
                "name": "report_incident",
                "description": "Open a new incident. Returns the created record including its id.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "summary": {
                            "type": "string",
                            "description": "One-line description of what is broken"
                        },
                        "severity": {
                            "type": "string",
                            "enum": ["low", "medium", "high", "critical"],
                            "description": "Severity (default: medium)"
                        },
                        "component": {
                            "type": "string",
                            "description": "Affected component or service"
                        }
                    },
                    "required": ["summary"]
                }
            },
            {
                "name": "incident_status",
                "description": "Fetch the current record for one incident by id.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "string", "description": "Incident id" }
                    },
                    "required": ["id"]
                }
            }
        ])
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Value {
        match name {
            "list_incidents" => self.list_incidents(arguments).await,
            "report_incident" => self.report_incident(arguments).await,
            "incident_status" => self.incident_status(arguments).await,
            _ => tool_error(format!("unknown tool: {name}")),
        }
    }

    async fn list_incidents(&self, arguments: Value) -> Value {
        let params: ListIncidentsParams = match serde_json::from_value(arguments) {
            Ok(params) => params,
            Err(err) => return tool_error(format!("invalid parameters: {err}")),
        };
        let limit = params
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);
        match self.upstream.list_incidents(params.status, limit).await {
            Ok(incidents) => match serde_json::to_string(&incidents) {
                Ok(text) => tool_text(text),
                Err(err) => tool_error(format!("encoding failed: {err}")),
            },
            Err(err) => tool_error(format!("list_incidents failed: {err}")),
        }
    }

    async fn report_incident(&self, arguments: Value) -> Value {
        let params: ReportIncidentParams = match serde_json::from_value(arguments) {
            Ok(params) => params,
            Err(err) => return tool_error(format!("invalid parameters: {err}")),
        };
        let new_incident = NewIncident {
            summary: params.summary,
            severity: params.severity.unwrap_or(Severity::Medium),
            component: params.component,
        };
        match self.upstream.report_incident(&new_incident).await {
            Ok(incident) => {
                // Interested push subscribers hear about it; nobody
                // listening is fine.
                let _ = self.push.send(json!({
                    "jsonrpc": "2.0",
                    "method": "notifications/incidents/reported",
                    "params": { "id": incident.id, "severity": incident.severity }
                }));
                match serde_json::to_string(&incident) {
                    Ok(text) => tool_text(text),
                    Err(err) => tool_error(format!("encoding failed: {err}")),
                }
            }
            Err(err) => tool_error(format!("report_incident failed: {err}")),
        }
    }

    async fn incident_status(&self, arguments: Value) -> Value {
        let params: IncidentStatusParams = match serde_json::from_value(arguments) {
            Ok(params) => params,
            Err(err) => return tool_error(format!("invalid parameters: {err}")),
        };
        match self.upstream.incident_status(&params.id).await {
            Ok(incident) => match serde_json::to_string(&incident) {
                Ok(text) => tool_text(text),
                Err(err) => tool_error(format!("encoding failed: {err}")),
            },
            Err(err) => tool_error(format!("incident_status failed: {err}")),
        }
    }
}

impl ProtocolEngine for IncidentEngine {
    async fn initialize(&self, message: Value) -> Result<Value, EngineError> {
        let method = message.get("method").and_then(Value::as_str).unwrap_or_default();
        if method != "initialize" {
            return Err(EngineError::Handshake(format!(
                "expected initialize, got {method:?}"
            )));
        }
        if message
            .pointer("/params/protocolVersion")
            .and_then(Value::as_str)
            .is_none()
        {
            return Err(EngineError::Handshake("missing protocolVersion".into()));
        }

        self.initialized.store(true, Ordering::SeqCst);
        let id = message.get("id").cloned().unwrap_or(Value::Null);
        Ok(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION")
                }
            }
        }))
    }

    async fn handle(&self, message: Value) -> Result<Option<Value>, EngineError> {
        if self.closed.is_cancelled() {
            return Err(EngineError::Closed);
        }
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(EngineError::Dispatch("session not initialized".into()));
        }

        let method = message
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let id = message.get("id").cloned();
        debug!(method = %method, "dispatching message");

        match method.as_str() {
            "notifications/initialized" | "notifications/cancelled" => Ok(None),
            "ping" => Ok(Some(json!({
                "jsonrpc": "2.0",
                "id": id.unwrap_or(Value::Null),
                "result": {}
            }))),
            "initialize" => Ok(Some(error_response(
                id.unwrap_or(Value::Null),
                INVALID_REQUEST,
                "session already initialized",
            ))),
            "tools/list" => Ok(Some(json!({
                "jsonrpc": "2.0",
                "id": id.unwrap_or(Value::Null),
                "result": { "tools": Self::tools() }
            }))),
            "tools/call" => {
                let name = message
                    .pointer("/params/name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned();
                let arguments = message
                    .pointer("/params/arguments")
                    .cloned()
                    .unwrap_or(Value::Object(Map::new()));
                let result = self.call_tool(&name, arguments).await;
                Ok(Some(json!({
                    "jsonrpc": "2.0",
                    "id": id.unwrap_or(Value::Null),
                    "result": result
                })))
            }
            // Unknown notifications are dropped; unknown requests get an
            // error correlated to their id.
            _ if id.is_none() => Ok(None),
            _ => Ok(Some(error_response(
                id.unwrap_or(Value::Null),
                METHOD_NOT_FOUND,
                format!("method not found: {method}"),
            ))),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.push.subscribe()
    }

    fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.closed.cancel();
        Ok(())
    }
}

fn tool_text(text: String) -> Value {
    json!({ "content": [{ "type": "text", "text": text }] })
}

fn tool_error(message: String) -> Value {
    json!({ "content": [{ "type": "text", "text": message }], "isError": true })
}
