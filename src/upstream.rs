//! HTTP client for the upstream incident reporting API.
//!
//! The transport treats this as an opaque dependency: one client is shared
//! by every engine instance, and each tool call maps onto one authenticated
//! REST request.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Timeout for requests to the upstream API.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Longest upstream error body echoed into our own error messages.
const ERROR_BODY_LIMIT: usize = 512;

/// Error type for upstream API operations.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Http(String),

    #[error("upstream returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid response payload: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        UpstreamError::Http(e.to_string())
    }
}

/// Severity assigned to an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Where an incident sits in its lifecycle upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentState {
    Open,
    Acknowledged,
    Resolved,
}

impl IncidentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentState::Open => "open",
            IncidentState::Acknowledged => "acknowledged",
            IncidentState::Resolved => "resolved",
        }
    }
}

/// An incident record as returned by the upstream API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub summary: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    pub status: IncidentState,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Payload for opening a new incident.
#[derive(Debug, Clone, Serialize)]
pub struct NewIncident {
    pub summary: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
}

/// Client for the upstream incident API.
///
/// The bearer token authenticates this server to the API; clients of this
/// server carry no credential of their own.
pub struct UpstreamClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl UpstreamClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("failed to build HTTP client"),
            base_url: base_url.into(),
            token,
        }
    }

    /// List incidents, optionally filtered by lifecycle state.
    pub async fn list_incidents(
        &self,
        status: Option<IncidentState>,
        limit: usize,
    ) -> Result<Vec<Incident>, UpstreamError> {
        let mut request = self
            .http
            .get(self.endpoint("incidents"))
            .query(&[("limit", limit.to_string())]);
        if let Some(status) = status {
            request = request.query(&[("status", status.as_str())]);
        }
        debug!(limit, "listing incidents");
        Self::decode(self.authorize(request).send().await?).await
    }

    /// Open a new incident and return the created record.
    pub async fn report_incident(&self, incident: &NewIncident) -> Result<Incident, UpstreamError> {
        debug!(summary = %incident.summary, "reporting incident");
        let request = self.http.post(self.endpoint("incidents")).json(incident);
        Self::decode(self.authorize(request).send().await?).await
    }

    /// Fetch the current record for one incident.
    pub async fn incident_status(&self, id: &str) -> Result<Incident, UpstreamError> {
        debug!(incident_id = %id, "fetching incident status");
        let request = self.http.get(self.endpoint(&format!("incidents/{id}")));
        Self::decode(self.authorize(request).send().await?).await
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, UpstreamError> {
        let status = response.status();
        if !status.is_success() {
            let mut message = response.text().await.unwrap_or_default();
            message.truncate(ERROR_BODY_LIMIT);
            return Err(UpstreamError::Api {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| UpstreamError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let client = UpstreamClient::new("https://api.example.com/v1/", None);
        assert_eq!(
            client.endpoint("incidents"),
            "https://api.example.com/v1/incidents"
        );
        assert_eq!(
            client.endpoint("incidents/abc"),
            "https://api.example.com/v1/incidents/abc"
        );
    }

    #[test]
    fn incident_round_trips() {
        let payload = json!({
            "id": "inc-42",
            "summary": "database latency spike",
            "severity": "high",
            "status": "open",
            "created_at": "2026-03-01T12:00:00Z"
        });
        let incident: Incident =
            serde_json::from_value(payload).expect("incident should deserialize");
        assert_eq!(incident.id, "inc-42");
        assert_eq!(incident.severity, Severity::High);
        assert_eq!(incident.status, IncidentState::Open);
        assert!(incident.component.is_none());

        let back = serde_json::to_value(&incident).expect("incident should serialize");
        assert_eq!(back["severity"], "high");
        assert!(back.get("component").is_none());
    }

    #[test]
    fn state_as_str_matches_wire_form() {
        let wire = serde_json::to_value(IncidentState::Acknowledged).expect("serialize");
        assert_eq!(wire, IncidentState::Acknowledged.as_str());
    }
}
