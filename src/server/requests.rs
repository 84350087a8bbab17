//! Tool parameter types.
//!
//! These structs define the arguments for each tool exposed by the engine.

use serde::Deserialize;

use crate::upstream::{IncidentState, Severity};

#[derive(Debug, Deserialize)]
pub struct ListIncidentsParams {
    /// Filter by lifecycle state; omit for all incidents.
    #[serde(alias = "state")]
    pub status: Option<IncidentState>,
    /// Maximum incidents to return (1-100, default: 20).
    #[serde(alias = "count")]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ReportIncidentParams {
    /// One-line description of what is broken.
    pub summary: String,
    /// Severity (default: medium).
    pub severity: Option<Severity>,
    /// Affected component or service, if known.
    pub component: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IncidentStatusParams {
    #[serde(alias = "incident_id")]
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_params_accept_aliases() {
        let params: ListIncidentsParams =
            serde_json::from_value(json!({ "state": "open", "count": 5 }))
                .expect("params should deserialize");
        assert_eq!(params.status, Some(IncidentState::Open));
        assert_eq!(params.limit, Some(5));
    }

    #[test]
    fn report_params_require_summary() {
        let err = serde_json::from_value::<ReportIncidentParams>(json!({ "severity": "low" }));
        assert!(err.is_err());
    }
}
