//! Safety Incident Model

use serde::{Deserialize, Serialize};

/// Incident severity (closed set, ordered)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Safety incident entity (roof fall, gas alarm, equipment failure...)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub severity: IncidentSeverity,
    /// Shaft / panel / working face where the incident occurred
    pub location: String,
    pub reported_by: String,
    /// When the incident occurred (Unix millis)
    pub occurred_at: i64,
    /// When the record was created (Unix millis)
    pub created_at: i64,
}

/// Create incident payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentCreate {
    pub title: String,
    pub description: Option<String>,
    pub severity: IncidentSeverity,
    pub location: String,
    pub reported_by: String,
    pub occurred_at: i64,
}
