//! Carbon / Emission Log Model

use serde::{Deserialize, Serialize};

/// Aggregated emission figures for a reporting period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmissionData {
    pub id: i64,
    /// Emission source (e.g. "ventilation", "coal-handling", "transport")
    pub source: String,
    pub co2_tonnes: f64,
    pub methane_m3: f64,
    /// Reporting period start (Unix millis, inclusive)
    pub period_start: i64,
    /// Reporting period end (Unix millis, inclusive)
    pub period_end: i64,
    pub created_at: i64,
}
