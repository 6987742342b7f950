//! Sensor Reading Model

use serde::{Deserialize, Serialize};

/// Sensor kind (underground environmental monitoring)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Methane,
    CarbonMonoxide,
    Temperature,
    Humidity,
    AirFlow,
}

/// A single sensor reading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorReading {
    pub id: i64,
    /// Device identifier (e.g. "ch4-panel3-07")
    pub sensor_id: String,
    pub kind: SensorKind,
    pub value: f64,
    /// Measurement unit (e.g. "%vol", "ppm", "m/s")
    pub unit: String,
    /// Shaft / panel / working face the sensor is installed at
    pub location: String,
    /// When the reading was taken (Unix millis)
    pub recorded_at: i64,
}
