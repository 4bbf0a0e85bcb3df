use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

/// Metrics reported for a single phase (L1, L2 or L3).
///
/// All values are single precision, matching what the meter reports; any of
/// them may be absent for a given reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseMetrics {
    pub current: Option<f32>,
    pub voltage: Option<f32>,
    pub active_power: Option<f32>,
    pub power_factor: Option<f32>,
    pub frequency: Option<f32>,
    pub total_active_energy: Option<f32>,
    pub total_active_returned_energy: Option<f32>,
    pub apparent_power: Option<f32>,
}

/// Aggregate metrics for the whole meter. Voltage, power factor and
/// frequency are not measured at the aggregate level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TotalMetrics {
    pub current: Option<f32>,
    pub active_power: Option<f32>,
    pub total_active_energy: Option<f32>,
    pub total_active_returned_energy: Option<f32>,
    pub apparent_power: Option<f32>,
}

/// One wide reading from a three-phase meter: everything the meter reported
/// at one timestamp, plus the real-time price in effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterReading {
    #[serde(with = "crate::domain::ts_format")]
    pub ts: PrimitiveDateTime,
    pub meter_id: String,
    pub price: Option<f32>,
    pub phases: [PhaseMetrics; 3],
    pub totals: TotalMetrics,
}
