use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

/// `phase_type` tag of the aggregate (whole-meter) row.
pub const TOTAL_PHASE: i16 = 4;

/// One narrow row of the hosted `phase` table: the metrics of a single phase
/// (or of the meter total) at one timestamp.
///
/// Field order is the table's column order; serde field names are the wire
/// keys for both the REST body and the staged CSV header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PhaseRow {
    pub current: Option<f32>,
    pub voltage: Option<f32>,
    pub active_power: Option<f32>,
    pub power_factor: Option<f32>,
    pub frequency: Option<f32>,
    pub total_active_energy: Option<f32>,
    pub total_active_returned_energy: Option<f32>,
    pub apparent_power: Option<f32>,
    pub device: i32,
    /// 1..=3 for L1..L3, [`TOTAL_PHASE`] for the meter total.
    pub phase_type: i16,
    #[serde(with = "crate::domain::ts_format")]
    pub ts: PrimitiveDateTime,
    pub price_realtime: Option<f32>,
}
