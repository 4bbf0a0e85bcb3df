pub mod devices;
pub mod meter_reading;
pub mod phase_row;
pub mod ts_format;

pub use devices::DeviceMap;
pub use meter_reading::{MeterReading, PhaseMetrics, TotalMetrics};
pub use phase_row::{PhaseRow, TOTAL_PHASE};
