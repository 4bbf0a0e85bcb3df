//! Wide-to-narrow unpivot: one meter reading becomes four phase rows.

use phase_client::domain::{DeviceMap, MeterReading, PhaseRow, TOTAL_PHASE};

use crate::pipeline::{Envelope, Expand, PipelineError};

/// Turns one wide reading into its four narrow rows: phases 1..3 in order,
/// then the whole-meter total tagged [`TOTAL_PHASE`].
///
/// The device number is resolved through the immutable [`DeviceMap`]; a
/// meter id without a mapping fails the reading outright, before any row is
/// produced. Absent metrics stay `None` all the way through; zero is a
/// measurement, not a placeholder for "missing".
pub struct PhaseUnpivoter {
    devices: DeviceMap,
}

impl PhaseUnpivoter {
    pub fn new(devices: DeviceMap) -> Self {
        Self { devices }
    }

    pub fn unpivot(&self, reading: &MeterReading) -> Result<[PhaseRow; 4], PipelineError> {
        let device = self
            .devices
            .get(&reading.meter_id)
            .ok_or_else(|| PipelineError::UnknownMeter(reading.meter_id.clone()))?;

        Ok([
            phase_row(reading, device, 0),
            phase_row(reading, device, 1),
            phase_row(reading, device, 2),
            total_row(reading, device),
        ])
    }
}

fn phase_row(reading: &MeterReading, device: i32, index: usize) -> PhaseRow {
    let m = &reading.phases[index];
    PhaseRow {
        current: m.current,
        voltage: m.voltage,
        active_power: m.active_power,
        power_factor: m.power_factor,
        frequency: m.frequency,
        total_active_energy: m.total_active_energy,
        total_active_returned_energy: m.total_active_returned_energy,
        apparent_power: m.apparent_power,
        device,
        phase_type: index as i16 + 1,
        ts: reading.ts,
        price_realtime: reading.price,
    }
}

fn total_row(reading: &MeterReading, device: i32) -> PhaseRow {
    let t = &reading.totals;
    PhaseRow {
        current: t.current,
        // Not measured at the aggregate level.
        voltage: None,
        active_power: t.active_power,
        power_factor: None,
        frequency: None,
        total_active_energy: t.total_active_energy,
        total_active_returned_energy: t.total_active_returned_energy,
        apparent_power: t.apparent_power,
        device,
        phase_type: TOTAL_PHASE,
        ts: reading.ts,
        price_realtime: reading.price,
    }
}

#[async_trait::async_trait]
impl Expand<MeterReading, PhaseRow> for PhaseUnpivoter {
    async fn apply(
        &self,
        input: Envelope<MeterReading>,
    ) -> Result<Vec<Envelope<PhaseRow>>, PipelineError> {
        let rows = self.unpivot(&input.payload)?;
        Ok(rows
            .into_iter()
            .map(|row| Envelope {
                payload: row,
                received_at: input.received_at,
            })
            .collect())
    }
}
