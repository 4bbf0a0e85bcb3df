use crate::pipeline::{Envelope, PipelineError, Transform};
use phase_client::domain::MeterReading;
use time::macros::datetime;

pub mod unpivot;

pub use unpivot::PhaseUnpivoter;

/// Pure validation of a wide `MeterReading`.
///
/// Rules:
/// - meter_id must be non-empty.
/// - ts must be within a broad sanity window [2000-01-01, 2100-01-01].
///
/// Metric values are deliberately not range-checked: active power and price
/// are legitimately negative when the meter exports or the market dips.
pub fn validate_meter_reading(
    env: Envelope<MeterReading>,
) -> Result<Envelope<MeterReading>, PipelineError> {
    let r = &env.payload;

    if r.meter_id.is_empty() {
        return Err(PipelineError::Transform("meter_id must be non-empty".to_string()));
    }

    let min_ts = datetime!(2000-01-01 00:00:00);
    let max_ts = datetime!(2100-01-01 00:00:00);

    if r.ts < min_ts || r.ts > max_ts {
        return Err(PipelineError::Transform(format!(
            "timestamp {} out of allowed range",
            r.ts
        )));
    }

    Ok(env)
}

#[derive(Clone, Default)]
pub struct MeterReadingValidation;

#[async_trait::async_trait]
impl Transform<MeterReading, MeterReading> for MeterReadingValidation {
    async fn apply(
        &self,
        input: Envelope<MeterReading>,
    ) -> Result<Envelope<MeterReading>, PipelineError> {
        match validate_meter_reading(input) {
            Ok(env) => Ok(env),
            Err(e) => {
                metrics::counter!("validation_meter_reading_rejected_total").increment(1);
                Err(e)
            }
        }
    }
}
