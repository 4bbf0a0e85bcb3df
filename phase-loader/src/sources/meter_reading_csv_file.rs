use std::{fs::File, path::PathBuf, time::SystemTime};

use csv::StringRecord;
use futures::Stream;
use phase_client::domain::{ts_format, MeterReading, PhaseMetrics, TotalMetrics};

use crate::pipeline::{Envelope, PipelineError, Source};

/// Wide CSV source for `MeterReading`.
///
/// Expected header columns (by name):
/// - ts (`YYYY-MM-DD HH:MM:SS`, a `T` separator is also accepted)
/// - meter_id
/// - price (optional)
/// - per phase p in 1..=3: `L{p} current`, `L{p} voltage`, `L{p} active power`,
///   `L{p} Power factor`, `L{p} frequency`, `L{p} total active energy`,
///   `L{p} total active returned energy`, `L{p} apparent power`
/// - `Total current`, `Total active power`, `Total active energy`,
///   `Total active returned energy`, `Total apparent power`
pub struct MeterReadingCsvFileSource {
    path: PathBuf,
}

impl MeterReadingCsvFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

/// Per-phase column suffixes, in `PhaseMetrics` field order. The exports
/// capitalize "Power factor" and nothing else.
const PHASE_METRICS: [&str; 8] = [
    "current",
    "voltage",
    "active power",
    "Power factor",
    "frequency",
    "total active energy",
    "total active returned energy",
    "apparent power",
];

/// Meter-total columns, in `TotalMetrics` field order.
const TOTAL_COLUMNS: [&str; 5] = [
    "Total current",
    "Total active power",
    "Total active energy",
    "Total active returned energy",
    "Total apparent power",
];

/// Column indices resolved from the header once per file, so record
/// conversion works off plain indices.
#[derive(Debug)]
struct WideColumns {
    ts: usize,
    meter_id: usize,
    price: Option<usize>,
    phases: [[usize; 8]; 3],
    totals: [usize; 5],
}

impl WideColumns {
    fn resolve(headers: &StringRecord) -> Result<Self, PipelineError> {
        let find = |name: &str| -> Result<usize, PipelineError> {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| {
                    PipelineError::Source(format!("missing column '{name}' in CSV header"))
                })
        };

        let mut phases = [[0usize; 8]; 3];
        for (p, row) in phases.iter_mut().enumerate() {
            for (m, slot) in row.iter_mut().enumerate() {
                *slot = find(&format!("L{} {}", p + 1, PHASE_METRICS[m]))?;
            }
        }

        let mut totals = [0usize; 5];
        for (m, slot) in totals.iter_mut().enumerate() {
            *slot = find(TOTAL_COLUMNS[m])?;
        }

        Ok(Self {
            ts: find("ts")?,
            meter_id: find("meter_id")?,
            price: headers.iter().position(|h| h.trim() == "price"),
            phases,
            totals,
        })
    }
}

/// An empty cell means the meter did not report the value; garbage is
/// counted but also comes back as `None` rather than failing the record.
fn parse_optional_f32(s: &str) -> Option<f32> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed = trimmed.parse().ok();
    if parsed.is_none() {
        metrics::counter!("meter_reading_csv_field_parse_errors_total").increment(1);
    }
    parsed
}

fn record_to_reading(
    record: &StringRecord,
    columns: &WideColumns,
) -> Result<MeterReading, PipelineError> {
    let field = |idx: usize| record.get(idx).unwrap_or("");
    let metric = |idx: usize| parse_optional_f32(field(idx));

    let ts_str = field(columns.ts);
    let ts = ts_format::parse_flexible(ts_str.trim())
        .map_err(|e| PipelineError::Source(format!("invalid ts '{ts_str}': {e}")))?;

    let meter_id = field(columns.meter_id).trim().to_string();
    if meter_id.is_empty() {
        return Err(PipelineError::Source(
            "empty meter_id in CSV record".to_string(),
        ));
    }

    let price = columns.price.and_then(|idx| metric(idx));

    let phase = |cols: &[usize; 8]| PhaseMetrics {
        current: metric(cols[0]),
        voltage: metric(cols[1]),
        active_power: metric(cols[2]),
        power_factor: metric(cols[3]),
        frequency: metric(cols[4]),
        total_active_energy: metric(cols[5]),
        total_active_returned_energy: metric(cols[6]),
        apparent_power: metric(cols[7]),
    };
    let phases = [
        phase(&columns.phases[0]),
        phase(&columns.phases[1]),
        phase(&columns.phases[2]),
    ];

    let totals = TotalMetrics {
        current: metric(columns.totals[0]),
        active_power: metric(columns.totals[1]),
        total_active_energy: metric(columns.totals[2]),
        total_active_returned_energy: metric(columns.totals[3]),
        apparent_power: metric(columns.totals[4]),
    };

    Ok(MeterReading {
        ts,
        meter_id,
        price,
        phases,
        totals,
    })
}

#[async_trait::async_trait]
impl Source<MeterReading> for MeterReadingCsvFileSource {
    async fn stream(
        &self,
    ) -> std::pin::Pin<Box<dyn Stream<Item = Result<Envelope<MeterReading>, PipelineError>> + Send>>
    {
        // Blocking CSV reader wrapped in a single async task. Fine for the
        // export sizes these meters produce.
        let path = self.path.clone();
        let s = async_stream::try_stream! {
            let file = File::open(&path)
                .map_err(|e| PipelineError::Source(format!("failed to open CSV file: {e}")))?;
            let mut rdr = csv::Reader::from_reader(file);
            let headers = rdr
                .headers()
                .map_err(|e| PipelineError::Source(format!("failed to read CSV headers: {e}")))?
                .clone();
            let columns = WideColumns::resolve(&headers)?;

            for result in rdr.records() {
                let record = result.map_err(|e| PipelineError::Source(format!(
                    "failed to read CSV record: {e}"
                )))?;

                let reading = match record_to_reading(&record, &columns) {
                    Ok(r) => r,
                    Err(e) => {
                        metrics::counter!("meter_reading_csv_parse_errors_total").increment(1);
                        Err(e)?
                    }
                };

                yield Envelope {
                    payload: reading,
                    received_at: SystemTime::now(),
                };
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn header_line() -> String {
        let mut cols = vec!["ts".to_string(), "meter_id".to_string(), "price".to_string()];
        for p in 1..=3 {
            for metric in PHASE_METRICS {
                cols.push(format!("L{p} {metric}"));
            }
        }
        cols.extend(TOTAL_COLUMNS.iter().map(|c| c.to_string()));
        cols.join(",")
    }

    fn record_fields() -> Vec<String> {
        let mut fields = vec![
            "2024-01-01 10:30:00".to_string(),
            "M1".to_string(),
            "0.25".to_string(),
        ];
        for v in 0..24 {
            fields.push(format!("{}", v as f32 / 2.0));
        }
        for v in 0..5 {
            fields.push(format!("{}", 100.0 + v as f32));
        }
        fields
    }

    fn parse_one(csv_text: &str) -> Result<MeterReading, PipelineError> {
        let mut rdr = csv::Reader::from_reader(csv_text.as_bytes());
        let headers = rdr.headers().unwrap().clone();
        let columns = WideColumns::resolve(&headers)?;
        let record = rdr.records().next().unwrap().unwrap();
        record_to_reading(&record, &columns)
    }

    #[test]
    fn resolves_all_columns_and_parses_a_record() {
        let text = format!("{}\n{}\n", header_line(), record_fields().join(","));
        let reading = parse_one(&text).unwrap();

        assert_eq!(reading.ts, datetime!(2024-01-01 10:30:00));
        assert_eq!(reading.meter_id, "M1");
        assert_eq!(reading.price, Some(0.25));
        assert_eq!(reading.phases[0].current, Some(0.0));
        assert_eq!(reading.phases[0].voltage, Some(0.5));
        assert_eq!(reading.phases[1].current, Some(4.0));
        assert_eq!(reading.phases[2].apparent_power, Some(11.5));
        assert_eq!(reading.totals.current, Some(100.0));
        assert_eq!(reading.totals.apparent_power, Some(104.0));
    }

    #[test]
    fn empty_and_garbage_cells_become_none() {
        let mut fields = record_fields();
        fields[2] = String::new(); // price
        fields[4] = String::new(); // L1 voltage
        fields[5] = "n/a".to_string(); // L1 active power
        let text = format!("{}\n{}\n", header_line(), fields.join(","));

        let reading = parse_one(&text).unwrap();
        assert_eq!(reading.price, None);
        assert_eq!(reading.phases[0].voltage, None);
        assert_eq!(reading.phases[0].active_power, None);
        // Neighbours are untouched.
        assert_eq!(reading.phases[0].current, Some(0.0));
    }

    #[test]
    fn t_separated_timestamps_are_accepted() {
        let mut fields = record_fields();
        fields[0] = "2024-01-01T10:30:00".to_string();
        let text = format!("{}\n{}\n", header_line(), fields.join(","));

        let reading = parse_one(&text).unwrap();
        assert_eq!(reading.ts, datetime!(2024-01-01 10:30:00));
    }

    #[test]
    fn unparseable_ts_is_an_error() {
        let mut fields = record_fields();
        fields[0] = "yesterday".to_string();
        let text = format!("{}\n{}\n", header_line(), fields.join(","));

        let err = parse_one(&text).unwrap_err();
        assert!(matches!(err, PipelineError::Source(msg) if msg.contains("invalid ts")));
    }

    #[test]
    fn missing_required_column_fails_header_resolution() {
        let header = header_line().replace("meter_id,", "");
        let mut rdr = csv::Reader::from_reader(header.as_bytes());
        let headers = rdr.headers().unwrap().clone();

        let err = WideColumns::resolve(&headers).unwrap_err();
        assert!(matches!(err, PipelineError::Source(msg) if msg.contains("meter_id")));
    }

    #[test]
    fn price_column_is_optional() {
        let header = header_line().replace("price,", "");
        let mut fields = record_fields();
        fields.remove(2);
        let text = format!("{}\n{}\n", header, fields.join(","));

        let reading = parse_one(&text).unwrap();
        assert_eq!(reading.price, None);
        assert_eq!(reading.phases[0].current, Some(0.0));
    }

    #[tokio::test]
    async fn streams_every_record_from_a_file() {
        use futures::StreamExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.csv");
        let record = record_fields().join(",");
        std::fs::write(&path, format!("{}\n{record}\n{record}\n", header_line())).unwrap();

        let source = MeterReadingCsvFileSource::new(&path);
        let mut stream = source.stream().await;
        let mut seen = 0;
        while let Some(item) = stream.next().await {
            let env = item.unwrap();
            assert_eq!(env.payload.meter_id, "M1");
            seen += 1;
        }
        assert_eq!(seen, 2);
    }
}
