use std::{path::PathBuf, time::SystemTime};

use async_stream::try_stream;
use futures::Stream;
use phase_client::domain::MeterReading;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};

use crate::pipeline::{Envelope, PipelineError, Source};

/// NDJSON backfill source for `MeterReading`.
///
/// Each line is a JSON object matching `MeterReading`, timestamps in the
/// fixed `YYYY-MM-DD HH:MM:SS` format. Unparseable lines are counted and
/// skipped so one corrupt line does not abort a long backfill.
pub struct MeterReadingBackfillFileSource {
    path: PathBuf,
}

impl MeterReadingBackfillFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl Source<MeterReading> for MeterReadingBackfillFileSource {
    async fn stream(
        &self,
    ) -> std::pin::Pin<Box<dyn Stream<Item = Result<Envelope<MeterReading>, PipelineError>> + Send>>
    {
        let path = self.path.clone();
        let s = try_stream! {
            let file = File::open(&path).await.map_err(|e| {
                PipelineError::Source(format!("failed to open backfill file: {e}"))
            })?;
            let reader = BufReader::new(file);
            let mut lines = reader.lines();

            while let Some(line) = lines.next_line().await.map_err(|e| {
                PipelineError::Source(format!("failed to read backfill line: {e}"))
            })? {
                if line.trim().is_empty() {
                    continue;
                }
                let reading: MeterReading = match serde_json::from_str(&line) {
                    Ok(v) => v,
                    Err(e) => {
                        metrics::counter!("backfill_meter_reading_parse_errors_total")
                            .increment(1);
                        tracing::warn!(error = %e, "skipping unparseable backfill line");
                        continue;
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
