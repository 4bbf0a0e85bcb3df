use std::path::PathBuf;

use futures::StreamExt;
use phase_client::domain::PhaseRow;

use crate::{
    pipeline::{Envelope, PipelineError, Sink},
    staging,
};

/// Writes narrow rows into numbered `;`-separated chunk files instead of
/// uploading them, one file per `chunk_size` rows. The chunks are merged
/// into a single file later with [`staging::join_chunks`].
pub struct CsvChunkSink {
    dir: PathBuf,
    file_stem: String,
    chunk_size: usize,
}

impl CsvChunkSink {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(dir: P, file_stem: S, chunk_size: usize) -> Self {
        Self {
            dir: dir.into(),
            file_stem: file_stem.into(),
            chunk_size: chunk_size.max(1),
        }
    }

    fn write_chunk(&self, index: usize, batch: &[Envelope<PhaseRow>]) -> Result<(), PipelineError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| PipelineError::Sink(format!("failed to create staging dir: {e}")))?;

        let path = staging::chunk_path(&self.dir, &self.file_stem, index);
        let mut writer = csv::WriterBuilder::new()
            .delimiter(staging::FIELD_SEPARATOR)
            .from_path(&path)
            .map_err(|e| PipelineError::Sink(format!("failed to create chunk file: {e}")))?;

        for env in batch {
            writer
                .serialize(&env.payload)
                .map_err(|e| PipelineError::Sink(format!("failed to write chunk row: {e}")))?;
        }
        writer
            .flush()
            .map_err(|e| PipelineError::Sink(format!("failed to flush chunk file: {e}")))?;

        metrics::counter!("phase_chunk_files_written_total").increment(1);
        tracing::debug!(path = %path.display(), rows = batch.len(), "wrote phase chunk");
        Ok(())
    }
}

#[async_trait::async_trait]
impl Sink<PhaseRow> for CsvChunkSink {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<PhaseRow>, PipelineError>>
            + Send
            + Unpin
            + 'static,
    {
        let mut buffer: Vec<Envelope<PhaseRow>> = Vec::with_capacity(self.chunk_size);
        let mut index = 0usize;

        while let Some(item) = input.next().await {
            let env = item?;
            buffer.push(env);
            if buffer.len() >= self.chunk_size {
                self.write_chunk(index, &buffer)?;
                buffer.clear();
                index += 1;
            }
        }

        if !buffer.is_empty() {
            self.write_chunk(index, &buffer)?;
            index += 1;
        }

        tracing::info!(chunks = index, "phase staging complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;
    use time::macros::datetime;

    fn row(device: i32) -> Envelope<PhaseRow> {
        Envelope {
            payload: PhaseRow {
                current: Some(1.5),
                voltage: None,
                active_power: Some(120.0),
                power_factor: None,
                frequency: None,
                total_active_energy: None,
                total_active_returned_energy: None,
                apparent_power: None,
                device,
                phase_type: 2,
                ts: datetime!(2024-01-01 00:00:00),
                price_realtime: None,
            },
            received_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn splits_rows_across_chunk_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvChunkSink::new(dir.path(), "rows", 2);

        let items: Vec<Result<Envelope<PhaseRow>, PipelineError>> =
            (0..5).map(|n| Ok(row(n))).collect();
        sink.run(futures::stream::iter(items)).await.unwrap();

        let counts = staging::chunk_row_counts(dir.path(), "rows").unwrap();
        let rows: Vec<usize> = counts.iter().map(|(_, n)| *n).collect();
        assert_eq!(rows, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn chunk_files_use_semicolons_and_a_header() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvChunkSink::new(dir.path(), "rows", 10);
        sink.run(futures::stream::iter(vec![Ok(row(3))]))
            .await
            .unwrap();

        let path = staging::chunk_path(dir.path(), "rows", 0);
        let text = std::fs::read_to_string(path).unwrap();
        let mut lines = text.lines();

        let header = lines.next().unwrap();
        assert!(header.starts_with("current;voltage;active_power"));
        assert!(header.ends_with("device;phase_type;ts;price_realtime"));

        let first = lines.next().unwrap();
        assert!(first.contains("2024-01-01 00:00:00"));
        assert!(first.contains(";3;2;"));
    }

    #[tokio::test]
    async fn upstream_error_stops_staging() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvChunkSink::new(dir.path(), "rows", 2);

        let items: Vec<Result<Envelope<PhaseRow>, PipelineError>> = vec![
            Ok(row(0)),
            Ok(row(1)),
            Err(PipelineError::Source("bad record".to_string())),
            Ok(row(2)),
        ];
        let err = sink.run(futures::stream::iter(items)).await.unwrap_err();

        assert!(matches!(err, PipelineError::Source(_)));
        // The completed chunk is on disk, the partial one is not.
        let chunks = staging::sorted_chunks(dir.path(), "rows").unwrap();
        assert_eq!(chunks.len(), 1);
    }
}
