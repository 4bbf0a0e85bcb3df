use anyhow::{bail, Result};
use phase_client::domain::{MeterReading, PhaseRow};
use phase_loader::{
    config::AppConfig, observability, pipeline::Pipeline, sinks::CsvChunkSink,
    sources::MeterReadingCsvFileSource, transform,
};
use std::{env, sync::Arc};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: stage_phase_chunks <wide_csv_path>");
    }
    let file_path = &args[1];

    let cfg = AppConfig::load()?;

    let sink = CsvChunkSink::new(
        cfg.staging.dir.clone(),
        cfg.staging.file_stem.clone(),
        cfg.staging.chunk_size,
    );
    let source = MeterReadingCsvFileSource::new(file_path);
    let unpivoter = transform::PhaseUnpivoter::new(cfg.device_map());

    let pipeline: Pipeline<_, MeterReading, PhaseRow, _> = Pipeline {
        source,
        transforms: vec![Arc::new(transform::MeterReadingValidation::default())],
        expand: Arc::new(unpivoter),
        sink,
    };

    pipeline.run().await?;

    Ok(())
}
