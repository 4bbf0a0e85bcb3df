use anyhow::{bail, Result};
use phase_client::domain::{MeterReading, PhaseRow};
use phase_loader::{
    config::AppConfig, metrics_server, observability, pipeline::Pipeline, sinks::SelectedSink,
    sources::MeterReadingBackfillFileSource, transform,
};
use std::{env, sync::Arc};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: load_phase_ndjson <ndjson_path>");
    }
    let file_path = &args[1];

    // Point PHASE_LOADER_CONFIG at a backfill-specific file when needed.
    let cfg = AppConfig::load()?;
    if let Some(metrics) = &cfg.metrics {
        metrics_server::serve(&metrics.bind_addr)?;
    }

    let sink = SelectedSink::from_config(&cfg).await?;
    let source = MeterReadingBackfillFileSource::new(file_path);
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
