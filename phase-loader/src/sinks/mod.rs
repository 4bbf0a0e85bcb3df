pub mod csv_chunks;
pub mod pgwire;
pub mod rest;
pub mod upload;

pub use csv_chunks::CsvChunkSink;
pub use pgwire::{PgwireBackend, PgwireUploadSink};
pub use rest::RestUploadSink;
pub use upload::{BatchUploadSink, InsertBackend};

use anyhow::{bail, Context};
use phase_client::{domain::PhaseRow, rest::RestTableClient};
use sqlx::postgres::PgPoolOptions;

use crate::{
    config::{AppConfig, SinkKind},
    pipeline::{Envelope, PipelineError, Sink},
};

/// The upload sink picked by `[sink] kind`, ready to run.
pub enum SelectedSink {
    Rest(RestUploadSink),
    Pgwire(PgwireUploadSink),
}

impl SelectedSink {
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let retry = config.sink.retry_policy();
        let sink = match config.sink.kind {
            SinkKind::Rest => {
                let (Some(rest_url), Some(api_key)) =
                    (&config.store.rest_url, &config.store.api_key)
                else {
                    bail!("store.rest_url and store.api_key are required for the rest sink");
                };
                let client = RestTableClient::new(rest_url.clone(), api_key.clone())?;
                SelectedSink::Rest(
                    RestUploadSink::new(
                        client,
                        config.store.table.clone(),
                        config.sink.batch_size,
                        config.sink.workers,
                        retry,
                    )
                    .abort_on_failure(config.sink.abort_on_failure),
                )
            }
            SinkKind::Pgwire => {
                let Some(pg_uri) = &config.store.pg_uri else {
                    bail!("store.pg_uri is required for the pgwire sink");
                };
                let pool = PgPoolOptions::new()
                    .max_connections(config.store.max_connections)
                    .connect(pg_uri)
                    .await
                    .context("failed to connect to the store over pgwire")?;
                SelectedSink::Pgwire(
                    PgwireUploadSink::new(
                        PgwireBackend::new(pool),
                        config.store.table.clone(),
                        config.sink.batch_size,
                        config.sink.workers,
                        retry,
                    )
                    .abort_on_failure(config.sink.abort_on_failure),
                )
            }
        };

        Ok(sink)
    }
}

#[async_trait::async_trait]
impl Sink<PhaseRow> for SelectedSink {
    async fn run<S>(&self, input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<PhaseRow>, PipelineError>>
            + Send
            + Unpin
            + 'static,
    {
        match self {
            SelectedSink::Rest(sink) => sink.run(input).await,
            SelectedSink::Pgwire(sink) => sink.run(input).await,
        }
    }
}
