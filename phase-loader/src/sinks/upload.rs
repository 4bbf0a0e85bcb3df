use std::{sync::Arc, time::SystemTime};

use futures::StreamExt;
use phase_client::domain::PhaseRow;

use crate::{
    pipeline::{Envelope, PipelineError, Sink},
    retry::RetryPolicy,
};

/// One bulk write against the backing store. The sink never looks past this
/// boundary, so REST and wire-protocol stores plug in interchangeably.
#[async_trait::async_trait]
pub trait InsertBackend: Send + Sync + 'static {
    async fn insert(&self, table: &str, rows: &[PhaseRow]) -> anyhow::Result<()>;
}

/// Batching, retrying upload sink over any [`InsertBackend`].
///
/// Rows are grouped into contiguous batches of `batch_size` and handed out
/// round-robin to `workers` spawned tasks, so at most `workers` inserts run
/// at once. A batch is never split or merged once formed: `N` rows become
/// `ceil(N / batch_size)` insert calls whose union is exactly the input.
///
/// Failures stay loud. By default a worker records its first terminal
/// failure and keeps draining so every batch still gets its attempts; with
/// `abort_on_failure` the failing worker stops and dispatch halts. Either
/// way the error surfaces after all workers have been joined.
pub struct BatchUploadSink<B> {
    backend: Arc<B>,
    table: String,
    batch_size: usize,
    workers: usize,
    retry: RetryPolicy,
    abort_on_failure: bool,
}

impl<B> BatchUploadSink<B> {
    pub fn new<T: Into<String>>(
        backend: B,
        table: T,
        batch_size: usize,
        workers: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            backend: Arc::new(backend),
            table: table.into(),
            batch_size: batch_size.max(1),
            workers: workers.max(1),
            retry,
            abort_on_failure: false,
        }
    }

    pub fn abort_on_failure(mut self, abort: bool) -> Self {
        self.abort_on_failure = abort;
        self
    }
}

struct Batch {
    index: usize,
    envelopes: Vec<Envelope<PhaseRow>>,
}

async fn submit_batch<B: InsertBackend>(
    backend: &B,
    table: &str,
    retry: &RetryPolicy,
    batch: Batch,
) -> Result<(), PipelineError> {
    let Batch { index, envelopes } = batch;
    let min_received = envelopes.iter().map(|e| e.received_at).min();
    let rows: Vec<PhaseRow> = envelopes.into_iter().map(|e| e.payload).collect();

    let mut attempt: u32 = 1;
    loop {
        match backend.insert(table, &rows).await {
            Ok(()) => {
                metrics::counter!("phase_rows_uploaded_total").increment(rows.len() as u64);

                // Approximate end-to-end latency from earliest received_at to now.
                if let Some(min_received) = min_received {
                    if let Ok(dur) = SystemTime::now().duration_since(min_received) {
                        metrics::histogram!("upload_end_to_end_latency_seconds")
                            .record(dur.as_secs_f64());
                    }
                }

                return Ok(());
            }
            Err(e) if attempt < retry.max_attempts => {
                tracing::warn!(
                    error = %e,
                    batch = index,
                    attempt,
                    "phase batch insert failed, retrying"
                );
                metrics::counter!("phase_upload_retries_total").increment(1);
                tokio::time::sleep(retry.delay_for(attempt)).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    batch = index,
                    attempt,
                    "phase batch insert failed, giving up"
                );
                metrics::counter!("phase_upload_failures_total").increment(1);
                return Err(PipelineError::Upload {
                    batch: index,
                    attempts: attempt,
                    message: e.to_string(),
                });
            }
        }
    }
}

async fn run_worker<B: InsertBackend>(
    backend: Arc<B>,
    table: String,
    retry: RetryPolicy,
    abort_on_failure: bool,
    mut rx: tokio::sync::mpsc::Receiver<Batch>,
) -> Result<(), PipelineError> {
    let mut first_err: Option<PipelineError> = None;

    while let Some(batch) = rx.recv().await {
        if let Err(e) = submit_batch(backend.as_ref(), &table, &retry, batch).await {
            if abort_on_failure {
                return Err(e);
            }
            if first_err.is_none() {
                first_err = Some(e);
            }
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[async_trait::async_trait]
impl<B: InsertBackend> Sink<PhaseRow> for BatchUploadSink<B> {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<PhaseRow>, PipelineError>>
            + Send
            + Unpin
            + 'static,
    {
        let mut txs = Vec::with_capacity(self.workers);
        let mut joins = Vec::with_capacity(self.workers);

        for _ in 0..self.workers {
            // Capacity 1 keeps memory bounded at roughly two batches per
            // worker and gives the dispatcher backpressure.
            let (tx, rx) = tokio::sync::mpsc::channel::<Batch>(1);
            txs.push(tx);
            joins.push(tokio::spawn(run_worker(
                Arc::clone(&self.backend),
                self.table.clone(),
                self.retry.clone(),
                self.abort_on_failure,
                rx,
            )));
        }

        let mut upstream_err: Option<PipelineError> = None;
        let mut dispatch_err: Option<PipelineError> = None;
        let mut buffer: Vec<Envelope<PhaseRow>> = Vec::with_capacity(self.batch_size);
        let mut dispatched: usize = 0;
        let mut next_worker = 0;

        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(e) => {
                    tracing::error!(error = %e, "upstream error, stopping dispatch");
                    upstream_err = Some(e);
                    break;
                }
            };

            buffer.push(env);
            if buffer.len() >= self.batch_size {
                let batch = Batch {
                    index: dispatched,
                    envelopes: std::mem::replace(
                        &mut buffer,
                        Vec::with_capacity(self.batch_size),
                    ),
                };
                if txs[next_worker].send(batch).await.is_err() {
                    dispatch_err = Some(PipelineError::Sink(
                        "upload worker stopped accepting batches".to_string(),
                    ));
                    break;
                }
                dispatched += 1;
                next_worker = (next_worker + 1) % self.workers;
            }
        }

        // The remainder only ships on a clean stream end; a partial buffer
        // behind an error would upload rows past the failure point.
        if upstream_err.is_none() && dispatch_err.is_none() && !buffer.is_empty() {
            let batch = Batch {
                index: dispatched,
                envelopes: std::mem::take(&mut buffer),
            };
            if txs[next_worker].send(batch).await.is_err() {
                dispatch_err = Some(PipelineError::Sink(
                    "upload worker stopped accepting batches".to_string(),
                ));
            } else {
                dispatched += 1;
            }
        }

        drop(txs);

        let mut worker_err: Option<PipelineError> = None;
        for j in joins {
            match j.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if worker_err.is_none() {
                        worker_err = Some(e);
                    }
                }
                Err(e) => {
                    if worker_err.is_none() {
                        worker_err =
                            Some(PipelineError::Sink(format!("upload worker join error: {e}")));
                    }
                }
            }
        }

        if let Some(e) = upstream_err {
            return Err(e);
        }
        if let Some(e) = worker_err {
            return Err(e);
        }
        if let Some(e) = dispatch_err {
            return Err(e);
        }

        tracing::info!(batches = dispatched, "phase upload complete");
        Ok(())
    }
}
