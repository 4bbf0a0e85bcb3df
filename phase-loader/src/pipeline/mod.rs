use std::{pin::Pin, sync::Arc, time::SystemTime};

use futures::{stream, Stream, StreamExt};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error("transform error: {0}")]
    Transform(String),
    #[error("no device mapping for meter id '{0}'")]
    UnknownMeter(String),
    #[error("upload of batch {batch} failed after {attempts} attempts: {message}")]
    Upload {
        batch: usize,
        attempts: u32,
        message: String,
    },
    #[error("sink error: {0}")]
    Sink(String),
}

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;
}

#[async_trait::async_trait]
pub trait Transform<I, O>: Send + Sync {
    async fn apply(&self, input: Envelope<I>) -> Result<Envelope<O>, PipelineError>;
}

/// One-to-many stage: a single input envelope fans out into any number of
/// output envelopes (unpivoting a wide reading into its per-phase rows).
#[async_trait::async_trait]
pub trait Expand<I, O>: Send + Sync {
    async fn apply(&self, input: Envelope<I>) -> Result<Vec<Envelope<O>>, PipelineError>;
}

#[async_trait::async_trait]
pub trait Sink<T>: Send + Sync {
    async fn run<S>(&self, input: S) -> Result<(), PipelineError>
    where
        S: Stream<Item = Result<Envelope<T>, PipelineError>> + Send + Unpin + 'static;
}

pub struct Pipeline<S, I, O, K> {
    pub source: S,
    pub transforms: Vec<Arc<dyn Transform<I, I> + Send + Sync>>, // same-type transforms chain
    pub expand: Arc<dyn Expand<I, O> + Send + Sync>,
    pub sink: K,
}

impl<I, O, S, K> Pipeline<S, I, O, K>
where
    I: Send + 'static,
    O: Send + 'static,
    S: Source<I> + Send + Sync + 'static,
    K: Sink<O> + Send + Sync + 'static,
{
    pub async fn run(self) -> Result<(), PipelineError> {
        let mut stream = self.source.stream().await;

        // Apply transforms in sequence (if any).
        for t in self.transforms {
            let t_arc = t.clone();
            stream = Box::pin(stream.then(move |item| {
                let t_inner = t_arc.clone();
                async move {
                    match item {
                        Ok(env) => t_inner.apply(env).await,
                        Err(e) => Err(e),
                    }
                }
            }));
        }

        // Fan each record out into its narrow rows; in-band errors pass
        // through untouched so the sink decides how to surface them.
        let expand = self.expand;
        let expanded = stream
            .then(move |item| {
                let ex = expand.clone();
                async move {
                    match item {
                        Ok(env) => ex.apply(env).await,
                        Err(e) => Err(e),
                    }
                }
            })
            .flat_map(|result| match result {
                Ok(envs) => stream::iter(envs.into_iter().map(Ok)).boxed(),
                Err(e) => stream::once(async move { Err(e) }).boxed(),
            });

        self.sink.run(Box::pin(expanded)).await
    }
}
