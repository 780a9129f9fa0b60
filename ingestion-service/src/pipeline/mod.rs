use std::{pin::Pin, sync::Arc, time::SystemTime};

use futures::{future, Stream, StreamExt, TryStreamExt};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

impl<T> Envelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            received_at: SystemTime::now(),
        }
    }

    /// Replace the payload, keeping the original receive time.
    pub fn map<U>(self, payload: U) -> Envelope<U> {
        Envelope {
            payload,
            received_at: self.received_at,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("upstream error: {0}")]
    Source(String),
    #[error("transform error: {0}")]
    Transform(String),
    #[error("write error: {0}")]
    Sink(String),
}

pub type EnvelopeStream<T> = Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(&self) -> EnvelopeStream<T>;
}

/// A record-level step. Returning `Ok(None)` drops the record.
#[async_trait::async_trait]
pub trait Transform<I, O>: Send + Sync {
    async fn apply(&self, input: Envelope<I>) -> Result<Option<Envelope<O>>, PipelineError>;
}

#[async_trait::async_trait]
pub trait Sink<T>: Send + Sync {
    /// Consume the stream and return the number of records written. The first
    /// error in the stream aborts the run.
    async fn run<S>(&self, input: S) -> Result<u64, PipelineError>
    where
        S: Stream<Item = Result<Envelope<T>, PipelineError>> + Send + Unpin + 'static;
}

pub struct Pipeline<S, I, O, K> {
    pub source: S,
    pub mapper: Arc<dyn Transform<I, O> + Send + Sync>,
    pub transforms: Vec<Arc<dyn Transform<O, O> + Send + Sync>>, // same-type transforms chain
    pub sink: K,
}

fn apply_step<A, B>(
    stream: EnvelopeStream<A>,
    step: Arc<dyn Transform<A, B> + Send + Sync>,
) -> EnvelopeStream<B>
where
    A: Send + 'static,
    B: Send + 'static,
{
    Box::pin(
        stream
            .then(move |item| {
                let step = step.clone();
                async move {
                    match item {
                        Ok(env) => step.apply(env).await,
                        Err(e) => Err(e),
                    }
                }
            })
            .try_filter_map(|maybe| future::ready(Ok(maybe))),
    )
}

impl<S, I, O, K> Pipeline<S, I, O, K>
where
    I: Send + 'static,
    O: Send + 'static,
    S: Source<I> + Send + Sync + 'static,
    K: Sink<O> + Send + Sync + 'static,
{
    pub async fn run(self) -> Result<u64, PipelineError> {
        let raw = self.source.stream().await;
        let mut stream = apply_step(raw, self.mapper);

        // Apply transforms in sequence (if any).
        for t in self.transforms {
            stream = apply_step(stream, t);
        }

        self.sink.run(stream).await
    }
}
