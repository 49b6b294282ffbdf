use std::{pin::Pin, sync::Arc, time::SystemTime};

use futures::{Stream, StreamExt};
use solar_core::{domain::RejectionReason, SiteId, StoreError};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

impl<T> Envelope<T> {
    pub fn now(payload: T) -> Self {
        Self {
            payload,
            received_at: SystemTime::now(),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            payload: f(self.payload),
            received_at: self.received_at,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error("reading rejected: {0}")]
    Rejected(#[from] RejectionReason),
    #[error("unknown site {0}")]
    UnknownSite(SiteId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Per-record failures the sink skips over; everything else stops it.
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            PipelineError::Source(_)
                | PipelineError::Rejected(_)
                | PipelineError::UnknownSite(_)
        )
    }
}

pub type EnvelopeStream<T> = Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(&self) -> EnvelopeStream<T>;
}

#[async_trait::async_trait]
pub trait Transform<I, O>: Send + Sync {
    async fn apply(&self, input: Envelope<I>) -> Result<Envelope<O>, PipelineError>;
}

#[async_trait::async_trait]
pub trait Sink<T>: Send + Sync {
    async fn run<S>(&self, input: S) -> Result<(), PipelineError>
    where
        S: Stream<Item = Result<Envelope<T>, PipelineError>> + Send + Unpin + 'static;
}

/// Source of raw records `I`, one converting stage `I -> O`, then any number
/// of `O -> O` filters before the sink.
pub struct Pipeline<S, I, O, K> {
    pub source: S,
    pub normalize: Arc<dyn Transform<I, O> + Send + Sync>,
    pub transforms: Vec<Arc<dyn Transform<O, O> + Send + Sync>>,
    pub sink: K,
}

impl<S, I, O, K> Pipeline<S, I, O, K>
where
    I: Send + 'static,
    O: Send + 'static,
    S: Source<I> + Send + Sync + 'static,
    K: Sink<O> + Send + Sync + 'static,
{
    pub async fn run(self) -> Result<(), PipelineError> {
        let raw = self.source.stream().await;

        let normalize = self.normalize.clone();
        let mut stream: EnvelopeStream<O> = Box::pin(raw.then(move |item| {
            let normalize = normalize.clone();
            async move {
                match item {
                    Ok(env) => normalize.apply(env).await,
                    Err(e) => Err(e),
                }
            }
        }));

        // Apply filters in sequence (if any).
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

        self.sink.run(stream).await
    }
}
