use super::{Step, StepEmitter, StepOutput, StepResult, StepState};
use crate::{Error, ErrorContext, Result};
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default capacity of a step's output channel.
pub const DEFAULT_OUTPUT_CAPACITY: usize = 64;

type Producer<I, O> = Box<dyn FnOnce(I, StepEmitter<O>) -> BoxFuture<'static, Result<O>> + Send>;

struct Pending<I, O> {
    producer: Producer<I, O>,
    tx: mpsc::Sender<StepResult<O>>,
}

/// A [`Step`] driven by an async body.
///
/// The body receives the input and a [`StepEmitter`] for partial values; its
/// `Ok` value becomes the `Final` result and its `Err` the `Error` result, so
/// exactly one terminal value is emitted no matter how the body is written.
/// The body runs on its own tokio task, raced against the cancellation token
/// passed to [`Step::run`].
pub struct StreamingStep<I, O> {
    name: String,
    pending: Option<Pending<I, O>>,
    output: StepOutput<O>,
    task: Option<JoinHandle<()>>,
}

impl<I, O> StreamingStep<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(I, StepEmitter<O>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
    {
        Self::with_capacity(name, DEFAULT_OUTPUT_CAPACITY, body)
    }

    pub fn with_capacity<F, Fut>(name: impl Into<String>, capacity: usize, body: F) -> Self
    where
        F: FnOnce(I, StepEmitter<O>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let producer: Producer<I, O> =
            Box::new(move |input, emitter| Box::pin(body(input, emitter)));
        Self {
            name: name.into(),
            pending: Some(Pending { producer, tx }),
            output: StepOutput::new(rx),
            task: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<I, O> fmt::Debug for StreamingStep<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingStep")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

#[async_trait::async_trait]
impl<I, O> Step<I, O> for StreamingStep<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn state(&self) -> StepState {
        if self.pending.is_some() {
            return StepState::NotStarted;
        }
        match &self.task {
            Some(task) if !task.is_finished() => StepState::Running,
            _ => StepState::Done,
        }
    }

    fn run(&mut self, cancel: &CancellationToken, input: I) -> Result<()> {
        let Pending { producer, tx } = self.pending.take().ok_or_else(|| {
            Error::runtime_with_context(
                "step was already started",
                ErrorContext::new()
                    .with_field_path(self.name.clone())
                    .with_source("streaming_step"),
            )
        })?;

        let emitter = StepEmitter::new(tx, cancel.clone());
        if cancel.is_cancelled() {
            tracing::debug!(step = %self.name, "step cancelled before start");
            emitter.abort();
            return Err(Error::Cancelled);
        }

        let name = self.name.clone();
        self.task = Some(tokio::spawn(async move {
            tracing::debug!(step = %name, "step started");
            let body = producer(input, emitter.clone());
            let terminal = tokio::select! {
                biased;
                _ = emitter.cancelled() => StepResult::Error(Error::Cancelled),
                outcome = body => match outcome {
                    Ok(value) => StepResult::Final(value),
                    Err(e) => StepResult::Error(e),
                },
            };
            match &terminal {
                StepResult::Error(e) if e.is_cancelled() => {
                    tracing::debug!(step = %name, "step cancelled")
                }
                StepResult::Error(e) => tracing::warn!(step = %name, error = %e, "step failed"),
                _ => tracing::debug!(step = %name, "step finished"),
            }
            emitter.finish(terminal).await;
        }));
        Ok(())
    }

    fn output(&mut self) -> &mut StepOutput<O> {
        &mut self.output
    }

    async fn wait(&mut self) -> Result<()> {
        match self.task.take() {
            None => Ok(()),
            Some(task) => task.await.map_err(|e| {
                Error::runtime_with_context(
                    "step task did not complete",
                    ErrorContext::new()
                        .with_field_path(self.name.clone())
                        .with_details(e.to_string())
                        .with_source("streaming_step"),
                )
            }),
        }
    }
}
