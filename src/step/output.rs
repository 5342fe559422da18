//! Output channel halves of a step: the consumer-side [`StepOutput`] and the
//! producer-side [`StepEmitter`].

use super::StepResult;
use crate::{Error, ErrorContext, Result};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Receive side of a step's output channel.
///
/// Yields results in emission order and returns `None` forever once the
/// terminal result has been handed out or the producer went away.
pub struct StepOutput<T> {
    rx: mpsc::Receiver<StepResult<T>>,
    finished: bool,
}

impl<T> StepOutput<T> {
    pub(crate) fn new(rx: mpsc::Receiver<StepResult<T>>) -> Self {
        Self {
            rx,
            finished: false,
        }
    }

    /// Wait for the next result.
    pub async fn recv(&mut self) -> Option<StepResult<T>> {
        if self.finished {
            return None;
        }
        let item = self.rx.recv().await;
        self.observe(item)
    }

    /// True once the terminal result was delivered or the channel closed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn observe(&mut self, item: Option<StepResult<T>>) -> Option<StepResult<T>> {
        match &item {
            Some(result) if result.is_terminal() => {
                self.finished = true;
                self.rx.close();
            }
            None => self.finished = true,
            Some(_) => {}
        }
        item
    }
}

impl<T> Stream for StepOutput<T> {
    type Item = StepResult<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(item) => Poll::Ready(this.observe(item)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Producer handle given to a step's body for emitting partial values.
///
/// Every send races the step's cancellation token, so a producer never blocks
/// on a consumer that stopped reading.
pub struct StepEmitter<T> {
    tx: mpsc::Sender<StepResult<T>>,
    cancel: CancellationToken,
}

impl<T> Clone for StepEmitter<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<T: Send> StepEmitter<T> {
    pub(crate) fn new(tx: mpsc::Sender<StepResult<T>>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    /// Emit one partial value.
    ///
    /// Fails with [`Error::Cancelled`] once the token fires, or with a runtime
    /// error if the consumer dropped the output.
    pub async fn emit(&self, value: T) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            sent = self.tx.send(StepResult::Partial(value)) => sent.map_err(|_| {
                Error::runtime_with_context(
                    "step output was dropped by its consumer",
                    ErrorContext::new().with_source("step_emitter"),
                )
            }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the step is cancelled; useful inside provider `select!` loops.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Terminate without running: queue a cancellation error if there is room.
    pub(crate) fn abort(&self) {
        let _ = self.tx.try_send(StepResult::Error(Error::Cancelled));
    }

    /// Deliver the terminal result. Gives up silently if cancellation wins.
    pub(crate) async fn finish(&self, terminal: StepResult<T>) {
        if self.cancel.is_cancelled() {
            // best effort, never wait on a consumer that may be gone
            let _ = self.tx.try_send(terminal);
            return;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {}
            _ = self.tx.send(terminal) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_output_stops_after_terminal() {
        let (tx, rx) = mpsc::channel(8);
        let mut out = StepOutput::new(rx);
        tx.send(StepResult::Partial(1)).await.unwrap();
        tx.send(StepResult::Final(2)).await.unwrap();
        // a misbehaving producer cannot smuggle values past the terminal
        let _ = tx.send(StepResult::Partial(3)).await;

        assert!(matches!(out.recv().await, Some(StepResult::Partial(1))));
        assert!(matches!(out.recv().await, Some(StepResult::Final(2))));
        assert!(out.is_finished());
        assert!(out.recv().await.is_none());
        assert!(out.next().await.is_none());
    }

    #[tokio::test]
    async fn test_emit_fails_after_cancel() {
        let (tx, _rx) = mpsc::channel(1);
        let token = CancellationToken::new();
        let emitter = StepEmitter::new(tx, token.clone());
        emitter.emit("a").await.unwrap();
        token.cancel();
        // channel is full, but the cancelled token must win instead of blocking
        let err = emitter.emit("b").await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_emit_fails_when_consumer_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let emitter = StepEmitter::new(tx, CancellationToken::new());
        let err = emitter.emit(1).await.unwrap_err();
        assert!(matches!(err, Error::Runtime { .. }));
    }
}
