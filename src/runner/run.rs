use super::ChatRunnable;
use crate::conversation::{ConversationManager, ConversationTemplate, ManagerOption, Message};
use crate::step::{Step, StepResult};
use crate::template::{Bindings, TemplateRenderer};
use crate::{Error, ErrorContext, Result};
use std::fmt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Where a [`ConversationRun`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Rendering,
    Running,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed | RunState::Cancelled
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Rendering => "rendering",
            RunState::Running => "running",
            RunState::Streaming => "streaming",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One invocation of a chat runnable against a conversation.
///
/// ```text
/// Idle ─▶ Rendering ─▶ Running ─▶ Streaming ─▶ Completed | Failed | Cancelled
/// ```
///
/// Partial text is forwarded to the sink as soon as it arrives and is not
/// retracted if the run later fails or is cancelled. The step is started with
/// a child of the run's token, and that child is cancelled when streaming
/// ends for any reason, so the producer never outlives the run.
pub struct ConversationRun<'a> {
    runnable: &'a dyn ChatRunnable,
    cancel: CancellationToken,
    state: RunState,
}

impl<'a> ConversationRun<'a> {
    pub fn new(runnable: &'a dyn ChatRunnable, cancel: CancellationToken) -> Self {
        Self {
            runnable,
            cancel,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        tracing::debug!(from = %self.state, to = %next, "run state changed");
        self.state = next;
    }

    fn fail(&mut self, error: Error) -> Error {
        let next = if error.is_cancelled() {
            RunState::Cancelled
        } else {
            RunState::Failed
        };
        self.transition(next);
        error
    }

    /// Render the conversation template into a fresh manager.
    pub fn render(
        &mut self,
        renderer: &dyn TemplateRenderer,
        template: &ConversationTemplate,
        bindings: &Bindings,
        options: Vec<ManagerOption>,
    ) -> Result<ConversationManager> {
        self.ensure_state(&[RunState::Idle], "render")?;
        self.transition(RunState::Rendering);
        template
            .render(renderer, bindings, options)
            .map_err(|e| self.fail(e))
    }

    /// Run the step over `manager` and stream its text into `sink`.
    ///
    /// Returns the full text: every partial followed by the final value.
    pub async fn stream<W>(&mut self, manager: &ConversationManager, sink: &mut W) -> Result<String>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.ensure_state(&[RunState::Idle, RunState::Rendering], "stream")?;
        self.transition(RunState::Running);

        let child = self.cancel.child_token();
        let _stop_producer = child.clone().drop_guard();
        let mut step = match self.runnable.run_with_manager(&child, manager) {
            Ok(step) => step,
            Err(e) => return Err(self.fail(e)),
        };

        self.transition(RunState::Streaming);
        match drive(&self.cancel, step.as_mut(), sink).await {
            Ok(text) => {
                tracing::debug!(
                    conversation_id = %manager.id(),
                    chars = text.len(),
                    "run completed"
                );
                self.transition(RunState::Completed);
                Ok(text)
            }
            Err(e) => {
                if !e.is_cancelled() {
                    tracing::warn!(conversation_id = %manager.id(), error = %e, "run failed");
                }
                Err(self.fail(e))
            }
        }
    }

    /// Stream into `sink`, then append the reply as an assistant message
    /// carrying the runnable's settings metadata.
    ///
    /// The manager is only touched when the run completes.
    pub async fn complete<'m, W>(
        &mut self,
        manager: &'m mut ConversationManager,
        sink: &mut W,
    ) -> Result<&'m Message>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let text = self.stream(manager, sink).await?;
        let reply = Message::assistant(text).with_metadata(self.runnable.metadata());
        manager.add_message(reply);
        let index = manager.len() - 1;
        Ok(&manager.messages()[index])
    }

    fn ensure_state(&self, allowed: &[RunState], operation: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        Err(Error::runtime_with_context(
            format!("cannot {} a run that is {}", operation, self.state),
            ErrorContext::new().with_source("conversation_run"),
        ))
    }
}

async fn drive<W>(
    cancel: &CancellationToken,
    step: &mut dyn Step<Vec<Message>, String>,
    sink: &mut W,
) -> Result<String>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut text = String::new();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            next = step.output().recv() => next,
        };
        match next {
            Some(StepResult::Partial(chunk)) => {
                forward(cancel, sink, &chunk).await?;
                text.push_str(&chunk);
            }
            Some(StepResult::Final(chunk)) => {
                forward(cancel, sink, &chunk).await?;
                text.push_str(&chunk);
                return Ok(text);
            }
            Some(StepResult::Error(e)) => return Err(e),
            None => {
                // producer vanished without a terminal value; surface its panic if any
                step.wait().await?;
                return Err(Error::runtime_with_context(
                    "step output closed without a terminal result",
                    ErrorContext::new().with_source("conversation_run"),
                ));
            }
        }
    }
}

/// Write and flush one chunk, giving up as soon as `cancel` fires.
async fn forward<W>(cancel: &CancellationToken, sink: &mut W, chunk: &str) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let write = async {
        sink.write_all(chunk.as_bytes()).await?;
        sink.flush().await
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        written = write => written.map_err(Error::from),
    }
}
