//! Running chat steps against a conversation.
//!
//! # Runner Module
//!
//! The runner is the glue between a [`ConversationManager`] and a step: it
//! starts the step on the conversation's messages, forwards partial text to a
//! sink as it arrives, and appends the finished reply to the conversation.
//!
//! Every entry point races the step against a [`CancellationToken`]. A cancelled
//! run returns [`Error::Cancelled`](crate::Error::Cancelled) right away; any
//! text already written stays written, and the conversation is not modified.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ChatRunnable`] | Anything that can start a chat step for a conversation |
//! | [`ConversationRun`] | Explicit run state machine |
//! | [`run_into_writer`] | Stream the reply into an `AsyncWrite` |
//! | [`run_to_string`] | Collect the reply |
//! | [`run_to_context_manager`] | Collect the reply and append it |
//! | [`deadline_token`] | Child token that cancels itself after a timeout |
//! | [`Deadline`] | Owns that token and its timer |

pub mod run;

pub use crate::conversation::create_manager;
pub use run::{ConversationRun, RunState};

use crate::conversation::{ConversationManager, Message};
use crate::settings::Metadata;
use crate::step::Step;
use crate::Result;
use std::fmt;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Something that can start a chat step over a conversation.
pub trait ChatRunnable: Send + Sync {
    /// Build and start a step over the manager's current messages.
    ///
    /// The returned step is already running; read its output until it closes.
    fn run_with_manager(
        &self,
        cancel: &CancellationToken,
        manager: &ConversationManager,
    ) -> Result<Box<dyn Step<Vec<Message>, String>>>;

    /// Settings provenance attached to the assistant reply.
    fn metadata(&self) -> Metadata {
        Metadata::new()
    }
}

/// Stream the reply into `writer` and return the full text.
pub async fn run_into_writer<W>(
    cancel: &CancellationToken,
    runnable: &dyn ChatRunnable,
    manager: &ConversationManager,
    writer: &mut W,
) -> Result<String>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    ConversationRun::new(runnable, cancel.clone())
        .stream(manager, writer)
        .await
}

/// Collect the reply: every partial followed by the final value.
pub async fn run_to_string(
    cancel: &CancellationToken,
    runnable: &dyn ChatRunnable,
    manager: &ConversationManager,
) -> Result<String> {
    run_into_writer(cancel, runnable, manager, &mut tokio::io::sink()).await
}

/// Collect the reply and append it to `manager` as an assistant message.
///
/// On error the manager is left exactly as it was.
pub async fn run_to_context_manager<'m>(
    cancel: &CancellationToken,
    runnable: &dyn ChatRunnable,
    manager: &'m mut ConversationManager,
) -> Result<&'m Message> {
    ConversationRun::new(runnable, cancel.clone())
        .complete(manager, &mut tokio::io::sink())
        .await
}

/// A token that is cancelled when its parent is or when a timeout elapses.
///
/// Dropping the deadline stops its timer without cancelling the token.
pub struct Deadline {
    token: CancellationToken,
    _timer: DropGuard,
}

impl Deadline {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl fmt::Debug for Deadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deadline")
            .field("expired", &self.is_expired())
            .finish()
    }
}

/// Derive a token that is cancelled when `parent` is or when `timeout` elapses.
///
/// Keep the returned [`Deadline`] alive for as long as the timeout applies.
/// Must be called from within a tokio runtime.
pub fn deadline_token(parent: &CancellationToken, timeout: Duration) -> Deadline {
    let token = parent.child_token();
    let stop = CancellationToken::new();
    let timer = token.clone();
    let stopped = stop.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = stopped.cancelled() => {}
            _ = timer.cancelled() => {}
            _ = tokio::time::sleep(timeout) => {
                tracing::debug!(timeout_ms = timeout.as_millis() as u64, "deadline reached");
                timer.cancel();
            }
        }
    });
    Deadline {
        token,
        _timer: stop.drop_guard(),
    }
}
