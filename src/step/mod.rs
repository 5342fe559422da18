//! Step execution and streaming results.
//!
//! # Step Layer
//!
//! A step is a single-use, cancellable unit of asynchronous work. Once started
//! with an input it emits a sequence of [`StepResult`] values on its own output
//! channel: zero or more partial values in generation order, then exactly one
//! terminal value (final or error). The channel closes after the terminal value.
//!
//! ```text
//!  NotStarted ──run(cancel, input)──▶ Running ──terminal emitted──▶ Done
//!                                        │
//!                                  Partial* ─▶ Final | Error
//! ```
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Step`] | Contract every runnable step satisfies |
//! | [`StepResult`] | Partial, final or error emission |
//! | [`StepOutput`] | Consumer side of the output channel (also a `Stream`) |
//! | [`StepEmitter`] | Producer side handed to a step body |
//! | [`StreamingStep`] | Generic step driven by an async body |
//! | [`StepFactory`] | Builds configured steps from settings |
//!
//! ## Example
//!
//! ```rust,no_run
//! use ai_chat_steps::step::{Step, StepEmitter, StreamingStep};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> ai_chat_steps::Result<()> {
//! let mut step = StreamingStep::new("echo", |input: String, out: StepEmitter<String>| async move {
//!     for word in input.split_inclusive(' ') {
//!         out.emit(word.to_string()).await?;
//!     }
//!     Ok::<_, ai_chat_steps::Error>(String::new())
//! });
//! step.run(&CancellationToken::new(), "hello streaming world".to_string())?;
//! while let Some(result) = step.output().recv().await {
//!     print!("{}", result.into_result()?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod output;
pub mod result;
pub mod streaming;

pub use output::{StepEmitter, StepOutput};
pub use result::StepResult;
pub use streaming::{StreamingStep, DEFAULT_OUTPUT_CAPACITY};

use crate::settings::ParameterMap;
use crate::Result;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    NotStarted,
    Running,
    Done,
}

/// A cancellable asynchronous task producing [`StepResult`] values.
#[async_trait::async_trait]
pub trait Step<I, O>: Send {
    fn state(&self) -> StepState;

    /// Start the task and return without waiting for it.
    ///
    /// Must be called from within a tokio runtime. If `cancel` is already
    /// cancelled the step emits a cancellation error, becomes `Done`, and this
    /// returns [`crate::Error::Cancelled`]. A step can only be started once.
    fn run(&mut self, cancel: &CancellationToken, input: I) -> Result<()>;

    /// The step's output channel; the same receiver on every call.
    fn output(&mut self) -> &mut StepOutput<O>;

    /// Join the producer task.
    async fn wait(&mut self) -> Result<()>;
}

/// Builds configured steps.
pub trait StepFactory<I, O>: Send + Sync {
    type Step: Step<I, O>;

    /// Apply flat named overrides onto the held settings.
    ///
    /// Unknown names are ignored; ill-typed values fail with a configuration error.
    fn update_from_parameters(&mut self, params: &ParameterMap) -> Result<()>;

    /// Build an unstarted step bound to a snapshot of the current settings.
    fn new_step(&self) -> Result<Self::Step>;
}
