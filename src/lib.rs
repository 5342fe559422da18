//! # ai-chat-steps
//!
//! Streaming chat steps for command-line LLM tools.
//!
//! ## Overview
//!
//! This library runs chat completions as cancellable, streaming *steps* and
//! keeps the resulting conversation as an ordered message log. Provider wire
//! protocols stay outside the crate, behind the [`chat::ChatBackend`] trait;
//! everything around them lives here: settings resolution, prompt rendering,
//! step execution and result streaming.
//!
//! ```text
//! SettingsMerger ─▶ ChatStepFactory ─▶ Step ─▶ StepResult stream ─▶ runner
//!                                                                   │
//!                                              sink (partials) ◀────┤
//!                                  ConversationManager (reply) ◀────┘
//! ```
//!
//! ## Core Philosophy
//!
//! - **Streaming-First**: partial text reaches the sink as soon as it is produced
//! - **Exactly One Terminal**: every step ends with one final value or one error
//! - **Cancellable**: every wait races a [`CancellationToken`](tokio_util::sync::CancellationToken)
//! - **Explicit Configuration**: settings are merged from layers and passed down, never looked up globally
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_chat_steps::chat::{ChatStepFactory, EchoBackend};
//! use ai_chat_steps::conversation::create_manager;
//! use ai_chat_steps::runner::run_to_context_manager;
//! use ai_chat_steps::settings::{SettingsMerger, StepSettings};
//! use ai_chat_steps::template::FieldRenderer;
//! use serde_json::json;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> ai_chat_steps::Result<()> {
//!     let merger = SettingsMerger::new(StepSettings::new())
//!         .with_config_file("chat.yaml")?
//!         .with_command_line(json!({"ai-temperature": 0.2}).as_object().cloned().unwrap());
//!     let factory = ChatStepFactory::from_merger(&merger, Arc::new(EchoBackend))?;
//!
//!     let bindings = json!({"name": "Bob"}).as_object().cloned().unwrap();
//!     let mut manager = create_manager(
//!         &FieldRenderer,
//!         "You are {{.name}}.",
//!         "Hi {{.name}}",
//!         &[],
//!         &bindings,
//!         Vec::new(),
//!     )?;
//!
//!     let reply = run_to_context_manager(&CancellationToken::new(), &factory, &mut manager).await?;
//!     println!("{}", reply.text);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`step`] | Step contract, streaming results and the generic streaming step |
//! | [`settings`] | Step settings and the layered settings merge |
//! | [`conversation`] | Messages and the conversation manager |
//! | [`template`] | Prompt rendering |
//! | [`chat`] | Provider backend seam and the chat step factory |
//! | [`runner`] | Driving steps into sinks and conversations |
//! | [`command`] | YAML command descriptions |

pub mod chat;
pub mod command;
pub mod conversation;
pub mod runner;
pub mod settings;
pub mod step;
pub mod template;

// Re-export main types for convenience
pub use chat::{ChatBackend, ChatRequest, ChatStepFactory, ProviderOptions};
pub use command::{ChatCommand, CommandDescription};
pub use conversation::{create_manager, ConversationManager, Message, MessageRole};
pub use runner::{
    deadline_token, run_into_writer, run_to_context_manager, run_to_string, ChatRunnable,
    ConversationRun, Deadline, RunState,
};
pub use settings::{ApiType, SettingsMerger, StepSettings};
pub use step::{Step, StepFactory, StepResult, StepState, StreamingStep};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
