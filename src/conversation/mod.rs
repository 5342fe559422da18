//! Conversation history.
//!
//! # Conversation Module
//!
//! A [`ConversationManager`] is the ordered record of what was said to and by
//! a model. It is filled in three stages when a command runs:
//!
//! 1. the rendered system prompt,
//! 2. the command's historical messages, each rendered against the same
//!    bindings and keeping any explicit timestamp,
//! 3. the rendered user prompt.
//!
//! After the step completes, the runner appends the assistant reply.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Message`] | Role-tagged text with id, timestamp and metadata |
//! | [`ConversationManager`] | Append-only message log |
//! | [`ConversationTemplate`] | Unrendered system prompt, messages and prompt |
//! | [`create_manager`] | Renders a template into a fresh manager |
//!
//! ## Example
//!
//! ```rust
//! use ai_chat_steps::conversation::{create_manager, MessageRole};
//! use ai_chat_steps::template::FieldRenderer;
//! use serde_json::json;
//!
//! let bindings = json!({"name": "Bob"}).as_object().cloned().unwrap();
//! let manager = create_manager(
//!     &FieldRenderer,
//!     "You are {{.name}}.",
//!     "Hi {{.name}}",
//!     &[],
//!     &bindings,
//!     Vec::new(),
//! )?;
//! assert_eq!(manager.messages()[0].text, "You are Bob.");
//! assert_eq!(manager.last_message().unwrap().role, MessageRole::User);
//! # Ok::<(), ai_chat_steps::Error>(())
//! ```

pub mod manager;
pub mod message;

pub use manager::ConversationManager;
pub use message::{Message, MessageRole};

use crate::template::{Bindings, TemplateRenderer};
use crate::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Adjustments applied to a freshly built manager.
#[derive(Debug, Clone)]
pub enum ManagerOption {
    /// Use a fixed conversation id instead of a random one.
    ConversationId(Uuid),
    /// Append already-rendered messages after the prompt.
    AppendMessages(Vec<Message>),
}

impl ManagerOption {
    fn apply(self, manager: &mut ConversationManager) {
        match self {
            ManagerOption::ConversationId(id) => manager.set_id(id),
            ManagerOption::AppendMessages(messages) => manager.add_messages(messages),
        }
    }
}

/// Build a manager from unrendered templates.
///
/// Empty `system_prompt` or `prompt` templates are skipped. Each historical
/// message keeps its role and timestamp; only its text is rendered. The first
/// render failure aborts construction and no manager is returned.
pub fn create_manager(
    renderer: &dyn TemplateRenderer,
    system_prompt: &str,
    prompt: &str,
    messages: &[Message],
    bindings: &Bindings,
    options: Vec<ManagerOption>,
) -> Result<ConversationManager> {
    let mut manager = ConversationManager::new();

    if !system_prompt.is_empty() {
        let text = renderer.render("system-prompt", system_prompt, bindings)?;
        manager.add_message(Message::system(text));
    }

    for message in messages {
        let text = renderer.render("message", &message.text, bindings)?;
        let mut rendered = Message::new(message.role, text).with_metadata(message.metadata.clone());
        rendered.time = message.time;
        manager.add_message(rendered);
    }

    if !prompt.is_empty() {
        let text = renderer.render("prompt", prompt, bindings)?;
        manager.add_message(Message::user(text));
    }

    for option in options {
        option.apply(&mut manager);
    }

    tracing::debug!(
        conversation_id = %manager.id(),
        messages = manager.len(),
        "conversation created"
    );
    Ok(manager)
}

/// The conversation part of a command description, before rendering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationTemplate {
    #[serde(rename = "system-prompt", alias = "system_prompt")]
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub prompt: String,
}

impl ConversationTemplate {
    /// Render into a new manager. See [`create_manager`].
    pub fn render(
        &self,
        renderer: &dyn TemplateRenderer,
        bindings: &Bindings,
        options: Vec<ManagerOption>,
    ) -> Result<ConversationManager> {
        create_manager(
            renderer,
            &self.system_prompt,
            &self.prompt,
            &self.messages,
            bindings,
            options,
        )
    }
}
