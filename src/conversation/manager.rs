use super::{Message, MessageRole};
use crate::template::{Bindings, TemplateRenderer};
use crate::Result;
use chrono::Utc;
use uuid::Uuid;

/// Ordered, append-only log of conversation messages.
///
/// Insertion order is the prompt history sent to providers and is never
/// changed. The manager has a single writer; readers either wait for the
/// owning run to finish or read between appends on the same task.
#[derive(Debug, Clone)]
pub struct ConversationManager {
    id: Uuid,
    messages: Vec<Message>,
}

impl ConversationManager {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    pub fn with_id(id: Uuid) -> Self {
        Self {
            id,
            messages: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: Uuid) {
        self.id = id;
    }

    /// Append messages in the given order, stamping any without a time.
    pub fn add_messages(&mut self, messages: impl IntoIterator<Item = Message>) {
        for mut message in messages {
            if message.time.is_none() {
                message.time = Some(Utc::now());
            }
            self.messages.push(message);
        }
    }

    pub fn add_message(&mut self, message: Message) {
        self.add_messages(std::iter::once(message));
    }

    /// Render `template` and append it with `role`.
    ///
    /// A render failure leaves the manager untouched.
    pub fn render_and_add(
        &mut self,
        renderer: &dyn TemplateRenderer,
        template: &str,
        role: MessageRole,
        bindings: &Bindings,
    ) -> Result<&Message> {
        let text = renderer.render(role.as_str(), template, bindings)?;
        let index = self.messages.len();
        self.add_message(Message::new(role, text));
        Ok(&self.messages[index])
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Human-readable dump of the conversation, one block per message.
    pub fn to_transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("[{}]: {}", m.role, m.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl Default for ConversationManager {
    fn default() -> Self {
        Self::new()
    }
}
