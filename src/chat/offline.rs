//! Backends that never leave the process.

use super::{ChatBackend, ChatRequest};
use crate::conversation::MessageRole;
use crate::step::StepEmitter;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// Streams the last user message back, one word at a time.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoBackend;

#[async_trait]
impl ChatBackend for EchoBackend {
    fn name(&self) -> &str {
        "echo"
    }

    async fn stream_chat(&self, request: ChatRequest, emitter: StepEmitter<String>) -> Result<String> {
        let text = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.text.clone())
            .unwrap_or_default();
        if !request.stream {
            return Ok(text);
        }

        let mut words: Vec<&str> = text.split_inclusive(' ').collect();
        let last = words.pop().unwrap_or_default().to_string();
        for word in words {
            emitter.emit(word.to_string()).await?;
        }
        Ok(last)
    }
}

/// Replays a fixed script of deltas, recording every request it receives.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    chunks: Vec<String>,
    final_text: String,
    failure: Option<String>,
    delay: Option<Duration>,
    hang: bool,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    pub fn new<S: Into<String>>(chunks: impl IntoIterator<Item = S>) -> Self {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Text returned as the final value after the deltas.
    pub fn with_final(mut self, text: impl Into<String>) -> Self {
        self.final_text = text.into();
        self
    }

    /// Fail with a step error after emitting the deltas.
    pub fn failing_with(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Sleep before each delta.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Never finish after the deltas; only cancellation ends the step.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream_chat(&self, request: ChatRequest, emitter: StepEmitter<String>) -> Result<String> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request);

        for chunk in &self.chunks {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            emitter.emit(chunk.clone()).await?;
        }
        if self.hang {
            emitter.cancelled().await;
            return Err(Error::Cancelled);
        }
        match &self.failure {
            Some(message) => Err(Error::step_with_context(
                message.clone(),
                ErrorContext::new().with_source(self.name()),
            )),
            None => Ok(self.final_text.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatStepFactory;
    use crate::conversation::Message;
    use crate::settings::StepSettings;
    use crate::step::{Step, StepFactory, StepResult};
    use serde_json::json;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    async fn collect(backend: Arc<dyn ChatBackend>, stream: bool) -> Vec<StepResult<String>> {
        let mut settings = StepSettings::new();
        settings
            .update_from_parameters(
                json!({"ai-api-type": "ollama", "ai-engine": "llama3", "ai-stream": stream})
                    .as_object()
                    .unwrap(),
            )
            .unwrap();
        let mut step = ChatStepFactory::new(settings, backend).new_step().unwrap();
        step.run(
            &CancellationToken::new(),
            vec![Message::system("sys"), Message::user("hello there world")],
        )
        .unwrap();
        let mut out = Vec::new();
        while let Some(r) = step.output().recv().await {
            out.push(r);
        }
        out
    }

    #[tokio::test]
    async fn test_echo_streams_words() {
        let results = collect(Arc::new(EchoBackend), true).await;
        let values: Vec<_> = results.iter().filter_map(|r| r.value().cloned()).collect();
        assert_eq!(values, vec!["hello ", "there ", "world"]);
        assert!(results.last().unwrap().is_final());
    }

    #[tokio::test]
    async fn test_echo_without_streaming_is_single_final() {
        let results = collect(Arc::new(EchoBackend), false).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].value().map(String::as_str), Some("hello there world"));
    }

    #[tokio::test]
    async fn test_scripted_failure_after_deltas() {
        let backend = Arc::new(ScriptedBackend::new(["a"]).failing_with("rate limited"));
        let results = collect(backend, true).await;
        assert!(results[0].is_partial());
        match &results[1] {
            StepResult::Error(Error::Step { message, .. }) => assert_eq!(message, "rate limited"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
