use super::{ApiKey, ChatBackend, ChatRequest, ProviderOptions};
use crate::conversation::{ConversationManager, Message};
use crate::runner::ChatRunnable;
use crate::settings::{ApiType, Metadata, ParameterMap, SettingsMerger, StepSettings};
use crate::step::{Step, StepEmitter, StepFactory, StreamingStep};
use crate::{Error, ErrorContext, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Provider used when no `ai-api-type` was configured.
pub const DEFAULT_API_TYPE: ApiType = ApiType::OpenAi;

/// Builds chat steps from settings and a provider backend.
///
/// Every step gets its own snapshot of the settings, so later parameter
/// updates on the factory never reach a step that was already built.
#[derive(Debug, Clone)]
pub struct ChatStepFactory {
    settings: StepSettings,
    backend: Arc<dyn ChatBackend>,
}

impl ChatStepFactory {
    pub fn new(settings: StepSettings, backend: Arc<dyn ChatBackend>) -> Self {
        Self { settings, backend }
    }

    /// Merge the layers and build a factory from the result.
    pub fn from_merger(merger: &SettingsMerger, backend: Arc<dyn ChatBackend>) -> Result<Self> {
        Ok(Self::new(merger.merge()?, backend))
    }

    pub fn settings(&self) -> &StepSettings {
        &self.settings
    }

    /// Validate the settings and resolve them into a request without messages.
    pub fn resolve_request(&self) -> Result<ChatRequest> {
        let settings = &self.settings;
        let api_type = settings.chat.api_type.unwrap_or(DEFAULT_API_TYPE);

        let api_key = settings.api.api_key(api_type).filter(|k| !k.is_empty());
        if api_type.requires_api_key() && api_key.is_none() {
            let param = format!("{}-api-key", api_type);
            tracing::warn!(api_type = %api_type, "missing api key");
            return Err(Error::configuration_with_context(
                format!("no API key configured for {}", api_type),
                ErrorContext::new()
                    .with_field_path(param)
                    .with_source("chat_step_factory"),
            ));
        }

        let engine = settings
            .chat
            .engine
            .clone()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                tracing::warn!(api_type = %api_type, "missing engine");
                Error::configuration_with_context(
                    "no engine configured",
                    ErrorContext::new()
                        .with_field_path("ai-engine")
                        .with_source("chat_step_factory"),
                )
            })?;

        let provider = match api_type {
            ApiType::OpenAi => ProviderOptions::OpenAi(settings.openai.clone()),
            ApiType::Claude => ProviderOptions::Claude(settings.claude.clone()),
            ApiType::Ollama => ProviderOptions::Ollama(settings.ollama.clone()),
        };

        Ok(ChatRequest {
            api_type,
            api_key: api_key.map(ApiKey::new),
            base_url: settings.api.base_url(api_type).map(str::to_string),
            engine,
            messages: Vec::new(),
            max_response_tokens: settings.chat.max_response_tokens,
            temperature: settings.chat.temperature,
            top_p: settings.chat.top_p,
            stop: settings.chat.stop.clone(),
            stream: settings.chat.stream,
            client: settings.client.clone(),
            provider,
        })
    }
}

impl StepFactory<Vec<Message>, String> for ChatStepFactory {
    type Step = StreamingStep<Vec<Message>, String>;

    fn update_from_parameters(&mut self, params: &ParameterMap) -> Result<()> {
        self.settings.update_from_parameters(params)
    }

    fn new_step(&self) -> Result<Self::Step> {
        let request = self.resolve_request()?;
        let backend = Arc::clone(&self.backend);
        let name = format!("{}-chat", request.api_type);
        tracing::debug!(
            step = %name,
            backend = backend.name(),
            engine = %request.engine,
            stream = request.stream,
            "chat step created"
        );

        Ok(StreamingStep::new(name, move |messages: Vec<Message>, emitter: StepEmitter<String>| async move {
            let mut request = request;
            request.messages = messages;
            backend.stream_chat(request, emitter).await
        }))
    }
}

impl ChatRunnable for ChatStepFactory {
    fn run_with_manager(
        &self,
        cancel: &CancellationToken,
        manager: &ConversationManager,
    ) -> Result<Box<dyn Step<Vec<Message>, String>>> {
        let mut step = self.new_step()?;
        step.run(cancel, manager.messages().to_vec())?;
        Ok(Box::new(step))
    }

    fn metadata(&self) -> Metadata {
        self.settings.get_metadata()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ScriptedBackend;
    use crate::step::StepResult;
    use serde_json::json;

    fn settings(v: serde_json::Value) -> StepSettings {
        let mut s = StepSettings::new();
        s.update_from_parameters(v.as_object().unwrap()).unwrap();
        s
    }

    fn factory(v: serde_json::Value) -> ChatStepFactory {
        ChatStepFactory::new(settings(v), Arc::new(ScriptedBackend::new(["a", "b"])))
    }

    #[test]
    fn test_missing_api_key_is_configuration_error() {
        let f = factory(json!({"ai-engine": "gpt-4"}));
        let err = f.new_step().unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert_eq!(
            err.context().unwrap().field_path.as_deref(),
            Some("openai-api-key")
        );
    }

    #[test]
    fn test_missing_engine_is_configuration_error() {
        let f = factory(json!({"ai-api-type": "claude", "claude-api-key": "sk"}));
        let err = f.new_step().unwrap_err();
        assert_eq!(err.context().unwrap().field_path.as_deref(), Some("ai-engine"));
    }

    #[test]
    fn test_ollama_needs_no_key_and_selects_its_block() {
        let f = factory(json!({
            "ai-api-type": "ollama",
            "ai-engine": "llama3",
            "ollama-top-k": 20,
            "ollama-base-url": "http://localhost:11434",
        }));
        let req = f.resolve_request().unwrap();
        assert_eq!(req.api_key, None);
        assert_eq!(req.base_url.as_deref(), Some("http://localhost:11434"));
        match req.provider {
            ProviderOptions::Ollama(o) => assert_eq!(o.top_k, Some(20)),
            other => panic!("unexpected provider {:?}", other),
        }
    }

    #[test]
    fn test_api_key_is_redacted_in_debug() {
        let f = factory(json!({"ai-engine": "gpt-4", "openai-api-key": "sk-secret"}));
        let req = f.resolve_request().unwrap();
        assert!(!format!("{:?}", req).contains("sk-secret"));
        assert_eq!(req.api_key.unwrap().expose(), "sk-secret");
    }

    #[tokio::test]
    async fn test_step_snapshot_ignores_later_updates() {
        let backend = Arc::new(ScriptedBackend::new(["x"]));
        let mut f = ChatStepFactory::new(
            settings(json!({"ai-engine": "gpt-4", "openai-api-key": "sk"})),
            backend.clone(),
        );
        let mut step = f.new_step().unwrap();
        f.update_from_parameters(json!({"ai-engine": "gpt-4o"}).as_object().unwrap())
            .unwrap();

        step.run(&CancellationToken::new(), vec![Message::user("hi")])
            .unwrap();
        while let Some(r) = step.output().recv().await {
            if let StepResult::Error(e) = r {
                panic!("unexpected error {}", e);
            }
        }
        let seen = backend.requests();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].engine, "gpt-4");
        assert_eq!(seen[0].messages[0].text, "hi");
        assert_eq!(f.settings().chat.engine.as_deref(), Some("gpt-4o"));
    }
}
