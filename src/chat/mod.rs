//! Chat steps: provider backends behind a single streaming contract.
//!
//! # Chat Module
//!
//! The wire protocol of each provider lives behind [`ChatBackend`]. A backend
//! receives a fully resolved [`ChatRequest`] and a [`StepEmitter`] for the text
//! deltas it decodes; the text it returns is the step's final value.
//!
//! [`ChatStepFactory`] turns merged [`StepSettings`](crate::settings::StepSettings)
//! into started steps, resolving the provider once at construction time so
//! that missing keys or engines fail before any request is made.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ChatBackend`] | Provider streaming client seam |
//! | [`ChatRequest`] | Resolved request handed to a backend |
//! | [`ProviderOptions`] | The selected provider's settings block |
//! | [`ChatStepFactory`] | Settings + backend → chat steps |
//! | [`EchoBackend`], [`ScriptedBackend`] | Offline backends for dry runs and tests |

pub mod factory;
pub mod offline;

pub use factory::ChatStepFactory;
pub use offline::{EchoBackend, ScriptedBackend};

use crate::conversation::Message;
use crate::settings::{ApiType, ClaudeSettings, ClientSettings, OllamaSettings, OpenAiSettings};
use crate::step::StepEmitter;
use crate::Result;
use async_trait::async_trait;
use std::fmt;

/// Streaming client for one or more providers.
///
/// Implementations emit text deltas through `emitter` as they arrive and
/// return the remaining text, which becomes the `Final` result; concatenating
/// the deltas and the returned text yields the full reply. When
/// `request.stream` is false the whole reply may simply be returned.
///
/// Provider failures are reported as `Err`, usually [`crate::Error::Step`].
/// `emit` fails once the step is cancelled; propagate that error with `?`.
#[async_trait]
pub trait ChatBackend: Send + Sync + fmt::Debug {
    /// Identifier used in logs.
    fn name(&self) -> &str;

    async fn stream_chat(&self, request: ChatRequest, emitter: StepEmitter<String>) -> Result<String>;
}

/// Secret that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Settings block of the provider a request targets.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOptions {
    OpenAi(OpenAiSettings),
    Claude(ClaudeSettings),
    Ollama(OllamaSettings),
}

impl ProviderOptions {
    pub fn api_type(&self) -> ApiType {
        match self {
            ProviderOptions::OpenAi(_) => ApiType::OpenAi,
            ProviderOptions::Claude(_) => ApiType::Claude,
            ProviderOptions::Ollama(_) => ApiType::Ollama,
        }
    }
}

/// Everything a backend needs for one chat completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub api_type: ApiType,
    /// `None` for providers that do not authenticate.
    pub api_key: Option<ApiKey>,
    pub base_url: Option<String>,
    pub engine: String,
    pub messages: Vec<Message>,
    pub max_response_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub stop: Vec<String>,
    pub stream: bool,
    pub client: ClientSettings,
    pub provider: ProviderOptions,
}
