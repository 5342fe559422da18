//! Layered step settings.
//!
//! # Settings Module
//!
//! [`StepSettings`] aggregates everything a chat step needs to know about the
//! provider it talks to. Settings are resolved by overlaying layers, lowest
//! precedence first:
//!
//! ```text
//! compiled-in defaults → configuration file → command-line parameters
//! ```
//!
//! Each layer is a flat `name → value` [`ParameterMap`]; a layer that leaves a
//! name absent (or `null`) keeps the value of the layer below. See
//! [`SettingsMerger`].
//!
//! Every settings type owns its data outright, so `clone()` is a deep copy:
//! one base settings object can be reused as the template for many
//! per-invocation overrides without aliasing.
//!
//! ## Parameter names
//!
//! | Block | Parameters |
//! |-------|------------|
//! | chat | `ai-api-type`, `ai-engine`, `ai-max-response-tokens`, `ai-temperature`, `ai-top-p`, `ai-stop`, `ai-stream` |
//! | client | `client-timeout`, `client-organization`, `client-user-agent` |
//! | api | `<provider>-api-key`, `<provider>-base-url` |
//! | openai | `openai-n`, `openai-presence-penalty`, `openai-frequency-penalty`, `openai-logit-bias` |
//! | claude | `claude-top-k`, `claude-user-id` |
//! | ollama | `ollama-temperature`, `ollama-seed`, `ollama-stop`, `ollama-top-k`, `ollama-top-p` |

pub mod api;
pub mod chat;
pub mod merge;
pub mod parameters;
pub mod providers;

pub use api::{ApiSettings, ApiType};
pub use chat::{ChatSettings, ClientSettings};
pub use merge::{load_parameter_file, parse_parameter_yaml, SettingsMerger};
pub use parameters::ParameterMap;
pub use providers::{ClaudeSettings, OllamaSettings, OpenAiSettings};

use crate::Result;
use parameters::Parameters;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::Read;

/// Flat name→value provenance attached to responses.
pub type Metadata = serde_json::Map<String, Value>;

/// Aggregate configuration for constructing steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepSettings {
    pub api: ApiSettings,
    pub chat: ChatSettings,
    pub client: ClientSettings,
    pub openai: OpenAiSettings,
    pub claude: ClaudeSettings,
    pub ollama: OllamaSettings,
}

#[derive(Deserialize)]
struct SettingsFile {
    #[serde(default)]
    factories: StepSettings,
}

impl StepSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load nested settings stored under a top-level `factories:` key.
    ///
    /// Fields missing from the document keep their defaults.
    pub fn from_yaml<R: Read>(reader: R) -> Result<Self> {
        let file: SettingsFile = serde_yaml::from_reader(reader)?;
        Ok(file.factories)
    }

    /// Overlay a flat parameter layer onto these settings.
    ///
    /// Either every value in `params` is applied or, on the first ill-typed
    /// value, nothing is.
    pub fn update_from_parameters(&mut self, params: &ParameterMap) -> Result<()> {
        let params = Parameters::new(params);
        let mut next = self.clone();
        next.api.update_from(&params)?;
        next.chat.update_from(&params)?;
        next.client.update_from(&params)?;
        next.openai.update_from(&params)?;
        next.claude.update_from(&params)?;
        next.ollama.update_from(&params)?;
        *self = next;
        Ok(())
    }

    /// Export the settings that differ from their documented defaults.
    ///
    /// Each field is suppressed against its own provider default (top-p 1,
    /// penalties 0, ollama top-k 40, ...), keeping the payload minimal.
    /// The client timeout is reported once, as `timeout_second`; there is no
    /// separate duration-string `timeout` key.
    pub fn get_metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();

        let chat = &self.chat;
        if let Some(engine) = &chat.engine {
            metadata.insert("ai-engine".into(), json!(engine));
        }
        if let Some(api_type) = chat.api_type {
            metadata.insert("ai-api-type".into(), json!(api_type));
            if let Some(base_url) = self.api.base_url(api_type) {
                metadata.insert("ai-base-url".into(), json!(base_url));
            }
        }
        if let Some(tokens) = chat.max_response_tokens {
            metadata.insert("ai-max-response-tokens".into(), json!(tokens));
        }
        if let Some(top_p) = chat.top_p.filter(|p| *p != 1.0) {
            metadata.insert("ai-top-p".into(), json!(top_p));
        }
        if let Some(t) = chat.temperature {
            metadata.insert("ai-temperature".into(), json!(t));
        }
        if !chat.stop.is_empty() {
            metadata.insert("ai-stop".into(), json!(chat.stop));
        }
        metadata.insert("ai-stream".into(), json!(chat.stream));

        let openai = &self.openai;
        if let Some(n) = openai.n.filter(|n| *n != 1) {
            metadata.insert("openai-n".into(), json!(n));
        }
        if let Some(p) = openai.presence_penalty.filter(|p| *p != 0.0) {
            metadata.insert("openai-presence-penalty".into(), json!(p));
        }
        if let Some(p) = openai.frequency_penalty.filter(|p| *p != 0.0) {
            metadata.insert("openai-frequency-penalty".into(), json!(p));
        }
        if !openai.logit_bias.is_empty() {
            metadata.insert("openai-logit-bias".into(), json!(openai.logit_bias));
        }

        let client = &self.client;
        if let Some(secs) = client.timeout_seconds {
            metadata.insert("timeout_second".into(), json!(secs));
        }
        if let Some(org) = client.organization.as_ref().filter(|o| !o.is_empty()) {
            metadata.insert("organization".into(), json!(org));
        }
        if let Some(agent) = &client.user_agent {
            metadata.insert("user-agent".into(), json!(agent));
        }

        let claude = &self.claude;
        if let Some(k) = claude.top_k.filter(|k| *k != 1) {
            metadata.insert("claude-top-k".into(), json!(k));
        }
        if let Some(user) = claude.user_id.as_ref().filter(|u| !u.is_empty()) {
            metadata.insert("claude-user-id".into(), json!(user));
        }

        let ollama = &self.ollama;
        if let Some(t) = ollama.temperature.filter(|t| *t != 0.0) {
            metadata.insert("ollama-temperature".into(), json!(t));
        }
        if let Some(seed) = ollama.seed.filter(|s| *s != 0) {
            metadata.insert("ollama-seed".into(), json!(seed));
        }
        if let Some(stop) = ollama.stop.as_ref().filter(|s| !s.is_empty()) {
            metadata.insert("ollama-stop".into(), json!(stop));
        }
        if let Some(k) = ollama.top_k.filter(|k| *k != 40) {
            metadata.insert("ollama-top-k".into(), json!(k));
        }
        if let Some(p) = ollama.top_p.filter(|p| *p != 0.9) {
            metadata.insert("ollama-top-p".into(), json!(p));
        }

        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(v: Value) -> ParameterMap {
        v.as_object().cloned().unwrap()
    }

    fn configured() -> StepSettings {
        let mut s = StepSettings::new();
        s.update_from_parameters(&params(json!({
            "ai-api-type": "openai",
            "ai-engine": "gpt-4",
            "ai-max-response-tokens": 512,
            "ai-temperature": 0.7,
            "ai-stop": ["\n\n"],
            "openai-api-key": "sk-test",
            "openai-base-url": "https://api.openai.com/v1",
            "openai-logit-bias": {"50256": -100},
            "claude-user-id": "u-1",
            "ollama-stop": "###",
        })))
        .unwrap();
        s
    }

    #[test]
    fn test_temperature_only_update_keeps_other_fields() {
        let mut s = configured();
        s.update_from_parameters(&params(json!({"ai-temperature": 0.2})))
            .unwrap();
        assert_eq!(s.chat.temperature, Some(0.2));
        assert_eq!(s.chat.engine.as_deref(), Some("gpt-4"));
        assert_eq!(s.chat.max_response_tokens, Some(512));
        assert_eq!(s.api.api_key(ApiType::OpenAi), Some("sk-test"));
    }

    #[test]
    fn test_unknown_parameters_are_ignored() {
        let mut s = configured();
        let before = s.clone();
        s.update_from_parameters(&params(json!({"print-prompt": true, "foo": [1, 2]})))
            .unwrap();
        assert_eq!(s, before);
    }

    #[test]
    fn test_invalid_update_is_atomic() {
        let mut s = configured();
        let before = s.clone();
        let err = s
            .update_from_parameters(&params(json!({
                "ai-engine": "gpt-4o",
                "ollama-top-k": "many",
            })))
            .unwrap_err();
        assert_eq!(
            err.context().unwrap().field_path.as_deref(),
            Some("ollama-top-k")
        );
        assert_eq!(s, before);
    }

    #[test]
    fn test_invalid_base_url_and_api_type() {
        let mut s = StepSettings::new();
        assert!(s
            .update_from_parameters(&params(json!({"claude-base-url": "not a url"})))
            .is_err());
        assert!(s
            .update_from_parameters(&params(json!({"ai-api-type": "bard"})))
            .is_err());
    }

    #[test]
    fn test_clone_is_deep_for_every_block() {
        let original = configured();
        let mut copy = original.clone();

        copy.api.api_keys.insert(ApiType::Claude, "other".into());
        copy.api.base_urls.clear();
        copy.chat.engine = Some("changed".into());
        copy.chat.stop.push("STOP".into());
        copy.chat.stream = true;
        copy.client.organization = Some("org".into());
        copy.openai.logit_bias.insert("1".into(), 5);
        copy.openai.n = Some(3);
        copy.claude.user_id = Some("u-2".into());
        copy.ollama.stop = Some("!!!".into());

        assert_eq!(original, configured());
        assert_ne!(original, copy);
    }

    #[test]
    fn test_metadata_default_suppression() {
        let mut s = StepSettings::new();
        s.chat.top_p = Some(1.0);
        s.claude.top_k = Some(1);
        s.openai.n = Some(1);
        s.openai.presence_penalty = Some(0.0);
        s.ollama.top_k = Some(40);
        s.ollama.top_p = Some(0.9);
        s.ollama.temperature = Some(0.0);
        s.ollama.seed = Some(0);
        let m = s.get_metadata();
        for key in [
            "ai-top-p",
            "claude-top-k",
            "openai-n",
            "openai-presence-penalty",
            "ollama-top-k",
            "ollama-top-p",
            "ollama-temperature",
            "ollama-seed",
        ] {
            assert!(!m.contains_key(key), "{} should be suppressed", key);
        }
        assert_eq!(m.get("ai-stream"), Some(&json!(false)));

        s.chat.top_p = Some(0.5);
        s.claude.top_k = Some(5);
        s.ollama.top_k = Some(20);
        let m = s.get_metadata();
        assert_eq!(m.get("ai-top-p"), Some(&json!(0.5)));
        assert_eq!(m.get("claude-top-k"), Some(&json!(5)));
        assert_eq!(m.get("ollama-top-k"), Some(&json!(20)));
    }

    #[test]
    fn test_metadata_includes_selected_base_url() {
        let m = configured().get_metadata();
        assert_eq!(m.get("ai-engine"), Some(&json!("gpt-4")));
        assert_eq!(m.get("ai-api-type"), Some(&json!("openai")));
        assert_eq!(m.get("ai-base-url"), Some(&json!("https://api.openai.com/v1")));
        assert_eq!(m.get("ai-stop"), Some(&json!(["\n\n"])));
        assert_eq!(m.get("claude-user-id"), Some(&json!("u-1")));
        assert_eq!(m.get("ollama-stop"), Some(&json!("###")));
        assert!(m.contains_key("openai-logit-bias"));
        assert!(!m.contains_key("openai-api-key"));
    }

    #[test]
    fn test_from_yaml_nested_document() {
        let doc = r#"
factories:
  api:
    api_keys:
      claude: sk-ant
  chat:
    api_type: claude
    engine: claude-3-opus
    stream: true
  claude:
    top_k: 3
"#;
        let s = StepSettings::from_yaml(doc.as_bytes()).unwrap();
        assert_eq!(s.chat.api_type, Some(ApiType::Claude));
        assert_eq!(s.chat.engine.as_deref(), Some("claude-3-opus"));
        assert!(s.chat.stream);
        assert_eq!(s.api.api_key(ApiType::Claude), Some("sk-ant"));
        assert_eq!(s.claude.top_k, Some(3));
        assert_eq!(s.ollama, OllamaSettings::default());
    }
}
