use super::parameters::Parameters;
use super::ApiType;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Provider-independent model parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_type: Option<ApiType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_response_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    pub stream: bool,
}

impl ChatSettings {
    pub(crate) fn update_from(&mut self, params: &Parameters<'_>) -> Result<()> {
        if let Some(api_type) = params.string("ai-api-type")? {
            self.api_type = Some(api_type.parse().map_err(|_| {
                super::parameters::invalid(
                    "ai-api-type",
                    "one of openai, claude, ollama",
                    &api_type.clone().into(),
                )
            })?);
        }
        if let Some(engine) = params.string("ai-engine")? {
            self.engine = Some(engine);
        }
        if let Some(tokens) = params.u32("ai-max-response-tokens")? {
            self.max_response_tokens = Some(tokens);
        }
        if let Some(t) = params.f64("ai-temperature")? {
            self.temperature = Some(t);
        }
        if let Some(p) = params.f64("ai-top-p")? {
            self.top_p = Some(p);
        }
        if let Some(stop) = params.string_list("ai-stop")? {
            self.stop = stop;
        }
        if let Some(stream) = params.bool("ai-stream")? {
            self.stream = stream;
        }
        Ok(())
    }
}

/// HTTP client knobs handed through to the provider backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl ClientSettings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }

    pub(crate) fn update_from(&mut self, params: &Parameters<'_>) -> Result<()> {
        if let Some(secs) = params.u64("client-timeout")? {
            self.timeout_seconds = Some(secs);
        }
        if let Some(org) = params.string("client-organization")? {
            self.organization = Some(org);
        }
        if let Some(agent) = params.string("client-user-agent")? {
            self.user_agent = Some(agent);
        }
        Ok(())
    }
}
