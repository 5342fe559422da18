//! Provider-specific settings blocks.

use super::parameters::Parameters;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub logit_bias: HashMap<String, i64>,
}

impl OpenAiSettings {
    pub(crate) fn update_from(&mut self, params: &Parameters<'_>) -> Result<()> {
        if let Some(n) = params.u32("openai-n")? {
            self.n = Some(n);
        }
        if let Some(p) = params.f64("openai-presence-penalty")? {
            self.presence_penalty = Some(p);
        }
        if let Some(p) = params.f64("openai-frequency-penalty")? {
            self.frequency_penalty = Some(p);
        }
        if let Some(bias) = params.int_map("openai-logit-bias")? {
            self.logit_bias = bias;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaudeSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl ClaudeSettings {
    pub(crate) fn update_from(&mut self, params: &Parameters<'_>) -> Result<()> {
        if let Some(k) = params.u32("claude-top-k")? {
            self.top_k = Some(k);
        }
        if let Some(user) = params.string("claude-user-id")? {
            self.user_id = Some(user);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

impl OllamaSettings {
    pub(crate) fn update_from(&mut self, params: &Parameters<'_>) -> Result<()> {
        if let Some(t) = params.f64("ollama-temperature")? {
            self.temperature = Some(t);
        }
        if let Some(seed) = params.i64("ollama-seed")? {
            self.seed = Some(seed);
        }
        if let Some(stop) = params.string("ollama-stop")? {
            self.stop = Some(stop);
        }
        if let Some(k) = params.u32("ollama-top-k")? {
            self.top_k = Some(k);
        }
        if let Some(p) = params.f64("ollama-top-p")? {
            self.top_p = Some(p);
        }
        Ok(())
    }
}
