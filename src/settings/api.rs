//! Provider identity and per-provider endpoint credentials.

use super::parameters::{invalid, Parameters};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// The closed set of supported provider APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    #[serde(alias = "open-ai")]
    OpenAi,
    Claude,
    Ollama,
}

impl ApiType {
    pub const ALL: [ApiType; 3] = [ApiType::OpenAi, ApiType::Claude, ApiType::Ollama];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiType::OpenAi => "openai",
            ApiType::Claude => "claude",
            ApiType::Ollama => "ollama",
        }
    }

    /// Whether requests to this provider need an API key.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, ApiType::Ollama)
    }
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "open-ai" => Ok(ApiType::OpenAi),
            "claude" | "anthropic" => Ok(ApiType::Claude),
            "ollama" => Ok(ApiType::Ollama),
            other => Err(Error::configuration_with_context(
                format!("unknown api type '{}'", other),
                ErrorContext::new()
                    .with_details("expected one of: openai, claude, ollama")
                    .with_source("api_type"),
            )),
        }
    }
}

/// API keys and base URLs, keyed by provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub api_keys: HashMap<ApiType, String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub base_urls: HashMap<ApiType, String>,
}

impl ApiSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api_key(&self, api_type: ApiType) -> Option<&str> {
        self.api_keys.get(&api_type).map(String::as_str)
    }

    pub fn base_url(&self, api_type: ApiType) -> Option<&str> {
        self.base_urls.get(&api_type).map(String::as_str)
    }

    /// Reads the `<provider>-api-key` and `<provider>-base-url` parameter families.
    pub(crate) fn update_from(&mut self, params: &Parameters<'_>) -> Result<()> {
        for api_type in ApiType::ALL {
            let key_name = format!("{}-api-key", api_type);
            if let Some(key) = params.string(&key_name)? {
                self.api_keys.insert(api_type, key);
            }

            let url_name = format!("{}-base-url", api_type);
            if let Some(base_url) = params.string(&url_name)? {
                url::Url::parse(&base_url)
                    .map_err(|_| invalid(&url_name, "an absolute URL", &base_url.clone().into()))?;
                self.base_urls.insert(api_type, base_url);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_type_parsing() {
        assert_eq!("OpenAI".parse::<ApiType>().unwrap(), ApiType::OpenAi);
        assert_eq!("anthropic".parse::<ApiType>().unwrap(), ApiType::Claude);
        assert!("bard".parse::<ApiType>().is_err());
        assert_eq!(ApiType::Ollama.to_string(), "ollama");
        assert!(!ApiType::Ollama.requires_api_key());
    }

    #[test]
    fn test_api_type_serde_names() {
        let v = serde_json::to_value(ApiType::OpenAi).unwrap();
        assert_eq!(v, serde_json::json!("openai"));
        let t: ApiType = serde_yaml::from_str("claude").unwrap();
        assert_eq!(t, ApiType::Claude);
    }
}
