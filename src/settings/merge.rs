//! Overlay of defaults, configuration files and command-line parameters.

use super::{ParameterMap, StepSettings};
use crate::{Error, ErrorContext, Result};
use serde_json::Value;
use std::path::Path;

/// Parameters whose values are maps themselves and must not be flattened.
const MAP_VALUED_PARAMETERS: &[&str] = &["openai-logit-bias"];

/// Resolves [`StepSettings`] from layered sources.
///
/// Layers are always applied in precedence order, regardless of the order the
/// builder methods were called in: defaults, then each file layer in the order
/// added, then the command-line layer.
#[derive(Debug, Clone, Default)]
pub struct SettingsMerger {
    defaults: StepSettings,
    files: Vec<(String, ParameterMap)>,
    command_line: ParameterMap,
}

impl SettingsMerger {
    pub fn new(defaults: StepSettings) -> Self {
        Self {
            defaults,
            files: Vec::new(),
            command_line: ParameterMap::new(),
        }
    }

    /// Add a configuration-file layer; `source` is used in logs.
    pub fn with_file_layer(mut self, source: impl Into<String>, params: ParameterMap) -> Self {
        self.files.push((source.into(), params));
        self
    }

    /// Read and add a configuration file layer from disk.
    pub fn with_config_file(self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let params = load_parameter_file(path)?;
        Ok(self.with_file_layer(path.display().to_string(), params))
    }

    /// Set the command-line layer. Later calls extend the previous one.
    pub fn with_command_line(mut self, params: ParameterMap) -> Self {
        self.command_line.extend(params);
        self
    }

    /// Produce a fresh settings object; the merger itself is left untouched.
    pub fn merge(&self) -> Result<StepSettings> {
        let mut settings = self.defaults.clone();
        for (source, params) in &self.files {
            tracing::debug!(layer = %source, parameters = params.len(), "applying settings file layer");
            settings.update_from_parameters(params).map_err(|e| {
                tracing::warn!(layer = %source, error = %e, "invalid settings file layer");
                e
            })?;
        }
        if !self.command_line.is_empty() {
            tracing::debug!(parameters = self.command_line.len(), "applying command-line settings layer");
            settings.update_from_parameters(&self.command_line)?;
        }
        Ok(settings)
    }
}

/// Read a flat YAML parameter file from disk. See [`parse_parameter_yaml`].
pub fn load_parameter_file(path: impl AsRef<Path>) -> Result<ParameterMap> {
    let text = std::fs::read_to_string(path.as_ref())?;
    parse_parameter_yaml(&text)
}

/// Parse a YAML parameter document.
///
/// The document is a mapping of parameter names to values. Mappings nested one
/// level deep are treated as sections and flattened, so both of these are
/// equivalent:
///
/// ```yaml
/// ai-engine: gpt-4
/// openai-api-key: sk-...
/// ---
/// ai-chat:
///   ai-engine: gpt-4
/// openai-chat:
///   openai-api-key: sk-...
/// ```
pub fn parse_parameter_yaml(text: &str) -> Result<ParameterMap> {
    let doc: serde_yaml::Value = serde_yaml::from_str(text)?;
    let value = serde_json::to_value(doc)?;
    let top = match value {
        Value::Null => return Ok(ParameterMap::new()),
        Value::Object(map) => map,
        other => {
            return Err(Error::configuration_with_context(
                "settings file must be a mapping of parameter names to values",
                ErrorContext::new()
                    .with_details(format!("got {}", other))
                    .with_source("settings_file"),
            ))
        }
    };

    let mut flat = ParameterMap::new();
    for (name, value) in top {
        match value {
            Value::Object(section) if !MAP_VALUED_PARAMETERS.contains(&name.as_str()) => {
                flat.extend(section);
            }
            other => {
                flat.insert(name, other);
            }
        }
    }
    Ok(flat)
}
