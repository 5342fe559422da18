//! YAML-described chat commands.
//!
//! # Command Module
//!
//! A command file declares the parameters a prompt accepts and the
//! conversation to render with them:
//!
//! ```yaml
//! name: explain
//! short: Explain a concept
//! flags:
//!   - name: topic
//!     type: string
//!     required: true
//!   - name: level
//!     type: choice
//!     choices: [beginner, expert]
//!     default: beginner
//! system-prompt: You are a patient teacher.
//! prompt: Explain {{.topic}} to a {{.level}}.
//! ```
//!
//! [`ChatCommand`] binds a description to a [`ChatStepFactory`] and runs it:
//! parameter values override settings, resolve template bindings, and the
//! rendered conversation is streamed through the runner.

pub mod parameters;

pub use parameters::{ParameterDefinition, ParameterType};

use crate::chat::ChatStepFactory;
use crate::conversation::{ConversationManager, ConversationTemplate};
use crate::runner::ConversationRun;
use crate::settings::{ParameterMap, StepSettings};
use crate::step::StepFactory;
use crate::template::{Bindings, FieldRenderer, TemplateRenderer};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Helper parameter: print the rendered conversation instead of running it.
pub const PRINT_PROMPT: &str = "print-prompt";

/// Parsed command file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandDescription {
    pub name: String,
    pub short: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub long: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<ParameterDefinition>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<ParameterDefinition>,
    /// Command-local settings used as the lowest layer instead of the
    /// built-in defaults.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factories: Option<StepSettings>,
    #[serde(flatten)]
    pub conversation: ConversationTemplate,
}

impl CommandDescription {
    pub fn from_yaml<R: Read>(reader: R) -> Result<Self> {
        let description: Self = serde_yaml::from_reader(reader)?;
        description.validate()?;
        Ok(description)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        Self::from_yaml(file).map_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "cannot load command");
            e
        })
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::configuration_with_context(
                "command has no name",
                ErrorContext::new()
                    .with_field_path("name")
                    .with_source("command_description"),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for def in self.parameters() {
            if !seen.insert(def.name.as_str()) {
                return Err(Error::configuration_with_context(
                    format!("parameter '{}' is declared twice", def.name),
                    ErrorContext::new()
                        .with_field_path(def.name.clone())
                        .with_source("command_description"),
                ));
            }
            def.validate()?;
        }
        Ok(())
    }

    /// Flags followed by arguments.
    pub fn parameters(&self) -> impl Iterator<Item = &ParameterDefinition> {
        self.flags.iter().chain(self.arguments.iter())
    }

    /// Settings for the lowest layer of the merge.
    pub fn default_settings(&self) -> StepSettings {
        self.factories.clone().unwrap_or_default()
    }

    /// Bindings made of declared defaults only.
    pub fn default_bindings(&self) -> Bindings {
        self.parameters()
            .filter_map(|def| def.default.clone().map(|v| (def.name.clone(), v)))
            .collect()
    }

    /// Resolve template bindings from parameter values.
    ///
    /// Declared parameters are coerced to their type, fall back to their
    /// default, and fail when required but missing. Undeclared values are
    /// passed through unchanged so templates can reference settings too.
    pub fn resolve_bindings(&self, values: &ParameterMap) -> Result<Bindings> {
        let mut bindings: Bindings = values
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for def in self.parameters() {
            let value = match values.get(&def.name).filter(|v| !v.is_null()) {
                Some(v) => def.coerce(v)?,
                None => match &def.default {
                    Some(default) => default.clone(),
                    None if def.required => {
                        return Err(Error::configuration_with_context(
                            format!("missing required parameter '{}'", def.name),
                            ErrorContext::new()
                                .with_field_path(def.name.clone())
                                .with_source("command_parameters"),
                        ))
                    }
                    None => Value::Null,
                },
            };
            bindings.insert(def.name.clone(), value);
        }
        Ok(bindings)
    }
}

/// A command description bound to a step factory.
#[derive(Clone)]
pub struct ChatCommand {
    description: CommandDescription,
    factory: ChatStepFactory,
    renderer: Arc<dyn TemplateRenderer>,
}

impl ChatCommand {
    pub fn new(description: CommandDescription, factory: ChatStepFactory) -> Self {
        Self {
            description,
            factory,
            renderer: Arc::new(FieldRenderer),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn description(&self) -> &CommandDescription {
        &self.description
    }

    pub fn factory(&self) -> &ChatStepFactory {
        &self.factory
    }

    /// Render the conversation for `values` without running it.
    pub fn render(&self, values: &ParameterMap) -> Result<ConversationManager> {
        let bindings = self.description.resolve_bindings(values)?;
        self.description
            .conversation
            .render(self.renderer.as_ref(), &bindings, Vec::new())
    }

    /// Run the command, streaming the reply into `out`.
    ///
    /// `values` both override settings and bind the templates. With
    /// `print-prompt` set, the rendered conversation is written instead and no
    /// step is started. Returns the conversation, including the reply.
    pub async fn run<W>(
        &self,
        cancel: &CancellationToken,
        values: &ParameterMap,
        out: &mut W,
    ) -> Result<ConversationManager>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut factory = self.factory.clone();
        factory.update_from_parameters(values)?;
        let bindings = self.description.resolve_bindings(values)?;

        let mut run = ConversationRun::new(&factory, cancel.clone());
        let mut manager = run.render(
            self.renderer.as_ref(),
            &self.description.conversation,
            &bindings,
            Vec::new(),
        )?;

        if print_prompt(values) {
            out.write_all(manager.to_transcript().as_bytes()).await?;
            out.write_all(b"\n").await?;
            out.flush().await?;
            return Ok(manager);
        }

        tracing::info!(command = %self.description.name, conversation_id = %manager.id(), "running command");
        run.complete(&mut manager, &mut *out).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
        Ok(manager)
    }
}

fn print_prompt(values: &ParameterMap) -> bool {
    match values.get(PRINT_PROMPT) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.parse().unwrap_or(false),
        _ => false,
    }
}
