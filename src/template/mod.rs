//! Template rendering seam for prompts and messages.
//!
//! The conversation layer never interprets template syntax itself; it hands the
//! template text and a flat set of bindings to a [`TemplateRenderer`]. The crate
//! ships [`FieldRenderer`], which understands field references of the form
//! `{{.name}}` or `{{ .user.name }}` (with optional `{{-`/`-}}` whitespace trim
//! markers). Richer template languages plug in by implementing the trait.
//!
//! ```rust
//! use ai_chat_steps::template::{FieldRenderer, TemplateRenderer};
//!
//! let mut bindings = serde_json::Map::new();
//! bindings.insert("name".into(), "Bob".into());
//! let out = FieldRenderer.render("prompt", "Hi {{.name}}", &bindings).unwrap();
//! assert_eq!(out, "Hi Bob");
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

/// Flat name→value mapping used when rendering templates.
pub type Bindings = serde_json::Map<String, Value>;

static FIELD_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\.([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)$")
        .expect("field path pattern is valid")
});

/// Template rendering errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("template '{template}' failed to parse: {reason}")]
    Parse { template: String, reason: String },

    #[error("template '{template}' references unknown field '{reference}'")]
    UnresolvedReference { template: String, reference: String },
}

/// Renders template text against bindings.
pub trait TemplateRenderer: Send + Sync {
    /// `name` identifies the template in error messages (e.g. "system-prompt").
    fn render(&self, name: &str, template: &str, bindings: &Bindings)
        -> Result<String, RenderError>;
}

/// Default renderer: substitutes `{{.field}}` references, failing on any other action.
///
/// Text outside actions is copied verbatim, including a lone `}}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldRenderer;

impl TemplateRenderer for FieldRenderer {
    fn render(
        &self,
        name: &str,
        template: &str,
        bindings: &Bindings,
    ) -> Result<String, RenderError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after_open = &rest[start + 2..];
            let end = after_open.find("}}").ok_or_else(|| RenderError::Parse {
                template: name.to_string(),
                reason: "unclosed action".to_string(),
            })?;

            let mut action = &after_open[..end];
            if let Some(stripped) = action.strip_prefix('-') {
                action = stripped;
                let trimmed = out.trim_end().len();
                out.truncate(trimmed);
            }
            let trim_after = match action.strip_suffix('-') {
                Some(stripped) => {
                    action = stripped;
                    true
                }
                None => false,
            };

            let action = action.trim();
            let caps = FIELD_PATH.captures(action).ok_or_else(|| RenderError::Parse {
                template: name.to_string(),
                reason: format!("unsupported action '{{{{{}}}}}'", action),
            })?;
            let value = lookup(bindings, &caps[1]).ok_or_else(|| {
                RenderError::UnresolvedReference {
                    template: name.to_string(),
                    reference: caps[1].to_string(),
                }
            })?;
            write_value(&mut out, value);

            rest = &after_open[end + 2..];
            if trim_after {
                rest = rest.trim_start();
            }
        }

        out.push_str(rest);
        Ok(out)
    }
}

fn lookup<'a>(bindings: &'a Bindings, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = bindings.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push_str(s),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        other => out.push_str(&other.to_string()),
    }
}

/// Convert any serializable struct into flat bindings (top-level fields become names).
pub fn bindings_from<T: Serialize>(params: &T) -> crate::Result<Bindings> {
    match serde_json::to_value(params)? {
        Value::Object(map) => Ok(map),
        other => Err(crate::Error::configuration_with_context(
            "template parameters must serialize to an object",
            crate::ErrorContext::new()
                .with_details(format!("got {}", other))
                .with_source("template_bindings"),
        )),
    }
}
