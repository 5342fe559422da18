//! Declared command parameters.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterType {
    #[default]
    String,
    Int,
    Float,
    Bool,
    StringList,
    Choice,
}

impl ParameterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterType::String => "string",
            ParameterType::Int => "int",
            ParameterType::Float => "float",
            ParameterType::Bool => "bool",
            ParameterType::StringList => "stringList",
            ParameterType::Choice => "choice",
        }
    }
}

/// A flag or positional argument of a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ParameterType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub help: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl ParameterDefinition {
    pub fn new(name: impl Into<String>, kind: ParameterType) -> Self {
        Self {
            name: name.into(),
            kind,
            help: String::new(),
            default: None,
            required: false,
            choices: Vec::new(),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.kind == ParameterType::Choice && self.choices.is_empty() {
            return Err(self.error("choice parameter declares no choices", None));
        }
        if let Some(default) = &self.default {
            self.coerce(default)?;
        }
        Ok(())
    }

    /// Convert `value` to this parameter's type.
    ///
    /// Strings, as they come from the command line, are parsed; a string list
    /// also accepts a single comma-separated string.
    pub fn coerce(&self, value: &Value) -> Result<Value> {
        let coerced = match (self.kind, value) {
            (ParameterType::String, Value::String(_)) => Some(value.clone()),
            (ParameterType::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (ParameterType::Int, Value::Number(n)) => n.as_i64().map(Value::from),
            (ParameterType::Int, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
            (ParameterType::Float, Value::Number(n)) => n.as_f64().map(Value::from),
            (ParameterType::Float, Value::String(s)) => s.trim().parse::<f64>().ok().map(Value::from),
            (ParameterType::Bool, Value::Bool(_)) => Some(value.clone()),
            (ParameterType::Bool, Value::String(s)) => s.trim().parse::<bool>().ok().map(Value::Bool),
            (ParameterType::StringList, Value::Array(items)) => items
                .iter()
                .map(|v| v.as_str().map(|s| Value::String(s.to_string())))
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            (ParameterType::StringList, Value::String(s)) => Some(Value::Array(
                s.split(',')
                    .map(|part| Value::String(part.trim().to_string()))
                    .filter(|v| v.as_str() != Some(""))
                    .collect(),
            )),
            (ParameterType::Choice, Value::String(s)) if self.choices.contains(s) => {
                Some(value.clone())
            }
            (ParameterType::Choice, Value::String(s)) => {
                return Err(self.error(
                    format!("'{}' is not one of {:?}", s, self.choices),
                    Some(value),
                ))
            }
            _ => None,
        };
        coerced.ok_or_else(|| self.error(format!("expected {}", self.kind.as_str()), Some(value)))
    }

    fn error(&self, message: impl Into<String>, got: Option<&Value>) -> Error {
        let mut context = ErrorContext::new()
            .with_field_path(self.name.clone())
            .with_source("command_parameters");
        if let Some(got) = got {
            context = context.with_details(format!("got {}", got));
        }
        Error::configuration_with_context(
            format!("invalid parameter '{}': {}", self.name, message.into()),
            context,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_from_strings() {
        let int = ParameterDefinition::new("n", ParameterType::Int);
        assert_eq!(int.coerce(&json!("42")).unwrap(), json!(42));
        assert!(int.coerce(&json!("4.2")).is_err());

        let list = ParameterDefinition::new("tags", ParameterType::StringList);
        assert_eq!(list.coerce(&json!("a, b,,c")).unwrap(), json!(["a", "b", "c"]));
        assert!(list.coerce(&json!([1, 2])).is_err());

        let flag = ParameterDefinition::new("verbose", ParameterType::Bool);
        assert_eq!(flag.coerce(&json!("true")).unwrap(), json!(true));
    }

    #[test]
    fn test_choice() {
        let mut level = ParameterDefinition::new("level", ParameterType::Choice);
        assert!(level.validate().is_err());
        level.choices = vec!["low".into(), "high".into()];
        assert_eq!(level.coerce(&json!("low")).unwrap(), json!("low"));
        let err = level.coerce(&json!("medium")).unwrap_err();
        assert_eq!(err.context().unwrap().field_path.as_deref(), Some("level"));
    }

    #[test]
    fn test_invalid_default_is_rejected() {
        let mut n = ParameterDefinition::new("n", ParameterType::Int);
        n.default = Some(json!("many"));
        assert!(n.validate().is_err());
    }
}
