//! Typed access to flat parameter maps.
//!
//! Parameters arrive from command-line flags or configuration files as a flat
//! `name → value` mapping. Flag values are often strings, so numeric and boolean
//! readers also accept strings that parse as the expected type. Absent keys and
//! `null` values both mean "not set in this layer".

use crate::{Error, ErrorContext, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;

/// Flat name→value mapping of resolved parameters.
pub type ParameterMap = serde_json::Map<String, Value>;

pub(crate) struct Parameters<'a> {
    map: &'a ParameterMap,
}

impl<'a> Parameters<'a> {
    pub(crate) fn new(map: &'a ParameterMap) -> Self {
        Self { map }
    }

    fn raw(&self, name: &str) -> Option<&'a Value> {
        match self.map.get(name) {
            None | Some(Value::Null) => None,
            Some(v) => Some(v),
        }
    }

    pub(crate) fn string(&self, name: &str) -> Result<Option<String>> {
        match self.raw(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(invalid(name, "a string", other)),
        }
    }

    pub(crate) fn f64(&self, name: &str) -> Result<Option<f64>> {
        match self.raw(name) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| invalid(name, "a number", &Value::Number(n.clone()))),
            Some(Value::String(s)) => parse_str(name, s, "a number"),
            Some(other) => Err(invalid(name, "a number", other)),
        }
    }

    pub(crate) fn u32(&self, name: &str) -> Result<Option<u32>> {
        match self.u64(name)? {
            None => Ok(None),
            Some(v) => u32::try_from(v)
                .map(Some)
                .map_err(|_| invalid(name, "an integer that fits in 32 bits", &Value::from(v))),
        }
    }

    pub(crate) fn u64(&self, name: &str) -> Result<Option<u64>> {
        match self.raw(name) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(Some)
                .ok_or_else(|| invalid(name, "a non-negative integer", &Value::Number(n.clone()))),
            Some(Value::String(s)) => parse_str(name, s, "a non-negative integer"),
            Some(other) => Err(invalid(name, "a non-negative integer", other)),
        }
    }

    pub(crate) fn i64(&self, name: &str) -> Result<Option<i64>> {
        match self.raw(name) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| invalid(name, "an integer", &Value::Number(n.clone()))),
            Some(Value::String(s)) => parse_str(name, s, "an integer"),
            Some(other) => Err(invalid(name, "an integer", other)),
        }
    }

    pub(crate) fn bool(&self, name: &str) -> Result<Option<bool>> {
        match self.raw(name) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::String(s)) => parse_str(name, s, "a boolean"),
            Some(other) => Err(invalid(name, "a boolean", other)),
        }
    }

    /// A list of strings; a single string is treated as a one-element list.
    pub(crate) fn string_list(&self, name: &str) -> Result<Option<Vec<String>>> {
        match self.raw(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(vec![s.clone()])),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(invalid(name, "a list of strings", other)),
                })
                .collect::<Result<Vec<_>>>()
                .map(Some),
            Some(other) => Err(invalid(name, "a list of strings", other)),
        }
    }

    pub(crate) fn int_map(&self, name: &str) -> Result<Option<HashMap<String, i64>>> {
        match self.raw(name) {
            None => Ok(None),
            Some(Value::Object(entries)) => entries
                .iter()
                .map(|(k, v)| match v.as_i64() {
                    Some(i) => Ok((k.clone(), i)),
                    None => Err(invalid(name, "a map of integers", v)),
                })
                .collect::<Result<HashMap<_, _>>>()
                .map(Some),
            Some(other) => Err(invalid(name, "a map of integers", other)),
        }
    }
}

fn parse_str<T: FromStr>(name: &str, s: &str, expected: &str) -> Result<Option<T>> {
    s.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| invalid(name, expected, &Value::String(s.to_string())))
}

pub(crate) fn invalid(name: &str, expected: &str, got: &Value) -> Error {
    Error::configuration_with_context(
        format!("invalid value for parameter '{}'", name),
        ErrorContext::new()
            .with_field_path(name)
            .with_details(format!("expected {}, got {}", expected, got))
            .with_source("settings_parameters"),
    )
}
