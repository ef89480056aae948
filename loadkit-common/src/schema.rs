//! Declarative behavior configuration.
//!
//! A behavior declares a [`ConfigSchema`]; raw JSON supplied by the host is validated against it
//! before the behavior runs, producing a typed [`BehaviorConfig`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Number,
    String,
    Boolean,
}

impl FieldKind {
    fn as_name(&self) -> &'static str {
        match self {
            FieldKind::Number => "number",
            FieldKind::String => "string",
            FieldKind::Boolean => "boolean",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::Number => value.is_number(),
            FieldKind::String => value.is_string(),
            FieldKind::Boolean => value.is_boolean(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigField {
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl ConfigField {
    pub fn number(default: f64) -> Self {
        Self { kind: FieldKind::Number, description: None, default: Some(Value::from(default)), min: None, max: None }
    }

    pub fn string(default: &str) -> Self {
        Self { kind: FieldKind::String, description: None, default: Some(Value::from(default)), min: None, max: None }
    }

    pub fn boolean(default: bool) -> Self {
        Self { kind: FieldKind::Boolean, description: None, default: Some(Value::from(default)), min: None, max: None }
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn at_least(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn required(mut self) -> Self {
        self.default = None;
        self
    }
}

/// Field name → field declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigSchema {
    pub fields: BTreeMap<String, ConfigField>,
}

impl ConfigSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, field: ConfigField) -> Self {
        self.fields.insert(name.to_string(), field);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check `raw` against the schema, filling in defaults.
    pub fn validate(&self, raw: &Value) -> Result<BehaviorConfig, ConfigError> {
        let empty = Map::new();
        let supplied = match raw {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => return Err(ConfigError::NotAnObject),
        };

        if let Some(unknown) = supplied.keys().find(|k| !self.fields.contains_key(*k)) {
            return Err(ConfigError::UnknownField(unknown.clone()));
        }

        let mut values = Map::new();
        for (name, field) in &self.fields {
            let value = match supplied.get(name).or(field.default.as_ref()) {
                Some(v) => v,
                None => return Err(ConfigError::MissingField(name.clone())),
            };
            if !field.kind.accepts(value) {
                return Err(ConfigError::WrongType { field: name.clone(), expected: field.kind.as_name() });
            }
            if let Some(n) = value.as_f64() {
                if let Some(min) = field.min.filter(|min| n < *min) {
                    return Err(ConfigError::BelowMin { field: name.clone(), value: n, min });
                }
                if let Some(max) = field.max.filter(|max| n > *max) {
                    return Err(ConfigError::AboveMax { field: name.clone(), value: n, max });
                }
            }
            values.insert(name.clone(), value.clone());
        }

        Ok(BehaviorConfig { values })
    }
}

/// Validated configuration handed to a behavior's `init` and `run`.
///
/// Accessors return `None` only for names the schema never declared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BehaviorConfig {
    values: Map<String, Value>,
}

impl BehaviorConfig {
    pub fn number(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(Value::as_f64)
    }

    /// Numeric field truncated to an unsigned integer.
    pub fn count(&self, name: &str) -> Option<u64> {
        self.number(name).map(|n| n.max(0.0) as u64)
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(Value::as_bool)
    }

    pub fn as_json(&self) -> Value {
        Value::Object(self.values.clone())
    }
}
