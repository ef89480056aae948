//! Raw behavior configuration as assembled by the CLI: an optional JSON file plus `key=value`
//! overrides. Validation against the behavior's schema happens later, in the runner.

use serde_json::{Map, Value};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error("failed to parse {path}: {source}")]
    Json { path: String, source: serde_json::Error },

    #[error("{0} does not contain a JSON object")]
    NotAnObject(String),

    #[error("override {0:?} is not of the form key=value")]
    BadOverride(String),
}

/// Split `key=value`. The value is parsed as JSON when possible (`3`, `true`, `"x"`), otherwise
/// taken verbatim as a string.
pub fn parse_override(raw: &str) -> Result<(String, Value), ConfigLoadError> {
    let (key, value) = raw.split_once('=').ok_or_else(|| ConfigLoadError::BadOverride(raw.to_string()))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(ConfigLoadError::BadOverride(raw.to_string()));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Read `file` (if any) and apply `overrides` on top, later overrides winning.
pub fn load_behavior_config(file: Option<&Path>, overrides: &[String]) -> Result<Value, ConfigLoadError> {
    let mut config = match file {
        Some(path) => read_object(path)?,
        None => Map::new(),
    };
    for raw in overrides {
        let (key, value) = parse_override(raw)?;
        config.insert(key, value);
    }
    Ok(Value::Object(config))
}

fn read_object(path: &Path) -> Result<Map<String, Value>, ConfigLoadError> {
    let display = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Io { path: display.clone(), source })?;
    let value: Value =
        serde_json::from_str(&text).map_err(|source| ConfigLoadError::Json { path: display.clone(), source })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ConfigLoadError::NotAnObject(display)),
    }
}
