//! JSON/YAML documents read and written as `serde_json::Value`.

use serde_json::Value;
use std::path::Path;
use thiserror::Error;

use crate::validation::DocumentFormat;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub fn parse(contents: &str, format: DocumentFormat) -> Result<Value, DocumentError> {
    Ok(match format {
        DocumentFormat::Json => serde_json::from_str(contents)?,
        DocumentFormat::Yaml => serde_yaml::from_str(contents)?,
    })
}

pub fn render(value: &Value, format: DocumentFormat) -> Result<String, DocumentError> {
    Ok(match format {
        DocumentFormat::Json => {
            let mut s = serde_json::to_string_pretty(value)?;
            s.push('\n');
            s
        }
        DocumentFormat::Yaml => serde_yaml::to_string(value)?,
    })
}

pub fn read(path: &Path, format: DocumentFormat) -> Result<Value, DocumentError> {
    parse(&std::fs::read_to_string(path)?, format)
}

/// Required top-level keys missing from `value`. A non-object is missing all of them.
pub fn missing_keys(value: &Value, required: &[String]) -> Vec<String> {
    match value.as_object() {
        Some(map) => required
            .iter()
            .filter(|k| !map.contains_key(k.as_str()))
            .cloned()
            .collect(),
        None => required.to_vec(),
    }
}
