//! # Prompts file
//!
//! This module defines the on-disk JSON document that backs a
//! [`PromptStore`](crate::store::PromptStore), and a validator for it.
//!
//! The main components are:
//! - [`PromptsFile`] struct - The whole document: a version string and the prompts by key
//! - [`PromptEntry`] struct - One prompt as serialized on disk
//! - [`validate`] function - Structural checks that report errors and warnings

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::StoreError;
use crate::parser::{Segment, is_identifier, scan};

pub const DEFAULT_VERSION: &str = "1.0";

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PromptsFile {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub prompts: BTreeMap<String, PromptEntry>,
}

impl Default for PromptsFile {
    fn default() -> Self {
        PromptsFile {
            version: default_version(),
            prompts: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PromptEntry {
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub variables: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub source: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub notes: String,
}

impl PromptsFile {
    pub fn from_json(raw: &str) -> Result<PromptsFile, StoreError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn read(path: &Path) -> Result<PromptsFile, StoreError> {
        let raw = fs::read_to_string(path)?;
        PromptsFile::from_json(&raw)
    }

    /// Writes the document as pretty-printed JSON, replacing any existing file.
    pub fn write(&self, path: &Path) -> Result<(), StoreError> {
        let mut serialized = serde_json::to_string_pretty(self)?;
        serialized.push('\n');
        fs::write(path, serialized)?;
        Ok(())
    }
}

/// Outcome of [`validate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub prompt_count: usize,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

/// Checks the structure of a prompts document without loading it.
///
/// Errors are problems that make a prompt unusable (bad JSON, no `prompts`
/// object, an entry without `text`). Warnings flag drift between the declared
/// `variables` and the placeholders the text actually uses.
pub fn validate(raw: &str) -> ValidationReport {
    let mut report = ValidationReport::default();

    let data: Value = match serde_json::from_str(raw) {
        Ok(data) => data,
        Err(e) => {
            report.errors.push(format!("Invalid JSON: {}", e));
            return report;
        }
    };

    let Some(prompts) = data.get("prompts") else {
        report.errors.push("Missing 'prompts' key".to_string());
        return report;
    };

    let Some(prompts) = prompts.as_object() else {
        report.errors.push("'prompts' must be an object".to_string());
        return report;
    };

    report.prompt_count = prompts.len();

    for (key, prompt) in prompts {
        let Some(prompt) = prompt.as_object() else {
            report.errors.push(format!("{}: Prompt must be an object", key));
            continue;
        };

        let text = match prompt.get("text") {
            None => {
                report.errors.push(format!("{}: Missing 'text' field", key));
                continue;
            }
            Some(Value::String(text)) => text,
            Some(_) => {
                report.errors.push(format!("{}: 'text' must be a string", key));
                continue;
            }
        };

        if text.is_empty() {
            report.warnings.push(format!("{}: Empty text", key));
        }

        let placeholders: Vec<&str> = scan(text)
            .into_iter()
            .filter_map(|segment| match segment {
                Segment::Placeholder(name) => Some(name),
                Segment::Literal(_) => None,
            })
            .collect();

        let declared: Vec<&str> = prompt
            .get("variables")
            .and_then(Value::as_array)
            .map(|vars| vars.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        for var in &declared {
            if !placeholders.contains(var) {
                report
                    .warnings
                    .push(format!("{}: Variable '{}' not used in text", key, var));
            }
        }

        let mut undeclared: Vec<&str> = Vec::new();
        for name in placeholders.iter().filter(|name| is_identifier(name)) {
            if !declared.contains(name) && !undeclared.contains(name) {
                undeclared.push(name);
            }
        }
        for name in undeclared {
            report
                .warnings
                .push(format!("{}: Placeholder '{{{}}}' not declared in variables", key, name));
        }
    }

    report
}

pub fn validate_file(path: &Path) -> Result<ValidationReport, StoreError> {
    let raw = fs::read_to_string(path)?;
    Ok(validate(&raw))
}
