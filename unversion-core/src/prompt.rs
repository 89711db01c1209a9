use std::borrow::Cow;
use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::parser::{Segment, is_identifier, scan};
use crate::registry::PromptEntry;

/// A value that can be substituted into a prompt.
///
/// Strings go in as-is, numbers and booleans in their usual text form. JSON
/// strings lose their quotes, so the same [`Variables`](crate::usage::Variables)
/// map can be passed to [`Prompt::format`] and to a usage event.
pub trait PromptValue {
    fn to_prompt_value(&self) -> String;
}

impl PromptValue for str {
    fn to_prompt_value(&self) -> String {
        self.to_string()
    }
}

impl PromptValue for String {
    fn to_prompt_value(&self) -> String {
        self.clone()
    }
}

impl PromptValue for Cow<'_, str> {
    fn to_prompt_value(&self) -> String {
        self.to_string()
    }
}

impl PromptValue for Value {
    fn to_prompt_value(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl<T: PromptValue + ?Sized> PromptValue for &T {
    fn to_prompt_value(&self) -> String {
        (**self).to_prompt_value()
    }
}

macro_rules! display_prompt_value {
    ($($ty:ty),*) => {
        $(impl PromptValue for $ty {
            fn to_prompt_value(&self) -> String {
                self.to_string()
            }
        })*
    };
}

display_prompt_value!(
    bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64
);

/// One named prompt template.
///
/// Records are built by [`PromptStore`](crate::store::PromptStore) while loading
/// a prompts file and never change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prompt {
    key: String,
    text: String,
    variables: Vec<String>,
    source: String,
    notes: String,
}

impl Prompt {
    pub fn new(key: String, text: String, variables: Vec<String>) -> Prompt {
        Prompt {
            key,
            text,
            variables,
            source: String::new(),
            notes: String::new(),
        }
    }

    pub fn from_entry(key: String, entry: PromptEntry) -> Prompt {
        Prompt {
            key,
            text: entry.text,
            variables: entry.variables,
            source: entry.source,
            notes: entry.notes,
        }
    }

    pub fn with_source(mut self, source: String) -> Prompt {
        self.source = source;
        self
    }

    pub fn with_notes(mut self, notes: String) -> Prompt {
        self.notes = notes;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Declared variable names. Advisory only: they are not checked against
    /// the placeholders actually present in [`text`](Self::text).
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    /// Distinct placeholder names referenced by the text, in order of first use.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in scan(&self.text) {
            if let Segment::Placeholder(name) = segment {
                if is_identifier(name) && !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Substitutes `{name}` placeholders with the supplied values.
    ///
    /// With no variables the text is returned untouched. Placeholders without a
    /// value are left verbatim, so a caller that drifted from the prompts file
    /// still gets usable text instead of an error.
    pub fn format<I, K, V>(&self, variables: I) -> String
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: PromptValue,
    {
        let values: HashMap<String, String> = variables
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.to_prompt_value()))
            .collect();

        if values.is_empty() {
            return self.text.clone();
        }

        let mut result = String::with_capacity(self.text.len());
        let mut missing: Vec<&str> = Vec::new();

        for segment in scan(&self.text) {
            match segment {
                Segment::Literal(text) => result.push_str(text),
                Segment::Placeholder(name) => match values.get(name) {
                    Some(value) => result.push_str(value),
                    None => {
                        if is_identifier(name) && !missing.contains(&name) {
                            missing.push(name);
                        }
                        result.push('{');
                        result.push_str(name);
                        result.push('}');
                    }
                },
            }
        }

        if !missing.is_empty() {
            warn!(
                prompt = %self.key,
                missing = ?missing,
                "missing format variables, leaving placeholders unresolved"
            );
        }

        result
    }
}
