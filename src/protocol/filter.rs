//! Input filtering applied to parameter values before anything reads them.
//!
//! Filters run in configured order on every string value, recursing into
//! arrays and objects. Keys are left alone. Because the gate sees filtered
//! values, clients sign the filtered form of their parameters.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One filtering step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// Strip whitespace, NUL and vertical tab from both ends.
    Trim,
    /// Remove markup tags.
    StripTags,
    /// Escape `& " ' < >` as HTML entities.
    Htmlspecialchars,
}

impl FilterKind {
    fn apply(self, input: &str) -> String {
        match self {
            Self::Trim => trim(input).to_string(),
            Self::StripTags => strip_tags(input),
            Self::Htmlspecialchars => html_escape(input),
        }
    }
}

/// Ordered list of filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputFilter {
    steps: Vec<FilterKind>,
}

impl InputFilter {
    pub fn new(steps: Vec<FilterKind>) -> Self {
        Self { steps }
    }

    /// `trim`, `strip_tags`, `htmlspecialchars`.
    pub fn standard() -> Self {
        Self::new(vec![
            FilterKind::Trim,
            FilterKind::StripTags,
            FilterKind::Htmlspecialchars,
        ])
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn apply_str(&self, input: &str) -> String {
        self.steps
            .iter()
            .fold(input.to_string(), |acc, step| step.apply(&acc))
    }

    pub fn apply(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.apply_str(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.apply(v)).collect()),
            Value::Object(map) => Value::Object(self.apply_map(map)),
            other => other.clone(),
        }
    }

    /// Filtered copy of a parameter map.
    pub fn apply_map(&self, map: &Map<String, Value>) -> Map<String, Value> {
        map.iter()
            .map(|(key, value)| (key.clone(), self.apply(value)))
            .collect()
    }
}

fn trim(input: &str) -> &str {
    input.trim_matches(|c: char| matches!(c, ' ' | '\t' | '\n' | '\r' | '\0' | '\x0B'))
}

/// Drop `<...>` sequences the way PHP `strip_tags` does. A `<` opens a tag
/// unless followed by whitespace; quoted `>` inside a tag does not close it;
/// an unclosed tag swallows the rest of the input.
fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        let opens_tag = ch == '<' && !chars.peek().is_some_and(|next| next.is_whitespace());
        if !opens_tag {
            out.push(ch);
            continue;
        }

        let mut quote: Option<char> = None;
        for inner in chars.by_ref() {
            match (quote, inner) {
                (None, '"' | '\'') => quote = Some(inner),
                (Some(q), c) if c == q => quote = None,
                (None, '>') => break,
                _ => {}
            }
        }
    }

    out
}

fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}
