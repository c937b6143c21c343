use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    static ref RECORD_BODY: Regex = Regex::new(r"\{[^{}]*\}").expect("record body pattern");
    static ref KEY_VALUE: Regex =
        Regex::new(r#"(\w+):\s*(?:"([^"]*)"|'([^']*)'|([^{},\n]+))"#).expect("key/value pattern");
}

/// Field names that carry identifiers and must never be coerced to numbers,
/// even when they look numeric.
const IDENTIFIER_FIELDS: &[&str] = &["teamId"];

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(value) => Some(*value),
            FieldValue::Float(value) => Some(*value as i64),
            FieldValue::Text(value) => value
                .parse::<i64>()
                .ok()
                .or_else(|| value.parse::<f64>().ok().map(|parsed| parsed as i64)),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Text(value) => Some(value.clone()),
            FieldValue::Int(value) => Some(value.to_string()),
            FieldValue::Float(value) => Some(value.to_string()),
            _ => None,
        }
    }
}

/// One parsed brace-delimited record. Duplicate keys keep the first value
/// seen; each record fragment is self-contained.
#[derive(Debug, Clone, Default)]
pub struct Record {
    fields: HashMap<String, FieldValue>,
}

impl Record {
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn text(&self, key: &str) -> Option<String> {
        self.fields
            .get(key)
            .and_then(FieldValue::as_text)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    pub fn integer(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(FieldValue::as_i64)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Pulls every `{ ... }` fragment out of a marker block.
pub fn extract_record_fragments(block: &str) -> Vec<&str> {
    RECORD_BODY
        .find_iter(block)
        .map(|found| found.as_str())
        .collect()
}

/// Parses a single brace-delimited fragment into typed fields. A token that
/// fails coercion is preserved as text; nothing in a fragment is fatal.
pub fn parse_record(fragment: &str) -> Record {
    let mut record = Record::default();

    for captures in KEY_VALUE.captures_iter(fragment) {
        let key = &captures[1];
        let raw = captures
            .get(2)
            .or_else(|| captures.get(3))
            .or_else(|| captures.get(4))
            .map(|value| value.as_str().trim())
            .unwrap_or("");

        let value = coerce_value(key, raw);
        record
            .fields
            .entry(key.to_string())
            .or_insert(value);
    }

    record
}

fn coerce_value(key: &str, raw: &str) -> FieldValue {
    let lowered = raw.to_ascii_lowercase();
    if raw.is_empty() || lowered == "null" || lowered == "none" {
        return FieldValue::Null;
    }
    if lowered == "true" {
        return FieldValue::Bool(true);
    }
    if lowered == "false" {
        return FieldValue::Bool(false);
    }

    if looks_numeric(raw) {
        if IDENTIFIER_FIELDS.contains(&key) {
            // Identifiers stay strings, normalized through the integer form
            // so "07" and "7" compare equal.
            if let Ok(parsed) = raw.parse::<i64>() {
                return FieldValue::Text(parsed.to_string());
            }
            return FieldValue::Text(raw.to_string());
        }
        if raw.contains('.') {
            if let Ok(parsed) = raw.parse::<f64>() {
                return FieldValue::Float(parsed);
            }
        } else if let Ok(parsed) = raw.parse::<i64>() {
            return FieldValue::Int(parsed);
        }
    }

    FieldValue::Text(raw.to_string())
}

fn looks_numeric(raw: &str) -> bool {
    let unsigned = raw.strip_prefix('-').unwrap_or(raw);
    if unsigned.is_empty() {
        return false;
    }

    let mut seen_dot = false;
    let mut seen_digit = false;
    for character in unsigned.chars() {
        match character {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return false,
        }
    }

    seen_digit
}
