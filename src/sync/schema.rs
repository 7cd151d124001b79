//! Per-collection field schema: which fields a list may edit, how their input is
//! validated and normalized, and how their writes are scheduled.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::store::error::{validation, StoreResult};
use crate::store::model::Timestamp;
use crate::store::value::{Value, ValueKind};
use crate::sync::writer::WriteMode;

static EMAIL_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .map_err(|err| log::error!("invalid email pattern: {err}"))
        .ok()
});

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Number,
    Boolean,
    /// Text that must be empty or a well-formed address.
    Email,
    /// Text reformatted as `(XXX) XXX-XXXX` when it holds exactly ten digits.
    Phone,
    Timestamp,
    StringList,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub kind: FieldKind,
    pub mode: WriteMode,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldSchema {
    fields: BTreeMap<String, FieldSpec>,
}

impl FieldSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, kind: FieldKind, mode: WriteMode) -> Self {
        self.fields.insert(name.into(), FieldSpec { kind, mode });
        self
    }

    /// Shorthand for a field whose writes are debounced.
    pub fn debounced(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.field(name, kind, WriteMode::Debounced)
    }

    /// Shorthand for a field whose writes go out at once.
    pub fn immediate(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.field(name, kind, WriteMode::Immediate)
    }

    pub fn spec(&self, field: &str) -> Option<FieldSpec> {
        self.fields.get(field).copied()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Validates `value` for `field` and returns the normalized value to buffer and write.
    pub fn normalize(&self, field: &str, value: Value) -> StoreResult<Value> {
        let spec = self
            .spec(field)
            .ok_or_else(|| validation(format!("field `{field}` is not editable here")))?;
        normalize_value(field, spec.kind, value)
    }
}

fn normalize_value(field: &str, kind: FieldKind, value: Value) -> StoreResult<Value> {
    if value.is_null() {
        return Ok(value);
    }
    let mismatch = |expected: &str, value: &Value| {
        validation(format!(
            "`{field}` expects {expected}, got {}",
            value.type_name()
        ))
    };

    match kind {
        FieldKind::Text => match value.kind() {
            ValueKind::String(_) => Ok(value),
            _ => Err(mismatch("text", &value)),
        },
        FieldKind::Integer => match value.kind() {
            ValueKind::Integer(_) => Ok(value),
            ValueKind::Double(number) if number.fract() == 0.0 => {
                Ok(Value::from_integer(*number as i64))
            }
            ValueKind::String(text) => parse_numeric(field, text, |input| {
                input.parse::<i64>().ok().map(Value::from_integer)
            }),
            _ => Err(mismatch("a whole number", &value)),
        },
        FieldKind::Number => match value.kind() {
            ValueKind::Integer(_) | ValueKind::Double(_) => Ok(value),
            ValueKind::String(text) => parse_numeric(field, text, |input| {
                input
                    .parse::<f64>()
                    .ok()
                    .filter(|number| number.is_finite())
                    .map(Value::from_double)
            }),
            _ => Err(mismatch("a number", &value)),
        },
        FieldKind::Boolean => match value.kind() {
            ValueKind::Boolean(_) => Ok(value),
            _ => Err(mismatch("true or false", &value)),
        },
        FieldKind::Email => match value.as_str() {
            Some(text) => {
                let text = text.trim();
                if text.is_empty() || is_valid_email(text) {
                    Ok(Value::from_string(text))
                } else {
                    Err(validation(format!("`{text}` is not a valid email address")))
                }
            }
            None => Err(mismatch("an email address", &value)),
        },
        FieldKind::Phone => match value.as_str() {
            Some(text) => Ok(Value::from_string(format_phone(text))),
            None => Err(mismatch("a phone number", &value)),
        },
        FieldKind::Timestamp => match value.kind() {
            ValueKind::Timestamp(_) => Ok(value),
            ValueKind::Integer(millis) => Ok(Value::from_timestamp(Timestamp::from_millis(*millis))),
            ValueKind::String(text) => chrono::DateTime::parse_from_rfc3339(text)
                .map(|parsed| Value::from_timestamp(Timestamp::from(parsed)))
                .map_err(|_| validation(format!("`{text}` is not a valid date and time"))),
            _ => Err(mismatch("a date and time", &value)),
        },
        FieldKind::StringList => match value.as_array() {
            Some(items) if items.iter().all(|item| item.as_str().is_some()) => Ok(value),
            _ => Err(mismatch("a list of text", &value)),
        },
    }
}

// Blank numeric input clears the field.
fn parse_numeric(
    field: &str,
    text: &str,
    parse: impl Fn(&str) -> Option<Value>,
) -> StoreResult<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Value::null());
    }
    parse(trimmed).ok_or_else(|| validation(format!("`{field}` expects a number, got `{text}`")))
}

pub fn is_valid_email(input: &str) -> bool {
    EMAIL_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(input))
}

/// Formats ten-digit input as `(XXX) XXX-XXXX`; anything else is returned unchanged.
pub fn format_phone(input: &str) -> String {
    let digits: String = input.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == 10 {
        format!("({}) {}-{}", &digits[0..3], &digits[3..6], &digits[6..10])
    } else {
        input.to_string()
    }
}
