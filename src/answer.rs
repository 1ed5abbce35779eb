//! Answer types and value interpretation
//!
//! Raw answer values are stored as JSON. The declared [`AnswerType`] decides how a
//! value is read when a rule compares it: numbers for boolean/integer/decimal
//! answers, text for strings, instants for dates, and element lists for arrays.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Scalar base type of an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BaseType {
    Boolean,
    Integer,
    Decimal,
    String,
    Date,
    Object,
}

impl BaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BaseType::Boolean => "boolean",
            BaseType::Integer => "integer",
            BaseType::Decimal => "decimal",
            BaseType::String => "string",
            BaseType::Date => "date",
            BaseType::Object => "object",
        }
    }
}

/// Describes how the raw value of an answer result should be interpreted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AnswerType {
    Boolean,
    Integer,
    Decimal,
    String,
    /// Date answer. `codingFormat` is a strftime pattern tried before the ISO 8601 forms.
    #[serde(rename_all = "camelCase")]
    Date {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        coding_format: Option<String>,
    },
    /// Multiple-choice style answer holding a list of scalar values
    #[serde(rename_all = "camelCase")]
    Array {
        base_type: BaseType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        coding_format: Option<String>,
    },
    Object,
}

impl AnswerType {
    pub fn date() -> Self {
        AnswerType::Date {
            coding_format: None,
        }
    }

    pub fn array(base_type: BaseType) -> Self {
        AnswerType::Array {
            base_type,
            coding_format: None,
        }
    }

    pub fn base_type(&self) -> BaseType {
        match self {
            AnswerType::Boolean => BaseType::Boolean,
            AnswerType::Integer => BaseType::Integer,
            AnswerType::Decimal => BaseType::Decimal,
            AnswerType::String => BaseType::String,
            AnswerType::Date { .. } => BaseType::Date,
            AnswerType::Array { base_type, .. } => *base_type,
            AnswerType::Object => BaseType::Object,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, AnswerType::Array { .. })
    }

    fn coding_format(&self) -> Option<&str> {
        match self {
            AnswerType::Date { coding_format } | AnswerType::Array { coding_format, .. } => {
                coding_format.as_deref()
            }
            _ => None,
        }
    }

    /// Name used in validation messages
    pub fn describe(&self) -> String {
        match self {
            AnswerType::Array { base_type, .. } => format!("array<{}>", base_type.as_str()),
            other => other.base_type().as_str().to_string(),
        }
    }

    /// Interpret a raw JSON value under this answer type.
    ///
    /// Returns `None` for null values and for values that cannot be read as this type.
    /// Array types always produce a list; a non-array value becomes a one-element list.
    pub fn interpret(&self, value: &Value) -> Option<AnswerValue> {
        if value.is_null() {
            return None;
        }
        match self {
            AnswerType::Array { base_type, .. } => {
                let elements: Vec<&Value> = match value {
                    Value::Array(items) => items.iter().collect(),
                    other => vec![other],
                };
                let converted: Vec<Comparable> = elements
                    .iter()
                    .filter_map(|v| scalar(v, *base_type, self.coding_format()))
                    .collect();
                // Any element that cannot be read invalidates the whole list
                if converted.len() != elements.len() {
                    return None;
                }
                Some(AnswerValue::List(converted))
            }
            other => scalar(value, other.base_type(), other.coding_format()).map(AnswerValue::Scalar),
        }
    }
}

/// A value read under an answer type, ready for comparison
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerValue {
    Scalar(Comparable),
    List(Vec<Comparable>),
}

/// A scalar that can be ordered against another scalar of the same kind
#[derive(Debug, Clone, PartialEq)]
pub enum Comparable {
    Number(f64),
    Text(String),
    Instant(DateTime<Utc>),
}

impl PartialOrd for Comparable {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::Text(a), Comparable::Text(b)) => Some(a.cmp(b)),
            (Comparable::Instant(a), Comparable::Instant(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

fn scalar(value: &Value, base_type: BaseType, coding_format: Option<&str>) -> Option<Comparable> {
    match base_type {
        BaseType::Boolean | BaseType::Integer | BaseType::Decimal => match value {
            Value::Number(n) => n.as_f64().map(Comparable::Number),
            Value::Bool(b) => Some(Comparable::Number(if *b { 1.0 } else { 0.0 })),
            _ => None,
        },
        BaseType::String => match value {
            Value::String(s) => Some(Comparable::Text(s.clone())),
            Value::Number(n) => Some(Comparable::Text(n.to_string())),
            Value::Bool(b) => Some(Comparable::Text(b.to_string())),
            _ => None,
        },
        BaseType::Date => match value {
            Value::String(s) => parse_date(s, coding_format).map(Comparable::Instant),
            _ => None,
        },
        BaseType::Object => None,
    }
}

/// Parse a date answer.
///
/// Tries the explicit coding format first, then RFC 3339, then the common ISO 8601
/// local forms. Values without a time of day resolve to midnight UTC.
pub fn parse_date(value: &str, coding_format: Option<&str>) -> Option<DateTime<Utc>> {
    if let Some(format) = coding_format {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc());
        }
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
