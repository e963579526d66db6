use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A single metadata value. External records may carry arbitrary JSON; only
/// these four shapes are let through.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

#[derive(Debug, Error, PartialEq)]
pub enum MetadataError {
    #[error("metadata must be a JSON object")]
    NotAnObject,
    #[error("metadata key '{0}' is empty")]
    EmptyKey(String),
    #[error("metadata key '{key}' has unsupported {found} value")]
    UnsupportedValue { key: String, found: &'static str },
    #[error("metadata key '{0}' holds a number that is not finite")]
    NonFiniteNumber(String),
}

/// Free-form key/value data attached to notifications and feed records,
/// validated where it enters the core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Metadata(BTreeMap<String, MetaValue>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(value: Value) -> Result<Self, MetadataError> {
        let Value::Object(map) = value else {
            return Err(MetadataError::NotAnObject);
        };

        let mut entries = BTreeMap::new();
        for (key, value) in map {
            if key.trim().is_empty() {
                return Err(MetadataError::EmptyKey(key));
            }
            let value = match value {
                Value::String(s) => match DateTime::parse_from_rfc3339(&s) {
                    Ok(ts) => MetaValue::Timestamp(ts.with_timezone(&Utc)),
                    Err(_) => MetaValue::Text(s),
                },
                Value::Bool(b) => MetaValue::Bool(b),
                Value::Number(n) => match n.as_f64() {
                    Some(f) if f.is_finite() => MetaValue::Number(f),
                    _ => return Err(MetadataError::NonFiniteNumber(key)),
                },
                Value::Null => return Err(unsupported(key, "null")),
                Value::Array(_) => return Err(unsupported(key, "array")),
                Value::Object(_) => return Err(unsupported(key, "object")),
            };
            entries.insert(key, value);
        }
        Ok(Self(entries))
    }

    pub fn insert(&mut self, key: impl Into<String>, value: MetaValue) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.0.get(key)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(MetaValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

fn unsupported(key: String, found: &'static str) -> MetadataError {
    MetadataError::UnsupportedValue { key, found }
}

impl TryFrom<Value> for Metadata {
    type Error = MetadataError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_json(value)
    }
}

impl From<Metadata> for Value {
    fn from(meta: Metadata) -> Self {
        let map = meta
            .0
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    MetaValue::Text(s) => Value::String(s),
                    MetaValue::Number(n) => serde_json::Number::from_f64(n)
                        .map(Value::Number)
                        .unwrap_or(Value::Null),
                    MetaValue::Bool(b) => Value::Bool(b),
                    MetaValue::Timestamp(ts) => Value::String(ts.to_rfc3339()),
                };
                (key, value)
            })
            .collect();
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_scalar_values() {
        let meta = Metadata::from_json(json!({
            "conversation_id": "c-1",
            "count": 3,
            "urgent": true,
            "sent_at": "2024-03-01T10:00:00Z",
        }))
        .unwrap();

        assert_eq!(meta.len(), 4);
        assert_eq!(meta.text("conversation_id"), Some("c-1"));
        assert_eq!(meta.get("count"), Some(&MetaValue::Number(3.0)));
        assert_eq!(meta.get("urgent"), Some(&MetaValue::Bool(true)));
        assert!(matches!(meta.get("sent_at"), Some(MetaValue::Timestamp(_))));
    }

    #[test]
    fn rejects_nested_and_null() {
        let err = Metadata::from_json(json!({ "tags": ["a"] })).unwrap_err();
        assert_eq!(
            err,
            MetadataError::UnsupportedValue { key: "tags".into(), found: "array" }
        );

        let err = Metadata::from_json(json!({ "x": null })).unwrap_err();
        assert!(matches!(err, MetadataError::UnsupportedValue { found: "null", .. }));

        assert_eq!(Metadata::from_json(json!([1, 2])).unwrap_err(), MetadataError::NotAnObject);
    }

    #[test]
    fn deserializes_through_validation() {
        let parsed: Result<Metadata, _> = serde_json::from_value(json!({ "bad": { "x": 1 } }));
        assert!(parsed.is_err());

        let parsed: Metadata = serde_json::from_value(json!({ "ok": "yes" })).unwrap();
        assert_eq!(parsed.text("ok"), Some("yes"));
    }
}
