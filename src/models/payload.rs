//! Free-form payloads produced by external agents.
//!
//! Editorial briefs, research context and glossaries arrive as loosely
//! shaped key-value data. They are kept as a string-keyed tree of plain
//! values so the checkpoint schema does not depend on any agent's output.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// String-keyed free-form map.
pub type Payload = BTreeMap<String, PayloadValue>;

/// A value inside a [`Payload`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<PayloadValue>),
    Map(BTreeMap<String, PayloadValue>),
}

impl PayloadValue {
    /// Borrow as text, if this is a text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of integer and float values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl From<&str> for PayloadValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for PayloadValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PayloadValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for PayloadValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl<T: Into<PayloadValue>> From<Vec<T>> for PayloadValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<Payload> for PayloadValue {
    fn from(map: Payload) -> Self {
        Self::Map(map)
    }
}

/// Build a [`Payload`] from key-value pairs.
pub fn payload<K, V, I>(entries: I) -> Payload
where
    K: Into<String>,
    V: Into<PayloadValue>,
    I: IntoIterator<Item = (K, V)>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_payload_keeps_value_kinds() {
        let glossary = payload([
            ("eros", PayloadValue::from("amor")),
            ("entries", PayloadValue::from(2i64)),
            ("confidence", PayloadValue::from(0.75)),
            ("reviewed", PayloadValue::from(true)),
            ("variants", PayloadValue::from(vec!["desig", "passió"])),
            ("note", PayloadValue::Null),
            ("nested", PayloadValue::from(payload([("k", "v")]))),
        ]);

        let json = serde_json::to_string(&glossary).unwrap();
        let back: Payload = serde_json::from_str(&json).unwrap();

        assert_eq!(back, glossary);
        assert_eq!(back["entries"], PayloadValue::Integer(2));
        assert_eq!(back["confidence"].as_f64(), Some(0.75));
        assert_eq!(back["eros"].as_str(), Some("amor"));
    }

    #[test]
    fn test_accepts_agent_json() {
        let raw = r#"{"tone": "formal", "audience": ["students", "general"], "length": 42}"#;
        let brief: Payload = serde_json::from_str(raw).unwrap();

        assert_eq!(brief["tone"].as_str(), Some("formal"));
        assert_eq!(brief["length"].as_f64(), Some(42.0));
        assert!(matches!(brief["audience"], PayloadValue::List(ref v) if v.len() == 2));
    }
}
