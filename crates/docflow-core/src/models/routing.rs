use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An extracted parameter value: free text or a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_json(&self) -> serde_json::Value {
        match self {
            ParamValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                serde_json::Value::Number((*n as i64).into())
            }
            ParamValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(n.to_string())),
            ParamValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Parse a value coming from text input: numbers stay numbers.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => ParamValue::Number(n),
            _ => ParamValue::Text(trimmed.to_string()),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // 6.0 renders as "6" so it can be substituted into file names.
            ParamValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            ParamValue::Number(n) => write!(f, "{}", n),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Text(s)
    }
}

impl From<i64> for ParamValue {
    fn from(n: i64) -> Self {
        ParamValue::Number(n as f64)
    }
}

impl From<f64> for ParamValue {
    fn from(n: f64) -> Self {
        ParamValue::Number(n)
    }
}

/// Extracted parameters, ordered for deterministic payloads.
pub type Parameters = BTreeMap<String, ParamValue>;

/// An incoming free-form request. Immutable once received.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub raw_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl Request {
    pub fn new(raw_text: impl Into<String>, session_id: Option<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            session_id,
            received_at: crate::models::now(),
        }
    }
}

/// One ranked candidate produced by a classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub label: String,
    #[serde(default)]
    pub parameters: Parameters,
    pub confidence: f64,
}

/// The routing outcome for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingDecision {
    pub capability_name: String,
    #[serde(default)]
    pub extracted_parameters: Parameters,
    pub confidence: f64,
}
