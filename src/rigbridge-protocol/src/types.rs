// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Transport DTOs for the command/response protocol.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Loosely-typed command parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Arrays, objects and integers outside the `i64` range.
    Other(Value),
}

impl ParamValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Null => "null",
            ParamValue::Bool(_) => "boolean",
            ParamValue::Int(_) => "integer",
            ParamValue::Float(_) => "number",
            ParamValue::Str(_) => "string",
            ParamValue::Other(_) => "value",
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ParamValue::Null => Value::Null,
            ParamValue::Bool(b) => Value::Bool(*b),
            ParamValue::Int(i) => Value::from(*i),
            ParamValue::Float(f) => Value::from(*f),
            ParamValue::Str(s) => Value::String(s.clone()),
            ParamValue::Other(v) => v.clone(),
        }
    }
}

impl From<Value> for ParamValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => ParamValue::Null,
            Value::Bool(b) => ParamValue::Bool(b),
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => ParamValue::Int(i),
                (None, Some(f)) if !n.is_u64() => ParamValue::Float(f),
                _ => ParamValue::Other(Value::Number(n)),
            },
            Value::String(s) => ParamValue::Str(s),
            other => ParamValue::Other(other),
        }
    }
}

/// Inbound request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandMessage {
    pub command: String,
    pub parameters: BTreeMap<String, ParamValue>,
    pub timestamp: Option<String>,
    /// Taken from transport metadata, never from the body.
    pub correlation_data: Vec<u8>,
}

impl CommandMessage {
    /// Look a parameter up by name, ignoring ASCII case.
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.parameters.get(name).or_else(|| {
            self.parameters
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidCommand,
    InvalidMessage,
    MissingParameter,
    InvalidParameter,
    InvalidMode,
    CommandFailed,
}

/// Outbound reply to exactly one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub timestamp: String,
    #[serde(default)]
    pub correlation_data: String,
}

impl CommandResponse {
    pub fn success(result: Value) -> Self {
        Self {
            status: ResponseStatus::Success,
            result: Some(result),
            error_code: None,
            error_message: None,
            timestamp: utc_timestamp(),
            correlation_data: String::new(),
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            result: None,
            error_code: Some(code),
            error_message: Some(message.into()),
            timestamp: utc_timestamp(),
            correlation_data: String::new(),
        }
    }

    /// Echo the request's correlation token in the body.
    pub fn correlated(mut self, correlation_data: &[u8]) -> Self {
        self.correlation_data = String::from_utf8_lossy(correlation_data).into_owned();
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

/// Best-effort notification published on a rig's events topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventNotification {
    pub event_type: String,
    pub message: String,
    pub timestamp: String,
}

impl EventNotification {
    pub fn new(event_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            message: message.into(),
            timestamp: utc_timestamp(),
        }
    }
}

/// Delivery guarantee requested for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

/// Message received from the broker, transport metadata included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: Qos,
    pub correlation_data: Option<Vec<u8>>,
    pub response_topic: Option<String>,
}

/// Message to hand to the broker client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: Qos,
    pub retain: bool,
    pub correlation_data: Option<Vec<u8>>,
}

/// ISO-8601 UTC timestamp with millisecond precision.
pub fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_error_response_omits_result() {
        let resp = CommandResponse::error(ErrorCode::InvalidCommand, "Unknown command: foo")
            .correlated(b"abc");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error_code"], "INVALID_COMMAND");
        assert_eq!(json["error_message"], "Unknown command: foo");
        assert_eq!(json["correlation_data"], "abc");
        assert!(json.get("result").is_none());
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_success_response_omits_error_fields() {
        let resp = CommandResponse::success(json!({"mode": "CW"}));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["result"]["mode"], "CW");
        assert!(json.get("error_code").is_none());
        assert!(json.get("error_message").is_none());
        assert_eq!(json["correlation_data"], "");
    }

    #[test]
    fn test_param_value_from_json() {
        assert_eq!(ParamValue::from(json!(14074000)), ParamValue::Int(14_074_000));
        assert_eq!(ParamValue::from(json!(7.5)), ParamValue::Float(7.5));
        assert_eq!(ParamValue::from(json!("A")), ParamValue::Str("A".into()));
        assert_eq!(ParamValue::from(json!(true)), ParamValue::Bool(true));
        assert_eq!(ParamValue::from(Value::Null), ParamValue::Null);
        assert!(matches!(
            ParamValue::from(json!(u64::MAX)),
            ParamValue::Other(_)
        ));
    }

    #[test]
    fn test_param_lookup_ignores_case() {
        let mut msg = CommandMessage::default();
        msg.parameters.insert("Frequency".into(), ParamValue::Int(1));
        assert_eq!(msg.param("frequency"), Some(&ParamValue::Int(1)));
        assert_eq!(msg.param("vfo"), None);
    }

    #[test]
    fn test_event_notification_fields() {
        let event = EventNotification::new("error", "boom");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "error");
        assert_eq!(json["message"], "boom");
        assert!(json["timestamp"].is_string());
    }
}
