// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! JSON codec for command payloads.

use serde::Serialize;
use serde_json::Value;

use crate::error::ProtocolError;
use crate::types::{CommandMessage, ParamValue};

/// Parse an inbound command payload.
///
/// Top-level field names are matched ignoring ASCII case. A missing or
/// `null` command parses as an empty name, and a missing or `null`
/// parameter object as an empty map. The correlation token is left empty
/// for the transport layer to fill in.
pub fn parse_command_message(payload: &[u8]) -> Result<CommandMessage, ProtocolError> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| ProtocolError::Shape(format!("payload is not UTF-8: {e}")))?;
    let root: Value = serde_json::from_str(text)?;
    let Value::Object(fields) = root else {
        return Err(ProtocolError::Shape("payload is not a JSON object".into()));
    };

    let mut msg = CommandMessage::default();
    for (key, value) in fields {
        match key.to_ascii_lowercase().as_str() {
            "command" => match value {
                Value::String(s) => msg.command = s,
                Value::Null => {}
                other => {
                    return Err(ProtocolError::Shape(format!(
                        "command must be a string, got {other}"
                    )))
                }
            },
            "parameters" => match value {
                Value::Object(params) => {
                    msg.parameters = params
                        .into_iter()
                        .map(|(name, value)| (name, ParamValue::from(value)))
                        .collect();
                }
                Value::Null => {}
                other => {
                    return Err(ProtocolError::Shape(format!(
                        "parameters must be an object, got {other}"
                    )))
                }
            },
            "timestamp" => match value {
                Value::String(s) => msg.timestamp = Some(s),
                Value::Null => {}
                other => {
                    return Err(ProtocolError::Shape(format!(
                        "timestamp must be a string, got {other}"
                    )))
                }
            },
            _ => {}
        }
    }
    Ok(msg)
}

/// Serialize any outbound body to a JSON payload.
pub fn to_payload<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(value)?)
}
