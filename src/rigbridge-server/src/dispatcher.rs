// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Command dispatch: validate a request, drive the radio, build the reply.
//!
//! Requests are independent of each other. Every failure ends up as an
//! error response; nothing escapes [`CommandDispatcher::handle`].

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use rigbridge_core::{RadioAdapter, RadioError, RigMode, RigSelector, Vfo};
use rigbridge_protocol::{CommandMessage, CommandResponse, ErrorCode, ParamValue};

/// Why a command could not be carried out.
#[derive(Debug, Clone, PartialEq)]
struct CommandError {
    code: ErrorCode,
    message: String,
}

impl CommandError {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<RadioError> for CommandError {
    fn from(err: RadioError) -> Self {
        let code = match err {
            RadioError::InvalidMode(_) => ErrorCode::InvalidMode,
            _ => ErrorCode::CommandFailed,
        };
        Self::new(code, err.to_string())
    }
}

type CommandResult = Result<Value, CommandError>;

#[derive(Clone)]
pub struct CommandDispatcher {
    adapter: RadioAdapter,
}

impl CommandDispatcher {
    pub fn new(adapter: RadioAdapter) -> Self {
        Self { adapter }
    }

    /// Execute one command against the radio addressed by `rig_id`.
    pub async fn handle(&self, msg: &CommandMessage, rig_id: &str) -> CommandResponse {
        if msg.command.trim().is_empty() {
            warn!("Received command is null or empty");
            return CommandResponse::error(
                ErrorCode::InvalidCommand,
                "Received command is null or empty",
            )
            .correlated(&msg.correlation_data);
        }

        let selector = self.adapter.selector_for(rig_id);
        info!("Handling command {} for rig {}", msg.command, rig_id);
        debug!("Command parameters: {:?}", msg.parameters);

        let outcome = match msg.command.to_ascii_lowercase().as_str() {
            "set_frequency" => self.set_frequency(msg, selector).await,
            "set_mode" => self.set_mode(msg, selector).await,
            "set_ptt" => set_ptt(msg, rig_id),
            "get_status" => self.get_status(selector).await,
            _ => Err(CommandError::new(
                ErrorCode::InvalidCommand,
                format!("Unknown command: {}", msg.command),
            )),
        };

        let response = match outcome {
            Ok(result) => CommandResponse::success(result),
            Err(err) => {
                warn!("Command {} for rig {} failed: {}", msg.command, rig_id, err.message);
                CommandResponse::error(err.code, err.message)
            }
        };
        response.correlated(&msg.correlation_data)
    }

    async fn set_frequency(&self, msg: &CommandMessage, selector: RigSelector) -> CommandResult {
        let frequency = match required(msg, "frequency")? {
            ParamValue::Int(hz) if *hz > 0 => *hz,
            ParamValue::Int(hz) => {
                return Err(CommandError::new(
                    ErrorCode::InvalidParameter,
                    format!("Parameter 'frequency' must be positive, got {hz}."),
                ))
            }
            other => return Err(wrong_type("frequency", "an integer", other)),
        };

        let (vfo, vfo_text) = match msg.param("vfo") {
            None => (Vfo::A, Vfo::A.as_str().to_string()),
            Some(ParamValue::Str(text)) => {
                let vfo = text
                    .parse::<Vfo>()
                    .map_err(|e| CommandError::new(ErrorCode::InvalidParameter, e.to_string()))?;
                (vfo, text.clone())
            }
            Some(other) => return Err(wrong_type("vfo", "a string", other)),
        };

        self.adapter.set_frequency(selector, vfo, frequency).await?;
        info!(
            "Set VFO {} frequency to {} Hz on rig {}",
            vfo,
            frequency,
            selector.number()
        );
        Ok(json!({ "frequency": frequency, "vfo": vfo_text }))
    }

    async fn set_mode(&self, msg: &CommandMessage, selector: RigSelector) -> CommandResult {
        let text = match required(msg, "mode")? {
            ParamValue::Str(text) => text,
            other => return Err(wrong_type("mode", "a string", other)),
        };
        let mode = text
            .parse::<RigMode>()
            .map_err(|_| CommandError::new(ErrorCode::InvalidMode, format!("Invalid mode: {text}")))?;

        self.adapter.set_mode(selector, mode).await?;
        info!("Set mode to {} on rig {}", mode, selector.number());
        Ok(json!({ "mode": text }))
    }

    async fn get_status(&self, selector: RigSelector) -> CommandResult {
        let snapshot = self.adapter.poll(selector).await?;
        serde_json::to_value(&snapshot)
            .map_err(|e| CommandError::new(ErrorCode::CommandFailed, e.to_string()))
    }
}

/// PTT control is acknowledged but not driven.
fn set_ptt(msg: &CommandMessage, rig_id: &str) -> CommandResult {
    let ptt = match required(msg, "ptt")? {
        ParamValue::Bool(ptt) => *ptt,
        other => return Err(wrong_type("ptt", "a boolean", other)),
    };
    info!("PTT {} requested for rig {}", ptt, rig_id);
    Ok(json!({ "ptt": ptt }))
}

fn required<'a>(msg: &'a CommandMessage, name: &str) -> Result<&'a ParamValue, CommandError> {
    match msg.param(name) {
        None => Err(CommandError::new(
            ErrorCode::CommandFailed,
            format!("Parameter '{name}' is missing."),
        )),
        Some(ParamValue::Null) => Err(CommandError::new(
            ErrorCode::MissingParameter,
            format!("Parameter '{name}' is null."),
        )),
        Some(value) => Ok(value),
    }
}

fn wrong_type(name: &str, expected: &str, got: &ParamValue) -> CommandError {
    CommandError::new(
        ErrorCode::InvalidParameter,
        format!("Parameter '{name}' must be {expected}, got {}.", got.type_name()),
    )
}
