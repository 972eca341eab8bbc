// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for rigbridge-server.
//!
//! Config is loaded from the `[rigbridge]` section of `rigbridge.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./rigbridge.toml`
//! 3. `~/.config/rigbridge/rigbridge.toml`
//! 4. `/etc/rigbridge/rigbridge.toml`
//!
//! When none of them exists the defaults are written to `./rigbridge.toml`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use rigbridge_app::ConfigFile;
use rigbridge_backend::RigAccess;
use rigbridge_protocol::StationInfo;

/// Top-level server configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// General settings
    pub general: GeneralConfig,
    /// Contest-logger datagram destination
    pub udp_sender: UdpSenderConfig,
    /// Contest-logger frequency-set listener
    pub udp_receiver: UdpReceiverConfig,
    /// MQTT broker session
    pub mqtt: MqttConfig,
    /// Frequent/sporadic radio info cadence
    pub publisher: PublisherConfig,
    /// Foreground logger loop
    pub logger: LoggerConfig,
    /// First radio
    pub rig1: RigConfig,
    /// Optional second radio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rig2: Option<RigConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpSenderConfig {
    /// IPv4 address or host name of the logger
    pub address: String,
    pub port: u16,
}

impl Default for UdpSenderConfig {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            port: 12060,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpReceiverConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for UdpReceiverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 12060,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub address: String,
    pub port: u16,
    /// Connect through `ws://<address>:<port>/mqtt` instead of plain TCP
    pub use_websockets: bool,
    /// Label used in logs
    pub connection_name: String,
    pub client_id: String,
    /// Credentials are sent only when both are non-empty
    pub username: String,
    pub password: String,
    pub keep_alive_secs: u64,
    /// First delay before reconnecting a dropped session
    pub reconnect_delay_secs: u64,
    /// Upper bound for the doubling reconnect delay
    pub reconnect_max_delay_secs: u64,
    /// How long startup waits for the first connection
    pub connect_timeout_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            port: 1883,
            use_websockets: false,
            connection_name: "Connection Name".to_string(),
            client_id: "OmniRigClient".to_string(),
            username: String::new(),
            password: String::new(),
            keep_alive_secs: 30,
            reconnect_delay_secs: 5,
            reconnect_max_delay_secs: 60,
            connect_timeout_secs: 30,
        }
    }
}

impl MqttConfig {
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.username.is_empty() || self.password.is_empty() {
            None
        } else {
            Some((&self.username, &self.password))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub frequent_interval_ms: u64,
    pub sporadic_interval_secs: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            frequent_interval_ms: 100,
            sporadic_interval_secs: 120,
        }
    }
}

impl PublisherConfig {
    pub fn frequent_interval(&self) -> Duration {
        Duration::from_millis(self.frequent_interval_ms)
    }

    pub fn sporadic_interval(&self) -> Duration {
        Duration::from_secs(self.sporadic_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub interval_ms: u64,
    /// Identical datagrams are resent after this long
    pub resend_after_secs: u64,
    pub station_name: String,
    pub op_call: String,
    pub app: String,
    /// Pause after a failed cycle
    pub error_backoff_secs: u64,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            resend_after_secs: 5,
            station_name: "Test".to_string(),
            op_call: "LB1TI".to_string(),
            app: "N1MM-Gen".to_string(),
            error_backoff_secs: 5,
        }
    }
}

impl LoggerConfig {
    pub fn station(&self) -> StationInfo {
        StationInfo {
            app: self.app.clone(),
            station_name: self.station_name.clone(),
            op_call: self.op_call.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    /// Link backend (e.g. "dummy", "kenwood")
    pub backend: String,
    pub access: AccessConfig,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            backend: "dummy".to_string(),
            access: AccessConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Access type: "serial" or "none"
    #[serde(rename = "type")]
    pub access_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baud: Option<u32>,
    pub timeout_ms: u64,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            access_type: "none".to_string(),
            port: None,
            baud: None,
            timeout_ms: 500,
        }
    }
}

impl AccessConfig {
    /// Call only after [`ServerConfig::validate`] succeeded.
    pub fn to_rig_access(&self) -> Result<RigAccess, String> {
        match self.access_type.as_str() {
            "none" => Ok(RigAccess::None),
            "serial" => match (&self.port, self.baud) {
                (Some(path), Some(baud)) => Ok(RigAccess::Serial {
                    path: path.clone(),
                    baud,
                    timeout: Duration::from_millis(self.timeout_ms),
                }),
                _ => Err("serial access requires port and baud".to_string()),
            },
            other => Err(format!("unknown access type '{other}'")),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.general.log_level.as_deref())?;

        if self.udp_sender.address.trim().is_empty() {
            return Err("[udp_sender].address must not be empty".to_string());
        }
        if self.udp_sender.port == 0 {
            return Err("[udp_sender].port must be > 0".to_string());
        }
        if self.udp_receiver.enabled && self.udp_receiver.port == 0 {
            return Err("[udp_receiver].port must be > 0 when the receiver is enabled".to_string());
        }

        if self.mqtt.address.trim().is_empty() {
            return Err("[mqtt].address must not be empty".to_string());
        }
        if self.mqtt.port == 0 {
            return Err("[mqtt].port must be > 0".to_string());
        }
        if self.mqtt.client_id.trim().is_empty() {
            return Err("[mqtt].client_id must not be empty".to_string());
        }
        if self.mqtt.keep_alive_secs == 0 {
            return Err("[mqtt].keep_alive_secs must be > 0".to_string());
        }
        if self.mqtt.reconnect_delay_secs == 0 {
            return Err("[mqtt].reconnect_delay_secs must be > 0".to_string());
        }
        if self.mqtt.connect_timeout_secs == 0 {
            return Err("[mqtt].connect_timeout_secs must be > 0".to_string());
        }

        if self.publisher.frequent_interval_ms == 0 {
            return Err("[publisher].frequent_interval_ms must be > 0".to_string());
        }
        if self.publisher.sporadic_interval_secs == 0 {
            return Err("[publisher].sporadic_interval_secs must be > 0".to_string());
        }

        if self.logger.interval_ms == 0 {
            return Err("[logger].interval_ms must be > 0".to_string());
        }

        validate_rig("rig1", &self.rig1)?;
        if let Some(rig2) = &self.rig2 {
            validate_rig("rig2", rig2)?;
        }
        Ok(())
    }

    /// Generate an example configuration wrapped under the `[rigbridge]`
    /// section header, suitable for use in `rigbridge.toml`.
    pub fn example_combined_toml() -> String {
        #[derive(serde::Serialize)]
        struct Wrapper {
            #[serde(rename = "rigbridge")]
            inner: ServerConfig,
        }
        let example = ServerConfig {
            general: GeneralConfig {
                log_level: Some("info".to_string()),
            },
            rig1: RigConfig {
                backend: "kenwood".to_string(),
                access: AccessConfig {
                    access_type: "serial".to_string(),
                    port: Some("/dev/ttyUSB0".to_string()),
                    baud: Some(9600),
                    timeout_ms: 500,
                },
            },
            rig2: Some(RigConfig::default()),
            ..ServerConfig::default()
        };
        toml::to_string_pretty(&Wrapper { inner: example }).unwrap_or_default()
    }
}

fn validate_log_level(level: Option<&str>) -> Result<(), String> {
    if let Some(level) = level {
        match level {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(format!(
                    "[general].log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
                    level
                ))
            }
        }
    }
    Ok(())
}

fn validate_rig(section: &str, rig: &RigConfig) -> Result<(), String> {
    if rig.backend.trim().is_empty() {
        return Err(format!("[{section}].backend must not be empty"));
    }
    let access = &rig.access;
    match access.access_type.as_str() {
        "none" => {}
        "serial" => {
            if access.port.as_deref().unwrap_or("").trim().is_empty() {
                return Err(format!(
                    "[{section}.access].port must be set for serial access ([{section}.access].type='serial')"
                ));
            }
            if access.baud.unwrap_or(0) == 0 {
                return Err(format!(
                    "[{section}.access].baud must be > 0 for serial access ([{section}.access].type='serial')"
                ));
            }
            if access.timeout_ms == 0 {
                return Err(format!("[{section}.access].timeout_ms must be > 0"));
            }
        }
        other => {
            return Err(format!(
                "[{section}.access].type '{}' is invalid (expected 'serial' or 'none')",
                other
            ))
        }
    }
    Ok(())
}

impl ConfigFile for ServerConfig {
    fn section_key() -> &'static str {
        "rigbridge"
    }
}
