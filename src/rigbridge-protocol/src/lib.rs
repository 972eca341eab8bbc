// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Wire formats spoken by rigbridge.
//!
//! This crate holds the MQTT command/response payloads and topic layout,
//! plus the XML datagrams exchanged with contest loggers over UDP.

pub mod codec;
pub mod error;
pub mod n1mm;
pub mod topics;
pub mod types;

// Re-export commonly used items
pub use codec::{parse_command_message, to_payload};
pub use error::ProtocolError;
pub use n1mm::{parse_datagram, radio_info_xml, LoggerCommand, StationInfo};
pub use types::{
    utc_timestamp, CommandMessage, CommandResponse, ErrorCode, EventNotification,
    InboundMessage, OutboundMessage, ParamValue, Qos, ResponseStatus,
};
