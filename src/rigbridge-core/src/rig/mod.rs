// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::rig::mode::NativeMode;
use crate::rig::response::{RadioError, RadioResult};

pub mod adapter;
pub mod mode;
pub mod policies;
pub mod response;
pub mod state;
pub mod status_reply;

/// Raw state read from a link in one pass, still in native codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkState {
    pub rx_hz: i64,
    pub tx_hz: i64,
    pub mode: NativeMode,
    pub transmitting: bool,
    pub split: bool,
    pub online: bool,
    pub rig_type: String,
}

/// Unsolicited notification raised by a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Reply to a command previously sent with [`RadioLink::send_custom`].
    CustomReply { command: String, reply: String },
}

/// Capability exposed by a radio-control binding.
///
/// Calls are synchronous and bounded by the binding's own I/O timeout.
/// Callers never issue two calls on the same link at once.
pub trait RadioLink: Send {
    /// Model name reported by the driver.
    fn rig_type(&self) -> String;

    /// Liveness probe run before every read or write.
    fn is_alive(&mut self) -> bool;

    fn read_state(&mut self) -> RadioResult<LinkState>;

    fn set_frequency(&mut self, vfo: Vfo, hz: i64) -> RadioResult<()>;

    fn set_mode(&mut self, mode: NativeMode) -> RadioResult<()>;

    /// Send `command` followed by `terminator`. Replies, if any, arrive
    /// as [`LinkEvent::CustomReply`] on the subscribed channel.
    fn send_custom(&mut self, command: &str, terminator: char) -> RadioResult<()>;

    /// Register the channel that receives asynchronous events.
    fn subscribe(&mut self, _events: mpsc::UnboundedSender<LinkEvent>) {}
}

/// Tunable frequency register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Vfo {
    A,
    B,
}

impl Vfo {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vfo::A => "A",
            Vfo::B => "B",
        }
    }
}

impl fmt::Display for Vfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vfo {
    type Err = RadioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Vfo::A),
            "B" => Ok(Vfo::B),
            other => Err(RadioError::link(format!(
                "Invalid VFO specified: {other}. Use 'A' or 'B'."
            ))),
        }
    }
}

/// Which of the two radio slots a request addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RigSelector {
    Rig1,
    Rig2,
}

impl RigSelector {
    /// Rig id `"2"` addresses the second radio, anything else the first.
    pub fn from_rig_id(rig_id: &str) -> Self {
        if rig_id.trim() == "2" {
            RigSelector::Rig2
        } else {
            RigSelector::Rig1
        }
    }

    pub fn number(&self) -> u8 {
        match self {
            RigSelector::Rig1 => 1,
            RigSelector::Rig2 => 2,
        }
    }

    pub fn index(&self) -> usize {
        usize::from(self.number() - 1)
    }

    /// Radio the logger should treat as active: this one while it is
    /// online, the other one otherwise.
    pub fn active_radio_nr(&self, online: bool) -> u8 {
        match (self, online) {
            (RigSelector::Rig1, true) | (RigSelector::Rig2, false) => 1,
            (RigSelector::Rig1, false) | (RigSelector::Rig2, true) => 2,
        }
    }
}
