// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::{Deserialize, Serialize};

use crate::rig::mode::RigMode;
use crate::rig::status_reply::StatusReply;
use crate::rig::{LinkState, RigSelector};

/// Point-in-time radio state. Never mutated, only superseded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RadioSnapshot {
    pub freq: i64,
    pub tx_freq: i64,
    pub mode: RigMode,
    pub is_transmitting: bool,
    pub is_split: bool,
    pub is_connected: bool,
    pub active_radio_nr: u8,
    pub radio_name: String,
}

impl RadioSnapshot {
    pub fn from_link(selector: RigSelector, state: LinkState) -> Self {
        Self {
            freq: state.rx_hz,
            tx_freq: state.tx_hz,
            mode: RigMode::from_native(state.mode),
            is_transmitting: state.transmitting,
            is_split: state.split,
            is_connected: state.online,
            active_radio_nr: selector.active_radio_nr(state.online),
            radio_name: state.rig_type,
        }
    }

    /// Fold a decoded status reply on top of `previous`. The reply carries
    /// a single frequency, so receive and transmit both take it. Without a
    /// previous snapshot the radio that just answered counts as connected
    /// under `radio_name`.
    pub fn with_status_reply(
        selector: RigSelector,
        previous: Option<&RadioSnapshot>,
        reply: &StatusReply,
        radio_name: &str,
    ) -> Self {
        let base = previous.cloned().unwrap_or_else(|| RadioSnapshot {
            is_connected: true,
            active_radio_nr: selector.active_radio_nr(true),
            radio_name: radio_name.to_string(),
            ..RadioSnapshot::offline(selector)
        });
        Self {
            freq: reply.frequency_hz,
            tx_freq: reply.frequency_hz,
            mode: reply.mode,
            is_transmitting: reply.transmitting,
            ..base
        }
    }

    pub fn offline(selector: RigSelector) -> Self {
        Self {
            freq: 0,
            tx_freq: 0,
            mode: RigMode::Unknown,
            is_transmitting: false,
            is_split: false,
            is_connected: false,
            active_radio_nr: selector.active_radio_nr(false),
            radio_name: String::new(),
        }
    }
}
