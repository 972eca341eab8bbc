// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Fixed-width reply to the `IF;` status query.
//!
//! Layout (0-based byte offsets):
//!
//! | field           | offset | width |
//! |-----------------|--------|-------|
//! | frequency (Hz)  | 2      | 11    |
//! | mode code       | 13     | 2     |
//! | RIT on          | 15     | 1     |
//! | XIT on          | 16     | 1     |
//! | memory channel  | 17     | 2     |
//! | TX              | 19     | 1     |
//! | band            | 20     | 2     |
//! | VFO/memory      | 22     | 1     |
//!
//! The reply is padded to at least [`MIN_REPLY_LEN`] characters.

use crate::rig::mode::RigMode;
use crate::rig::response::{RadioError, RadioResult};

/// The only custom command whose reply updates the snapshot.
pub const STATUS_QUERY: &str = "IF;";

pub const MIN_REPLY_LEN: usize = 38;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReply {
    pub frequency_hz: i64,
    pub mode: RigMode,
    pub rit: bool,
    pub xit: bool,
    pub memory_channel: u8,
    pub transmitting: bool,
    pub band: u8,
    /// `true` when tuned from a VFO, `false` in memory mode.
    pub vfo_mode: bool,
}

impl StatusReply {
    pub fn decode(reply: &str) -> RadioResult<Self> {
        if reply.len() < MIN_REPLY_LEN || !reply.is_ascii() {
            return Err(RadioError::MalformedReply(format!(
                "expected at least {MIN_REPLY_LEN} characters, got {}",
                reply.len()
            )));
        }
        let bytes = reply.as_bytes();

        Ok(Self {
            frequency_hz: digits(reply, 2, 11)?,
            mode: RigMode::from_status_code(digits(reply, 13, 2)? as u8),
            rit: bytes[15] == b'1',
            xit: bytes[16] == b'1',
            memory_channel: digits(reply, 17, 2)? as u8,
            transmitting: bytes[19] == b'1',
            band: digits(reply, 20, 2)? as u8,
            vfo_mode: bytes[22] == b'0',
        })
    }

    /// Render the reply a radio would send, `;`-terminated.
    pub fn encode(&self) -> String {
        let mode = self.mode.to_status_code().unwrap_or(0);
        let mut out = format!(
            "IF{:011}{:02}{}{}{:02}{}{:02}{}",
            self.frequency_hz.clamp(0, 99_999_999_999),
            mode,
            u8::from(self.rit),
            u8::from(self.xit),
            self.memory_channel.min(99),
            u8::from(self.transmitting),
            self.band.min(99),
            if self.vfo_mode { '0' } else { '1' },
        );
        while out.len() < MIN_REPLY_LEN - 1 {
            out.push('0');
        }
        out.push(';');
        out
    }
}

fn digits(reply: &str, start: usize, len: usize) -> RadioResult<i64> {
    let field = &reply[start..start + len];
    if !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RadioError::MalformedReply(format!(
            "non-numeric field at offset {start}: {field:?}"
        )));
    }
    field
        .parse::<i64>()
        .map_err(|e| RadioError::MalformedReply(e.to_string()))
}
