// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Canonical operating modes and the code tables that translate them.
//!
//! Two code families reach this crate: the radio-automation mode parameter
//! (a bit flag per mode, see [`NativeMode`]) used by link bindings, and the
//! 2-digit mode field of the fixed-width status reply.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::rig::response::RadioError;

/// Mode vocabulary shared by every protocol this bridge speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RigMode {
    #[serde(rename = "CW")]
    Cw,
    #[serde(rename = "CW-R")]
    CwR,
    #[serde(rename = "USB")]
    Usb,
    #[serde(rename = "LSB")]
    Lsb,
    #[serde(rename = "USB-D")]
    UsbD,
    #[serde(rename = "LSB-D")]
    LsbD,
    #[serde(rename = "AM")]
    Am,
    #[serde(rename = "FM")]
    Fm,
    #[serde(rename = "Unknown")]
    Unknown,
}

/// Radio-automation mode parameter, one bit per mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeMode(pub u32);

impl NativeMode {
    pub const CW_U: NativeMode = NativeMode(0x0080_0000);
    pub const CW_L: NativeMode = NativeMode(0x0100_0000);
    pub const SSB_U: NativeMode = NativeMode(0x0200_0000);
    pub const SSB_L: NativeMode = NativeMode(0x0400_0000);
    pub const DIG_U: NativeMode = NativeMode(0x0800_0000);
    pub const DIG_L: NativeMode = NativeMode(0x1000_0000);
    pub const AM: NativeMode = NativeMode(0x2000_0000);
    pub const FM: NativeMode = NativeMode(0x4000_0000);
}

/// Fixed bidirectional table between native codes and canonical modes.
const NATIVE_TABLE: [(NativeMode, RigMode); 8] = [
    (NativeMode::CW_U, RigMode::Cw),
    (NativeMode::CW_L, RigMode::CwR),
    (NativeMode::SSB_U, RigMode::Usb),
    (NativeMode::SSB_L, RigMode::Lsb),
    (NativeMode::DIG_U, RigMode::UsbD),
    (NativeMode::DIG_L, RigMode::LsbD),
    (NativeMode::AM, RigMode::Am),
    (NativeMode::FM, RigMode::Fm),
];

/// Mode field of the status reply: 1 LSB, 2 USB, 3 CW, 4 FM, 5 AM,
/// 6 FSK, 7 CW-R, 9 FSK-R.
const STATUS_CODE_TABLE: [(u8, RigMode); 8] = [
    (1, RigMode::Lsb),
    (2, RigMode::Usb),
    (3, RigMode::Cw),
    (4, RigMode::Fm),
    (5, RigMode::Am),
    (6, RigMode::LsbD),
    (7, RigMode::CwR),
    (9, RigMode::UsbD),
];

impl RigMode {
    /// All modes that may be written to a radio.
    pub const CANONICAL: [RigMode; 8] = [
        RigMode::Cw,
        RigMode::CwR,
        RigMode::Usb,
        RigMode::Lsb,
        RigMode::UsbD,
        RigMode::LsbD,
        RigMode::Am,
        RigMode::Fm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RigMode::Cw => "CW",
            RigMode::CwR => "CW-R",
            RigMode::Usb => "USB",
            RigMode::Lsb => "LSB",
            RigMode::UsbD => "USB-D",
            RigMode::LsbD => "LSB-D",
            RigMode::Am => "AM",
            RigMode::Fm => "FM",
            RigMode::Unknown => "Unknown",
        }
    }

    /// Decode a native code. Unrecognised codes read as `Unknown`.
    pub fn from_native(code: NativeMode) -> RigMode {
        NATIVE_TABLE
            .iter()
            .find(|(native, _)| *native == code)
            .map(|(_, mode)| *mode)
            .unwrap_or(RigMode::Unknown)
    }

    /// Encode for writing. `Unknown` cannot be written.
    pub fn to_native(self) -> Result<NativeMode, RadioError> {
        NATIVE_TABLE
            .iter()
            .find(|(_, mode)| *mode == self)
            .map(|(native, _)| *native)
            .ok_or_else(|| RadioError::InvalidMode(self.as_str().to_string()))
    }

    pub fn from_status_code(code: u8) -> RigMode {
        STATUS_CODE_TABLE
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, mode)| *mode)
            .unwrap_or(RigMode::Unknown)
    }

    pub fn to_status_code(self) -> Result<u8, RadioError> {
        STATUS_CODE_TABLE
            .iter()
            .find(|(_, mode)| *mode == self)
            .map(|(c, _)| *c)
            .ok_or_else(|| RadioError::InvalidMode(self.as_str().to_string()))
    }
}

impl fmt::Display for RigMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RigMode {
    type Err = RadioError;

    /// Parse one of the canonical mode strings (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RigMode::CANONICAL
            .iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| RadioError::InvalidMode(s.to_string()))
    }
}
