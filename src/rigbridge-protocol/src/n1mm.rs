// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Contest-logger UDP broadcast format.
//!
//! Outbound datagrams are `RadioInfo` documents. The only inbound
//! document understood is `radio_setfrequency`, whose `frequency`
//! element carries kHz.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use rigbridge_core::RadioSnapshot;

use crate::error::ProtocolError;

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n";

/// Station fields that do not come from the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationInfo {
    pub app: String,
    pub station_name: String,
    pub op_call: String,
}

impl Default for StationInfo {
    fn default() -> Self {
        Self {
            app: "N1MM-Gen".to_string(),
            station_name: "Test".to_string(),
            op_call: "LB1TI".to_string(),
        }
    }
}

/// Command decoded from an inbound datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerCommand {
    /// Tune VFO A.
    SetFrequency { hz: i64 },
}

fn xml_err<E: std::fmt::Display>(e: E) -> ProtocolError {
    ProtocolError::Xml(e.to_string())
}

fn flag(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// Render the `RadioInfo` document for one snapshot.
pub fn radio_info_xml(
    snapshot: &RadioSnapshot,
    station: &StationInfo,
) -> Result<String, ProtocolError> {
    let freq = snapshot.freq.to_string();
    let tx_freq = snapshot.tx_freq.to_string();
    let active = snapshot.active_radio_nr.to_string();
    let fields: [(&str, &str); 22] = [
        ("app", station.app.as_str()),
        ("StationName", station.station_name.as_str()),
        ("RadioNr", "1"),
        ("Freq", freq.as_str()),
        ("TXFreq", tx_freq.as_str()),
        ("Mode", snapshot.mode.as_str()),
        ("OpCall", station.op_call.as_str()),
        ("IsRunning", "False"),
        ("FocusEntry", "204626"),
        ("EntryWindowHwnd", "275678"),
        ("Antenna", "8"),
        ("Rotors", ""),
        ("FocusRadioNr", "1"),
        ("IsStereo", "False"),
        ("IsSplit", flag(snapshot.is_split)),
        ("ActiveRadioNr", active.as_str()),
        ("IsTransmitting", flag(snapshot.is_transmitting)),
        ("FunctionKeyCaption", ""),
        ("RadioName", ""),
        ("AuxAntSelected", "-1"),
        ("AuxAntSelectedName", ""),
        ("IsConnected", flag(snapshot.is_connected)),
    ];

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Start(BytesStart::new("RadioInfo")))
        .map_err(xml_err)?;
    for (name, value) in fields {
        writer
            .write_event(Event::Start(BytesStart::new(name)))
            .map_err(xml_err)?;
        writer
            .write_event(Event::Text(BytesText::new(value)))
            .map_err(xml_err)?;
        writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(xml_err)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("RadioInfo")))
        .map_err(xml_err)?;

    let body = String::from_utf8(writer.into_inner()).map_err(xml_err)?;
    Ok(format!("{XML_DECLARATION}{body}"))
}

/// Decode an inbound datagram. Documents with any other root element are
/// not for us and yield `Ok(None)`.
pub fn parse_datagram(datagram: &[u8]) -> Result<Option<LoggerCommand>, ProtocolError> {
    let text = std::str::from_utf8(datagram)
        .map_err(|e| ProtocolError::Xml(format!("datagram is not UTF-8: {e}")))?;
    let mut reader = Reader::from_str(text);

    let mut depth = 0usize;
    let mut in_frequency = false;
    let mut frequency: Option<String> = None;
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => {
                depth += 1;
                if depth == 1 && e.name().as_ref() != b"radio_setfrequency" {
                    return Ok(None);
                }
                in_frequency = depth == 2 && e.name().as_ref() == b"frequency";
            }
            Event::Empty(e) => {
                if depth == 0 && e.name().as_ref() != b"radio_setfrequency" {
                    return Ok(None);
                }
            }
            Event::Text(t) if in_frequency => {
                let value = t.unescape().map_err(xml_err)?;
                frequency.get_or_insert_with(String::new).push_str(&value);
            }
            Event::End(_) => {
                in_frequency = false;
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let raw = frequency
        .ok_or_else(|| ProtocolError::Shape("radio_setfrequency without frequency".into()))?;
    let khz: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ProtocolError::Shape(format!("invalid frequency: {:?}", raw.trim())))?;
    if !khz.is_finite() {
        return Err(ProtocolError::Shape(format!("invalid frequency: {khz}")));
    }
    Ok(Some(LoggerCommand::SetFrequency {
        hz: khz_to_hz(khz),
    }))
}

/// Convert kHz to the nearest whole Hz.
pub fn khz_to_hz(khz: f64) -> i64 {
    (khz * 1000.0).round() as i64
}
