// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Kenwood-style ASCII CAT over a serial port.
//!
//! Every command is `;`-terminated. Queries are answered with the command
//! prefix followed by data and `;`. Writes are not acknowledged.

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use rigbridge_core::{
    DynResult, LinkEvent, LinkState, NativeMode, RadioError, RadioLink, RadioResult, RigMode, Vfo,
};

/// Byte stream the link talks over.
pub trait CatPort: Read + Write + Send {}

impl<T: Read + Write + Send> CatPort for T {}

pub struct KenwoodLink {
    port: Box<dyn CatPort>,
    events: Option<mpsc::UnboundedSender<LinkEvent>>,
}

impl KenwoodLink {
    pub fn open(path: &str, baud: u32, timeout: Duration) -> DynResult<Self> {
        let port = tokio_serial::new(path, baud).timeout(timeout).open()?;
        debug!("Opened Kenwood CAT port {} at {} baud", path, baud);
        Ok(Self::with_port(Box::new(port)))
    }

    pub fn with_port(port: Box<dyn CatPort>) -> Self {
        Self { port, events: None }
    }

    fn write_cmd(&mut self, cmd: &str) -> RadioResult<()> {
        self.port.write_all(cmd.as_bytes())?;
        self.port.flush()?;
        Ok(())
    }

    /// Read up to and including the next `;`.
    fn read_response(&mut self) -> RadioResult<String> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.port.read(&mut byte) {
                Ok(0) => return Err(RadioError::link("CAT port closed")),
                Ok(_) => {
                    buf.push(byte[0]);
                    if byte[0] == b';' {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn query(&mut self, cmd: &str) -> RadioResult<String> {
        self.write_cmd(cmd)?;
        let resp = self.read_response()?;
        let prefix = cmd.trim_end_matches(';');
        if resp == "?;" {
            return Err(RadioError::link(format!("radio rejected {cmd}")));
        }
        resp.strip_prefix(prefix)
            .and_then(|data| data.strip_suffix(';'))
            .map(str::to_string)
            .ok_or_else(|| RadioError::link(format!("unexpected reply to {cmd}: {resp}")))
    }

    fn read_number(&mut self, cmd: &str) -> RadioResult<i64> {
        let data = self.query(cmd)?;
        data.trim()
            .parse()
            .map_err(|_| RadioError::link(format!("CAT {cmd} parse failed: {data:?}")))
    }
}

impl RadioLink for KenwoodLink {
    fn rig_type(&self) -> String {
        "Kenwood".to_string()
    }

    fn is_alive(&mut self) -> bool {
        match self.query("FA;") {
            Ok(_) => true,
            Err(e) => {
                debug!("Kenwood liveness probe failed: {}", e);
                false
            }
        }
    }

    fn read_state(&mut self) -> RadioResult<LinkState> {
        let vfo_a = self.read_number("FA;")?;
        let vfo_b = self.read_number("FB;")?;
        let mode_code = self.read_number("MD;")?;
        let rx_vfo = self.read_number("FR;")?;
        let tx_vfo = self.read_number("FT;")?;
        let transmitting = self.read_number("TQ;")? == 1;

        let pick = |vfo: i64| if vfo == 1 { vfo_b } else { vfo_a };
        let mode = RigMode::from_status_code(u8::try_from(mode_code).unwrap_or(0))
            .to_native()
            .unwrap_or(NativeMode(0));
        Ok(LinkState {
            rx_hz: pick(rx_vfo),
            tx_hz: pick(tx_vfo),
            mode,
            transmitting,
            split: rx_vfo != tx_vfo,
            online: true,
            rig_type: self.rig_type(),
        })
    }

    fn set_frequency(&mut self, vfo: Vfo, hz: i64) -> RadioResult<()> {
        let cmd = match vfo {
            Vfo::A => "FA",
            Vfo::B => "FB",
        };
        self.write_cmd(&format!("{cmd}{hz:011};"))
    }

    fn set_mode(&mut self, mode: NativeMode) -> RadioResult<()> {
        let code = RigMode::from_native(mode).to_status_code()?;
        self.write_cmd(&format!("MD{code};"))
    }

    fn send_custom(&mut self, command: &str, terminator: char) -> RadioResult<()> {
        let full = format!("{command}{terminator}");
        self.write_cmd(&full)?;
        match self.read_response() {
            Ok(reply) => {
                if let Some(events) = &self.events {
                    let _ = events.send(LinkEvent::CustomReply {
                        command: full,
                        reply,
                    });
                }
                Ok(())
            }
            // Set commands are silent.
            Err(RadioError::Timeout) => Ok(()),
            Err(e) => {
                warn!("Custom command {} failed: {}", full, e);
                Err(e)
            }
        }
    }

    fn subscribe(&mut self, events: mpsc::UnboundedSender<LinkEvent>) {
        self.events = Some(events);
    }
}
