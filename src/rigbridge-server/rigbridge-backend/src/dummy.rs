// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Dummy radio link for development and testing.
//!
//! Holds radio state in memory and answers every call immediately.
//! No hardware or serial port required. A [`DummyHandle`] shares the same
//! state so tests can flip the radio offline, inject failures and see
//! what was written.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use rigbridge_core::rig::status_reply::{StatusReply, STATUS_QUERY};
use rigbridge_core::{
    LinkEvent, LinkState, NativeMode, RadioError, RadioLink, RadioResult, RigMode, Vfo,
};

#[derive(Debug)]
struct DummyState {
    vfo_a_hz: i64,
    vfo_b_hz: i64,
    mode: NativeMode,
    transmitting: bool,
    split: bool,
    online: bool,
    alive: bool,
    read_error: Option<RadioError>,
    raw_commands: Vec<String>,
    events: Option<mpsc::UnboundedSender<LinkEvent>>,
}

impl Default for DummyState {
    fn default() -> Self {
        Self {
            vfo_a_hz: 14_074_000,
            vfo_b_hz: 14_074_000,
            mode: NativeMode::DIG_U,
            transmitting: false,
            split: false,
            online: true,
            alive: true,
            read_error: None,
            raw_commands: Vec::new(),
            events: None,
        }
    }
}

type Shared = Arc<Mutex<DummyState>>;

fn lock(state: &Shared) -> MutexGuard<'_, DummyState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct DummyLink {
    state: Shared,
}

impl DummyLink {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(DummyState::default())),
        }
    }

    /// Handle sharing this link's state.
    pub fn handle(&self) -> DummyHandle {
        DummyHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for DummyLink {
    fn default() -> Self {
        Self::new()
    }
}

impl RadioLink for DummyLink {
    fn rig_type(&self) -> String {
        "Dummy".to_string()
    }

    fn is_alive(&mut self) -> bool {
        lock(&self.state).alive
    }

    fn read_state(&mut self) -> RadioResult<LinkState> {
        let state = lock(&self.state);
        if let Some(err) = &state.read_error {
            return Err(err.clone());
        }
        Ok(LinkState {
            rx_hz: state.vfo_a_hz,
            tx_hz: if state.split {
                state.vfo_b_hz
            } else {
                state.vfo_a_hz
            },
            mode: state.mode,
            transmitting: state.transmitting,
            split: state.split,
            online: state.online,
            rig_type: self.rig_type(),
        })
    }

    fn set_frequency(&mut self, vfo: Vfo, hz: i64) -> RadioResult<()> {
        let mut state = lock(&self.state);
        match vfo {
            Vfo::A => state.vfo_a_hz = hz,
            Vfo::B => state.vfo_b_hz = hz,
        }
        Ok(())
    }

    fn set_mode(&mut self, mode: NativeMode) -> RadioResult<()> {
        lock(&self.state).mode = mode;
        Ok(())
    }

    fn send_custom(&mut self, command: &str, terminator: char) -> RadioResult<()> {
        let full = format!("{command}{terminator}");
        let mut state = lock(&self.state);
        state.raw_commands.push(full.clone());
        if full == STATUS_QUERY {
            let reply = StatusReply {
                frequency_hz: state.vfo_a_hz,
                mode: RigMode::from_native(state.mode),
                rit: false,
                xit: false,
                memory_channel: 0,
                transmitting: state.transmitting,
                band: 0,
                vfo_mode: true,
            };
            if let Some(events) = &state.events {
                let _ = events.send(LinkEvent::CustomReply {
                    command: full,
                    reply: reply.encode(),
                });
            }
        }
        Ok(())
    }

    fn subscribe(&mut self, events: mpsc::UnboundedSender<LinkEvent>) {
        lock(&self.state).events = Some(events);
    }
}

/// Test-side view of a [`DummyLink`].
#[derive(Clone)]
pub struct DummyHandle {
    state: Shared,
}

impl DummyHandle {
    pub fn vfo_a(&self) -> i64 {
        lock(&self.state).vfo_a_hz
    }

    pub fn vfo_b(&self) -> i64 {
        lock(&self.state).vfo_b_hz
    }

    pub fn mode(&self) -> RigMode {
        RigMode::from_native(lock(&self.state).mode)
    }

    pub fn raw_commands(&self) -> Vec<String> {
        lock(&self.state).raw_commands.clone()
    }

    /// Whether the driver reports the radio as online.
    pub fn set_online(&self, online: bool) {
        lock(&self.state).online = online;
    }

    /// Whether the liveness probe succeeds.
    pub fn set_alive(&self, alive: bool) {
        lock(&self.state).alive = alive;
    }

    pub fn set_transmitting(&self, transmitting: bool) {
        lock(&self.state).transmitting = transmitting;
    }

    pub fn set_split(&self, split: bool) {
        lock(&self.state).split = split;
    }

    pub fn set_frequency(&self, hz: i64) {
        lock(&self.state).vfo_a_hz = hz;
    }

    /// Make every read fail with `err` until cleared with `None`.
    pub fn set_read_error(&self, err: Option<RadioError>) {
        lock(&self.state).read_error = err;
    }

    /// Emit a custom reply as if the radio had sent it.
    pub fn emit_custom_reply(&self, command: &str, reply: &str) -> bool {
        match &lock(&self.state).events {
            Some(events) => events
                .send(LinkEvent::CustomReply {
                    command: command.to_string(),
                    reply: reply.to_string(),
                })
                .is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rigbridge_core::{RadioAdapter, RigSelector};

    use super::*;

    #[test]
    fn test_split_reads_tx_from_vfo_b() {
        let mut link = DummyLink::new();
        let handle = link.handle();
        link.set_frequency(Vfo::B, 14_080_000).unwrap();
        assert_eq!(link.read_state().unwrap().tx_hz, 14_074_000);

        handle.set_split(true);
        let state = link.read_state().unwrap();
        assert_eq!(state.rx_hz, 14_074_000);
        assert_eq!(state.tx_hz, 14_080_000);
        assert!(state.split);
    }

    #[test]
    fn test_read_error_injection() {
        let mut link = DummyLink::new();
        let handle = link.handle();
        handle.set_read_error(Some(RadioError::Timeout));
        assert_eq!(link.read_state(), Err(RadioError::Timeout));
        handle.set_read_error(None);
        assert!(link.read_state().is_ok());
    }

    #[test]
    fn test_status_query_emits_reply() {
        let mut link = DummyLink::new();
        let handle = link.handle();
        let (tx, mut rx) = mpsc::unbounded_channel();
        link.subscribe(tx);
        link.set_mode(NativeMode::CW_U).unwrap();
        link.send_custom("IF", ';').unwrap();
        link.send_custom("FA", ';').unwrap();

        let LinkEvent::CustomReply { command, reply } = rx.try_recv().unwrap();
        assert_eq!(command, "IF;");
        let decoded = StatusReply::decode(&reply).unwrap();
        assert_eq!(decoded.frequency_hz, 14_074_000);
        assert_eq!(decoded.mode, RigMode::Cw);
        assert!(rx.try_recv().is_err());
        assert_eq!(handle.raw_commands(), vec!["IF;", "FA;"]);
    }

    #[tokio::test]
    async fn test_adapter_folds_replies_from_the_radio() {
        let link = DummyLink::new();
        let handle = link.handle();
        let adapter = RadioAdapter::new(Box::new(link), None);
        let _pumps = adapter.spawn_event_pump();
        let mut rx = adapter.subscribe(RigSelector::Rig1).unwrap();

        // Garbage first; it must not reach the snapshot.
        assert!(handle.emit_custom_reply("IF;", "IF0001;"));
        handle.set_transmitting(true);
        adapter.send_raw(RigSelector::Rig1, "IF;").await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .unwrap()
            .unwrap();

        let snap = adapter.latest(RigSelector::Rig1).unwrap();
        assert_eq!(snap.freq, 14_074_000);
        assert_eq!(snap.mode, RigMode::UsbD);
        assert!(snap.is_transmitting);
        assert!(snap.is_connected);
        assert_eq!(snap.radio_name, "Dummy");
    }
}
