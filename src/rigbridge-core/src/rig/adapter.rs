// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Shared access to one or two radio links.
//!
//! Every link call runs on the blocking pool while holding that radio's
//! lock, so at most one call is in flight per radio. Polls and custom
//! status replies both land in [`RadioAdapter::commit`], which replaces
//! the radio's snapshot as a whole.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::rig::mode::RigMode;
use crate::rig::response::{RadioError, RadioResult};
use crate::rig::state::RadioSnapshot;
use crate::rig::status_reply::{StatusReply, STATUS_QUERY};
use crate::rig::{LinkEvent, RadioLink, RigSelector, Vfo};

type SharedLink = Arc<Mutex<Box<dyn RadioLink>>>;

struct RadioSlot {
    selector: RigSelector,
    radio_name: String,
    link: SharedLink,
    snapshot: watch::Sender<Option<RadioSnapshot>>,
}

impl RadioSlot {
    fn new(selector: RigSelector, link: Box<dyn RadioLink>) -> Self {
        let (snapshot, _) = watch::channel(None);
        Self {
            selector,
            radio_name: link.rig_type(),
            link: Arc::new(Mutex::new(link)),
            snapshot,
        }
    }
}

#[derive(Clone)]
pub struct RadioAdapter {
    slots: Arc<[Option<RadioSlot>; 2]>,
}

impl RadioAdapter {
    pub fn new(rig1: Box<dyn RadioLink>, rig2: Option<Box<dyn RadioLink>>) -> Self {
        let slots = [
            Some(RadioSlot::new(RigSelector::Rig1, rig1)),
            rig2.map(|link| RadioSlot::new(RigSelector::Rig2, link)),
        ];
        Self {
            slots: Arc::new(slots),
        }
    }

    pub fn is_configured(&self, selector: RigSelector) -> bool {
        self.slots[selector.index()].is_some()
    }

    /// Resolve a topic rig id. Ids naming an unconfigured radio fall back
    /// to the first one.
    pub fn selector_for(&self, rig_id: &str) -> RigSelector {
        let selector = RigSelector::from_rig_id(rig_id);
        if self.is_configured(selector) {
            selector
        } else {
            RigSelector::Rig1
        }
    }

    fn slot(&self, selector: RigSelector) -> RadioResult<&RadioSlot> {
        self.slots[selector.index()]
            .as_ref()
            .ok_or(RadioError::NotConfigured(selector.number()))
    }

    async fn call<T, F>(&self, selector: RigSelector, op: F) -> RadioResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn RadioLink) -> RadioResult<T> + Send + 'static,
    {
        let link = Arc::clone(&self.slot(selector)?.link);
        tokio::task::spawn_blocking(move || {
            let mut guard = link
                .lock()
                .map_err(|_| RadioError::link("radio link lock poisoned"))?;
            op(&mut **guard)
        })
        .await
        .map_err(|e| RadioError::link(format!("radio call aborted: {e}")))?
    }

    /// Probe the link, then read a fresh snapshot.
    pub async fn poll(&self, selector: RigSelector) -> RadioResult<RadioSnapshot> {
        let state = self
            .call(selector, |link| {
                ensure_alive(link)?;
                link.read_state()
            })
            .await?;
        let snapshot = RadioSnapshot::from_link(selector, state);
        self.commit(selector, |_| snapshot.clone())?;
        Ok(snapshot)
    }

    pub async fn set_frequency(&self, selector: RigSelector, vfo: Vfo, hz: i64) -> RadioResult<()> {
        self.call(selector, move |link| {
            ensure_alive(link)?;
            link.set_frequency(vfo, hz)
        })
        .await
    }

    pub async fn set_mode(&self, selector: RigSelector, mode: RigMode) -> RadioResult<()> {
        let native = mode.to_native()?;
        self.call(selector, move |link| {
            ensure_alive(link)?;
            link.set_mode(native)
        })
        .await
    }

    /// Send a raw command. A trailing `;` is stripped and the link
    /// re-appends it as the terminator.
    pub async fn send_raw(&self, selector: RigSelector, text: &str) -> RadioResult<()> {
        let command = text.trim_end_matches(';').to_string();
        debug!("Sending raw command {:?} to rig {}", command, selector.number());
        self.call(selector, move |link| link.send_custom(&command, ';'))
            .await
    }

    /// Last committed snapshot, if any.
    pub fn latest(&self, selector: RigSelector) -> Option<RadioSnapshot> {
        self.slot(selector)
            .ok()
            .and_then(|slot| slot.snapshot.borrow().clone())
    }

    pub fn subscribe(
        &self,
        selector: RigSelector,
    ) -> RadioResult<watch::Receiver<Option<RadioSnapshot>>> {
        Ok(self.slot(selector)?.snapshot.subscribe())
    }

    /// Fold a custom reply into the snapshot. Only status-query replies
    /// are decoded; malformed ones are logged and dropped.
    pub fn apply_custom_reply(&self, selector: RigSelector, command: &str, reply: &str) {
        debug!(
            "Custom reply from rig {}: {} -> {}",
            selector.number(),
            command,
            reply
        );
        if command != STATUS_QUERY {
            return;
        }
        let slot = match self.slot(selector) {
            Ok(slot) => slot,
            Err(e) => {
                warn!("Status reply for rig {} dropped: {}", selector.number(), e);
                return;
            }
        };
        match StatusReply::decode(reply) {
            Ok(status) => {
                if let Err(e) = self.commit(selector, |previous| {
                    RadioSnapshot::with_status_reply(selector, previous, &status, &slot.radio_name)
                }) {
                    warn!("Status reply for rig {} dropped: {}", selector.number(), e);
                }
            }
            Err(e) => warn!("Discarding status reply from rig {}: {}", selector.number(), e),
        }
    }

    /// The single entry point that supersedes a radio's snapshot.
    fn commit<F>(&self, selector: RigSelector, next: F) -> RadioResult<()>
    where
        F: FnOnce(Option<&RadioSnapshot>) -> RadioSnapshot,
    {
        let slot = self.slot(selector)?;
        slot.snapshot.send_if_modified(|current| {
            let updated = next(current.as_ref());
            if current.as_ref() == Some(&updated) {
                return false;
            }
            *current = Some(updated);
            true
        });
        Ok(())
    }

    /// Subscribe to every configured link's events and forward them into
    /// the snapshot. Must be called from within a Tokio runtime.
    pub fn spawn_event_pump(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for slot in self.slots.iter().flatten() {
            let (tx, mut rx) = mpsc::unbounded_channel();
            match slot.link.lock() {
                Ok(mut link) => link.subscribe(tx),
                Err(_) => {
                    warn!("Rig {} link lock poisoned; events disabled", slot.selector.number());
                    continue;
                }
            }
            let adapter = self.clone();
            let selector = slot.selector;
            handles.push(tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    match event {
                        LinkEvent::CustomReply { command, reply } => {
                            adapter.apply_custom_reply(selector, &command, &reply)
                        }
                    }
                }
            }));
        }
        handles
    }
}

fn ensure_alive(link: &mut dyn RadioLink) -> RadioResult<()> {
    if link.is_alive() {
        Ok(())
    } else {
        Err(RadioError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::rig::mode::NativeMode;
    use crate::rig::LinkState;

    #[derive(Default)]
    struct Probe {
        alive: AtomicBool,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        writes: Mutex<Vec<String>>,
    }

    struct FakeLink {
        probe: Arc<Probe>,
        events: Option<mpsc::UnboundedSender<LinkEvent>>,
    }

    impl FakeLink {
        fn new() -> (Self, Arc<Probe>) {
            let probe = Arc::new(Probe::default());
            probe.alive.store(true, Ordering::SeqCst);
            (
                Self {
                    probe: Arc::clone(&probe),
                    events: None,
                },
                probe,
            )
        }

        fn record(&self, entry: String) {
            self.probe.writes.lock().unwrap().push(entry);
        }
    }

    impl RadioLink for FakeLink {
        fn rig_type(&self) -> String {
            "Fake".to_string()
        }

        fn is_alive(&mut self) -> bool {
            self.probe.alive.load(Ordering::SeqCst)
        }

        fn read_state(&mut self) -> RadioResult<LinkState> {
            Ok(LinkState {
                rx_hz: 14_074_000,
                tx_hz: 14_074_000,
                mode: NativeMode::DIG_U,
                transmitting: false,
                split: false,
                online: true,
                rig_type: self.rig_type(),
            })
        }

        fn set_frequency(&mut self, vfo: Vfo, hz: i64) -> RadioResult<()> {
            let now = self.probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.probe.max_in_flight.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            self.probe.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.record(format!("freq {vfo} {hz}"));
            Ok(())
        }

        fn set_mode(&mut self, mode: NativeMode) -> RadioResult<()> {
            self.record(format!("mode {:#x}", mode.0));
            Ok(())
        }

        fn send_custom(&mut self, command: &str, terminator: char) -> RadioResult<()> {
            let full = format!("{command}{terminator}");
            self.record(format!("raw {full}"));
            if full == STATUS_QUERY {
                if let Some(events) = &self.events {
                    let reply = "IF00007030000030000000000000000000000;".to_string();
                    let _ = events.send(LinkEvent::CustomReply {
                        command: full,
                        reply,
                    });
                }
            }
            Ok(())
        }

        fn subscribe(&mut self, events: mpsc::UnboundedSender<LinkEvent>) {
            self.events = Some(events);
        }
    }

    #[tokio::test]
    async fn poll_fails_when_probe_fails() {
        let (link, probe) = FakeLink::new();
        probe.alive.store(false, Ordering::SeqCst);
        let adapter = RadioAdapter::new(Box::new(link), None);
        assert_eq!(
            adapter.poll(RigSelector::Rig1).await,
            Err(RadioError::Unavailable)
        );
        assert!(adapter.latest(RigSelector::Rig1).is_none());
    }

    #[tokio::test]
    async fn poll_commits_snapshot() {
        let (link, _probe) = FakeLink::new();
        let adapter = RadioAdapter::new(Box::new(link), None);
        let snap = adapter.poll(RigSelector::Rig1).await.unwrap();
        assert_eq!(snap.mode, RigMode::UsbD);
        assert_eq!(snap.active_radio_nr, 1);
        assert_eq!(adapter.latest(RigSelector::Rig1), Some(snap));
    }

    #[tokio::test]
    async fn unknown_mode_is_rejected_before_the_link() {
        let (link, probe) = FakeLink::new();
        let adapter = RadioAdapter::new(Box::new(link), None);
        let err = adapter
            .set_mode(RigSelector::Rig1, RigMode::Unknown)
            .await
            .unwrap_err();
        assert!(matches!(err, RadioError::InvalidMode(_)));
        assert!(probe.writes.lock().unwrap().is_empty());

        adapter.set_mode(RigSelector::Rig1, RigMode::Cw).await.unwrap();
        assert_eq!(probe.writes.lock().unwrap().as_slice(), ["mode 0x800000"]);
    }

    #[tokio::test]
    async fn raw_command_terminator_is_normalized() {
        let (link, probe) = FakeLink::new();
        let adapter = RadioAdapter::new(Box::new(link), None);
        adapter.send_raw(RigSelector::Rig1, "FA;").await.unwrap();
        adapter.send_raw(RigSelector::Rig1, "FB").await.unwrap();
        assert_eq!(
            probe.writes.lock().unwrap().as_slice(),
            ["raw FA;", "raw FB;"]
        );
    }

    #[tokio::test]
    async fn missing_second_radio() {
        let (link, _probe) = FakeLink::new();
        let adapter = RadioAdapter::new(Box::new(link), None);
        assert_eq!(adapter.selector_for("2"), RigSelector::Rig1);
        assert_eq!(
            adapter.poll(RigSelector::Rig2).await,
            Err(RadioError::NotConfigured(2))
        );
    }

    #[tokio::test]
    async fn calls_are_single_flight_per_radio() {
        let (link, probe) = FakeLink::new();
        let adapter = RadioAdapter::new(Box::new(link), None);
        let mut handles = Vec::new();
        for i in 0..8 {
            let adapter = adapter.clone();
            handles.push(tokio::spawn(async move {
                adapter
                    .set_frequency(RigSelector::Rig1, Vfo::A, 7_000_000 + i)
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(probe.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(probe.writes.lock().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn status_reply_event_updates_snapshot() {
        let (link, _probe) = FakeLink::new();
        let adapter = RadioAdapter::new(Box::new(link), None);
        let _pumps = adapter.spawn_event_pump();
        adapter.poll(RigSelector::Rig1).await.unwrap();

        let mut rx = adapter.subscribe(RigSelector::Rig1).unwrap();
        adapter.send_raw(RigSelector::Rig1, "IF;").await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .unwrap()
            .unwrap();

        let snap = adapter.latest(RigSelector::Rig1).unwrap();
        assert_eq!(snap.freq, 7_030_000);
        assert_eq!(snap.mode, RigMode::Cw);
        assert!(snap.is_connected);
        assert_eq!(snap.radio_name, "Fake");
    }

    #[tokio::test]
    async fn status_reply_before_first_poll() {
        let (link, _probe) = FakeLink::new();
        let adapter = RadioAdapter::new(Box::new(link), None);
        adapter.apply_custom_reply(
            RigSelector::Rig1,
            "IF;",
            "IF00007030000030000000000000000000000;",
        );

        let snap = adapter.latest(RigSelector::Rig1).unwrap();
        assert_eq!(snap.freq, 7_030_000);
        assert!(snap.is_connected);
        assert_eq!(snap.active_radio_nr, 1);
        assert_eq!(snap.radio_name, "Fake");
    }

    #[tokio::test]
    async fn malformed_and_foreign_replies_are_ignored() {
        let (link, _probe) = FakeLink::new();
        let adapter = RadioAdapter::new(Box::new(link), None);
        let before = adapter.poll(RigSelector::Rig1).await.unwrap();
        adapter.apply_custom_reply(RigSelector::Rig1, "IF;", "IF0001;");
        adapter.apply_custom_reply(
            RigSelector::Rig1,
            "FA;",
            "IF00007030000030000000000000000000000;",
        );
        assert_eq!(adapter.latest(RigSelector::Rig1), Some(before));
    }
}
