// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! RadioInfo datagrams for contest loggers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{error, info, trace};

use rigbridge_core::rig::policies::BackoffPolicy;
use rigbridge_core::{DynResult, RadioAdapter, RigSelector};
use rigbridge_protocol::{radio_info_xml, StationInfo};

use crate::mqtt::{publish_event, MessageSink};

/// First IPv4 address `host` resolves to.
pub async fn resolve_ipv4(host: &str, port: u16) -> DynResult<SocketAddr> {
    let addr = tokio::net::lookup_host((host, port))
        .await?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| format!("Unable to resolve hostname to an IPv4 address: {host}"))?;
    info!("UDP sender target {} resolved to {}", host, addr);
    Ok(addr)
}

/// UDP sender that drops a message identical to the previous one unless
/// `resend_after` has passed since that one went out.
pub struct LoggerSender {
    socket: UdpSocket,
    target: SocketAddr,
    resend_after: Duration,
    last_sent: Option<(String, Instant)>,
    sent: u64,
}

impl LoggerSender {
    pub async fn bind(target: SocketAddr, resend_after: Duration) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
        Ok(Self {
            socket,
            target,
            resend_after,
            last_sent: None,
            sent: 0,
        })
    }

    fn should_send(&self, message: &str, now: Instant) -> bool {
        match &self.last_sent {
            Some((last, at)) => {
                last != message || now.saturating_duration_since(*at) >= self.resend_after
            }
            None => true,
        }
    }

    /// Returns whether the datagram was actually sent.
    pub async fn send(&mut self, message: &str, now: Instant) -> std::io::Result<bool> {
        if !self.should_send(message, now) {
            return Ok(false);
        }
        self.socket.send_to(message.as_bytes(), self.target).await?;
        self.sent += 1;
        self.last_sent = Some((message.to_string(), now));
        trace!("Sent datagram #{} to {}", self.sent, self.target);
        Ok(true)
    }
}

/// The foreground loop: poll radio 1, render RadioInfo, send it.
pub struct LoggerLoop {
    adapter: RadioAdapter,
    sender: LoggerSender,
    station: StationInfo,
    interval: Duration,
    backoff: Box<dyn BackoffPolicy>,
    sink: Arc<dyn MessageSink>,
}

impl LoggerLoop {
    pub fn new(
        adapter: RadioAdapter,
        sender: LoggerSender,
        station: StationInfo,
        interval: Duration,
        backoff: Box<dyn BackoffPolicy>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            adapter,
            sender,
            station,
            interval,
            backoff,
            sink,
        }
    }

    async fn run_cycle(&mut self) -> DynResult<()> {
        let snapshot = self.adapter.poll(RigSelector::Rig1).await?;
        let xml = radio_info_xml(&snapshot, &self.station)?;
        self.sender.send(&xml, Instant::now()).await?;
        Ok(())
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Sending RadioInfo to {} every {:?}",
            self.sender.target, self.interval
        );
        let mut failures: u32 = 0;
        loop {
            let pause = match self.run_cycle().await {
                Ok(()) => {
                    failures = 0;
                    self.interval
                }
                Err(e) => {
                    error!("Error in main loop: {}", e);
                    let message = e.to_string();
                    if let Err(e) = publish_event(self.sink.as_ref(), "1", "error", &message).await {
                        error!("Failed to publish error event: {}", e);
                    }
                    let delay = self.backoff.delay(failures);
                    failures = failures.saturating_add(1);
                    delay
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Logger loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use rigbridge_backend::DummyLink;
    use rigbridge_core::rig::policies::FixedDelay;

    use super::*;
    use crate::mqtt::RecordingSink;

    async fn receiver() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    async fn recv_text(socket: &UdpSocket) -> String {
        let mut buf = vec![0u8; 4096];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        String::from_utf8_lossy(&buf[..len]).into_owned()
    }

    #[tokio::test]
    async fn identical_messages_wait_for_resend_window() {
        let (_socket, addr) = receiver().await;
        let mut sender = LoggerSender::bind(addr, Duration::from_secs(5)).await.unwrap();
        let start = Instant::now();

        assert!(sender.send("a", start).await.unwrap());
        assert!(!sender.send("a", start + Duration::from_secs(1)).await.unwrap());
        assert!(sender.send("b", start + Duration::from_secs(2)).await.unwrap());
        assert!(!sender.send("b", start + Duration::from_secs(6)).await.unwrap());
        assert!(sender.send("b", start + Duration::from_secs(7)).await.unwrap());
    }

    #[tokio::test]
    async fn resolves_localhost_to_ipv4() {
        let addr = resolve_ipv4("127.0.0.1", 12060).await.unwrap();
        assert_eq!(addr, "127.0.0.1:12060".parse::<SocketAddr>().unwrap());
    }

    #[tokio::test]
    async fn loop_sends_radio_info() {
        let (socket, addr) = receiver().await;
        let link = DummyLink::new();
        let adapter = RadioAdapter::new(Box::new(link), None);
        let sender = LoggerSender::bind(addr, Duration::from_secs(5)).await.unwrap();
        let sink = RecordingSink::default();
        let logger = LoggerLoop::new(
            adapter,
            sender,
            StationInfo::default(),
            Duration::from_millis(10),
            Box::new(FixedDelay::new(Duration::from_millis(10))),
            Arc::new(sink.clone()),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(logger.run(shutdown_rx));

        let text = recv_text(&socket).await;
        assert!(text.starts_with("<?xml"));
        assert!(text.contains("<RadioInfo>"));
        assert!(text.contains("<Freq>14074000</Freq>"));

        shutdown_tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(sink.messages().is_empty());
    }

    #[tokio::test]
    async fn loop_reports_errors_as_events() {
        let (_socket, addr) = receiver().await;
        let link = DummyLink::new();
        let radio = link.handle();
        radio.set_alive(false);
        let adapter = RadioAdapter::new(Box::new(link), None);
        let sender = LoggerSender::bind(addr, Duration::from_secs(5)).await.unwrap();
        let sink = RecordingSink::default();
        let logger = LoggerLoop::new(
            adapter,
            sender,
            StationInfo::default(),
            Duration::from_millis(10),
            Box::new(FixedDelay::new(Duration::from_secs(5))),
            Arc::new(sink.clone()),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(logger.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();

        // The 5 s back-off allows exactly one cycle.
        let events = sink.on_topic("omnirig/1/events");
        assert_eq!(events.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&events[0].payload).unwrap();
        assert_eq!(body["message"], "Radio is not available.");
    }
}
