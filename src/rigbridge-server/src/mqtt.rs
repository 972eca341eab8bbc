// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! MQTT v5 session: connect, subscribe, reconnect and route inbound commands.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use rumqttc::v5::mqttbytes::v5::{Packet, Publish, PublishProperties};
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, ClientError, Event, EventLoop, MqttOptions};
use rumqttc::Transport;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use rigbridge_core::rig::policies::BackoffPolicy;
use rigbridge_core::{DynResult, RadioAdapter, RigSelector};
use rigbridge_protocol::topics::{self, COMMANDS_FILTER, SYSTEM_RIG_ID};
use rigbridge_protocol::{to_payload, EventNotification, InboundMessage, OutboundMessage, Qos};

use crate::config::MqttConfig;
use crate::correlation;
use crate::dispatcher::CommandDispatcher;

/// Capacity of the client request queue.
const REQUEST_QUEUE_CAP: usize = 64;

/// Where outbound messages go. Both calls hand the request over and return;
/// neither waits for the broker.
pub trait MessageSink: Send + Sync {
    fn publish<'a>(
        &'a self,
        msg: OutboundMessage,
    ) -> Pin<Box<dyn Future<Output = DynResult<()>> + Send + 'a>>;

    fn subscribe<'a>(
        &'a self,
        filter: &'a str,
        qos: Qos,
    ) -> Pin<Box<dyn Future<Output = DynResult<()>> + Send + 'a>>;
}

/// Sink backed by a live broker client. Requests go into the client queue
/// and are written by the event loop; while the broker is unreachable the
/// queue fills up and further publishes are dropped.
#[derive(Clone)]
pub struct MqttSink {
    client: AsyncClient,
    dropped: Arc<AtomicU64>,
}

impl MqttSink {
    fn new(client: AsyncClient) -> Self {
        Self {
            client,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publishes dropped since the queue last accepted one.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn record_enqueue(&self, outcome: Result<(), ClientError>, topic: &str) {
        match outcome {
            Ok(()) => {
                let dropped = self.dropped.swap(0, Ordering::Relaxed);
                if dropped > 0 {
                    info!("MQTT request queue accepting again, {} messages dropped", dropped);
                }
            }
            Err(e) => {
                if self.dropped.fetch_add(1, Ordering::Relaxed) == 0 {
                    warn!("MQTT request queue unavailable, dropping messages ({}): {}", topic, e);
                }
            }
        }
    }

    /// Queue a DISCONNECT. The event loop writes it after every message
    /// queued before it.
    pub fn disconnect(&self) -> DynResult<()> {
        self.client.try_disconnect()?;
        Ok(())
    }
}

impl MessageSink for MqttSink {
    fn publish<'a>(
        &'a self,
        msg: OutboundMessage,
    ) -> Pin<Box<dyn Future<Output = DynResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let properties = PublishProperties {
                correlation_data: msg.correlation_data.map(Bytes::from),
                ..PublishProperties::default()
            };
            let outcome = self.client.try_publish_with_properties(
                msg.topic.clone(),
                to_mqtt_qos(msg.qos),
                msg.retain,
                msg.payload,
                properties,
            );
            self.record_enqueue(outcome, &msg.topic);
            Ok(())
        })
    }

    fn subscribe<'a>(
        &'a self,
        filter: &'a str,
        qos: Qos,
    ) -> Pin<Box<dyn Future<Output = DynResult<()>> + Send + 'a>> {
        Box::pin(async move {
            self.client.try_subscribe(filter, to_mqtt_qos(qos))?;
            Ok(())
        })
    }
}

/// Sink that keeps every message, for tests.
#[derive(Clone, Default)]
pub struct RecordingSink {
    messages: Arc<Mutex<Vec<OutboundMessage>>>,
    subscriptions: Arc<Mutex<Vec<(String, Qos)>>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    pub fn on_topic(&self, topic: &str) -> Vec<OutboundMessage> {
        self.messages()
            .into_iter()
            .filter(|msg| msg.topic == topic)
            .collect()
    }

    pub fn subscriptions(&self) -> Vec<(String, Qos)> {
        self.subscriptions
            .lock()
            .map(|subscriptions| subscriptions.clone())
            .unwrap_or_default()
    }
}

impl MessageSink for RecordingSink {
    fn publish<'a>(
        &'a self,
        msg: OutboundMessage,
    ) -> Pin<Box<dyn Future<Output = DynResult<()>> + Send + 'a>> {
        Box::pin(async move {
            self.messages
                .lock()
                .map_err(|_| "recording sink lock poisoned")?
                .push(msg);
            Ok(())
        })
    }

    fn subscribe<'a>(
        &'a self,
        filter: &'a str,
        qos: Qos,
    ) -> Pin<Box<dyn Future<Output = DynResult<()>> + Send + 'a>> {
        Box::pin(async move {
            self.subscriptions
                .lock()
                .map_err(|_| "recording sink lock poisoned")?
                .push((filter.to_string(), qos));
            Ok(())
        })
    }
}

pub fn to_mqtt_qos(qos: Qos) -> QoS {
    match qos {
        Qos::AtMostOnce => QoS::AtMostOnce,
        Qos::AtLeastOnce => QoS::AtLeastOnce,
        Qos::ExactlyOnce => QoS::ExactlyOnce,
    }
}

pub fn from_mqtt_qos(qos: QoS) -> Qos {
    match qos {
        QoS::AtMostOnce => Qos::AtMostOnce,
        QoS::AtLeastOnce => Qos::AtLeastOnce,
        QoS::ExactlyOnce => Qos::ExactlyOnce,
    }
}

/// Broker URL used for websocket sessions.
fn websocket_url(cfg: &MqttConfig) -> String {
    format!("ws://{}:{}/mqtt", cfg.address, cfg.port)
}

pub fn build_options(cfg: &MqttConfig) -> MqttOptions {
    let host = if cfg.use_websockets {
        websocket_url(cfg)
    } else {
        cfg.address.clone()
    };
    let mut options = MqttOptions::new(cfg.client_id.clone(), host, cfg.port);
    options.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs));
    options.set_clean_start(true);
    if cfg.use_websockets {
        options.set_transport(Transport::Ws);
    }
    if let Some((username, password)) = cfg.credentials() {
        options.set_credentials(username, password);
    }
    options
}

/// Create the client and its not-yet-polled event loop.
pub fn connect(cfg: &MqttConfig) -> (MqttSink, EventLoop) {
    info!(
        "[{}] MQTT broker {}:{} (websockets: {}, user: {})",
        cfg.connection_name,
        cfg.address,
        cfg.port,
        cfg.use_websockets,
        rigbridge_app::redact(&cfg.username)
    );
    let (client, eventloop) = AsyncClient::new(build_options(cfg), REQUEST_QUEUE_CAP);
    (MqttSink::new(client), eventloop)
}

/// Convert a received PUBLISH, transport metadata included.
pub fn inbound_from_publish(publish: &Publish) -> InboundMessage {
    let (correlation_data, response_topic) = match &publish.properties {
        Some(props) => (
            props.correlation_data.as_ref().map(|data| data.to_vec()),
            props.response_topic.clone(),
        ),
        None => (None, None),
    };
    InboundMessage {
        topic: String::from_utf8_lossy(&publish.topic).into_owned(),
        payload: publish.payload.to_vec(),
        qos: from_mqtt_qos(publish.qos),
        correlation_data,
        response_topic,
    }
}

/// Best-effort event on `omnirig/<rig_id>/events`.
pub async fn publish_event(
    sink: &dyn MessageSink,
    rig_id: &str,
    event_type: &str,
    message: &str,
) -> DynResult<()> {
    let event = EventNotification::new(event_type, message);
    let payload = to_payload(&event)?;
    sink.publish(OutboundMessage {
        topic: topics::events_topic(rig_id),
        payload,
        qos: Qos::AtLeastOnce,
        retain: false,
        correlation_data: None,
    })
    .await?;
    debug!("Published {} event for rig {}: {}", event_type, rig_id, message);
    Ok(())
}

/// Poll the radio behind `rig_id` and publish it retained on
/// `omnirig/<rig_id>/status`.
pub async fn publish_status_update(
    sink: &dyn MessageSink,
    adapter: &RadioAdapter,
    rig_id: &str,
) -> DynResult<()> {
    let snapshot = adapter.poll(adapter.selector_for(rig_id)).await?;
    sink.publish(OutboundMessage {
        topic: topics::status_topic(rig_id),
        payload: to_payload(&snapshot)?,
        qos: Qos::AtLeastOnce,
        retain: true,
        correlation_data: None,
    })
    .await?;
    debug!("Published status update for rig {}", rig_id);
    Ok(())
}

/// Work done after every (re)connection. The session only counts as
/// connected once the command subscription is queued.
async fn on_connected(
    sink: Arc<dyn MessageSink>,
    adapter: RadioAdapter,
    connected: Arc<watch::Sender<bool>>,
) {
    if let Err(e) = sink.subscribe(COMMANDS_FILTER, Qos::AtLeastOnce).await {
        error!("Failed to subscribe to {}: {}", COMMANDS_FILTER, e);
        return;
    }
    info!("Subscribed to {}", COMMANDS_FILTER);
    connected.send_replace(true);

    if let Err(e) =
        publish_event(sink.as_ref(), SYSTEM_RIG_ID, "connection", "Connected to MQTT broker").await
    {
        warn!("Failed to publish connection event: {}", e);
    }
    for selector in [RigSelector::Rig1, RigSelector::Rig2] {
        if !adapter.is_configured(selector) {
            continue;
        }
        let rig_id = selector.number().to_string();
        if let Err(e) = publish_status_update(sink.as_ref(), &adapter, &rig_id).await {
            warn!("Failed to publish status for rig {}: {}", rig_id, e);
        }
    }
}

/// State carried across reconnects of one broker session.
struct Session {
    sink: Arc<dyn MessageSink>,
    dispatcher: CommandDispatcher,
    adapter: RadioAdapter,
    backoff: Box<dyn BackoffPolicy>,
    connected: Arc<watch::Sender<bool>>,
    failures: u32,
}

impl Session {
    fn new(
        sink: Arc<dyn MessageSink>,
        dispatcher: CommandDispatcher,
        adapter: RadioAdapter,
        backoff: Box<dyn BackoffPolicy>,
        connected: watch::Sender<bool>,
    ) -> Self {
        Self {
            sink,
            dispatcher,
            adapter,
            backoff,
            connected: Arc::new(connected),
            failures: 0,
        }
    }

    /// Handle one event from the client. Work that talks to the radio is
    /// spawned; its handle is returned.
    fn on_event(&mut self, event: Event) -> Option<JoinHandle<()>> {
        match event {
            Event::Incoming(Packet::ConnAck(_)) => {
                info!("Connected to MQTT broker");
                self.failures = 0;
                Some(tokio::spawn(on_connected(
                    Arc::clone(&self.sink),
                    self.adapter.clone(),
                    Arc::clone(&self.connected),
                )))
            }
            Event::Incoming(Packet::Publish(publish)) => {
                let msg = inbound_from_publish(&publish);
                let dispatcher = self.dispatcher.clone();
                let sink = Arc::clone(&self.sink);
                Some(tokio::spawn(async move {
                    correlation::handle_inbound(msg, &dispatcher, sink.as_ref()).await;
                }))
            }
            Event::Incoming(Packet::Disconnect(_)) => {
                warn!("Broker closed the session");
                self.connected.send_replace(false);
                None
            }
            _ => None,
        }
    }

    /// Record a connection failure and return how long to wait before the
    /// next attempt.
    fn on_error(&mut self) -> Duration {
        self.connected.send_replace(false);
        let delay = self.backoff.delay(self.failures);
        self.failures = self.failures.saturating_add(1);
        delay
    }
}

/// Drive the session until shutdown. `connected` tracks whether the
/// current connection is acknowledged and subscribed.
pub async fn run_event_loop(
    mut eventloop: EventLoop,
    sink: Arc<dyn MessageSink>,
    dispatcher: CommandDispatcher,
    adapter: RadioAdapter,
    backoff: Box<dyn BackoffPolicy>,
    connected: watch::Sender<bool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut session = Session::new(sink, dispatcher, adapter, backoff, connected);
    loop {
        match eventloop.poll().await {
            Ok(event) => {
                session.on_event(event);
            }
            Err(e) => {
                let delay = session.on_error();
                if *shutdown.borrow() {
                    debug!("MQTT event loop stopped: {}", e);
                    break;
                }
                warn!(
                    "Disconnected from MQTT broker: {}; reconnecting in {:?}",
                    e, delay
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rigbridge_backend::DummyLink;
    use rigbridge_core::rig::policies::ExponentialBackoff;
    use rigbridge_core::RadioLink;
    use rumqttc::v5::mqttbytes::v5::{ConnAck, ConnectReturnCode};

    use super::*;

    fn session_with(rig2: bool) -> (Session, RecordingSink, watch::Receiver<bool>) {
        let rig2 = rig2.then(|| Box::new(DummyLink::new()) as Box<dyn RadioLink>);
        let adapter = RadioAdapter::new(Box::new(DummyLink::new()), rig2);
        let sink = RecordingSink::default();
        let (connected_tx, connected_rx) = watch::channel(false);
        let session = Session::new(
            Arc::new(sink.clone()),
            CommandDispatcher::new(adapter.clone()),
            adapter,
            Box::new(ExponentialBackoff::new(
                Duration::from_secs(1),
                Duration::from_secs(60),
            )),
            connected_tx,
        );
        (session, sink, connected_rx)
    }

    fn connack() -> Event {
        Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
            properties: None,
        }))
    }

    /// A port nothing listens on.
    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_websocket_options() {
        let cfg = MqttConfig {
            address: "broker.local".to_string(),
            port: 9001,
            use_websockets: true,
            ..MqttConfig::default()
        };
        assert_eq!(websocket_url(&cfg), "ws://broker.local:9001/mqtt");
        let options = build_options(&cfg);
        assert_eq!(options.broker_address().0, "ws://broker.local:9001/mqtt");
        assert_eq!(options.client_id(), "OmniRigClient");
    }

    #[test]
    fn test_credentials_only_when_complete() {
        let mut cfg = MqttConfig::default();
        cfg.username = "op".to_string();
        assert!(build_options(&cfg).credentials().is_none());
        cfg.password = "secret".to_string();
        assert!(build_options(&cfg).credentials().is_some());
    }

    #[test]
    fn test_inbound_keeps_transport_metadata() {
        let mut publish = Publish::new(
            "omnirig/1/commands",
            QoS::ExactlyOnce,
            r#"{"command":"get_status"}"#,
            None,
        );
        publish.properties = Some(PublishProperties {
            correlation_data: Some(Bytes::from_static(b"abc")),
            response_topic: Some("clients/42/replies".to_string()),
            ..PublishProperties::default()
        });

        let msg = inbound_from_publish(&publish);
        assert_eq!(msg.topic, "omnirig/1/commands");
        assert_eq!(msg.qos, Qos::ExactlyOnce);
        assert_eq!(msg.correlation_data.as_deref(), Some(&b"abc"[..]));
        assert_eq!(msg.response_topic.as_deref(), Some("clients/42/replies"));
    }

    #[tokio::test]
    async fn test_event_payload() {
        let sink = RecordingSink::default();
        publish_event(&sink, "1", "error", "boom").await.unwrap();

        let messages = sink.on_topic("omnirig/1/events");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].qos, Qos::AtLeastOnce);
        assert!(!messages[0].retain);
        let body: serde_json::Value = serde_json::from_slice(&messages[0].payload).unwrap();
        assert_eq!(body["event_type"], "error");
        assert_eq!(body["message"], "boom");
    }

    #[tokio::test]
    async fn test_status_update_is_retained() {
        let link = rigbridge_backend::DummyLink::new();
        let adapter = RadioAdapter::new(Box::new(link), None);
        let sink = RecordingSink::default();
        publish_status_update(&sink, &adapter, "1").await.unwrap();

        let messages = sink.on_topic("omnirig/1/status");
        assert_eq!(messages.len(), 1);
        assert!(messages[0].retain);
        let body: serde_json::Value = serde_json::from_slice(&messages[0].payload).unwrap();
        assert_eq!(body["Freq"], 14_074_000);
    }

    #[tokio::test]
    async fn test_connack_subscribes_and_announces() {
        let (mut session, sink, connected_rx) = session_with(true);
        session.on_event(connack()).unwrap().await.unwrap();

        assert_eq!(
            sink.subscriptions(),
            vec![("omnirig/+/commands".to_string(), Qos::AtLeastOnce)]
        );
        assert!(*connected_rx.borrow());

        let events = sink.on_topic("omnirig/system/events");
        assert_eq!(events.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&events[0].payload).unwrap();
        assert_eq!(body["event_type"], "connection");
        assert_eq!(sink.on_topic("omnirig/1/status").len(), 1);
        assert_eq!(sink.on_topic("omnirig/2/status").len(), 1);

        // Every reconnection subscribes again.
        session.on_event(connack()).unwrap().await.unwrap();
        assert_eq!(sink.subscriptions().len(), 2);
    }

    #[tokio::test]
    async fn test_status_only_for_configured_rigs() {
        let (mut session, sink, _connected_rx) = session_with(false);
        session.on_event(connack()).unwrap().await.unwrap();
        assert_eq!(sink.on_topic("omnirig/1/status").len(), 1);
        assert!(sink.on_topic("omnirig/2/status").is_empty());
    }

    #[tokio::test]
    async fn test_backoff_resets_on_connack() {
        let (mut session, _sink, connected_rx) = session_with(false);
        assert_eq!(session.on_error(), Duration::from_secs(1));
        assert_eq!(session.on_error(), Duration::from_secs(2));
        assert_eq!(session.on_error(), Duration::from_secs(4));

        session.on_event(connack()).unwrap().await.unwrap();
        assert!(*connected_rx.borrow());
        assert_eq!(session.on_error(), Duration::from_secs(1));
        assert!(!*connected_rx.borrow());
    }

    #[tokio::test]
    async fn test_inbound_command_is_answered() {
        let (mut session, sink, _connected_rx) = session_with(false);
        let publish = Publish::new(
            "omnirig/1/commands",
            QoS::AtLeastOnce,
            r#"{"command":"set_ptt","parameters":{"ptt":true}}"#,
            None,
        );
        session
            .on_event(Event::Incoming(Packet::Publish(publish)))
            .unwrap()
            .await
            .unwrap();

        let responses = sink.on_topic("omnirig/1/responses");
        assert_eq!(responses.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&responses[0].payload).unwrap();
        assert_eq!(body["status"], "success");
        assert_eq!(body["result"]["ptt"], true);
    }

    #[tokio::test]
    async fn test_publish_never_waits_for_the_broker() {
        // The event loop is never polled, so nothing drains the queue.
        let (sink, _eventloop) = connect(&MqttConfig::default());
        for i in 0..(REQUEST_QUEUE_CAP * 2) {
            let published = tokio::time::timeout(
                Duration::from_millis(200),
                publish_event(&sink, "1", "error", &format!("failure {i}")),
            )
            .await;
            assert!(matches!(published, Ok(Ok(()))), "publish {i} blocked");
        }
        assert!(sink.dropped() > 0);
        assert!(sink.disconnect().is_err());
    }

    #[tokio::test]
    async fn test_event_loop_stops_during_backoff() {
        let cfg = MqttConfig {
            address: "127.0.0.1".to_string(),
            port: closed_port(),
            ..MqttConfig::default()
        };
        let (sink, eventloop) = connect(&cfg);
        let adapter = RadioAdapter::new(Box::new(DummyLink::new()), None);
        let (connected_tx, connected_rx) = watch::channel(false);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_event_loop(
            eventloop,
            Arc::new(sink),
            CommandDispatcher::new(adapter.clone()),
            adapter,
            Box::new(ExponentialBackoff::new(
                Duration::from_secs(30),
                Duration::from_secs(60),
            )),
            connected_tx,
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown_tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(!*connected_rx.borrow());
    }
}
