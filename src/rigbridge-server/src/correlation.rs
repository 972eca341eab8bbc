// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Request/response pairing.
//!
//! Correlation data and the response-topic hint are read from transport
//! metadata before the body is looked at, so a request whose body cannot
//! be parsed still gets a correlated `INVALID_MESSAGE` reply.

use tracing::{debug, error, info, warn};

use rigbridge_protocol::topics::{self, rig_id_from_topic};
use rigbridge_protocol::{
    parse_command_message, to_payload, CommandResponse, ErrorCode, InboundMessage,
    OutboundMessage,
};

use crate::dispatcher::CommandDispatcher;
use crate::mqtt::MessageSink;

/// Handle one inbound message. Publishes exactly one response unless the
/// topic carries no rig id.
pub async fn handle_inbound(
    msg: InboundMessage,
    dispatcher: &CommandDispatcher,
    sink: &dyn MessageSink,
) {
    debug!(
        "Received message on {}: {}",
        msg.topic,
        String::from_utf8_lossy(&msg.payload)
    );
    let Some(rig_id) = rig_id_from_topic(&msg.topic) else {
        warn!("Ignoring message on {}: no rig id in topic", msg.topic);
        return;
    };
    let correlation_data = msg.correlation_data.clone().unwrap_or_default();

    let response = match parse_command_message(&msg.payload) {
        Ok(mut command) => {
            command.correlation_data = correlation_data.clone();
            dispatcher.handle(&command, rig_id).await
        }
        Err(e) => {
            warn!("Failed to deserialize command message on {}: {}", msg.topic, e);
            CommandResponse::error(ErrorCode::InvalidMessage, "Failed to deserialize command message")
                .correlated(&correlation_data)
        }
    };

    let topic = response_topic(&msg, rig_id);
    let payload = match to_payload(&response) {
        Ok(payload) => payload,
        Err(e) => {
            error!("Failed to serialize response for {}: {}", topic, e);
            return;
        }
    };
    let outbound = OutboundMessage {
        topic,
        payload,
        qos: msg.qos,
        retain: false,
        correlation_data: (!correlation_data.is_empty()).then_some(correlation_data),
    };
    let topic = outbound.topic.clone();
    match sink.publish(outbound).await {
        Ok(()) => info!("Published {:?} response to {}", response.status, topic),
        Err(e) => error!("Failed to publish response to {}: {}", topic, e),
    }
}

/// The request's hint when present, else `omnirig/<rig_id>/responses`.
fn response_topic(msg: &InboundMessage, rig_id: &str) -> String {
    match msg.response_topic.as_deref() {
        Some(hint) if !hint.is_empty() => hint.to_string(),
        _ => topics::responses_topic(rig_id),
    }
}

#[cfg(test)]
mod tests {
    use rigbridge_backend::{DummyHandle, DummyLink};
    use rigbridge_core::RadioAdapter;
    use rigbridge_protocol::Qos;
    use serde_json::Value;

    use super::*;
    use crate::mqtt::RecordingSink;

    fn setup() -> (CommandDispatcher, DummyHandle, RecordingSink) {
        let link = DummyLink::new();
        let handle = link.handle();
        let dispatcher = CommandDispatcher::new(RadioAdapter::new(Box::new(link), None));
        (dispatcher, handle, RecordingSink::default())
    }

    fn inbound(topic: &str, payload: &str) -> InboundMessage {
        InboundMessage {
            topic: topic.to_string(),
            payload: payload.as_bytes().to_vec(),
            qos: Qos::AtLeastOnce,
            correlation_data: Some(b"corr-7".to_vec()),
            response_topic: None,
        }
    }

    fn body(msg: &OutboundMessage) -> Value {
        serde_json::from_slice(&msg.payload).unwrap()
    }

    #[tokio::test]
    async fn response_goes_to_default_topic() {
        let (dispatcher, radio, sink) = setup();
        let msg = inbound(
            "omnirig/1/commands",
            r#"{"command":"set_frequency","parameters":{"frequency":10136000}}"#,
        );
        handle_inbound(msg, &dispatcher, &sink).await;

        let sent = sink.messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, "omnirig/1/responses");
        assert_eq!(sent[0].qos, Qos::AtLeastOnce);
        assert_eq!(sent[0].correlation_data.as_deref(), Some(&b"corr-7"[..]));
        let json = body(&sent[0]);
        assert_eq!(json["status"], "success");
        assert_eq!(json["result"]["vfo"], "A");
        assert_eq!(json["correlation_data"], "corr-7");
        assert_eq!(radio.vfo_a(), 10_136_000);
    }

    #[tokio::test]
    async fn response_topic_hint_and_qos_are_honoured() {
        let (dispatcher, _radio, sink) = setup();
        let mut msg = inbound("omnirig/2/commands", r#"{"command":"get_status"}"#);
        msg.response_topic = Some("clients/abc/replies".to_string());
        msg.qos = Qos::ExactlyOnce;
        handle_inbound(msg, &dispatcher, &sink).await;

        let sent = sink.messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, "clients/abc/replies");
        assert_eq!(sent[0].qos, Qos::ExactlyOnce);
        assert!(!sent[0].retain);
        assert_eq!(body(&sent[0])["result"]["ActiveRadioNr"], 1);
    }

    #[tokio::test]
    async fn malformed_payload_still_gets_correlated_reply() {
        let (dispatcher, _radio, sink) = setup();
        handle_inbound(
            inbound("omnirig/1/commands", "{not json"),
            &dispatcher,
            &sink,
        )
        .await;

        let sent = sink.messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].correlation_data.as_deref(), Some(&b"corr-7"[..]));
        let json = body(&sent[0]);
        assert_eq!(json["status"], "error");
        assert_eq!(json["error_code"], "INVALID_MESSAGE");
        assert_eq!(json["error_message"], "Failed to deserialize command message");
        assert_eq!(json["correlation_data"], "corr-7");
    }

    #[tokio::test]
    async fn missing_correlation_is_sent_empty() {
        let (dispatcher, _radio, sink) = setup();
        let mut msg = inbound("omnirig/1/commands", r#"{"command":"nope"}"#);
        msg.correlation_data = None;
        handle_inbound(msg, &dispatcher, &sink).await;

        let sent = sink.messages();
        assert_eq!(sent[0].correlation_data, None);
        let json = body(&sent[0]);
        assert_eq!(json["error_code"], "INVALID_COMMAND");
        assert_eq!(json["correlation_data"], "");
    }

    #[tokio::test]
    async fn topic_without_rig_id_is_ignored() {
        let (dispatcher, _radio, sink) = setup();
        handle_inbound(
            inbound("omnirig", r#"{"command":"get_status"}"#),
            &dispatcher,
            &sink,
        )
        .await;
        assert!(sink.messages().is_empty());
    }
}
