// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Dual-cadence radio info publisher.
//!
//! The frequent topic gets every snapshot that differs from the last one
//! published there. The sporadic topic gets the current snapshot at least
//! once per sporadic interval whether or not anything changed. Nothing is
//! published while the radio reports itself offline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{error, info, trace};

use rigbridge_core::{DynResult, RadioAdapter, RadioSnapshot, RigSelector};
use rigbridge_protocol::topics::{FREQUENT_TOPIC, SPORADIC_TOPIC};
use rigbridge_protocol::{to_payload, OutboundMessage, Qos};

use crate::config::PublisherConfig;
use crate::mqtt::{publish_event, MessageSink};

pub struct Publisher {
    adapter: RadioAdapter,
    sink: Arc<dyn MessageSink>,
    frequent_interval: Duration,
    sporadic_interval: Duration,
    last_published: Option<RadioSnapshot>,
    last_sporadic: Option<Instant>,
}

impl Publisher {
    pub fn new(adapter: RadioAdapter, sink: Arc<dyn MessageSink>, cfg: &PublisherConfig) -> Self {
        Self {
            adapter,
            sink,
            frequent_interval: cfg.frequent_interval(),
            sporadic_interval: cfg.sporadic_interval(),
            last_published: None,
            last_sporadic: None,
        }
    }

    /// One cycle at `now`: poll, maybe publish sporadic, maybe publish
    /// frequent.
    pub async fn run_cycle(&mut self, now: Instant) -> DynResult<()> {
        let snapshot = self.adapter.poll(RigSelector::Rig1).await?;

        let sporadic_due = self
            .last_sporadic
            .map_or(true, |last| now.saturating_duration_since(last) >= self.sporadic_interval);
        if sporadic_due {
            self.publish_to_topic(SPORADIC_TOPIC, &snapshot).await?;
            self.last_sporadic = Some(now);
        }

        if self.last_published.as_ref() == Some(&snapshot) {
            return Ok(());
        }
        self.publish_to_topic(FREQUENT_TOPIC, &snapshot).await?;
        self.last_published = Some(snapshot);
        Ok(())
    }

    /// Retained at QoS 1; silently skipped while the radio is offline.
    async fn publish_to_topic(&self, topic: &str, snapshot: &RadioSnapshot) -> DynResult<()> {
        if !snapshot.is_connected {
            trace!("Radio offline, not publishing to {}", topic);
            return Ok(());
        }
        self.sink
            .publish(OutboundMessage {
                topic: topic.to_string(),
                payload: to_payload(snapshot)?,
                qos: Qos::AtLeastOnce,
                retain: true,
                correlation_data: None,
            })
            .await
    }

    /// Run cycles until shutdown. The frequent interval is slept after
    /// every cycle, failed or not.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Publishing radio info every {:?} (sporadic every {:?})",
            self.frequent_interval, self.sporadic_interval
        );
        loop {
            if let Err(e) = self.run_cycle(Instant::now()).await {
                error!("Error publishing radio info: {}", e);
                let message = format!("Failed to publish radio info: {e}");
                if let Err(e) = publish_event(self.sink.as_ref(), "1", "error", &message).await {
                    error!("Failed to publish error event: {}", e);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.frequent_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Radio info publisher stopped");
    }
}
