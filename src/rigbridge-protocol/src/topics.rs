// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! MQTT topic contract.

pub const TOPIC_PREFIX: &str = "omnirig/";

/// Subscription filter for inbound commands of every rig.
pub const COMMANDS_FILTER: &str = "omnirig/+/commands";

pub const FREQUENT_TOPIC: &str = "omnirig/frequent/radio_info";
pub const SPORADIC_TOPIC: &str = "omnirig/sporadic/radio_info";

/// Rig id used for process-wide notifications.
pub const SYSTEM_RIG_ID: &str = "system";

pub fn responses_topic(rig_id: &str) -> String {
    format!("{TOPIC_PREFIX}{rig_id}/responses")
}

pub fn events_topic(rig_id: &str) -> String {
    format!("{TOPIC_PREFIX}{rig_id}/events")
}

pub fn status_topic(rig_id: &str) -> String {
    format!("{TOPIC_PREFIX}{rig_id}/status")
}

/// Rig id is the second topic level: `omnirig/<rig_id>/commands`.
pub fn rig_id_from_topic(topic: &str) -> Option<&str> {
    topic.split('/').nth(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_per_rig_topics() {
        assert_eq!(responses_topic("1"), "omnirig/1/responses");
        assert_eq!(events_topic("system"), "omnirig/system/events");
        assert_eq!(status_topic("2"), "omnirig/2/status");
    }

    #[test]
    fn extracts_rig_id() {
        assert_eq!(rig_id_from_topic("omnirig/1/commands"), Some("1"));
        assert_eq!(rig_id_from_topic("omnirig/shack/commands"), Some("shack"));
        assert_eq!(rig_id_from_topic("omnirig"), None);
    }
}
