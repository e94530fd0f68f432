use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════
//  Records
// ════════════════════════════════════════════════════════════════

/// Named, durable stream of messages with its own retention window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub topic_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Creation time, Unix ms.
    pub created_at: i64,
    pub retention_period_hours: u32,
    /// Lifetime publish count. Retention never decrements it.
    #[serde(default)]
    pub message_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_timestamp: Option<i64>,
}

/// Message metadata. Payload bytes live in the blob store under `payload_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_id: String,
    pub topic_id: String,
    /// Strictly increasing per topic, starting at 1. Gaps are possible.
    pub sequence_number: u64,
    /// Publish time, Unix ms.
    pub timestamp: i64,
    pub payload_key: String,
    pub content_type: String,
    /// Payload size in bytes.
    pub size: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    /// `timestamp + retentionPeriodHours` in ms.
    pub expires_at: i64,
}

impl Message {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at <= now_ms
    }
}

/// Named cursor holder consuming a topic independently of other groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerGroup {
    pub group_id: String,
    pub topic_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_consumed_timestamp: Option<i64>,
}

/// Consumption progress of one group on one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offset {
    pub group_id: String,
    pub topic_id: String,
    /// Last delivered sequence number; 0 = nothing consumed yet.
    #[serde(default)]
    pub last_sequence_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_consumed_timestamp: Option<i64>,
}

impl Offset {
    /// Cursor of a group that has not consumed anything.
    pub fn initial(topic_id: &str, group_id: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
            topic_id: topic_id.to_string(),
            last_sequence_number: 0,
            last_consumed_timestamp: None,
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  Requests
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTopicRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// None = configured default retention.
    #[serde(default)]
    pub retention_period_hours: Option<u32>,
}

/// Partial topic update. Absent fields stay unchanged; an empty
/// `description` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTopicRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub retention_period_hours: Option<u32>,
}

impl UpdateTopicRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.retention_period_hours.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishRequest {
    pub payload: Vec<u8>,
    pub content_type: String,
    pub metadata: BTreeMap<String, String>,
}

impl PublishRequest {
    pub fn new(payload: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            content_type: content_type.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConsumerGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeRequest {
    /// None = configured default batch size.
    #[serde(default)]
    pub max_messages: Option<u32>,
    /// None or 0 = return immediately when nothing is available.
    #[serde(default)]
    pub wait_time_seconds: Option<u32>,
}

impl ConsumeRequest {
    pub fn new(max_messages: u32) -> Self {
        Self { max_messages: Some(max_messages), wait_time_seconds: None }
    }

    pub fn wait(mut self, seconds: u32) -> Self {
        self.wait_time_seconds = Some(seconds);
        self
    }
}

// ════════════════════════════════════════════════════════════════
//  Responses
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReceipt {
    pub message_id: String,
    pub topic_id: String,
    pub sequence_number: u64,
    pub timestamp: i64,
}

/// Message metadata together with its payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredMessage {
    pub message: Message,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumeResponse {
    /// Ascending by sequence number.
    pub messages: Vec<DeliveredMessage>,
    /// Greatest delivered sequence number, or the prior cursor when empty.
    pub next_sequence_number: u64,
}

impl ConsumeResponse {
    pub fn sequence_numbers(&self) -> Vec<u64> {
        self.messages.iter().map(|m| m.message.sequence_number).collect()
    }
}
