use std::time::Duration;

use serde::Deserialize;

use queue_api::QueueError;

pub const MAX_NAME_LENGTH: usize = 255;
pub const MAX_DESCRIPTION_LENGTH: usize = 1024;
pub const DEFAULT_RETENTION_HOURS: u32 = 24;
pub const MAX_RETENTION_HOURS: u32 = 168;
pub const MAX_TOPICS: usize = 1000;
pub const MAX_MESSAGE_SIZE_BYTES: usize = 256 * 1024;
pub const MAX_METADATA_KEYS: usize = 10;
pub const MAX_METADATA_KEY_LENGTH: usize = 128;
pub const MAX_METADATA_VALUE_LENGTH: usize = 1024;
pub const DEFAULT_MESSAGES_PER_CONSUME: u32 = 10;
pub const MAX_MESSAGES_PER_CONSUME: u32 = 10;
pub const MAX_WAIT_TIME_SECONDS: u32 = 20;
pub const MAX_LIST_MESSAGES: usize = 100;

/// Root engine configuration. Every field has a default, so an empty
/// `[engine]` table is valid.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub limits: QueueLimits,

    /// Re-poll interval of a long-polling consume.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub reaper: ReaperConfig,
}

fn default_poll_interval_ms() -> u64 {
    250
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: QueueLimits::default(),
            poll_interval_ms: default_poll_interval_ms(),
            reaper: ReaperConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reject configurations that make operations impossible.
    pub fn validate(&self) -> Result<(), QueueError> {
        let l = &self.limits;
        if self.poll_interval_ms == 0 {
            return Err(QueueError::validation("poll_interval_ms must be positive"));
        }
        if l.max_retention_hours == 0 {
            return Err(QueueError::validation("max_retention_hours must be positive"));
        }
        if l.default_retention_hours == 0 || l.default_retention_hours > l.max_retention_hours {
            return Err(QueueError::validation(format!(
                "default_retention_hours must be within 1..={}",
                l.max_retention_hours
            )));
        }
        if l.max_messages_per_consume == 0
            || l.default_messages_per_consume == 0
            || l.default_messages_per_consume > l.max_messages_per_consume
        {
            return Err(QueueError::validation(format!(
                "default_messages_per_consume must be within 1..={}",
                l.max_messages_per_consume
            )));
        }
        if self.reaper.interval_secs == 0 || self.reaper.page_size == 0 {
            return Err(QueueError::validation("reaper interval_secs and page_size must be positive"));
        }
        Ok(())
    }
}

/// Input limits enforced by validation.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueLimits {
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
    #[serde(default = "default_max_description_length")]
    pub max_description_length: usize,
    #[serde(default = "default_retention_hours")]
    pub default_retention_hours: u32,
    #[serde(default = "default_max_retention_hours")]
    pub max_retention_hours: u32,
    /// Account-wide topic quota.
    #[serde(default = "default_max_topics")]
    pub max_topics: usize,
    #[serde(default = "default_max_message_size_bytes")]
    pub max_message_size_bytes: usize,
    #[serde(default = "default_max_metadata_keys")]
    pub max_metadata_keys: usize,
    #[serde(default = "default_max_metadata_key_length")]
    pub max_metadata_key_length: usize,
    #[serde(default = "default_max_metadata_value_length")]
    pub max_metadata_value_length: usize,
    #[serde(default = "default_messages_per_consume")]
    pub default_messages_per_consume: u32,
    #[serde(default = "default_max_messages_per_consume")]
    pub max_messages_per_consume: u32,
    #[serde(default = "default_max_wait_time_seconds")]
    pub max_wait_time_seconds: u32,
    #[serde(default = "default_max_list_messages")]
    pub max_list_messages: usize,
}

fn default_max_name_length() -> usize {
    MAX_NAME_LENGTH
}
fn default_max_description_length() -> usize {
    MAX_DESCRIPTION_LENGTH
}
fn default_retention_hours() -> u32 {
    DEFAULT_RETENTION_HOURS
}
fn default_max_retention_hours() -> u32 {
    MAX_RETENTION_HOURS
}
fn default_max_topics() -> usize {
    MAX_TOPICS
}
fn default_max_message_size_bytes() -> usize {
    MAX_MESSAGE_SIZE_BYTES
}
fn default_max_metadata_keys() -> usize {
    MAX_METADATA_KEYS
}
fn default_max_metadata_key_length() -> usize {
    MAX_METADATA_KEY_LENGTH
}
fn default_max_metadata_value_length() -> usize {
    MAX_METADATA_VALUE_LENGTH
}
fn default_messages_per_consume() -> u32 {
    DEFAULT_MESSAGES_PER_CONSUME
}
fn default_max_messages_per_consume() -> u32 {
    MAX_MESSAGES_PER_CONSUME
}
fn default_max_wait_time_seconds() -> u32 {
    MAX_WAIT_TIME_SECONDS
}
fn default_max_list_messages() -> usize {
    MAX_LIST_MESSAGES
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self {
            max_name_length: default_max_name_length(),
            max_description_length: default_max_description_length(),
            default_retention_hours: default_retention_hours(),
            max_retention_hours: default_max_retention_hours(),
            max_topics: default_max_topics(),
            max_message_size_bytes: default_max_message_size_bytes(),
            max_metadata_keys: default_max_metadata_keys(),
            max_metadata_key_length: default_max_metadata_key_length(),
            max_metadata_value_length: default_max_metadata_value_length(),
            default_messages_per_consume: default_messages_per_consume(),
            max_messages_per_consume: default_max_messages_per_consume(),
            max_wait_time_seconds: default_max_wait_time_seconds(),
            max_list_messages: default_max_list_messages(),
        }
    }
}

/// Retention reaper schedule.
#[derive(Debug, Clone, Deserialize)]
pub struct ReaperConfig {
    #[serde(default = "default_reaper_enabled")]
    pub enabled: bool,
    #[serde(default = "default_reaper_interval_secs")]
    pub interval_secs: u64,
    /// Items fetched per store scan.
    #[serde(default = "default_reaper_page_size")]
    pub page_size: usize,
}

fn default_reaper_enabled() -> bool {
    true
}
fn default_reaper_interval_secs() -> u64 {
    60
}
fn default_reaper_page_size() -> usize {
    100
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: default_reaper_enabled(),
            interval_secs: default_reaper_interval_secs(),
            page_size: default_reaper_page_size(),
        }
    }
}

impl ReaperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.limits.max_message_size_bytes, 262_144);
        assert_eq!(config.limits.max_retention_hours, 168);
        assert_eq!(config.reaper.interval(), Duration::from_secs(60));
        config.validate().unwrap();
    }

    #[test]
    fn partial_limits_keep_other_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"limits": {"max_topics": 3}}"#).unwrap();
        assert_eq!(config.limits.max_topics, 3);
        assert_eq!(config.limits.max_metadata_keys, 10);
    }

    #[test]
    fn rejects_inconsistent_consume_limits() {
        let mut config = EngineConfig::default();
        config.limits.default_messages_per_consume = 50;
        assert!(config.validate().is_err());
    }
}
