//! Key layout of the shared store.
//!
//! All records live in one ordered key space. Message keys embed a
//! zero-padded sequence number so that a prefix scan returns them in
//! publish order.

pub const TOPIC_PREFIX: &str = "topic/";
pub const TOPIC_NAME_PREFIX: &str = "topic-name/";
pub const SEQUENCE_PREFIX: &str = "seq/";
pub const MESSAGE_PREFIX: &str = "msg/";
pub const GROUP_PREFIX: &str = "group/";
pub const GROUP_NAME_PREFIX: &str = "group-name/";
pub const OFFSET_PREFIX: &str = "offset/";

pub fn topic(topic_id: &str) -> String {
    format!("{TOPIC_PREFIX}{topic_id}")
}

pub fn topic_name(name: &str) -> String {
    format!("{TOPIC_NAME_PREFIX}{name}")
}

/// Per-topic sequence counter. Separate from `messageCount` on the topic row.
pub fn sequence(topic_id: &str) -> String {
    format!("{SEQUENCE_PREFIX}{topic_id}")
}

pub fn messages(topic_id: &str) -> String {
    format!("{MESSAGE_PREFIX}{topic_id}/")
}

pub fn message(topic_id: &str, sequence_number: u64) -> String {
    format!("{MESSAGE_PREFIX}{topic_id}/{sequence_number:020}")
}

pub fn groups(topic_id: &str) -> String {
    format!("{GROUP_PREFIX}{topic_id}/")
}

pub fn group(topic_id: &str, group_id: &str) -> String {
    format!("{GROUP_PREFIX}{topic_id}/{group_id}")
}

pub fn group_names(topic_id: &str) -> String {
    format!("{GROUP_NAME_PREFIX}{topic_id}/")
}

pub fn group_name(topic_id: &str, name: &str) -> String {
    format!("{GROUP_NAME_PREFIX}{topic_id}/{name}")
}

pub fn offsets(topic_id: &str) -> String {
    format!("{OFFSET_PREFIX}{topic_id}/")
}

pub fn offset(topic_id: &str, group_id: &str) -> String {
    format!("{OFFSET_PREFIX}{topic_id}/{group_id}")
}

/// Topic id embedded in a key under `prefix` (`seq/{id}`, `group/{id}/..`).
pub fn topic_id_of<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    key.strip_prefix(prefix)?
        .split('/')
        .next()
        .filter(|id| !id.is_empty())
}

/// Item field names shared by partial updates.
pub mod field {
    pub const MESSAGE_COUNT: &str = "messageCount";
    pub const LAST_MESSAGE_TIMESTAMP: &str = "lastMessageTimestamp";
    pub const NAME: &str = "name";
    pub const DESCRIPTION: &str = "description";
    pub const RETENTION_PERIOD_HOURS: &str = "retentionPeriodHours";
    pub const LAST_SEQUENCE_NUMBER: &str = "lastSequenceNumber";
    pub const LAST_CONSUMED_TIMESTAMP: &str = "lastConsumedTimestamp";
    /// Counter value of a `seq/` row.
    pub const VALUE: &str = "value";
    /// Id owning a name-index row.
    pub const OWNER: &str = "owner";
    pub const CLAIMED_AT: &str = "claimedAt";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_keys_sort_by_sequence() {
        let nine = message("t", 9);
        let ten = message("t", 10);
        assert!(nine < ten);
        assert!(nine.starts_with(&messages("t")));
        // Cursor 0 sorts before every real message.
        assert!(message("t", 0) < message("t", 1));
    }

    #[test]
    fn prefixes_do_not_overlap() {
        assert!(!topic_name("orders").starts_with(TOPIC_PREFIX));
        assert!(!group_name("t", "billing").starts_with(GROUP_PREFIX));
    }

    #[test]
    fn extracts_topic_id() {
        assert_eq!(topic_id_of(&sequence("abc"), SEQUENCE_PREFIX), Some("abc"));
        assert_eq!(topic_id_of(&group("abc", "g1"), GROUP_PREFIX), Some("abc"));
        assert_eq!(topic_id_of("seq/", SEQUENCE_PREFIX), None);
        assert_eq!(topic_id_of("other/abc", SEQUENCE_PREFIX), None);
    }
}
