use std::collections::BTreeMap;

use queue_api::{ConsumeRequest, QueueError};

use crate::config::QueueLimits;

/// Topic and consumer-group names: non-empty, bounded, `[A-Za-z0-9._-]`.
pub(crate) fn name(what: &str, value: &str, limits: &QueueLimits) -> Result<(), QueueError> {
    if value.is_empty() {
        return Err(QueueError::validation(format!("{what} name must not be empty")));
    }
    let len = value.chars().count();
    if len > limits.max_name_length {
        return Err(QueueError::validation(format!(
            "{what} name is {len} characters, limit is {}",
            limits.max_name_length
        )));
    }
    if let Some(c) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(QueueError::validation(format!(
            "{what} name contains invalid character {c:?}; allowed: letters, digits, '.', '_', '-'"
        )));
    }
    Ok(())
}

pub(crate) fn description(value: Option<&str>, limits: &QueueLimits) -> Result<(), QueueError> {
    match value {
        Some(d) if d.chars().count() > limits.max_description_length => {
            Err(QueueError::validation(format!(
                "description exceeds {} characters",
                limits.max_description_length
            )))
        }
        _ => Ok(()),
    }
}

pub(crate) fn retention(hours: u32, limits: &QueueLimits) -> Result<(), QueueError> {
    if hours == 0 || hours > limits.max_retention_hours {
        return Err(QueueError::validation(format!(
            "retentionPeriodHours must be within 1..={}, got {hours}",
            limits.max_retention_hours
        )));
    }
    Ok(())
}

/// Publish input. Size is checked first so that an oversized payload is
/// rejected before anything is written or allocated.
pub(crate) fn publish(
    payload: &[u8],
    content_type: &str,
    metadata: &BTreeMap<String, String>,
    limits: &QueueLimits,
) -> Result<(), QueueError> {
    if payload.len() > limits.max_message_size_bytes {
        return Err(QueueError::message_too_large(payload.len(), limits.max_message_size_bytes));
    }
    if content_type.trim().is_empty() {
        return Err(QueueError::validation("contentType is required"));
    }
    if metadata.len() > limits.max_metadata_keys {
        return Err(QueueError::validation(format!(
            "metadata has {} keys, limit is {}",
            metadata.len(),
            limits.max_metadata_keys
        )));
    }
    for (key, value) in metadata {
        if key.is_empty() {
            return Err(QueueError::validation("metadata keys must not be empty"));
        }
        if key.chars().count() > limits.max_metadata_key_length {
            return Err(QueueError::validation(format!(
                "metadata key '{key}' exceeds {} characters",
                limits.max_metadata_key_length
            )));
        }
        if value.chars().count() > limits.max_metadata_value_length {
            return Err(QueueError::validation(format!(
                "metadata value for '{key}' exceeds {} characters",
                limits.max_metadata_value_length
            )));
        }
    }
    Ok(())
}

/// Resolved `(max_messages, wait_time_seconds)` of a consume request.
pub(crate) fn consume(
    request: &ConsumeRequest,
    limits: &QueueLimits,
) -> Result<(usize, u32), QueueError> {
    let max = request.max_messages.unwrap_or(limits.default_messages_per_consume);
    if max == 0 || max > limits.max_messages_per_consume {
        return Err(QueueError::validation(format!(
            "maxMessages must be within 1..={}, got {max}",
            limits.max_messages_per_consume
        )));
    }
    let wait = request.wait_time_seconds.unwrap_or(0);
    if wait > limits.max_wait_time_seconds {
        return Err(QueueError::validation(format!(
            "waitTimeSeconds must be at most {}, got {wait}",
            limits.max_wait_time_seconds
        )));
    }
    Ok((max as usize, wait))
}

pub(crate) fn list_limit(limit: Option<usize>, limits: &QueueLimits) -> Result<usize, QueueError> {
    let limit = limit.unwrap_or(limits.max_list_messages);
    if limit == 0 || limit > limits.max_list_messages {
        return Err(QueueError::validation(format!(
            "limit must be within 1..={}, got {limit}",
            limits.max_list_messages
        )));
    }
    Ok(limit)
}

#[cfg(test)]
mod tests {
    use queue_api::ErrorCode;

    use super::*;

    fn limits() -> QueueLimits {
        QueueLimits::default()
    }

    #[test]
    fn names() {
        assert!(name("topic", "orders.v2_eu-west", &limits()).is_ok());
        assert!(name("topic", "", &limits()).is_err());
        assert!(name("topic", "has space", &limits()).is_err());
        assert!(name("topic", "a/b", &limits()).is_err());
        assert!(name("topic", &"x".repeat(255), &limits()).is_ok());
        assert!(name("topic", &"x".repeat(256), &limits()).is_err());
    }

    #[test]
    fn retention_bounds() {
        assert!(retention(0, &limits()).is_err());
        assert!(retention(1, &limits()).is_ok());
        assert!(retention(168, &limits()).is_ok());
        assert!(retention(169, &limits()).is_err());
    }

    #[test]
    fn oversized_payload_is_too_large_not_invalid() {
        let payload = vec![0u8; 256 * 1024 + 1];
        let err = publish(&payload, "", &BTreeMap::new(), &limits()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MessageTooLarge);

        let exact = vec![0u8; 256 * 1024];
        assert!(publish(&exact, "application/octet-stream", &BTreeMap::new(), &limits()).is_ok());
    }

    #[test]
    fn zero_length_payload_is_accepted() {
        assert!(publish(b"", "text/plain", &BTreeMap::new(), &limits()).is_ok());
    }

    #[test]
    fn publish_requires_content_type() {
        let err = publish(b"{}", " ", &BTreeMap::new(), &limits()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[test]
    fn metadata_limits() {
        let mut meta: BTreeMap<String, String> =
            (0..10).map(|i| (format!("k{i}"), "v".to_string())).collect();
        assert!(publish(b"x", "text/plain", &meta, &limits()).is_ok());

        meta.insert("k10".into(), "v".into());
        assert!(publish(b"x", "text/plain", &meta, &limits()).is_err());

        let long_value = BTreeMap::from([("k".to_string(), "v".repeat(1025))]);
        assert!(publish(b"x", "text/plain", &long_value, &limits()).is_err());
    }

    #[test]
    fn consume_defaults_and_bounds() {
        assert_eq!(consume(&ConsumeRequest::default(), &limits()).unwrap(), (10, 0));
        assert_eq!(consume(&ConsumeRequest::new(3).wait(20), &limits()).unwrap(), (3, 20));
        assert!(consume(&ConsumeRequest::new(0), &limits()).is_err());
        assert!(consume(&ConsumeRequest::new(11), &limits()).is_err());
        assert!(consume(&ConsumeRequest::new(1).wait(21), &limits()).is_err());
    }
}
