use serde::Serialize;

use crate::store::StoreError;

/// Stable error code returned to callers. Transport bindings map it to
/// their own status space; the code itself never changes meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed or out-of-range input. Permanent, do not retry.
    ValidationError,
    TopicNotFound,
    TopicAlreadyExists,
    /// Payload exceeds the configured message size limit.
    MessageTooLarge,
    ConsumerGroupNotFound,
    ConsumerGroupAlreadyExists,
    /// Store throttled the request. Transient, safe to retry.
    RateLimitExceeded,
    /// Store unreachable or contended. Transient, safe to retry.
    ServiceUnavailable,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::TopicNotFound => "TOPIC_NOT_FOUND",
            ErrorCode::TopicAlreadyExists => "TOPIC_ALREADY_EXISTS",
            ErrorCode::MessageTooLarge => "MESSAGE_TOO_LARGE",
            ErrorCode::ConsumerGroupNotFound => "CONSUMER_GROUP_NOT_FOUND",
            ErrorCode::ConsumerGroupAlreadyExists => "CONSUMER_GROUP_ALREADY_EXISTS",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain error returned by every queue operation.
///
/// Carries a stable `ErrorCode` and a human-readable message. Storage
/// failures reach callers only through this type: conditional-write
/// conflicts are translated by the component that issued the write,
/// transient failures keep a retryable code.
#[derive(Clone, PartialEq, Eq)]
pub struct QueueError {
    code: ErrorCode,
    message: String,
}

impl QueueError {
    pub fn new(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into() }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, msg)
    }

    pub fn topic_not_found(topic_id: &str) -> Self {
        Self::new(ErrorCode::TopicNotFound, format!("topic '{topic_id}' not found"))
    }

    pub fn topic_already_exists(name: &str) -> Self {
        Self::new(ErrorCode::TopicAlreadyExists, format!("topic '{name}' already exists"))
    }

    pub fn message_too_large(size: usize, limit: usize) -> Self {
        Self::new(
            ErrorCode::MessageTooLarge,
            format!("payload of {size} bytes exceeds limit of {limit} bytes"),
        )
    }

    pub fn group_not_found(topic_id: &str, group_id: &str) -> Self {
        Self::new(
            ErrorCode::ConsumerGroupNotFound,
            format!("consumer group '{group_id}' not found for topic '{topic_id}'"),
        )
    }

    pub fn group_already_exists(topic_id: &str, name: &str) -> Self {
        Self::new(
            ErrorCode::ConsumerGroupAlreadyExists,
            format!("consumer group '{name}' already exists for topic '{topic_id}'"),
        )
    }

    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RateLimitExceeded, msg)
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, msg)
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Only throttling and unavailability are worth retrying; validation,
    /// not-found and already-exists fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(self.code, ErrorCode::RateLimitExceeded | ErrorCode::ServiceUnavailable)
    }

    /// Add context to the error, preserving the original code.
    ///
    /// Produces: `"context: original message"`.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        Self {
            code: self.code,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl std::fmt::Debug for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for QueueError {}

/// Fallback translation for store failures that no component claimed.
///
/// `ConditionFailed` lands here only when a caller forgot to translate it,
/// so it becomes an internal error rather than a misleading domain code.
impl From<StoreError> for QueueError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Throttled(msg) => Self::rate_limited(format!("store throttled: {msg}")),
            StoreError::Unavailable(msg) => Self::unavailable(format!("store unavailable: {msg}")),
            StoreError::ConditionFailed => Self::internal("unexpected conditional write conflict"),
            other => Self::internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_store_errors_stay_retryable() {
        let throttled = QueueError::from(StoreError::Throttled("hot partition".into()));
        assert_eq!(throttled.code(), ErrorCode::RateLimitExceeded);
        assert!(throttled.is_retryable());

        let down = QueueError::from(StoreError::Unavailable("connection reset".into()));
        assert_eq!(down.code(), ErrorCode::ServiceUnavailable);
        assert!(down.is_retryable());
    }

    #[test]
    fn untranslated_conflict_is_internal() {
        let err = QueueError::from(StoreError::ConditionFailed);
        assert_eq!(err.code(), ErrorCode::InternalError);
        assert!(!err.is_retryable());
    }

    #[test]
    fn code_serializes_as_wire_name() {
        let json = serde_json::to_string(&ErrorCode::ConsumerGroupAlreadyExists).unwrap();
        assert_eq!(json, "\"CONSUMER_GROUP_ALREADY_EXISTS\"");
        assert_eq!(ErrorCode::MessageTooLarge.as_str(), "MESSAGE_TOO_LARGE");
    }

    #[test]
    fn context_keeps_code() {
        let err = QueueError::topic_not_found("t-1").with_context("publish");
        assert_eq!(err.code(), ErrorCode::TopicNotFound);
        assert_eq!(err.message(), "publish: topic 't-1' not found");
    }
}
