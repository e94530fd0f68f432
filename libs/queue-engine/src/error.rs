use queue_api::{QueueError, StoreError};

/// Translation of store results at a component boundary.
pub(crate) trait StoreResultExt<T> {
    /// Map a failed write condition to the domain error it means at this
    /// call site. Any other store failure keeps its generic translation.
    fn on_conflict(self, err: impl FnOnce() -> QueueError) -> Result<T, QueueError>;
}

impl<T> StoreResultExt<T> for Result<T, StoreError> {
    fn on_conflict(self, err: impl FnOnce() -> QueueError) -> Result<T, QueueError> {
        match self {
            Ok(v) => Ok(v),
            Err(StoreError::ConditionFailed) => Err(err()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use queue_api::ErrorCode;

    use super::*;

    #[test]
    fn conflict_becomes_domain_error() {
        let res: Result<(), StoreError> = Err(StoreError::ConditionFailed);
        let err = res.on_conflict(|| QueueError::topic_not_found("t")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::TopicNotFound);
    }

    #[test]
    fn transient_failure_passes_through() {
        let res: Result<(), StoreError> = Err(StoreError::Throttled("slow down".into()));
        let err = res.on_conflict(|| QueueError::topic_not_found("t")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::RateLimitExceeded);
    }
}
