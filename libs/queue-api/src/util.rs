/// Current Unix time in milliseconds.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Milliseconds in one hour.
pub const HOUR_MS: i64 = 3_600 * 1_000;

/// Expiry instant for a message published at `timestamp_ms`.
pub fn expires_at(timestamp_ms: i64, retention_hours: u32) -> i64 {
    timestamp_ms.saturating_add(i64::from(retention_hours) * HOUR_MS)
}
