//! The retryability predicate and backoff schedule from §4.3.

use std::time::Duration;

use blob_common::config::{QUEUE_BASE_BACKOFF, QUEUE_MAX_BACKOFF};

const NON_RETRYABLE_SUBSTRINGS: &[&str] = &[
    "insufficient balance",
    "file too large",
    "missing required",
    "aborted",
];

const RETRYABLE_MESSAGE_SUBSTRINGS: &[&str] = &[
    "timeout",
    "network",
    "unreachable",
    "server may be down",
    "connection refused",
    "econnreset",
    "etimedout",
    "temporarily unavailable",
];

/// An HTTP status as observed by the client; `0` stands for a network-level failure
/// with no HTTP response at all (the same convention the browser XHR layer uses).
pub fn is_retryable(message: &str, status: u16) -> bool {
    let lower = message.to_lowercase();
    if NON_RETRYABLE_SUBSTRINGS.iter().any(|s| lower.contains(s)) {
        return false;
    }

    if matches!(status, 0 | 408 | 429) || (500..600).contains(&status) {
        return true;
    }

    if RETRYABLE_MESSAGE_SUBSTRINGS.iter().any(|s| lower.contains(s)) {
        return true;
    }

    // Default to retryable: an unrecognized failure is assumed transient rather
    // than permanently blocking the item.
    true
}

/// `delay = min(10s * 2^attempt, 60s)`.
pub fn backoff_for_attempt(attempt: u32) -> Duration {
    let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    let scaled = QUEUE_BASE_BACKOFF
        .checked_mul(multiplier)
        .unwrap_or(QUEUE_MAX_BACKOFF);
    scaled.min(QUEUE_MAX_BACKOFF)
}

/// `timeoutMs = max(60s, 60s + 1s * fileSizeMiB)` for the client-side XHR upload.
pub fn xhr_timeout(file_size_bytes: u64) -> Duration {
    let mib = file_size_bytes as f64 / (1024.0 * 1024.0);
    let computed = Duration::from_secs(60) + Duration::from_secs_f64(mib);
    computed.max(Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_retryable_phrases_win_even_with_5xx_status() {
        assert!(!is_retryable("Insufficient balance for this upload", 500));
        assert!(!is_retryable("File too large for plan", 413));
        assert!(!is_retryable("Missing required field: userId", 400));
        assert!(!is_retryable("Upload aborted by user", 0));
    }

    #[test]
    fn network_and_5xx_statuses_are_retryable() {
        for status in [0, 408, 429, 500, 502, 503] {
            assert!(is_retryable("boom", status), "status {status} should be retryable");
        }
    }

    #[test]
    fn message_substrings_are_retryable_regardless_of_status() {
        assert!(is_retryable("Request timeout while connecting", 200));
        assert!(is_retryable("server may be down for maintenance", 200));
        assert!(is_retryable("ECONNRESET", 200));
    }

    #[test]
    fn unrecognized_errors_default_to_retryable() {
        assert!(is_retryable("something exploded", 418));
    }

    #[test]
    fn backoff_doubles_and_caps_at_60s() {
        assert_eq!(backoff_for_attempt(0), Duration::from_secs(10));
        assert_eq!(backoff_for_attempt(1), Duration::from_secs(20));
        assert_eq!(backoff_for_attempt(2), Duration::from_secs(40));
        assert_eq!(backoff_for_attempt(3), Duration::from_secs(60));
        assert_eq!(backoff_for_attempt(10), Duration::from_secs(60));
    }

    #[test]
    fn xhr_timeout_scales_with_file_size() {
        assert_eq!(xhr_timeout(0), Duration::from_secs(60));
        assert_eq!(xhr_timeout(10 * 1024 * 1024), Duration::from_secs(70));
    }
}
