//! # Retry Backoff
//!
//! Pure computation of the next retry time for a failed outbox op. State
//! is persisted by `sync-store` (`next_retry_at`), not held by an
//! in-memory timer, so retries survive a process restart.

use crate::outbox::{BASE_BACKOFF_MS, MAX_BACKOFF_MS, MAX_RETRY_ATTEMPTS};

/// Pure doubling-with-cap delay for a given retry count, independent of
/// whether that count is still within `MAX_RETRY_ATTEMPTS`. Exists mainly
/// so the `.min(MAX_BACKOFF_MS)` cap can be exercised directly: with
/// `MAX_RETRY_ATTEMPTS=5` the gated sequence in [`next_retry_at`] never
/// reaches it (its last scheduled delay is 16s), but the formula itself
/// still must saturate for arbitrarily large retry counts.
fn backoff_delay_ms(retry_count: i64) -> i64 {
    let shift = (retry_count - 1).clamp(0, 62) as u32;
    BASE_BACKOFF_MS.saturating_mul(1i64 << shift).min(MAX_BACKOFF_MS)
}

/// Given the retry count *after* this failure (i.e. already incremented),
/// returns the epoch-millisecond timestamp at which the op becomes
/// eligible for retry, or `None` if retries are exhausted.
///
/// Sequence (seconds): 1, 2, 4, 8, 16, capped at 300.
pub fn next_retry_at(retry_count: i64, now_ms: i64) -> Option<i64> {
    if retry_count > MAX_RETRY_ATTEMPTS {
        return None;
    }
    Some(now_ms + backoff_delay_ms(retry_count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_sequence_doubles_up_to_cap() {
        let now = 0;
        assert_eq!(next_retry_at(1, now), Some(1_000));
        assert_eq!(next_retry_at(2, now), Some(2_000));
        assert_eq!(next_retry_at(3, now), Some(4_000));
        assert_eq!(next_retry_at(4, now), Some(8_000));
        assert_eq!(next_retry_at(5, now), Some(16_000));
    }

    #[test]
    fn backoff_delay_is_capped_at_five_minutes() {
        // MAX_RETRY_ATTEMPTS=5 means next_retry_at never schedules past 16s
        // (its last retry_count=5 delay); the cap itself is still a real
        // part of the formula, so it's verified directly here.
        assert_eq!(backoff_delay_ms(20), MAX_BACKOFF_MS);
        assert_eq!(backoff_delay_ms(10), MAX_BACKOFF_MS);
        assert!(backoff_delay_ms(9) < MAX_BACKOFF_MS);
    }

    #[test]
    fn next_retry_at_is_none_past_max_attempts_even_at_large_counts() {
        assert_eq!(next_retry_at(20, 0), None);
    }

    #[test]
    fn retries_exhausted_past_max_attempts() {
        assert_eq!(next_retry_at(MAX_RETRY_ATTEMPTS + 1, 0), None);
    }

    #[test]
    fn retry_at_max_attempts_still_scheduled() {
        assert!(next_retry_at(MAX_RETRY_ATTEMPTS, 0).is_some());
    }
}
