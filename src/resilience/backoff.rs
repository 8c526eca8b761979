//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Delay before retry number `attempt` (1-based). Attempt 0 is the first
/// try and waits nothing. Grows as base * 2^(attempt-1), capped at
/// `max_ms`, plus up to 10% jitter so concurrent retries spread out.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponential = base_ms.saturating_mul(2u64.saturating_pow(attempt - 1));
    let capped = exponential.min(max_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_attempt_has_no_delay() {
        assert_eq!(calculate_backoff(0, 100, 2000), Duration::ZERO);
    }

    #[test]
    fn test_delay_doubles_per_attempt() {
        let b1 = calculate_backoff(1, 100, 2000);
        assert!(b1.as_millis() >= 100);

        let b2 = calculate_backoff(2, 100, 2000);
        assert!(b2.as_millis() >= 200);
    }

    #[test]
    fn test_delay_is_capped_with_bounded_jitter() {
        let capped = calculate_backoff(10, 100, 1000);
        assert!(capped.as_millis() >= 1000);
        assert!(capped.as_millis() < 1100);
    }

    #[test]
    fn test_huge_attempt_numbers_do_not_overflow() {
        let d = calculate_backoff(u32::MAX, u64::MAX, 5000);
        assert!(d.as_millis() >= 5000);
    }
}
