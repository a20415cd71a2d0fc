//! Backoff helpers.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff for retry `n` (1-based): `base · 2^(n-1)`.
///
/// The schedule is deterministic; spreading load across retrying clients
/// is the job of the per-request arrival times, not jitter here.
pub fn retry_backoff(retry: u32, base: Duration) -> Duration {
    let factor = 2u32.saturating_pow(retry.saturating_sub(1));
    base.saturating_mul(factor)
}

/// A period with up to 10% random jitter added, used by the health prober
/// to keep a fleet of probers from synchronizing.
pub fn jittered(period: Duration) -> Duration {
    let jitter_range = period.as_millis() as u64 / 10;
    if jitter_range == 0 {
        return period;
    }
    let jitter = rand::thread_rng().gen_range(0..jitter_range);
    period + Duration::from_millis(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_retry() {
        let base = Duration::from_millis(100);
        assert_eq!(retry_backoff(1, base), Duration::from_millis(100));
        assert_eq!(retry_backoff(2, base), Duration::from_millis(200));
        assert_eq!(retry_backoff(3, base), Duration::from_millis(400));
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let period = Duration::from_secs(30);
        for _ in 0..100 {
            let jittered = jittered(period);
            assert!(jittered >= period);
            assert!(jittered <= period + Duration::from_secs(3));
        }
    }
}
