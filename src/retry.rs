//! Exponential-backoff retry policy shared by the blob and manifest
//! protocols (C12)
//!
//! Generalized from `TokenManager::execute_with_retry`'s shape (an
//! attempt-counted loop around a fallible operation, matching on the
//! outcome to decide retry-vs-bail) but driven by transient-failure
//! classification instead of 401-triggered token refresh. The loop itself
//! lives in `transport::HttpSession::send_with_retry`, since deciding
//! whether to retry requires inspecting the HTTP status and `Retry-After`
//! header, not just the error.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy { max_attempts: 3, base_backoff: Duration::from_millis(500) }
    }
}

impl RetryPolicy {
    /// `base_backoff * 2^(attempt-1)` plus up to 100ms of deterministic
    /// jitter, so retry timing stays reproducible under test.
    pub(crate) fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let exp = self.base_backoff.saturating_mul(1u32 << shift);
        exp + Duration::from_millis(jitter_ms(attempt))
    }
}

fn jitter_ms(attempt: u32) -> u64 {
    (attempt as u64 * 37) % 100
}

/// 5xx, 408, and 429 are retried per §4.4.5/§7; everything else is
/// terminal at the HTTP layer.
pub(crate) fn is_retriable_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..=599).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially() {
        let policy = RetryPolicy { max_attempts: 5, base_backoff: Duration::from_millis(100) };
        assert!(policy.backoff_for(1) < policy.backoff_for(2));
        assert!(policy.backoff_for(2) < policy.backoff_for(3));
    }

    #[test]
    fn retriable_statuses() {
        assert!(is_retriable_status(503));
        assert!(is_retriable_status(429));
        assert!(is_retriable_status(408));
        assert!(!is_retriable_status(404));
        assert!(!is_retriable_status(400));
    }
}
