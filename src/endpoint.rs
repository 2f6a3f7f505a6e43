//! Registry endpoint and push tuning knobs (§3, §6 configuration table)

use crate::retry::RetryPolicy;
use std::time::Duration;

/// Process-wide registry target. One connection pool lives under it from
/// first use to drop.
#[derive(Debug, Clone)]
pub struct RegistryEndpoint {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl RegistryEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        RegistryEndpoint {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Per-push tuning: blob fan-out bound, chunk size, and the monolithic/
/// chunked split point.
#[derive(Debug, Clone, Copy)]
pub struct PushOptions {
    pub max_concurrent_blobs: usize,
    pub chunk_size: usize,
    pub monolithic_threshold: u64,
    pub retry: RetryPolicy,
}

const MIN_CHUNK_SIZE: usize = 1024 * 1024;

impl Default for PushOptions {
    fn default() -> Self {
        PushOptions {
            max_concurrent_blobs: 5,
            chunk_size: 5 * 1024 * 1024,
            monolithic_threshold: 5 * 1024 * 1024,
            retry: RetryPolicy::default(),
        }
    }
}

impl PushOptions {
    /// Clamps `chunk_size` to the documented 1 MiB minimum.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(MIN_CHUNK_SIZE);
        self
    }

    pub fn with_max_concurrent_blobs(mut self, n: usize) -> Self {
        self.max_concurrent_blobs = n.max(1);
        self
    }

    pub fn with_monolithic_threshold(mut self, threshold: u64) -> Self {
        self.monolithic_threshold = threshold;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
