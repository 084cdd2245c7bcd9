//! Per-namespace token-bucket rate limiting, consulted before C3 (spec
//! §9 "a token-bucket limiter consulted per request before C3"; see
//! SPEC_FULL.md §11).
//!
//! Grounded directly on `capture::partition_limits::PartitionLimiter`:
//! same `governor::RateLimiter::dashmap` construction, same
//! `is_limited`-by-key query shape, adapted from per-event-key limiting
//! to per-namespace limiting using each namespace's own
//! `rateLimitConfig`.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{clock, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter};
use wal_common::model::RateLimitConfig;

#[derive(Clone)]
pub struct NamespaceRateLimiter {
    limiter: Arc<RateLimiter<String, DefaultKeyedStateStore<String>, clock::DefaultClock>>,
}

impl NamespaceRateLimiter {
    /// Builds a limiter whose quota matches `config`, or an effectively
    /// unlimited one if a namespace carries no `rateLimitConfig`.
    pub fn new(config: Option<&RateLimitConfig>) -> Self {
        let per_second = config
            .and_then(|c| NonZeroU32::new(c.requests_per_second))
            .unwrap_or_else(|| NonZeroU32::new(u32::MAX).expect("u32::MAX is non-zero"));
        let burst = config
            .and_then(|c| c.burst)
            .and_then(NonZeroU32::new)
            .unwrap_or(per_second);

        let quota = Quota::per_second(per_second).allow_burst(burst);
        Self {
            limiter: Arc::new(RateLimiter::dashmap(quota)),
        }
    }

    pub fn is_limited(&self, namespace: &str) -> bool {
        self.limiter.check_key(&namespace.to_owned()).is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttles_past_burst() {
        let limiter = NamespaceRateLimiter::new(Some(&RateLimitConfig {
            requests_per_second: 1,
            burst: Some(1),
        }));
        assert!(!limiter.is_limited("ns"));
        assert!(limiter.is_limited("ns"));
    }

    #[test]
    fn unconfigured_namespace_is_effectively_unlimited() {
        let limiter = NamespaceRateLimiter::new(None);
        for _ in 0..100 {
            assert!(!limiter.is_limited("ns"));
        }
    }
}
