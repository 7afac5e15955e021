//! Rate Limiting for Message Writes
//!
//! Per-client-IP throttling of the mutating message routes using
//! tower_governor's GCRA limiter.

use governor::middleware::StateInformationMiddleware;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::PeerIpKeyExtractor;

/// Governor config keyed by peer IP, reporting X-RateLimit-* headers
pub type WriteGovernorConfig =
    tower_governor::governor::GovernorConfig<PeerIpKeyExtractor, StateInformationMiddleware>;

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Seconds to replenish one request of the quota
    pub per_second: u64,
    /// Requests that can be made back to back
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: 1,
            burst_size: 10,
        }
    }
}

impl RateLimitConfig {
    /// Tighter quota for public deployments
    pub fn strict() -> Self {
        Self {
            per_second: 4,
            burst_size: 2,
        }
    }
}

/// Build the governor config for message writes.
///
/// Returns `None` for a zero rate or burst. The server must be run with
/// `into_make_service_with_connect_info::<SocketAddr>()` for the peer IP
/// to be available.
pub fn write_governor(config: &RateLimitConfig) -> Option<Arc<WriteGovernorConfig>> {
    GovernorConfigBuilder::default()
        .per_second(config.per_second)
        .burst_size(config.burst_size)
        .use_headers()
        .finish()
        .map(Arc::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RateLimitConfig::default();
        assert_eq!(config.per_second, 1);
        assert_eq!(config.burst_size, 10);
        assert!(write_governor(&config).is_some());
    }

    #[test]
    fn test_zero_burst_rejected() {
        let config = RateLimitConfig {
            burst_size: 0,
            ..RateLimitConfig::strict()
        };
        assert!(write_governor(&config).is_none());
    }
}
