//! Query cache timing configuration.

use std::time::Duration;

const DEFAULT_STALE_AFTER_MS: u64 = 0;
const DEFAULT_GC_GRACE_MS: u64 = 5 * 60 * 1000;
const DEFAULT_GC_INTERVAL_MS: u64 = 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Age after which a successful entry refetches on the next subscription.
    /// Zero means every new subscription triggers a background refetch.
    pub stale_after: Duration,
    /// How long an unsubscribed entry is retained before eviction.
    pub gc_grace: Duration,
    /// Sweep cadence of the background collector.
    pub gc_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_millis(DEFAULT_STALE_AFTER_MS),
            gc_grace: Duration::from_millis(DEFAULT_GC_GRACE_MS),
            gc_interval: Duration::from_millis(DEFAULT_GC_INTERVAL_MS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            stale_after: settings.stale_after,
            gc_grace: settings.gc_grace,
            gc_interval: settings.gc_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.stale_after, Duration::ZERO);
        assert_eq!(config.gc_grace, Duration::from_secs(300));
        assert_eq!(config.gc_interval, Duration::from_secs(60));
    }
}
