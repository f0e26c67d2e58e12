//! Page cache configuration.

use std::{num::NonZeroUsize, time::Duration};

const DEFAULT_TTL_SECS: u64 = 20;
const DEFAULT_CAPACITY: usize = 512;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Runtime configuration of the feed page cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Wire a page cache at all.
    pub enabled: bool,
    /// How long a rendered page stays fresh.
    pub ttl: Duration,
    /// Maximum rendered pages held before LRU eviction.
    pub capacity: usize,
    /// Cadence of the background purge of expired pages.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            capacity: DEFAULT_CAPACITY,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            ttl: settings.ttl,
            capacity: settings.capacity.get(),
            sweep_interval: settings.sweep_interval,
        }
    }
}

impl CacheConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
