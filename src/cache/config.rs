//! Query cache configuration.
//!
//! Controlled by the `[cache]` table of `roster.toml`.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_STALE_TIME_MS: u64 = 5 * 60 * 1000;
const DEFAULT_GC_TIME_MS: u64 = 5 * 60 * 1000;
const DEFAULT_RETRY: u32 = 1;
const DEFAULT_RETRY_DELAY_MS: u64 = 250;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a successful result is served without refetching.
    pub stale_time_ms: u64,
    /// How long an entry with no subscriber survives garbage collection. `0` keeps
    /// entries for the whole session.
    pub gc_time_ms: u64,
    /// Automatic retries after a failed fetch.
    pub retry: u32,
    /// Fixed delay between a failure and its retry.
    pub retry_delay_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time_ms: DEFAULT_STALE_TIME_MS,
            gc_time_ms: DEFAULT_GC_TIME_MS,
            retry: DEFAULT_RETRY,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            stale_time_ms: settings.stale_time_ms,
            gc_time_ms: settings.gc_time_ms,
            retry: settings.retry,
            retry_delay_ms: settings.retry_delay_ms,
        }
    }
}

impl CacheConfig {
    pub fn stale_time(&self) -> Duration {
        Duration::from_millis(self.stale_time_ms)
    }

    /// Returns `None` when garbage collection is disabled.
    pub fn gc_time(&self) -> Option<Duration> {
        (self.gc_time_ms > 0).then(|| Duration::from_millis(self.gc_time_ms))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
