//! Tunables for sync scheduling and batch transfer

use std::time::Duration;

/// Default interval between periodic sync rounds
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Consecutive failures before the scheduler switches to backoff
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Starting delay once backoff engages
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(5);

/// Ceiling for the backoff delay
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Maximum number of posts carried by a single POST_BATCH message
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Configuration for a [`crate::sync::SyncManager`] and its scheduler
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Interval between periodic sync rounds
    pub sync_interval: Duration,
    /// Consecutive failures before backoff engages
    pub failure_threshold: u32,
    /// Starting backoff delay
    pub base_backoff: Duration,
    /// Maximum backoff delay
    pub max_backoff: Duration,
    /// Posts per POST_BATCH; larger result sets are chunked
    pub max_batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval: DEFAULT_SYNC_INTERVAL,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            base_backoff: DEFAULT_BASE_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

impl SyncConfig {
    /// Delay before the next sync round after `consecutive_failures`
    ///
    /// Below the threshold this is the regular interval. At and beyond it,
    /// the delay doubles from `base_backoff` per additional failure, capped
    /// at `max_backoff`.
    pub fn next_delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures < self.failure_threshold {
            return self.sync_interval;
        }
        let exponent = (consecutive_failures - self.failure_threshold).min(31);
        let backoff = self.base_backoff.saturating_mul(1u32 << exponent);
        backoff.min(self.max_backoff)
    }
}
