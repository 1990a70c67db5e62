//! Query cache configuration.
//!
//! Durations are configured in milliseconds, e.g. in `callboard.toml`:
//!
//! ```toml
//! [query]
//! stale_time_ms = 300000
//! gc_time_ms = 600000
//! retry = 3
//! refetch_on_reconnect = true
//! ```

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

use super::retry::{Backoff, RetryPolicy};

const DEFAULT_STALE_TIME_MS: u64 = 5 * 60 * 1000;
const DEFAULT_GC_TIME_MS: u64 = 10 * 60 * 1000;
const DEFAULT_RETRY: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 30_000;
const DEFAULT_MUTATION_RETRY: u32 = 1;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_GC_INTERVAL_MS: u64 = 60_000;

/// Engine defaults applied to every query and mutation unless overridden.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// How long fetched data counts as fresh.
    pub stale_time_ms: u64,
    /// How long an unobserved entry survives after its last fetch.
    pub gc_time_ms: u64,
    /// Retries for failed fetches; client errors are never retried.
    pub retry: u32,
    /// First retry delay; doubled per attempt.
    pub retry_base_delay_ms: u64,
    /// Upper bound for the retry delay.
    pub retry_max_delay_ms: u64,
    /// Retries for failed mutations.
    pub mutation_retry: u32,
    /// Time budget of a single fetch or mutation attempt.
    pub request_timeout_ms: u64,
    pub refetch_on_window_focus: bool,
    pub refetch_on_reconnect: bool,
    /// Period of the background garbage-collection sweep.
    pub gc_interval_ms: u64,
    /// Upper bound on cached entries; `0` disables the bound.
    pub max_entries: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time_ms: DEFAULT_STALE_TIME_MS,
            gc_time_ms: DEFAULT_GC_TIME_MS,
            retry: DEFAULT_RETRY,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            mutation_retry: DEFAULT_MUTATION_RETRY,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            refetch_on_window_focus: false,
            refetch_on_reconnect: true,
            gc_interval_ms: DEFAULT_GC_INTERVAL_MS,
            max_entries: 0,
        }
    }
}

impl QueryConfig {
    pub fn stale_time(&self) -> Duration {
        Duration::from_millis(self.stale_time_ms)
    }

    pub fn gc_time(&self) -> Duration {
        Duration::from_millis(self.gc_time_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_millis(self.gc_interval_ms)
    }

    /// Returns the entry bound, or `None` when unbounded.
    pub fn max_entries_non_zero(&self) -> Option<NonZeroUsize> {
        NonZeroUsize::new(self.max_entries)
    }

    pub fn query_retry(&self) -> RetryPolicy {
        RetryPolicy::Count(self.retry)
    }

    pub fn mutation_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::Count(self.mutation_retry)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::Exponential {
            base: Duration::from_millis(self.retry_base_delay_ms),
            cap: Duration::from_millis(self.retry_max_delay_ms),
        }
    }
}
