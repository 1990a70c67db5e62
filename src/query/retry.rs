//! Retry policies and backoff schedules for fetches and mutations.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::error::QueryError;

type RetryPredicate = Arc<dyn Fn(u32, &QueryError) -> bool + Send + Sync>;
type DelayFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Decides whether a failed attempt is tried again.
#[derive(Clone)]
pub enum RetryPolicy {
    Never,
    /// Retry up to `n` times, only for [retryable](QueryError::is_retryable) errors.
    Count(u32),
    /// Custom decision from the number of failures so far and the last error.
    Predicate(RetryPredicate),
}

impl RetryPolicy {
    pub fn predicate(f: impl Fn(u32, &QueryError) -> bool + Send + Sync + 'static) -> Self {
        Self::Predicate(Arc::new(f))
    }

    /// `failures` counts failed attempts including the one that produced `error`.
    pub fn should_retry(&self, failures: u32, error: &QueryError) -> bool {
        match self {
            Self::Never => false,
            Self::Count(max) => error.is_retryable() && failures <= *max,
            Self::Predicate(f) => f(failures, error),
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Never => f.write_str("Never"),
            Self::Count(n) => f.debug_tuple("Count").field(n).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Delay schedule between attempts.
#[derive(Clone)]
pub enum Backoff {
    Fixed(Duration),
    /// `min(base * 2^attempt, cap)`.
    Exponential { base: Duration, cap: Duration },
    Custom(DelayFn),
}

impl Backoff {
    pub fn custom(f: impl Fn(u32) -> Duration + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential { base, cap } => base
                .saturating_mul(2_u32.saturating_pow(attempt))
                .min(*cap),
            Self::Custom(f) => f(attempt),
        }
    }
}

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(delay) => f.debug_tuple("Fixed").field(delay).finish(),
            Self::Exponential { base, cap } => f
                .debug_struct("Exponential")
                .field("base", base)
                .field("cap", cap)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
