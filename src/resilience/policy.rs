use std::time::Duration;

/// How often and how patiently a failed operation is retried.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryPolicy {
    /// Never retry after the first failure
    Never,

    /// Retry up to `max_attempts` times, waiting `delay` between attempts
    Fixed { delay: Duration, max_attempts: usize },

    /// Retry with doubling delay starting at `base`, capped at `max`
    Exponential {
        base: Duration,
        max: Duration,
        max_attempts: usize,
    },
}

impl RetryPolicy {
    pub fn fixed(delay: Duration, max_attempts: usize) -> Self {
        if max_attempts == 0 {
            return RetryPolicy::Never;
        }
        RetryPolicy::Fixed { delay, max_attempts }
    }

    /// Number of retries allowed after the first failure
    pub fn max_attempts(&self) -> usize {
        match self {
            RetryPolicy::Never => 0,
            RetryPolicy::Fixed { max_attempts, .. } | RetryPolicy::Exponential { max_attempts, .. } => {
                *max_attempts
            }
        }
    }

    /// Delay to wait after the 1-based `attempt` failed, `None` when it was the last one.
    pub fn delay_after(&self, attempt: usize) -> Option<Duration> {
        if attempt >= self.max_attempts() {
            return None;
        }
        match self {
            RetryPolicy::Never => None,
            RetryPolicy::Fixed { delay, .. } => Some(*delay),
            RetryPolicy::Exponential { base, max, .. } => {
                let factor = 1u32.checked_shl(attempt.saturating_sub(1) as u32).unwrap_or(u32::MAX);
                Some(base.saturating_mul(factor).min(*max))
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Fixed {
            delay: Duration::from_secs(2),
            max_attempts: 10,
        }
    }
}
