use std::collections::BTreeSet;
use std::time::Duration;

use crate::status::UnifiedStatus;

pub const DEFAULT_MAX_RETRIES: usize = 3;
pub const DEFAULT_RETRY_COOLDOWN: Duration = Duration::from_secs(1);

/// Which statuses are retried, how often, and how long to wait in between.
///
/// The wait is a fixed cooldown, not a backoff: every retry sleeps the same
/// duration on the calling thread.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_retries: usize,
    cooldown: Duration,
    retryable_status_codes: BTreeSet<u16>,
    retry_on_execution_failure: bool,
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::standard()
        }
    }

    pub fn standard() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            cooldown: DEFAULT_RETRY_COOLDOWN,
            retryable_status_codes: default_retryable_status_codes(),
            retry_on_execution_failure: true,
        }
    }

    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = codes.into_iter().collect();
        self
    }

    pub fn retry_on_execution_failure(mut self, retry: bool) -> Self {
        self.retry_on_execution_failure = retry;
        self
    }

    pub fn max_retries_value(&self) -> usize {
        self.max_retries
    }

    pub fn cooldown_value(&self) -> Duration {
        self.cooldown
    }

    pub fn is_transient(&self, status: UnifiedStatus) -> bool {
        match status {
            UnifiedStatus::Http(code) => self.retryable_status_codes.contains(&code),
            UnifiedStatus::ExecutionFailed => self.retry_on_execution_failure,
            UnifiedStatus::Cancelled => false,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

fn default_retryable_status_codes() -> BTreeSet<u16> {
    [502_u16, 503].into_iter().collect()
}
