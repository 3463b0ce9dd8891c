use std::time::Duration;

use rand::Rng;

use crate::{
    classify::fatal_reason,
    load_error::LoadErrorInfo,
};

/// Upper bound for any reconnect delay. Live radio favors fast reconnection.
pub const MAX_RETRY_DELAY: Duration = Duration::from_millis(5000);
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_JITTER: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Reopen after this delay.
    Retry(Duration),
    /// Terminal for the current attempt chain.
    Stop,
}

impl RetryDecision {
    pub fn delay_ms(&self) -> Option<u64> {
        match self {
            RetryDecision::Retry(delay) => Some(delay.as_millis() as u64),
            RetryDecision::Stop => None,
        }
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, RetryDecision::Stop)
    }
}

/// Decides whether a failed load is retried, and after how long.
///
/// Transient errors are retried forever with a doubling delay capped at
/// [`MAX_RETRY_DELAY`]. Fatal errors stop the chain on any attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_delay: Duration,
    jitter: f64,
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: MAX_RETRY_DELAY,
            jitter: DEFAULT_JITTER,
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Lowers the delay cap. Values above [`MAX_RETRY_DELAY`] are clamped.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay.min(MAX_RETRY_DELAY);
        self
    }

    /// Fraction of the delay that may be randomly shaved off, in `0.0..=1.0`.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = if jitter.is_finite() {
            jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Capped exponential delay for `attempt`, without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1) - 1;
        let factor = 2u32.saturating_pow(exponent);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn decide(&self, info: &LoadErrorInfo) -> RetryDecision {
        let attempt = info.attempt_count.max(1);

        if let Some(reason) = fatal_reason(&info.error) {
            tracing::error!(
                "Fatal {:?} load error ({reason:?}) on attempt {attempt}, stopping: {}",
                info.data_type,
                info.error
            );
            return RetryDecision::Stop;
        }

        let mut delay = self.backoff(attempt);
        if self.jitter > 0.0 && !delay.is_zero() {
            let cut = rand::thread_rng().gen_range(0.0..=self.jitter);
            delay = delay.mul_f64(1.0 - cut);
        }

        let call = if attempt == 1 {
            "Initial retry".to_string()
        } else {
            format!("Retry #{attempt}")
        };
        tracing::info!(
            "{call} of {:?} load in {}ms: {}",
            info.data_type,
            delay.as_millis(),
            info.error
        );
        RetryDecision::Retry(delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}
